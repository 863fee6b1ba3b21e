//! HTTP-Redirect Binding implementation.
//!
//! Sends SAML messages in URL query parameters with raw DEFLATE
//! compression. Signatures are detached and computed over
//! `SAMLRequest=..&RelayState=..&SigAlg=..` exactly as it appears on the
//! wire, so verification uses the raw, still URL-encoded values.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::{DecodeLimits, DecodedMessage, RedirectSignature, SamlMessageType, decode_payload};
use crate::error::{DecodeError, SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a message into a redirect URL.
    ///
    /// With a signer, `SigAlg` and `Signature` are appended; the XML itself
    /// must then be unsigned.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode(
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner<'_>>,
    ) -> SamlResult<String> {
        let compressed = deflate(xml.as_bytes())?;
        let mut query = format!(
            "{}={}",
            message_type.param(),
            urlencoding::encode(&STANDARD.encode(compressed))
        );
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        if let Some(signer) = signer {
            query = signer.sign_redirect_query(&query)?;
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a message from a raw (still URL-encoded) query string.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if no SAML parameter is present, or the
    /// payload fails any decoding step or limit.
    pub fn decode(raw_query: &str, limits: &DecodeLimits) -> Result<DecodedMessage, DecodeError> {
        let params = RawQuery::parse(raw_query);

        let (message_type, raw_message) = if let Some(v) = params.get("SAMLRequest") {
            (SamlMessageType::Request, v)
        } else if let Some(v) = params.get("SAMLResponse") {
            (SamlMessageType::Response, v)
        } else {
            return Err(DecodeError::MissingParameter("SAMLRequest or SAMLResponse"));
        };

        let document = decode_payload(&form_decode(raw_message)?, true, limits)?;
        let relay_state = params.get("RelayState").map(form_decode).transpose()?;

        let redirect_signature = match (params.get("SigAlg"), params.get("Signature")) {
            (Some(sig_alg), Some(signature)) => {
                let mut signed_query = format!("{}={raw_message}", message_type.param());
                if let Some(rs) = params.get("RelayState") {
                    signed_query.push_str("&RelayState=");
                    signed_query.push_str(rs);
                }
                signed_query.push_str("&SigAlg=");
                signed_query.push_str(sig_alg);
                Some(RedirectSignature {
                    signed_query,
                    sig_alg: form_decode(sig_alg)?,
                    signature: form_decode(signature)?,
                })
            }
            (None, None) => None,
            (None, Some(_)) => return Err(DecodeError::MissingParameter("SigAlg")),
            (Some(_), None) => return Err(DecodeError::MissingParameter("Signature")),
        };

        Ok(DecodedMessage {
            document,
            message_type,
            binding: SamlBinding::HttpRedirect,
            relay_state,
            redirect_signature,
        })
    }
}

/// Query parameters with their raw values. The first occurrence wins.
struct RawQuery<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> RawQuery<'a> {
    fn parse(raw_query: &'a str) -> Self {
        let raw_query = raw_query.strip_prefix('?').unwrap_or(raw_query);
        let pairs = raw_query
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| p.split_once('=').unwrap_or((p, "")))
            .collect();
        Self { pairs }
    }

    fn get(&self, name: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }
}

fn form_decode(raw: &str) -> Result<String, DecodeError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|v| v.into_owned())
        .map_err(|_| DecodeError::invalid("query parameter", raw))
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| SamlError::Decode(DecodeError::Inflate(format!("compression error: {e}"))))?;
    encoder
        .finish()
        .map_err(|e| SamlError::Decode(DecodeError::Inflate(format!("compression error: {e}"))))
}

/// Inflates raw DEFLATE data, refusing output larger than `limit`.
pub(super) fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = DeflateDecoder::new(data).take(cap);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|e| DecodeError::Inflate(e.to_string()))?;
    if inflated.len() > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(inflated)
}
