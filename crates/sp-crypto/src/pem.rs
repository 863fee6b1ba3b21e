//! PEM armour handling.

use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// Decodes the first PEM block with the given label.
///
/// # Errors
///
/// Returns an error if no block with that label exists or its body is not
/// valid base64.
pub fn pem_to_der(pem: &str, label: &str) -> CryptoResult<Vec<u8>> {
    pem_blocks(pem, label)?
        .into_iter()
        .next()
        .ok_or_else(|| CryptoError::InvalidPem(format!("no {label} block found")))
}

/// Decodes every PEM block with the given label, in document order.
///
/// # Errors
///
/// Returns an error if a block is unterminated or its body is not valid
/// base64.
pub fn pem_blocks(pem: &str, label: &str) -> CryptoResult<Vec<Vec<u8>>> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let mut blocks = Vec::new();
    let mut rest = pem;
    while let Some(start) = rest.find(&begin) {
        let body_start = start + begin.len();
        let body_len = rest[body_start..]
            .find(&end)
            .ok_or_else(|| CryptoError::InvalidPem(format!("unterminated {label} block")))?;

        let body = &rest[body_start..body_start + body_len];
        blocks.push(decode_base64_body(body)?);
        rest = &rest[body_start + body_len + end.len()..];
    }
    Ok(blocks)
}

/// Decodes base64 text that may be wrapped across lines, as found in PEM
/// bodies and in `ds:X509Certificate` elements.
///
/// # Errors
///
/// Returns an error if the text is not valid base64.
pub fn decode_base64_body(text: &str) -> CryptoResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::InvalidPem(format!("invalid base64 body: {e}")))
}
