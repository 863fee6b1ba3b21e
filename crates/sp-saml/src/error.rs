//! SAML error types.
//!
//! The engine reports one family per failure category so hosts can branch on
//! [`SamlError::kind`] without inspecting messages. Cryptographic and
//! semantic failures are never recovered inside the engine.

use thiserror::Error;

use crate::signature::VerificationOutcome;
use crate::validation::{Rejection, RejectionReason};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML engine errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Missing or invalid options. Raised before any protocol work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transport payload could not be turned into a message.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A signature was missing, untrusted or wrong.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// A message failed semantic validation.
    #[error("validation failed: {0}")]
    Validation(Rejection),

    /// A message id was already consumed.
    #[error("replayed message: {message_id}")]
    Replay {
        /// The duplicate message or assertion id.
        message_id: String,
    },

    /// Partner metadata was rejected as a whole.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// The replay store could not answer. The message is rejected.
    #[error("replay store error: {0}")]
    ReplayStore(String),

    /// Key material failed while producing a signature.
    #[error("crypto error: {0}")]
    Crypto(#[from] sp_crypto::CryptoError),

    /// The request path maps to no command.
    #[error("no SAML2 command for path {0}")]
    UnknownCommand(String),
}

/// Fieldless discriminant of [`SamlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`SamlError::Configuration`].
    Configuration,
    /// See [`SamlError::Decode`].
    Decode,
    /// See [`SamlError::Signature`].
    Signature,
    /// See [`SamlError::Validation`].
    Validation,
    /// See [`SamlError::Replay`].
    Replay,
    /// See [`SamlError::Metadata`].
    Metadata,
    /// See [`SamlError::ReplayStore`].
    ReplayStore,
    /// See [`SamlError::Crypto`].
    Crypto,
    /// See [`SamlError::UnknownCommand`].
    UnknownCommand,
}

impl SamlError {
    /// Returns the error family.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Signature(_) => ErrorKind::Signature,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Replay { .. } => ErrorKind::Replay,
            Self::Metadata(_) => ErrorKind::Metadata,
            Self::ReplayStore(_) => ErrorKind::ReplayStore,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::UnknownCommand(_) => ErrorKind::UnknownCommand,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a metadata error.
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }
}

impl From<Rejection> for SamlError {
    fn from(rejection: Rejection) -> Self {
        match rejection.reason {
            RejectionReason::Signature(error) => Self::Signature(error),
            RejectionReason::Replay { message_id } => Self::Replay { message_id },
            _ => Self::Validation(rejection),
        }
    }
}

/// Transport or XML decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A required transport parameter is absent.
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),

    /// The payload is larger than the configured limit.
    #[error("payload exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The payload is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(String),

    /// Raw DEFLATE decompression failed.
    #[error("inflate failed: {0}")]
    Inflate(String),

    /// The decoded message is not UTF-8.
    #[error("message is not valid UTF-8")]
    Utf8,

    /// The message is not well-formed XML.
    #[error("malformed XML: {0}")]
    MalformedXml(String),

    /// The document declares a DTD.
    #[error("document type declarations are not allowed")]
    DtdForbidden,

    /// The root element is not the expected message.
    #[error("expected {expected}, found {found}")]
    UnexpectedMessage {
        /// Expected element name.
        expected: String,
        /// Actual root element name.
        found: String,
    },

    /// A required element or attribute is absent.
    #[error("missing {0}")]
    Missing(String),

    /// An attribute or element has an unusable value.
    #[error("invalid {field}: {value}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// The binding cannot carry this message.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),
}

impl DecodeError {
    pub(crate) fn missing(what: impl Into<String>) -> Self {
        Self::Missing(what.into())
    }

    pub(crate) fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl From<quick_xml::Error> for DecodeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::MalformedXml(err.to_string())
    }
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err.to_string())
    }
}

/// A failed signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{outcome}: {detail}")]
pub struct SignatureError {
    /// The verification outcome. Never [`VerificationOutcome::Valid`].
    pub outcome: VerificationOutcome,
    /// Human-readable diagnostic.
    pub detail: String,
}

impl SignatureError {
    /// Creates a signature error.
    pub fn new(outcome: VerificationOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }
}
