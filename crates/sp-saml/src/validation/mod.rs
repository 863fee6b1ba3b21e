//! Semantic validation of inbound protocol messages.
//!
//! A response moves through the stages of [`ValidationStage`] strictly in
//! order. The first failed check ends validation with a [`Rejection`] naming
//! the stage that was being attempted and a [`RejectionReason`] hosts can
//! match on.

mod logout;
mod response;

pub use logout::LogoutValidator;
pub use response::{AcceptedResponse, Principal, ResponseValidator};

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::entity_id::EntityId;
use crate::error::SignatureError;
use crate::options::IdentityProvider;
use crate::replay::{ConsumeOutcome, ReplayStore};
use crate::signature::AlgorithmPolicy;

/// Validation pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValidationStage {
    /// Structure, issuer, destination and status.
    Received,
    /// Enveloped or detached signatures.
    SignatureChecked,
    /// `NotBefore`/`NotOnOrAfter` window and audience.
    ConditionsChecked,
    /// Bearer confirmation and `InResponseTo`.
    SubjectConfirmed,
    /// Message and assertion ids against the replay store.
    ReplayChecked,
    /// All checks passed.
    Accepted,
}

impl ValidationStage {
    /// Returns the stage name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::SignatureChecked => "signature_checked",
            Self::ConditionsChecked => "conditions_checked",
            Self::SubjectConfirmed => "subject_confirmed",
            Self::ReplayChecked => "replay_checked",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// The message is structurally unusable.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The issuer is not the expected partner.
    #[error("unknown issuer {actual:?}, expected {expected}")]
    UnknownIssuer {
        /// Expected issuer.
        expected: String,
        /// Issuer found in the message.
        actual: Option<String>,
    },

    /// `Destination` names another endpoint.
    #[error("wrong destination {actual}, expected {expected}")]
    WrongDestination {
        /// This SP's endpoint.
        expected: String,
        /// The message's `Destination`.
        actual: String,
    },

    /// The partner reported a failure.
    #[error("partner returned status {status}")]
    StatusNotSuccess {
        /// Top-level status code.
        status: String,
        /// Optional status message.
        message: Option<String>,
    },

    /// A signature was missing or failed verification.
    #[error("{0}")]
    Signature(SignatureError),

    /// The validity window has not started.
    #[error("not valid before {not_before}")]
    NotYetValid {
        /// Start of the validity window.
        not_before: DateTime<Utc>,
    },

    /// The validity window has ended.
    #[error("expired at {not_on_or_after}")]
    Expired {
        /// End of the validity window.
        not_on_or_after: DateTime<Utc>,
    },

    /// The validity window ends after the replay retention bound.
    #[error("valid until {not_on_or_after}, beyond the replay retention")]
    ValidityTooLong {
        /// End of the validity window.
        not_on_or_after: DateTime<Utc>,
    },

    /// An audience restriction excludes this SP.
    #[error("audience restriction does not include {expected}")]
    WrongAudience {
        /// This SP's entity id.
        expected: String,
    },

    /// The subject has no bearer confirmation.
    #[error("no bearer subject confirmation")]
    NoBearerConfirmation,

    /// The bearer confirmation names another recipient.
    #[error("wrong recipient {actual:?}, expected {expected}")]
    WrongRecipient {
        /// This SP's assertion consumer service URL.
        expected: String,
        /// The confirmation's `Recipient`.
        actual: Option<String>,
    },

    /// `InResponseTo` does not answer an outstanding request.
    #[error("InResponseTo {0} matches no outstanding request")]
    UnknownInResponseTo(String),

    /// The response answers no request and the partner may not send
    /// unsolicited responses.
    #[error("unsolicited response not allowed")]
    Unsolicited,

    /// The id was already consumed.
    #[error("replayed id {message_id}")]
    Replay {
        /// The duplicate id.
        message_id: String,
    },

    /// Only encrypted assertions were delivered.
    #[error("encrypted assertions are not supported")]
    EncryptedAssertionUnsupported,
}

impl RejectionReason {
    /// Short, stable label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnknownIssuer { .. } => "unknown_issuer",
            Self::WrongDestination { .. } => "wrong_destination",
            Self::StatusNotSuccess { .. } => "status_not_success",
            Self::Signature(_) => "signature",
            Self::NotYetValid { .. } => "not_yet_valid",
            Self::Expired { .. } => "expired",
            Self::ValidityTooLong { .. } => "validity_too_long",
            Self::WrongAudience { .. } => "wrong_audience",
            Self::NoBearerConfirmation => "no_bearer_confirmation",
            Self::WrongRecipient { .. } => "wrong_recipient",
            Self::UnknownInResponseTo(_) => "unknown_in_response_to",
            Self::Unsolicited => "unsolicited",
            Self::Replay { .. } => "replay",
            Self::EncryptedAssertionUnsupported => "encrypted_assertion_unsupported",
        }
    }
}

/// A failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected at {stage}: {reason}")]
pub struct Rejection {
    /// The stage being attempted when the check failed.
    pub stage: ValidationStage,
    /// What failed.
    pub reason: RejectionReason,
}

impl Rejection {
    /// Creates a rejection.
    #[must_use]
    pub const fn new(stage: ValidationStage, reason: RejectionReason) -> Self {
        Self { stage, reason }
    }
}

/// Inputs shared by the validators.
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    /// This SP's entity id, expected in audience restrictions.
    pub sp_entity_id: &'a EntityId,
    /// The SP endpoint that received the message.
    pub endpoint_url: &'a str,
    /// The partner that must have issued the message.
    pub idp: &'a IdentityProvider,
    /// Allowed signature and digest algorithms.
    pub policy: AlgorithmPolicy,
    /// Tolerance applied to every time comparison.
    pub clock_skew: Duration,
    /// Upper bound on how long consumed ids are remembered.
    pub max_replay_retention: Duration,
    /// Whether the assertion must carry its own signature.
    pub require_signed_assertions: bool,
    /// Request id the host stored for this exchange, if any.
    pub expected_in_response_to: Option<&'a str>,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

impl<'a> ValidationContext<'a> {
    /// Creates a context evaluated at the current time.
    #[must_use]
    pub fn new(
        sp_entity_id: &'a EntityId,
        endpoint_url: &'a str,
        idp: &'a IdentityProvider,
        config: &EngineConfig,
    ) -> Self {
        Self {
            sp_entity_id,
            endpoint_url,
            idp,
            policy: config.algorithm_policy(),
            clock_skew: config.clock_skew(),
            max_replay_retention: config.max_replay_retention(),
            require_signed_assertions: idp.want_assertions_signed,
            expected_in_response_to: None,
            now: Utc::now(),
        }
    }

    /// Sets the request id this exchange must answer.
    #[must_use]
    pub fn with_expected_request(mut self, request_id: Option<&'a str>) -> Self {
        self.expected_in_response_to = request_id;
        self
    }

    /// Requires assertions to be signed in addition to the partner setting.
    #[must_use]
    pub fn require_signed_assertions(mut self, required: bool) -> Self {
        self.require_signed_assertions = self.require_signed_assertions || required;
        self
    }

    /// Evaluates at `now` instead of the current time.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Replay-cache expiry for a message valid until `not_on_or_after`:
    /// that instant plus skew. An id is never remembered for less than its
    /// message stays acceptable, so a window ending past the retention bound
    /// is refused outright.
    pub(crate) fn replay_expiry(
        &self,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, RejectionReason> {
        let cap = self.now + self.max_replay_retention;
        match not_on_or_after {
            None => Ok(cap),
            Some(not_on_or_after) if not_on_or_after > cap => {
                Err(RejectionReason::ValidityTooLong { not_on_or_after })
            }
            Some(not_on_or_after) => Ok(not_on_or_after + self.clock_skew),
        }
    }

    /// Checks that `now` lies inside `[not_before, not_on_or_after)` widened
    /// by the clock skew.
    pub(crate) fn check_window(
        &self,
        not_before: Option<DateTime<Utc>>,
        not_on_or_after: Option<DateTime<Utc>>,
    ) -> Result<(), RejectionReason> {
        if let Some(not_before) = not_before {
            if self.now + self.clock_skew < not_before {
                return Err(RejectionReason::NotYetValid { not_before });
            }
        }
        if let Some(not_on_or_after) = not_on_or_after {
            if self.now >= not_on_or_after + self.clock_skew {
                return Err(RejectionReason::Expired { not_on_or_after });
            }
        }
        Ok(())
    }
}

/// Consumes `key` in `store`, turning a duplicate into a replay rejection.
pub(crate) async fn consume_once(
    store: &dyn ReplayStore,
    key: &str,
    message_id: &str,
    expires_at: DateTime<Utc>,
) -> crate::error::SamlResult<()> {
    match store.try_consume(key, expires_at).await? {
        ConsumeOutcome::Accepted => Ok(()),
        ConsumeOutcome::AlreadyConsumed => {
            tracing::warn!(
                target: "saml2::security",
                message_id,
                "Replayed SAML message id detected"
            );
            Err(Rejection::new(
                ValidationStage::ReplayChecked,
                RejectionReason::Replay {
                    message_id: message_id.to_string(),
                },
            )
            .into())
        }
    }
}
