//! Single logout message validation.
//!
//! Inbound logout messages must always be signed, either with an enveloped
//! signature or, on the Redirect binding, with a detached query signature.

use super::{Rejection, RejectionReason, ValidationContext, ValidationStage, consume_once};
use crate::bindings::DecodedMessage;
use crate::error::SamlResult;
use crate::replay::ReplayStore;
use crate::signature::XmlSignatureValidator;
use crate::types::{LogoutRequest, LogoutResponse};

/// Validates `LogoutRequest` and `LogoutResponse` messages from an IdP.
pub struct LogoutValidator<'a> {
    ctx: ValidationContext<'a>,
    store: &'a dyn ReplayStore,
}

impl<'a> LogoutValidator<'a> {
    /// Creates a validator. `ctx.endpoint_url` is this SP's logout URL.
    #[must_use]
    pub fn new(ctx: ValidationContext<'a>, store: &'a dyn ReplayStore) -> Self {
        Self { ctx, store }
    }

    /// Validates an IdP-initiated logout request.
    ///
    /// # Errors
    ///
    /// Returns a signature, validation or replay error for a rejected
    /// request.
    pub async fn validate_request(&self, message: &DecodedMessage) -> SamlResult<LogoutRequest> {
        let request = LogoutRequest::from_element(message.document.root())
            .map_err(|e| self.reject(ValidationStage::Received, RejectionReason::Malformed(e.to_string())))?;
        self.check_origin(&request.issuer, request.destination.as_deref())?;
        self.check_signature(message)?;
        // Without NotOnOrAfter the request is good for the retention period
        // after it was issued.
        let not_on_or_after = request.not_on_or_after.unwrap_or(
            request.issue_instant + self.ctx.max_replay_retention - self.ctx.clock_skew,
        );
        let expiry = self
            .ctx
            .check_window(None, Some(not_on_or_after))
            .and_then(|()| self.ctx.replay_expiry(Some(not_on_or_after)))
            .map_err(|reason| self.reject(ValidationStage::ConditionsChecked, reason))?;

        consume_once(self.store, &format!("logout:{}", request.id), &request.id, expiry).await?;
        tracing::debug!(request_id = %request.id, idp = %self.ctx.idp.entity_id, "LogoutRequest accepted");
        Ok(request)
    }

    /// Validates the IdP's answer to a logout request this SP sent.
    ///
    /// # Errors
    ///
    /// Returns a signature, validation or replay error for a rejected
    /// response, including a non-success status.
    pub async fn validate_response(&self, message: &DecodedMessage) -> SamlResult<LogoutResponse> {
        let response = LogoutResponse::from_element(message.document.root())
            .map_err(|e| self.reject(ValidationStage::Received, RejectionReason::Malformed(e.to_string())))?;
        self.check_origin(&response.issuer, response.destination.as_deref())?;
        self.check_signature(message)?;

        if !response.status.is_success() {
            return Err(self
                .reject(
                    ValidationStage::Received,
                    RejectionReason::StatusNotSuccess {
                        status: response.status.code.clone(),
                        message: response.status.message.clone(),
                    },
                )
                .into());
        }

        let Some(request_id) = response.in_response_to.as_deref() else {
            return Err(self
                .reject(ValidationStage::SubjectConfirmed, RejectionReason::Unsolicited)
                .into());
        };
        let expected = self.ctx.expected_in_response_to.is_none_or(|e| e == request_id);
        if !expected || !self.store.claim_issued(request_id, self.ctx.now).await? {
            return Err(self
                .reject(
                    ValidationStage::SubjectConfirmed,
                    RejectionReason::UnknownInResponseTo(request_id.to_string()),
                )
                .into());
        }

        let expiry = self
            .ctx
            .replay_expiry(None)
            .map_err(|reason| self.reject(ValidationStage::ConditionsChecked, reason))?;
        consume_once(self.store, &format!("logout:{}", response.id), &response.id, expiry).await?;
        Ok(response)
    }

    fn check_origin(&self, issuer: &str, destination: Option<&str>) -> Result<(), Rejection> {
        let expected = self.ctx.idp.entity_id.as_str();
        if issuer != expected {
            return Err(self.reject(
                ValidationStage::Received,
                RejectionReason::UnknownIssuer {
                    expected: expected.to_string(),
                    actual: Some(issuer.to_string()),
                },
            ));
        }
        match destination {
            Some(destination) if destination != self.ctx.endpoint_url => Err(self.reject(
                ValidationStage::Received,
                RejectionReason::WrongDestination {
                    expected: self.ctx.endpoint_url.to_string(),
                    actual: destination.to_string(),
                },
            )),
            _ => Ok(()),
        }
    }

    fn check_signature(&self, message: &DecodedMessage) -> Result<(), Rejection> {
        let validator =
            XmlSignatureValidator::new(&self.ctx.idp.signing_certificates, &self.ctx.policy);
        let verified = match &message.redirect_signature {
            Some(detached) => validator.verify_redirect(
                &detached.signed_query,
                &detached.sig_alg,
                &detached.signature,
            ),
            None => validator.check_element(message.document.root()),
        };
        verified
            .map(|_| ())
            .map_err(|e| self.reject(ValidationStage::SignatureChecked, RejectionReason::Signature(e)))
    }

    fn reject(&self, stage: ValidationStage, reason: RejectionReason) -> Rejection {
        tracing::warn!(
            idp = %self.ctx.idp.entity_id,
            stage = %stage,
            reason = reason.label(),
            detail = %reason,
            "SAML logout message rejected"
        );
        Rejection::new(stage, reason)
    }
}
