//! Assertion consumer validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Rejection, RejectionReason, ValidationContext, ValidationStage, consume_once};
use crate::entity_id::EntityId;
use crate::error::{SamlResult, SignatureError};
use crate::replay::ReplayStore;
use crate::signature::{VerificationOutcome, XmlSignatureValidator};
use crate::types::{
    Assertion, Attribute, NameId, Response, SAML_NS, SubjectConfirmation, SubjectConfirmationData,
};
use crate::xml::{XmlDocument, XmlElement};

/// The authenticated subject of an accepted response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The IdP that asserted the identity.
    pub issuer: EntityId,
    /// Subject name identifier, including its format.
    pub name_id: NameId,
    /// IdP session index, needed for single logout.
    pub session_index: Option<String>,
    /// When the user authenticated at the IdP.
    pub authn_instant: Option<DateTime<Utc>>,
    /// When the IdP session ends, if it said.
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    /// Asserted attributes.
    pub attributes: Vec<Attribute>,
}

impl Principal {
    /// Looks up an attribute by `Name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// First value of the attribute called `name`.
    #[must_use]
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attribute(name)
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }
}

/// A response that passed every stage.
#[derive(Debug, Clone)]
pub struct AcceptedResponse {
    /// Response `ID`.
    pub response_id: String,
    /// Assertion `ID`.
    pub assertion_id: String,
    /// The request this response answered, if it was solicited.
    pub in_response_to: Option<String>,
    /// The authenticated subject.
    pub principal: Principal,
    /// The validated assertion.
    pub assertion: Assertion,
}

/// Runs a `samlp:Response` through the validation stages.
pub struct ResponseValidator<'a> {
    ctx: ValidationContext<'a>,
    store: &'a dyn ReplayStore,
}

impl<'a> ResponseValidator<'a> {
    /// Creates a validator.
    #[must_use]
    pub fn new(ctx: ValidationContext<'a>, store: &'a dyn ReplayStore) -> Self {
        Self { ctx, store }
    }

    /// Validates a decoded response document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Signature`](crate::SamlError::Signature) for
    /// signature failures, [`SamlError::Replay`](crate::SamlError::Replay)
    /// for replays, [`SamlError::Validation`](crate::SamlError::Validation)
    /// for every other rejection and
    /// [`SamlError::ReplayStore`](crate::SamlError::ReplayStore) when the
    /// store cannot answer.
    pub async fn validate(&self, document: &XmlDocument) -> SamlResult<AcceptedResponse> {
        let checked = self.check(document.root()).inspect_err(|r| self.log_rejection(r))?;

        if let Some(id) = checked.in_response_to.as_deref() {
            if !self.store.claim_issued(id, self.ctx.now).await? {
                let rejection = Rejection::new(
                    ValidationStage::SubjectConfirmed,
                    RejectionReason::UnknownInResponseTo(id.to_string()),
                );
                self.log_rejection(&rejection);
                return Err(rejection.into());
            }
        }

        let expiry = checked.replay_expiry;
        let response_id = &checked.response.id;
        let assertion_id = &checked.assertion.id;
        consume_once(self.store, &format!("response:{response_id}"), response_id, expiry).await?;
        consume_once(self.store, &format!("assertion:{assertion_id}"), assertion_id, expiry).await?;

        tracing::debug!(
            idp = %self.ctx.idp.entity_id,
            response_id = %response_id,
            stage = %ValidationStage::Accepted,
            "SAML response accepted"
        );
        Ok(checked.into_accepted())
    }

    /// The stages that need no store access.
    fn check(&self, root: &XmlElement) -> Result<Checked, Rejection> {
        let response = self.received(root)?;
        let assertion = response
            .assertions
            .first()
            .cloned()
            .ok_or_else(|| at_received(RejectionReason::Malformed("no assertion".into())))?;
        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.clone())
            .ok_or_else(|| {
                at_received(RejectionReason::Malformed("assertion subject has no NameID".into()))
            })?;
        tracing::debug!(response_id = %response.id, stage = %ValidationStage::Received, "Stage passed");

        self.signatures(root)?;
        self.conditions(&assertion)?;
        let confirmation = self.subject(&assertion)?;
        let in_response_to = self.in_response_to(&response, confirmation)?;

        let not_on_or_after = [
            assertion.conditions.as_ref().and_then(|c| c.not_on_or_after),
            confirmation.not_on_or_after,
        ]
        .into_iter()
        .flatten()
        .min();
        let replay_expiry = self
            .ctx
            .replay_expiry(not_on_or_after)
            .map_err(|reason| Rejection::new(ValidationStage::ConditionsChecked, reason))?;

        Ok(Checked {
            issuer: self.ctx.idp.entity_id.clone(),
            name_id,
            in_response_to,
            not_on_or_after,
            replay_expiry,
            response,
            assertion,
        })
    }

    fn received(&self, root: &XmlElement) -> Result<Response, Rejection> {
        let response = Response::from_element(root)
            .map_err(|e| at_received(RejectionReason::Malformed(e.to_string())))?;
        let expected = self.ctx.idp.entity_id.as_str();

        if let Some(issuer) = response.issuer.as_deref() {
            if issuer != expected {
                return Err(at_received(unknown_issuer(expected, issuer)));
            }
        }
        if let Some(destination) = response.destination.as_deref() {
            if destination != self.ctx.endpoint_url {
                return Err(at_received(RejectionReason::WrongDestination {
                    expected: self.ctx.endpoint_url.to_string(),
                    actual: destination.to_string(),
                }));
            }
        }
        if !response.status.is_success() {
            return Err(at_received(RejectionReason::StatusNotSuccess {
                status: response.status.code.clone(),
                message: response.status.message.clone(),
            }));
        }

        let assertion = match response.assertions.as_slice() {
            [assertion] => assertion,
            [] if response.encrypted_assertions > 0 => {
                return Err(at_received(RejectionReason::EncryptedAssertionUnsupported));
            }
            [] => return Err(at_received(RejectionReason::Malformed("no assertion".into()))),
            _ => {
                return Err(at_received(RejectionReason::Malformed(
                    "more than one assertion".into(),
                )));
            }
        };
        if assertion.issuer != expected {
            return Err(at_received(unknown_issuer(expected, &assertion.issuer)));
        }
        Ok(response)
    }

    /// Verifies the response and assertion signatures. Both elements are
    /// direct children of the document, the only ones read afterwards.
    fn signatures(&self, root: &XmlElement) -> Result<(), Rejection> {
        let reject = |e: SignatureError| {
            Rejection::new(ValidationStage::SignatureChecked, RejectionReason::Signature(e))
        };
        let validator =
            XmlSignatureValidator::new(&self.ctx.idp.signing_certificates, &self.ctx.policy);
        let assertion = root
            .first_child(SAML_NS, "Assertion")
            .ok_or_else(|| at_received(RejectionReason::Malformed("no assertion".into())))?;

        let response_signed = XmlSignatureValidator::is_signed(root);
        let assertion_signed = XmlSignatureValidator::is_signed(assertion);
        if response_signed {
            validator.check_element(root).map_err(reject)?;
        }
        if assertion_signed {
            validator.check_element(assertion).map_err(reject)?;
        }
        if !assertion_signed && (!response_signed || self.ctx.require_signed_assertions) {
            let detail = if response_signed {
                "assertion is not signed"
            } else {
                "neither response nor assertion is signed"
            };
            return Err(reject(SignatureError::new(
                VerificationOutcome::MissingSignature,
                detail,
            )));
        }
        tracing::debug!(stage = %ValidationStage::SignatureChecked, response_signed, assertion_signed, "Stage passed");
        Ok(())
    }

    fn conditions(&self, assertion: &Assertion) -> Result<(), Rejection> {
        let reject = |reason| Rejection::new(ValidationStage::ConditionsChecked, reason);
        let Some(conditions) = assertion.conditions.as_ref() else {
            return Ok(());
        };
        self.ctx
            .check_window(conditions.not_before, conditions.not_on_or_after)
            .map_err(reject)?;

        let sp = self.ctx.sp_entity_id.as_str();
        let excluded = conditions
            .audience_restrictions
            .iter()
            .any(|restriction| !restriction.audiences.iter().any(|a| a == sp));
        if excluded {
            return Err(reject(RejectionReason::WrongAudience {
                expected: sp.to_string(),
            }));
        }
        Ok(())
    }

    /// Finds a bearer confirmation that holds. When none does, the failure
    /// of the last candidate is reported.
    fn subject<'s>(&self, assertion: &'s Assertion) -> Result<&'s SubjectConfirmationData, Rejection> {
        let mut failure = RejectionReason::NoBearerConfirmation;
        for confirmation in assertion.bearer_confirmations() {
            match self.check_bearer(confirmation) {
                Ok(data) => return Ok(data),
                Err(reason) => failure = reason,
            }
        }
        Err(Rejection::new(ValidationStage::SubjectConfirmed, failure))
    }

    fn check_bearer<'s>(
        &self,
        confirmation: &'s SubjectConfirmation,
    ) -> Result<&'s SubjectConfirmationData, RejectionReason> {
        let data = confirmation.data.as_ref();
        let recipient = data.and_then(|d| d.recipient.as_deref());
        let Some(data) = data.filter(|_| recipient == Some(self.ctx.endpoint_url)) else {
            return Err(RejectionReason::WrongRecipient {
                expected: self.ctx.endpoint_url.to_string(),
                actual: recipient.map(str::to_string),
            });
        };
        let not_on_or_after = data.not_on_or_after.ok_or_else(|| {
            RejectionReason::Malformed("bearer confirmation without NotOnOrAfter".into())
        })?;
        self.ctx.check_window(data.not_before, Some(not_on_or_after))?;
        Ok(data)
    }

    fn in_response_to(
        &self,
        response: &Response,
        confirmation: &SubjectConfirmationData,
    ) -> Result<Option<String>, Rejection> {
        let reject = |reason| Rejection::new(ValidationStage::SubjectConfirmed, reason);
        let id = match (
            response.in_response_to.as_deref(),
            confirmation.in_response_to.as_deref(),
        ) {
            (Some(outer), Some(inner)) if outer != inner => {
                return Err(reject(RejectionReason::UnknownInResponseTo(inner.to_string())));
            }
            (outer, inner) => outer.or(inner),
        };

        match (id, self.ctx.expected_in_response_to) {
            (Some(id), Some(expected)) if id != expected => {
                Err(reject(RejectionReason::UnknownInResponseTo(id.to_string())))
            }
            (Some(id), _) => Ok(Some(id.to_string())),
            (None, _) if self.ctx.idp.allow_unsolicited_authn_response => Ok(None),
            (None, _) => Err(reject(RejectionReason::Unsolicited)),
        }
    }

    fn log_rejection(&self, rejection: &Rejection) {
        tracing::warn!(
            idp = %self.ctx.idp.entity_id,
            stage = %rejection.stage,
            reason = rejection.reason.label(),
            detail = %rejection.reason,
            "SAML response rejected"
        );
    }
}

struct Checked {
    issuer: EntityId,
    name_id: NameId,
    in_response_to: Option<String>,
    not_on_or_after: Option<DateTime<Utc>>,
    replay_expiry: DateTime<Utc>,
    response: Response,
    assertion: Assertion,
}

impl Checked {
    fn into_accepted(self) -> AcceptedResponse {
        let assertion = self.assertion;
        let statement = assertion.authn_statements.first();
        let principal = Principal {
            issuer: self.issuer,
            name_id: self.name_id,
            session_index: assertion.session_index().map(str::to_string),
            authn_instant: statement.map(|s| s.authn_instant),
            session_not_on_or_after: statement.and_then(|s| s.session_not_on_or_after),
            attributes: assertion.attributes.clone(),
        };
        AcceptedResponse {
            response_id: self.response.id,
            assertion_id: assertion.id.clone(),
            in_response_to: self.in_response_to,
            principal,
            assertion,
        }
    }
}

fn at_received(reason: RejectionReason) -> Rejection {
    Rejection::new(ValidationStage::Received, reason)
}

fn unknown_issuer(expected: &str, actual: &str) -> RejectionReason {
    RejectionReason::UnknownIssuer {
        expected: expected.to_string(),
        actual: Some(actual.to_string()),
    }
}
