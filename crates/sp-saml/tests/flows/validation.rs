//! Response validation against the public validator API.

use std::sync::Arc;

use chrono::Duration;
use sp_crypto::Certificate;
use sp_saml::signature::VerificationOutcome;
use sp_saml::validation::{
    AcceptedResponse, RejectionReason, ResponseValidator, ValidationContext, ValidationStage,
};
use sp_saml::xml::XmlDocument;
use sp_saml::{ErrorKind, Options, SamlError, SamlResult};

use crate::common::{
    ACS_URL, IDP_ENTITY, IdpResponse, ROGUE_CERT, TestEnv, identity_provider, rogue_credential,
};

fn unsolicited_env() -> anyhow::Result<TestEnv> {
    TestEnv::with_idp(identity_provider()?.with_unsolicited_responses(true))
}

async fn validate(options: &Options, xml: &str) -> SamlResult<AcceptedResponse> {
    let document = XmlDocument::parse(xml)?;
    let Some(idp) = options.identity_providers.get(IDP_ENTITY) else {
        return Err(SamlError::configuration("test IdP missing"));
    };
    let ctx = ValidationContext::new(
        options.sp_options.entity_id(),
        ACS_URL,
        &idp,
        &options.config,
    );
    ResponseValidator::new(ctx, options.replay_store.as_ref())
        .validate(&document)
        .await
}

fn signature_outcome(err: &SamlError) -> Option<VerificationOutcome> {
    match err {
        SamlError::Signature(e) => Some(e.outcome),
        _ => None,
    }
}

#[tokio::test]
async fn signed_response_yields_principal() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let response = IdpResponse::new();

    let accepted = validate(&env.options, &response.signed()?).await?;

    assert_eq!(accepted.response_id, response.response_id);
    assert_eq!(accepted.principal.name_id.value, "alice");
    assert_eq!(accepted.principal.issuer.as_str(), IDP_ENTITY);
    assert_eq!(accepted.principal.session_index.as_deref(), Some("_idx1"));
    Ok(())
}

#[tokio::test]
async fn expired_response_is_rejected_at_conditions() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let response = IdpResponse::new().aged(Duration::hours(1));

    let err = validate(&env.options, &response.signed()?).await.unwrap_err();

    let SamlError::Validation(rejection) = err else {
        anyhow::bail!("expected a validation error, got {err}");
    };
    assert_eq!(rejection.stage, ValidationStage::ConditionsChecked);
    assert!(matches!(rejection.reason, RejectionReason::Expired { .. }));
    Ok(())
}

#[tokio::test]
async fn second_delivery_is_a_replay() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let xml = IdpResponse::new().signed()?;

    validate(&env.options, &xml).await?;
    let err = validate(&env.options, &xml).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Replay);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_accept_exactly_once() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let xml = Arc::new(IdpResponse::new().signed()?);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let options = Arc::clone(&env.options);
            let xml = Arc::clone(&xml);
            tokio::spawn(async move { validate(&options, &xml).await.is_ok() })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await? {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
    Ok(())
}

#[tokio::test]
async fn tampered_assertion_fails_its_digest() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let xml = IdpResponse::new()
        .signed()?
        .replace("<saml:NameID>alice<", "<saml:NameID>mallory<");

    let err = validate(&env.options, &xml).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Signature);
    assert!(matches!(
        signature_outcome(&err),
        Some(VerificationOutcome::DigestMismatch | VerificationOutcome::InvalidSignatureValue)
    ));
    Ok(())
}

#[tokio::test]
async fn untrusted_signer_is_rejected() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let xml = IdpResponse::new().signed_with(&rogue_credential()?)?;

    let err = validate(&env.options, &xml).await.unwrap_err();

    assert_eq!(signature_outcome(&err), Some(VerificationOutcome::UntrustedCertificate));
    Ok(())
}

#[tokio::test]
async fn unsolicited_response_needs_partner_consent() -> anyhow::Result<()> {
    let env = TestEnv::new()?;

    let err = validate(&env.options, &IdpResponse::new().signed()?)
        .await
        .unwrap_err();

    let SamlError::Validation(rejection) = err else {
        anyhow::bail!("expected a validation error, got {err}");
    };
    assert_eq!(rejection.reason, RejectionReason::Unsolicited);
    Ok(())
}

#[tokio::test]
async fn solicited_response_claims_the_request_once() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let expiry = chrono::Utc::now() + Duration::minutes(5);
    env.options.replay_store.remember_issued("_req1", expiry).await?;

    let first = IdpResponse::new().answering("_req1");
    let accepted = validate(&env.options, &first.signed()?).await?;
    assert_eq!(accepted.in_response_to.as_deref(), Some("_req1"));

    let second = IdpResponse::new().answering("_req1");
    let err = validate(&env.options, &second.signed()?).await.unwrap_err();
    let SamlError::Validation(rejection) = err else {
        anyhow::bail!("expected a validation error, got {err}");
    };
    assert_eq!(rejection.stage, ValidationStage::SubjectConfirmed);
    Ok(())
}

#[tokio::test]
async fn rotated_partner_key_takes_effect_on_reload() -> anyhow::Result<()> {
    let env = unsolicited_env()?;
    let mut rotated = identity_provider()?.with_unsolicited_responses(true);
    rotated.signing_certificates = vec![Certificate::from_pem(ROGUE_CERT)?];
    env.registry.upsert(rotated);

    let err = validate(&env.options, &IdpResponse::new().signed()?).await.unwrap_err();
    assert_eq!(signature_outcome(&err), Some(VerificationOutcome::UntrustedCertificate));

    let xml = IdpResponse::new().signed_with(&rogue_credential()?)?;
    assert!(validate(&env.options, &xml).await.is_ok());
    Ok(())
}
