use async_trait::async_trait;
use chrono::Utc;

use super::sign_in::local_return_url;
use super::{
    Command, CommandKind, CommandResult, HttpRequestData, Outbound, RequestState, Saml2Urls,
    decode_inbound, find_issuer, finish, return_target, send_message,
};
use crate::bindings::SamlMessageType;
use crate::error::{SamlError, SamlResult};
use crate::options::Options;
use crate::types::{LogoutRequest, LogoutResponse, Status};
use crate::validation::{LogoutValidator, ValidationContext};

/// Single logout.
///
/// Without a `SAMLRequest` this starts SP-initiated logout for the signed-in
/// user. With one, it answers the IdP's LogoutRequest.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogoutCommand;

#[async_trait]
impl Command for LogoutCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Logout
    }

    async fn run(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        if request.carries(SamlMessageType::Request) {
            self.answer(request, options).await
        } else {
            self.initiate(request, options).await
        }
    }
}

impl LogoutCommand {
    async fn initiate(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        let sp = options.effective_sp_options();
        let urls = Saml2Urls::new(&request.url, &sp, &options.config.module_path);
        let return_url = request
            .param("ReturnUrl")
            .and_then(local_return_url)
            .or_else(|| sp.return_url().map(str::to_string))
            .unwrap_or_else(|| urls.application_url.clone());

        let target = request.principal.as_ref().and_then(|principal| {
            let idp = options.identity_providers.get(principal.issuer.as_str())?;
            let destination = idp.single_logout_service_url.clone()?;
            Some((principal, idp, destination))
        });
        let Some((principal, idp, destination)) =
            target.filter(|_| sp.signing_credential().is_some())
        else {
            tracing::info!("No single logout possible, signing out locally");
            let mut result = CommandResult::redirect(return_url);
            result.terminate_local_session = true;
            return Ok(finish(self.kind(), result, options));
        };

        let mut logout_request =
            LogoutRequest::new(sp.entity_id().as_str(), destination.as_str(), principal.name_id.clone());
        if let Some(index) = &principal.session_index {
            logout_request = logout_request.with_session_index(index.clone());
        }

        let relay_state = sp_crypto::random::generate_relay_state();
        let now = Utc::now();
        options
            .replay_store
            .remember_issued(
                &logout_request.id,
                now + options.config.outstanding_request_lifetime(),
            )
            .await?;

        let signer = sp.signer()?;
        let mut result = send_message(
            Outbound {
                id: &logout_request.id,
                xml: logout_request.to_xml(),
                destination: &destination,
                binding: idp.single_logout_service_binding,
                message_type: SamlMessageType::Request,
                relay_state: Some(&relay_state),
            },
            Some(&signer),
            options,
        )?;
        result.request_state = Some(RequestState {
            message_id: logout_request.id.clone(),
            idp: idp.entity_id.clone(),
            return_url: Some(return_url),
            relay_state: relay_state.clone(),
            created_at: now,
        });
        result.relay_state = Some(relay_state);
        result.terminate_local_session = true;
        let result = finish(self.kind(), result, options);

        tracing::info!(idp = %idp.entity_id, request_id = %logout_request.id, "Sent LogoutRequest");
        Ok(result)
    }

    async fn answer(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        let message = decode_inbound(request, options, SamlMessageType::Request)?;
        let sp = options.effective_sp_options();
        let urls = Saml2Urls::new(&request.url, &sp, &options.config.module_path);
        let idp = find_issuer(&message, None, options)?;

        let ctx = ValidationContext::new(sp.entity_id(), &urls.logout_url, &idp, &options.config);
        let logout_request = LogoutValidator::new(ctx, options.replay_store.as_ref())
            .validate_request(&message)
            .await?;

        let destination = idp.logout_response_url().ok_or_else(|| {
            SamlError::configuration(format!(
                "identity provider {} has no single logout endpoint",
                idp.entity_id
            ))
        })?;
        let response = LogoutResponse::new(
            sp.entity_id().as_str(),
            destination,
            logout_request.id.as_str(),
            Status::success(),
        );
        let signer = sp.signer()?;
        let mut result = send_message(
            Outbound {
                id: &response.id,
                xml: response.to_xml(),
                destination,
                binding: idp.single_logout_service_binding,
                message_type: SamlMessageType::Response,
                relay_state: message.relay_state.as_deref(),
            },
            Some(&signer),
            options,
        )?;
        result.relay_state = message.relay_state.clone();
        result.terminate_local_session = true;
        let result = finish(self.kind(), result, options);

        tracing::info!(
            idp = %idp.entity_id,
            request_id = %logout_request.id,
            name_id = %logout_request.name_id.value,
            "Answered IdP-initiated logout"
        );
        Ok(result)
    }
}

/// Completes SP-initiated logout when the IdP's `LogoutResponse` arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogoutResponseCommand;

#[async_trait]
impl Command for LogoutResponseCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::LogoutResponse
    }

    async fn run(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        let message = decode_inbound(request, options, SamlMessageType::Response)?;
        let sp = options.effective_sp_options();
        let urls = Saml2Urls::new(&request.url, &sp, &options.config.module_path);
        let state = request.stored_request_state.as_ref();
        let idp = find_issuer(&message, state.map(|s| &s.idp), options)?;

        let ctx = ValidationContext::new(sp.entity_id(), &urls.logout_url, &idp, &options.config)
            .with_expected_request(state.map(|s| s.message_id.as_str()));
        let response = LogoutValidator::new(ctx, options.replay_store.as_ref())
            .validate_response(&message)
            .await?;

        let mut result = CommandResult::redirect(return_target(request, sp.return_url(), &urls));
        result.relay_state = message.relay_state;
        result.clear_request_state = true;
        let result = finish(self.kind(), result, options);

        tracing::info!(idp = %idp.entity_id, response_id = %response.id, "Completed single logout");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use url::Url;

    use super::*;
    use crate::bindings::{DecodeLimits, HttpRedirectBinding};
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::options::PartnerRegistry;
    use crate::signature::XmlSigner;
    use crate::test_support::{
        IDP_ENTITY, SP_ENTITY, entity, identity_provider, idp_credential, sp_options,
    };
    use crate::options::SpOptions;
    use crate::types::{NameId, SAMLP_NS};
    use crate::validation::Principal;

    const LOGOUT_URL: &str = "https://sp.example.org/Saml2/Logout";

    fn options() -> Options {
        Options::new(sp_options(), EngineConfig::default())
            .unwrap()
            .with_identity_providers(Arc::new(PartnerRegistry::with_partners([
                identity_provider(),
            ])))
    }

    fn principal() -> Principal {
        Principal {
            issuer: entity(IDP_ENTITY),
            name_id: NameId::new("user-1"),
            session_index: Some("_s1".to_string()),
            authn_instant: None,
            session_not_on_or_after: None,
            attributes: Vec::new(),
        }
    }

    /// An IdP message on the Redirect binding, signed with the IdP key.
    fn from_idp(xml: &str, message_type: SamlMessageType) -> HttpRequestData {
        let credential = idp_credential();
        let signer = XmlSigner::new(&credential);
        let url = HttpRedirectBinding::encode(xml, LOGOUT_URL, message_type, Some("rs-9"), Some(&signer))
            .unwrap();
        HttpRequestData::get(Url::parse(&url).unwrap())
    }

    #[tokio::test]
    async fn sp_initiated_logout_sends_signed_request() {
        let options = options();
        let request = HttpRequestData::get(Url::parse(LOGOUT_URL).unwrap())
            .with_principal(Some(principal()));
        let result = LogoutCommand.run(&request, &options).await.unwrap();

        assert_eq!(result.status, StatusCode::SEE_OTHER);
        assert!(result.terminate_local_session);
        let location = result.location.unwrap();
        assert!(location.starts_with("https://idp.example.com/slo?SAMLRequest="));
        assert!(location.contains("&Signature="));

        let decoded = HttpRedirectBinding::decode(
            location.split_once('?').unwrap().1,
            &DecodeLimits::default(),
        )
        .unwrap();
        let sent = LogoutRequest::from_element(decoded.document.root()).unwrap();
        assert_eq!(sent.issuer, SP_ENTITY);
        assert_eq!(sent.session_indexes, vec!["_s1".to_string()]);

        let state = result.request_state.unwrap();
        assert_eq!(state.message_id, sent.id);
        assert!(options
            .replay_store
            .claim_issued(&sent.id, Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn without_signing_key_logout_is_local_only() {
        let sp = SpOptions::builder(entity(SP_ENTITY)).build().unwrap();
        let options = Options::new(sp, EngineConfig::default())
            .unwrap()
            .with_identity_providers(Arc::new(PartnerRegistry::with_partners([
                identity_provider(),
            ])));
        let request = HttpRequestData::get(Url::parse(LOGOUT_URL).unwrap())
            .with_principal(Some(principal()));
        let result = LogoutCommand.run(&request, &options).await.unwrap();

        assert!(result.terminate_local_session);
        assert_eq!(result.location.as_deref(), Some("https://sp.example.org/"));
        assert!(result.request_state.is_none());
    }

    #[tokio::test]
    async fn anonymous_logout_is_local_only() {
        let request = HttpRequestData::get(Url::parse(LOGOUT_URL).unwrap());
        let result = LogoutCommand.run(&request, &options()).await.unwrap();
        assert!(result.terminate_local_session);
        assert!(result.request_state.is_none());
    }

    #[tokio::test]
    async fn idp_initiated_logout_is_answered_once() {
        let options = options();
        let logout_request = LogoutRequest::new(IDP_ENTITY, LOGOUT_URL, NameId::new("user-1"));
        let request = from_idp(&logout_request.to_xml(), SamlMessageType::Request);

        let result = LogoutCommand.run(&request, &options).await.unwrap();
        assert!(result.terminate_local_session);
        assert_eq!(result.relay_state.as_deref(), Some("rs-9"));
        let location = result.location.unwrap();
        assert!(location.starts_with("https://idp.example.com/slo?SAMLResponse="));
        assert!(location.contains("&RelayState=rs-9"));

        let decoded = HttpRedirectBinding::decode(
            location.split_once('?').unwrap().1,
            &DecodeLimits::default(),
        )
        .unwrap();
        assert!(decoded.document.root().is(SAMLP_NS, "LogoutResponse"));
        let answer = LogoutResponse::from_element(decoded.document.root()).unwrap();
        assert_eq!(answer.in_response_to.as_deref(), Some(logout_request.id.as_str()));
        assert!(answer.status.is_success());

        let err = LogoutCommand.run(&request, &options).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Replay);
    }

    #[tokio::test]
    async fn logout_response_completes_sp_initiated_logout() {
        let options = options();
        options
            .replay_store
            .remember_issued("_lr1", Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();
        let response = LogoutResponse::new(IDP_ENTITY, LOGOUT_URL, "_lr1", Status::success());
        let request = from_idp(&response.to_xml(), SamlMessageType::Response).with_request_state(
            Some(RequestState {
                message_id: "_lr1".to_string(),
                idp: entity(IDP_ENTITY),
                return_url: Some("/bye".to_string()),
                relay_state: "rs-9".to_string(),
                created_at: Utc::now(),
            }),
        );

        let result = LogoutResponseCommand.run(&request, &options).await.unwrap();
        assert_eq!(result.location.as_deref(), Some("/bye"));
        assert!(result.clear_request_state);
    }
}
