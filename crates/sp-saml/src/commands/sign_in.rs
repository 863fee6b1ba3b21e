use async_trait::async_trait;
use chrono::Utc;

use super::{
    Command, CommandKind, CommandResult, HttpRequestData, Outbound, RequestState, Saml2Urls,
    finish, send_message,
};
use crate::bindings::SamlMessageType;
use crate::error::{SamlError, SamlResult};
use crate::options::Options;
use crate::types::AuthnRequest;

/// Sends an `AuthnRequest` to the chosen IdP.
///
/// The IdP comes from the `idp` parameter or the registry default. A
/// `ReturnUrl` parameter is honoured only when it is a local path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignInCommand;

#[async_trait]
impl Command for SignInCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::SignIn
    }

    async fn run(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        let sp = options.effective_sp_options();
        let urls = Saml2Urls::new(&request.url, &sp, &options.config.module_path);

        let idp = match request.param("idp") {
            Some(entity_id) => options.identity_providers.get(&entity_id).ok_or_else(|| {
                SamlError::configuration(format!("unknown identity provider {entity_id}"))
            })?,
            None => options.identity_providers.default_idp().ok_or_else(|| {
                SamlError::configuration("no idp parameter and no default identity provider")
            })?,
        };

        let mut authn_request = AuthnRequest::new(
            sp.entity_id().as_str(),
            idp.single_sign_on_service_url.as_str(),
            urls.acs_url.as_str(),
        );
        if let Some(policy) = sp.name_id_policy() {
            authn_request = authn_request.with_name_id_policy(policy.clone());
        }

        let relay_state = sp_crypto::random::generate_relay_state();
        let now = Utc::now();
        options
            .replay_store
            .remember_issued(
                &authn_request.id,
                now + options.config.outstanding_request_lifetime(),
            )
            .await?;

        let signer = if idp.want_authn_requests_signed || sp.authn_requests_signed() {
            Some(sp.signer()?)
        } else {
            None
        };

        let mut result = send_message(
            Outbound {
                id: &authn_request.id,
                xml: authn_request.to_xml(),
                destination: &authn_request.destination,
                binding: idp.binding,
                message_type: SamlMessageType::Request,
                relay_state: Some(&relay_state),
            },
            signer.as_ref(),
            options,
        )?;
        result.request_state = Some(RequestState {
            message_id: authn_request.id.clone(),
            idp: idp.entity_id.clone(),
            return_url: request.param("ReturnUrl").and_then(local_return_url),
            relay_state: relay_state.clone(),
            created_at: now,
        });
        result.relay_state = Some(relay_state);
        let result = finish(self.kind(), result, options);

        tracing::info!(
            idp = %idp.entity_id,
            request_id = %authn_request.id,
            signed = signer.is_some(),
            "Sent AuthnRequest"
        );
        Ok(result)
    }
}

/// Accepts `/path` but not `//host` or absolute URLs.
pub(super) fn local_return_url(candidate: String) -> Option<String> {
    if candidate.starts_with('/') && !candidate.starts_with("//") && !candidate.contains('\\') {
        Some(candidate)
    } else {
        tracing::warn!(return_url = %candidate, "Ignoring non-local ReturnUrl");
        None
    }
}
