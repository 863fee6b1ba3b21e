use async_trait::async_trait;
use axum::http::Method;

use super::{
    Command, CommandKind, CommandResult, HttpRequestData, Saml2Urls, decode_inbound, find_issuer,
    finish, return_target,
};
use crate::bindings::SamlMessageType;
use crate::error::{DecodeError, SamlResult};
use crate::options::Options;
use crate::validation::{ResponseValidator, ValidationContext};

/// Assertion consumer service: validates a POSTed `Response` and signs the
/// user in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcsCommand;

#[async_trait]
impl Command for AcsCommand {
    fn kind(&self) -> CommandKind {
        CommandKind::Acs
    }

    async fn run(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult> {
        if request.method != Method::POST {
            return Err(DecodeError::MissingParameter(SamlMessageType::Response.param()).into());
        }
        let message = decode_inbound(request, options, SamlMessageType::Response)?;

        let sp = options.effective_sp_options();
        let urls = Saml2Urls::new(&request.url, &sp, &options.config.module_path);
        let idp = find_issuer(
            &message,
            request.stored_request_state.as_ref().map(|state| &state.idp),
            options,
        )?;

        let expected = request
            .stored_request_state
            .as_ref()
            .map(|state| state.message_id.as_str());
        let ctx = ValidationContext::new(sp.entity_id(), &urls.acs_url, &idp, &options.config)
            .with_expected_request(expected)
            .require_signed_assertions(sp.want_assertions_signed());
        let accepted = ResponseValidator::new(ctx, options.replay_store.as_ref())
            .validate(&message.document)
            .await?;

        let mut result = CommandResult::redirect(return_target(request, sp.return_url(), &urls));
        result.principal = Some(accepted.principal);
        result.relay_state = message.relay_state;
        result.clear_request_state = true;
        let result = finish(self.kind(), result, options);

        tracing::info!(
            idp = %idp.entity_id,
            response_id = %accepted.response_id,
            assertion_id = %accepted.assertion_id,
            "Signed in"
        );
        Ok(result)
    }
}
