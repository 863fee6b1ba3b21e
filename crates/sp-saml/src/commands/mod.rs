//! Commands: the HTTP-facing operations of the SP.
//!
//! An inbound request maps to exactly one [`CommandKind`]. Each command
//! resolves the effective [`SpOptions`](crate::options::SpOptions), performs
//! its protocol step and returns a [`CommandResult`] the host renders.
//! Commands never make HTTP status decisions for failures: errors are
//! returned as [`SamlError`] for the host to translate.

mod acs;
mod logout;
mod metadata;
mod sign_in;
mod urls;

pub use acs::AcsCommand;
pub use logout::{LogoutCommand, LogoutResponseCommand};
pub use metadata::MetadataCommand;
pub use sign_in::SignInCommand;
pub use urls::Saml2Urls;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::bindings::{
    DecodeLimits, DecodedMessage, HttpPostBinding, HttpRedirectBinding, SamlMessageType,
};
use crate::signature::XmlSigner;
use crate::entity_id::EntityId;
use crate::error::{DecodeError, SamlError, SamlResult};
use crate::notifications::{CommandResultCreated, MessageReceived, MessageSent};
use crate::options::{IdentityProvider, Options};
use crate::types::{SAML_NS, SamlBinding, issuer_of};
use crate::validation::{Principal, Rejection, RejectionReason, ValidationStage};

/// The inbound HTTP request, as far as the engine needs it.
#[derive(Debug, Clone)]
pub struct HttpRequestData {
    /// HTTP method.
    pub method: Method,
    /// Full request URL, including the raw query string.
    pub url: Url,
    /// URL-decoded form fields of a POST body.
    pub form: HashMap<String, String>,
    /// The signed-in user, if the host has a session.
    pub principal: Option<Principal>,
    /// State the host persisted from the command that started this
    /// exchange.
    pub stored_request_state: Option<RequestState>,
}

impl HttpRequestData {
    /// A GET request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            form: HashMap::new(),
            principal: None,
            stored_request_state: None,
        }
    }

    /// A POST request with form fields.
    #[must_use]
    pub fn post(url: Url, form: HashMap<String, String>) -> Self {
        Self {
            method: Method::POST,
            form,
            ..Self::get(url)
        }
    }

    /// Attaches the stored request state.
    #[must_use]
    pub fn with_request_state(mut self, state: Option<RequestState>) -> Self {
        self.stored_request_state = state;
        self
    }

    /// Attaches the signed-in user.
    #[must_use]
    pub fn with_principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    /// A decoded query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// A query parameter or, for POST, a form field.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.form.get(name).cloned().or_else(|| self.query_param(name))
    }

    fn carries(&self, message_type: SamlMessageType) -> bool {
        self.param(message_type.param()).is_some()
    }
}

/// State the host persists between an outbound request and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestState {
    /// Id of the outbound message.
    pub message_id: String,
    /// The partner it was sent to.
    pub idp: EntityId,
    /// Where to send the user afterwards.
    pub return_url: Option<String>,
    /// RelayState sent along.
    pub relay_state: String,
    /// When the message was sent.
    pub created_at: DateTime<Utc>,
}

/// What a command asks the host to do.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// HTTP status.
    pub status: StatusCode,
    /// Response body.
    pub content: Option<String>,
    /// Content type of the body.
    pub content_type: Option<String>,
    /// Extra response headers.
    pub headers: BTreeMap<String, String>,
    /// Redirect target for `303 See Other`.
    pub location: Option<String>,
    /// The user signed in by this command.
    pub principal: Option<Principal>,
    /// RelayState received with the message.
    pub relay_state: Option<String>,
    /// State to persist until the partner answers.
    pub request_state: Option<RequestState>,
    /// Whether persisted request state can be discarded.
    pub clear_request_state: bool,
    /// Whether the host must end its local session.
    pub terminate_local_session: bool,
}

impl Default for CommandResult {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            content: None,
            content_type: None,
            headers: BTreeMap::new(),
            location: None,
            principal: None,
            relay_state: None,
            request_state: None,
            clear_request_state: false,
            terminate_local_session: false,
        }
    }
}

impl CommandResult {
    /// A `200 OK` with a body.
    #[must_use]
    pub fn content(content: String, content_type: &str) -> Self {
        Self {
            content: Some(content),
            content_type: Some(content_type.to_string()),
            ..Self::default()
        }
    }

    /// A `303 See Other` to `location`.
    #[must_use]
    pub fn redirect(location: String) -> Self {
        Self {
            status: StatusCode::SEE_OTHER,
            location: Some(location),
            ..Self::default()
        }
    }

    /// An auto-submitting HTML form.
    #[must_use]
    pub fn html_form(html: String) -> Self {
        let mut result = Self::content(html, "text/html; charset=utf-8");
        result
            .headers
            .insert("Cache-Control".to_string(), "no-cache, no-store".to_string());
        result
    }
}

/// The commands of the SAML2 module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Publish SP metadata.
    Metadata,
    /// Issue an AuthnRequest.
    SignIn,
    /// Consume a Response.
    Acs,
    /// Start logout, or answer an IdP's LogoutRequest.
    Logout,
    /// Consume a LogoutResponse.
    LogoutResponse,
}

impl CommandKind {
    /// Maps a request path below `module_path` to a command. Matching is
    /// case-insensitive; [`CommandKind::LogoutResponse`] is never returned
    /// because it shares the logout path.
    #[must_use]
    pub fn from_path(path: &str, module_path: &str) -> Option<Self> {
        let module_path = module_path.trim_end_matches('/');
        let prefix = path.get(..module_path.len())?;
        if !prefix.eq_ignore_ascii_case(module_path) {
            return None;
        }
        let rest = path[module_path.len()..].trim_end_matches('/');
        match rest.to_ascii_lowercase().as_str() {
            "" => Some(Self::Metadata),
            "/signin" => Some(Self::SignIn),
            "/acs" => Some(Self::Acs),
            "/logout" => Some(Self::Logout),
            _ => None,
        }
    }

    /// Name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::SignIn => "sign_in",
            Self::Acs => "acs",
            Self::Logout => "logout",
            Self::LogoutResponse => "logout_response",
        }
    }
}

/// One SAML2 module operation.
#[async_trait]
pub trait Command: Send + Sync {
    /// Which command this is.
    fn kind(&self) -> CommandKind;

    /// Runs the command.
    ///
    /// # Errors
    ///
    /// Returns the typed failure of whichever step failed.
    async fn run(&self, request: &HttpRequestData, options: &Options) -> SamlResult<CommandResult>;
}

/// Returns the command implementing `kind`.
#[must_use]
pub fn command(kind: CommandKind) -> &'static dyn Command {
    match kind {
        CommandKind::Metadata => &MetadataCommand,
        CommandKind::SignIn => &SignInCommand,
        CommandKind::Acs => &AcsCommand,
        CommandKind::Logout => &LogoutCommand,
        CommandKind::LogoutResponse => &LogoutResponseCommand,
    }
}

/// Routes `request` to its command and runs it.
///
/// A request to the logout path carrying `SAMLResponse` is a
/// [`CommandKind::LogoutResponse`].
///
/// # Errors
///
/// Returns [`SamlError::UnknownCommand`] for a path outside the module, or
/// the command's own error.
pub async fn dispatch(
    path: &str,
    request: &HttpRequestData,
    options: &Options,
) -> SamlResult<CommandResult> {
    let kind = CommandKind::from_path(path, &options.config.module_path)
        .ok_or_else(|| SamlError::UnknownCommand(path.to_string()))?;
    let kind = if kind == CommandKind::Logout && request.carries(SamlMessageType::Response) {
        CommandKind::LogoutResponse
    } else {
        kind
    };

    let result = command(kind).run(request, options).await;
    if let Err(err) = &result {
        tracing::warn!(command = kind.as_str(), kind = ?err.kind(), error = %err, "SAML2 command failed");
    }
    result
}

/// Fires [`CommandResultCreated`] and hands the result back.
fn finish(kind: CommandKind, result: CommandResult, options: &Options) -> CommandResult {
    options
        .notifications
        .command_result_created(&CommandResultCreated {
            command: kind,
            result: &result,
        });
    result
}

/// Decodes the inbound message from the binding the request method implies
/// and fires [`MessageReceived`].
fn decode_inbound(
    request: &HttpRequestData,
    options: &Options,
    expected: SamlMessageType,
) -> SamlResult<DecodedMessage> {
    let limits = DecodeLimits::from(&options.config);
    let message = if request.method == Method::POST {
        HttpPostBinding::decode(&request.form, &limits)?
    } else {
        HttpRedirectBinding::decode(request.url.query().unwrap_or_default(), &limits)?
    };
    if message.message_type != expected {
        return Err(DecodeError::MissingParameter(expected.param()).into());
    }

    options.notifications.message_received(&MessageReceived {
        message_type: message.message_type,
        binding: message.binding,
        xml: message.xml(),
        relay_state: message.relay_state.as_deref(),
    });
    tracing::debug!(binding = ?message.binding, param = expected.param(), "Decoded inbound SAML message");
    Ok(message)
}

/// Finds the partner that issued `message`. With an `expected` partner
/// from stored request state, the issuer must be that partner.
fn find_issuer(
    message: &DecodedMessage,
    expected: Option<&EntityId>,
    options: &Options,
) -> SamlResult<Arc<IdentityProvider>> {
    let root = message.document.root();
    let issuer = issuer_of(root).or_else(|| {
        root.first_child(SAML_NS, "Assertion")
            .and_then(issuer_of)
    });
    let unknown = |expected: String| -> SamlError {
        Rejection::new(
            ValidationStage::Received,
            RejectionReason::UnknownIssuer {
                expected,
                actual: issuer.clone(),
            },
        )
        .into()
    };

    if let Some(expected) = expected {
        if issuer.as_deref() != Some(expected.as_str()) {
            return Err(unknown(expected.to_string()));
        }
    }
    issuer
        .as_deref()
        .and_then(|id| options.identity_providers.get(id))
        .ok_or_else(|| unknown("a registered identity provider".to_string()))
}

/// A protocol message on its way to a partner.
struct Outbound<'a> {
    id: &'a str,
    xml: String,
    destination: &'a str,
    binding: SamlBinding,
    message_type: SamlMessageType,
    relay_state: Option<&'a str>,
}

/// Encodes `outbound` on its binding and fires [`MessageSent`]. On the
/// Redirect binding the signer produces a detached query signature, on POST
/// an enveloped one.
fn send_message(
    outbound: Outbound<'_>,
    signer: Option<&XmlSigner<'_>>,
    options: &Options,
) -> SamlResult<CommandResult> {
    let (result, xml) = match outbound.binding {
        SamlBinding::HttpRedirect => {
            let location = HttpRedirectBinding::encode(
                &outbound.xml,
                outbound.destination,
                outbound.message_type,
                outbound.relay_state,
                signer,
            )?;
            (CommandResult::redirect(location), outbound.xml)
        }
        SamlBinding::HttpPost => {
            let xml = match signer {
                Some(signer) => signer.sign(&outbound.xml, outbound.id)?,
                None => outbound.xml,
            };
            let form = HttpPostBinding::encode(
                &xml,
                outbound.destination,
                outbound.message_type,
                outbound.relay_state,
            );
            (CommandResult::html_form(form), xml)
        }
        other => {
            return Err(SamlError::configuration(format!(
                "binding {} cannot carry {}",
                other.uri(),
                outbound.message_type.param()
            )));
        }
    };

    options.notifications.message_sent(&MessageSent {
        message_id: outbound.id,
        message_type: outbound.message_type,
        binding: outbound.binding,
        destination: outbound.destination,
        xml: &xml,
    });
    tracing::debug!(
        message_id = outbound.id,
        binding = ?outbound.binding,
        destination = outbound.destination,
        "Sent SAML message"
    );
    Ok(result)
}

/// Where to send the user when the exchange is over.
fn return_target(request: &HttpRequestData, sp_return_url: Option<&str>, urls: &Saml2Urls) -> String {
    request
        .stored_request_state
        .as_ref()
        .and_then(|s| s.return_url.clone())
        .or_else(|| sp_return_url.map(str::to_string))
        .unwrap_or_else(|| urls.application_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_commands() {
        assert_eq!(CommandKind::from_path("/Saml2", "/Saml2"), Some(CommandKind::Metadata));
        assert_eq!(CommandKind::from_path("/Saml2/", "/Saml2"), Some(CommandKind::Metadata));
        assert_eq!(CommandKind::from_path("/saml2/signin", "/Saml2"), Some(CommandKind::SignIn));
        assert_eq!(CommandKind::from_path("/Saml2/Acs", "/Saml2/"), Some(CommandKind::Acs));
        assert_eq!(CommandKind::from_path("/Saml2/Logout", "/Saml2"), Some(CommandKind::Logout));
        assert_eq!(CommandKind::from_path("/Saml2/Other", "/Saml2"), None);
        assert_eq!(CommandKind::from_path("/Other", "/Saml2"), None);
        assert_eq!(CommandKind::from_path("/", "/Saml2"), None);
    }

    #[test]
    fn request_params_prefer_form_fields() {
        let url = Url::parse("https://sp.example.org/Saml2/SignIn?idp=https%3A%2F%2Fidp&x=q").unwrap();
        let mut form = HashMap::new();
        form.insert("x".to_string(), "f".to_string());
        let request = HttpRequestData::post(url, form);
        assert_eq!(request.param("idp").as_deref(), Some("https://idp"));
        assert_eq!(request.param("x").as_deref(), Some("f"));
    }

    #[test]
    fn redirect_result_uses_see_other() {
        let result = CommandResult::redirect("https://idp/sso".to_string());
        assert_eq!(result.status, StatusCode::SEE_OTHER);
        assert!(result.content.is_none());
    }
}
