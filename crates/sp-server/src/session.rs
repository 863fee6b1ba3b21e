//! Cookie sessions for the demo host.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, header};
use dashmap::DashMap;
use sp_saml::Principal;
use sp_saml::endpoints::SessionBridge;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "saml2_session";

/// In-memory sessions keyed by an opaque cookie value.
#[derive(Debug, Default)]
pub struct CookieSessions {
    sessions: DashMap<String, Principal>,
}

impl CookieSessions {
    /// Creates an empty session table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if nobody is signed in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// The principal of the session named by the request's cookie.
    #[must_use]
    pub fn principal(&self, headers: &HeaderMap) -> Option<Principal> {
        let id = session_id(headers)?;
        self.sessions.get(id).map(|p| p.clone())
    }
}

/// Reads the session id from the `Cookie` headers.
fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

fn set_cookie(response_headers: &mut HeaderMap, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response_headers.append(header::SET_COOKIE, value);
        }
        Err(_) => tracing::warn!("Could not encode session cookie"),
    }
}

#[async_trait]
impl SessionBridge for CookieSessions {
    async fn current_principal(&self, request_headers: &HeaderMap) -> Option<Principal> {
        self.principal(request_headers)
    }

    async fn sign_in(&self, principal: &Principal, response_headers: &mut HeaderMap) {
        let id = sp_crypto::random::random_alphanumeric(32);
        self.sessions.insert(id.clone(), principal.clone());
        tracing::info!(name_id = %principal.name_id.value, issuer = %principal.issuer, "Local session started");
        set_cookie(
            response_headers,
            &format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; Secure; SameSite=Lax"),
        );
    }

    async fn sign_out(&self, request_headers: &HeaderMap, response_headers: &mut HeaderMap) {
        if let Some(id) = session_id(request_headers) {
            if self.sessions.remove(id).is_some() {
                tracing::info!("Local session ended");
            }
        }
        set_cookie(
            response_headers,
            &format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Lax"),
        );
    }
}
