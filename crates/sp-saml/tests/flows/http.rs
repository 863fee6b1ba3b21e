//! The axum module driven end to end through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use sp_saml::Principal;
use sp_saml::bindings::{DecodeLimits, HttpRedirectBinding};
use sp_saml::endpoints::{SamlState, SessionBridge, router};
use tower::ServiceExt;
use url::Url;

use crate::common::{IdpResponse, TestEnv};

/// Records sign-ins and answers with a session cookie.
#[derive(Default)]
struct RecordingSessions {
    signed_in: Mutex<Vec<String>>,
}

#[async_trait]
impl SessionBridge for RecordingSessions {
    async fn current_principal(&self, _request_headers: &HeaderMap) -> Option<Principal> {
        None
    }

    async fn sign_in(&self, principal: &Principal, response_headers: &mut HeaderMap) {
        self.signed_in.lock().push(principal.name_id.value.clone());
        response_headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=1"));
    }

    async fn sign_out(&self, _request_headers: &HeaderMap, _response_headers: &mut HeaderMap) {}
}

fn app(env: &TestEnv, sessions: Arc<RecordingSessions>) -> Router {
    let state = SamlState::new(env.options.as_ref().clone()).with_sessions(sessions);
    router(state)
}

fn get(path: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::get(path)
        .header(header::HOST, "sp.example.org")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())?)
}

fn post_form(path: &str, fields: &[(&str, &str)]) -> anyhow::Result<Request<Body>> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    Ok(Request::post(path)
        .header(header::HOST, "sp.example.org")
        .header("x-forwarded-proto", "https")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))?)
}

fn location(response: &axum::response::Response) -> anyhow::Result<String> {
    let Some(value) = response.headers().get(header::LOCATION) else {
        anyhow::bail!("no Location header");
    };
    Ok(value.to_str()?.to_string())
}

#[tokio::test]
async fn module_root_serves_metadata() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let response = app(&env, Arc::default()).oneshot(get("/Saml2")?).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE),
        Some(&HeaderValue::from_static("application/samlmetadata+xml"))
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let xml = String::from_utf8(body.to_vec())?;
    assert!(xml.contains(r#"Location="https://sp.example.org/Saml2/Acs""#));
    Ok(())
}

#[tokio::test]
async fn unknown_command_is_not_found() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let response = app(&env, Arc::default()).oneshot(get("/Saml2/Frobnicate")?).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn sign_in_round_trip_establishes_a_session() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let sessions = Arc::new(RecordingSessions::default());
    let app = app(&env, Arc::clone(&sessions));

    let response = app.clone().oneshot(get("/Saml2/SignIn")?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let redirect = Url::parse(&location(&response)?)?;
    assert_eq!(redirect.path(), "/sso");

    let decoded = HttpRedirectBinding::decode(redirect.query().unwrap_or_default(), &DecodeLimits::default())?;
    let Some(request_id) = decoded.document.root().attribute("ID") else {
        anyhow::bail!("AuthnRequest without ID");
    };
    let Some(relay_state) = decoded.relay_state.clone() else {
        anyhow::bail!("SignIn sent no RelayState");
    };

    let idp_response = STANDARD.encode(IdpResponse::new().answering(request_id).signed()?);
    let fields = [("SAMLResponse", idp_response.as_str()), ("RelayState", relay_state.as_str())];

    let response = app.clone().oneshot(post_form("/Saml2/Acs", &fields)?).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response)?, "https://sp.example.org/");
    assert!(response.headers().contains_key(header::SET_COOKIE));
    assert_eq!(*sessions.signed_in.lock(), vec!["alice".to_string()]);

    let replayed = app.oneshot(post_form("/Saml2/Acs", &fields)?).await?;
    assert_eq!(replayed.status(), StatusCode::FORBIDDEN);
    let body = axum::body::to_bytes(replayed.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"SAML message rejected");
    assert_eq!(sessions.signed_in.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn acs_over_get_is_a_bad_request() -> anyhow::Result<()> {
    let env = TestEnv::new()?;
    let response = app(&env, Arc::default())
        .oneshot(get("/Saml2/Acs?SAMLResponse=abc")?)
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
