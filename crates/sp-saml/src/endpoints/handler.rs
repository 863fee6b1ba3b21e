//! The catch-all SAML2 handler.

use std::collections::HashMap;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use url::Url;

use super::state::SamlState;
use crate::commands::{CommandResult, HttpRequestData, dispatch};
use crate::error::{ErrorKind, SamlError};

/// Handles every request below the module path.
pub async fn saml_handler(
    State(state): State<SamlState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(url) = request_url(&uri, &headers, state.options.sp_options.public_origin()) else {
        return (StatusCode::BAD_REQUEST, "Missing or invalid Host header").into_response();
    };
    let form: HashMap<String, String> = if method == Method::POST {
        url::form_urlencoded::parse(&body).into_owned().collect()
    } else {
        HashMap::new()
    };

    let mut request = HttpRequestData {
        method,
        url,
        form,
        principal: state.sessions.current_principal(&headers).await,
        stored_request_state: None,
    };
    let relay_state = request.param("RelayState");
    if let Some(relay_state) = relay_state.as_deref() {
        request.stored_request_state = state.request_states.load(relay_state).await;
    }

    match dispatch(uri.path(), &request, &state.options).await {
        Ok(result) => {
            let mut extra = HeaderMap::new();
            if let Some(pending) = &result.request_state {
                state.request_states.save(pending.clone()).await;
            }
            if result.clear_request_state {
                if let Some(relay_state) = relay_state.as_deref() {
                    state.request_states.remove(relay_state).await;
                }
            }
            if result.terminate_local_session {
                state.sessions.sign_out(&headers, &mut extra).await;
            }
            if let Some(principal) = &result.principal {
                state.sessions.sign_in(principal, &mut extra).await;
            }
            into_response(result, extra)
        }
        Err(err) => error_response(&err),
    }
}

/// Rebuilds the absolute request URL on `public_origin`, or from the `Host`
/// header when no origin is configured.
fn request_url(uri: &Uri, headers: &HeaderMap, public_origin: Option<&Url>) -> Option<Url> {
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    if let Some(origin) = public_origin {
        let origin = origin.as_str().trim_end_matches('/');
        return Url::parse(&format!("{origin}{path}")).ok();
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    Url::parse(&format!("{scheme}://{host}{path}")).ok()
}

/// HTTP status for a failed command.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Decode => StatusCode::BAD_REQUEST,
        ErrorKind::Signature | ErrorKind::Validation | ErrorKind::Replay => StatusCode::FORBIDDEN,
        ErrorKind::UnknownCommand => StatusCode::NOT_FOUND,
        ErrorKind::Configuration
        | ErrorKind::Metadata
        | ErrorKind::ReplayStore
        | ErrorKind::Crypto => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &SamlError) -> Response {
    let status = status_for(err.kind());
    let body = match err.kind() {
        ErrorKind::Decode | ErrorKind::UnknownCommand => err.to_string(),
        ErrorKind::Signature | ErrorKind::Validation | ErrorKind::Replay => {
            "SAML message rejected".to_string()
        }
        _ => "SAML2 service error".to_string(),
    };
    (status, body).into_response()
}

/// Renders a [`CommandResult`], adding `extra` headers.
#[must_use]
pub fn into_response(result: CommandResult, extra: HeaderMap) -> Response {
    let mut response = Response::new(result.content.map_or_else(Body::empty, Body::from));
    *response.status_mut() = result.status;
    let headers = response.headers_mut();

    if let Some(location) = result.location.as_deref() {
        insert(headers, header::LOCATION, location);
    }
    if let Some(content_type) = result.content_type.as_deref() {
        insert(headers, header::CONTENT_TYPE, content_type);
    }
    for (name, value) in &result.headers {
        match HeaderName::try_from(name.as_str()) {
            Ok(name) => insert(headers, name, value),
            Err(_) => tracing::warn!(header = %name, "Dropping invalid header name"),
        }
    }
    for (name, value) in &extra {
        headers.append(name, value.clone());
    }
    response
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "Dropping invalid header value"),
    }
}
