//! Redis error conversion.

use sp_saml::SamlError;

/// Converts a `fred` Redis error to [`SamlError::ReplayStore`]. The message
/// that needed the store is rejected.
#[allow(clippy::needless_pass_by_value)]
pub fn from_redis_error(err: fred::error::Error) -> SamlError {
    let category = match err.kind() {
        fred::error::ErrorKind::IO | fred::error::ErrorKind::Timeout => "connection",
        fred::error::ErrorKind::Config => "configuration",
        _ => "command",
    };
    tracing::error!(category, error = %err, "Redis replay store failed");
    SamlError::ReplayStore(format!("redis {category} error: {err}"))
}
