//! SAML2 router configuration.

use axum::{Router, routing::get};

use super::handler::saml_handler;
use super::state::SamlState;

/// Creates the SAML2 module router.
///
/// # Endpoints
///
/// | Method   | Path               | Command                        |
/// |----------|--------------------|--------------------------------|
/// | GET      | `{module}`         | Metadata                       |
/// | GET      | `{module}/SignIn`  | SignIn                         |
/// | POST     | `{module}/Acs`     | Acs                            |
/// | GET/POST | `{module}/Logout`  | Logout, LogoutResponse         |
///
/// Command names are matched case-insensitively by the dispatcher; unknown
/// names answer `404`.
pub fn saml_router(module_path: &str) -> Router<SamlState> {
    Router::new()
        .route(module_path, get(saml_handler))
        .route(
            &format!("{module_path}/{{command}}"),
            get(saml_handler).post(saml_handler),
        )
}

/// Mounts the SAML2 module with its state, at the configured module path.
pub fn router(state: SamlState) -> Router {
    let module_path = state.options.config.module_path.clone();
    saml_router(&module_path).with_state(state)
}
