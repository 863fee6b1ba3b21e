//! Module URLs.

use url::Url;

use crate::options::SpOptions;

/// Absolute URLs of the SAML2 module endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saml2Urls {
    /// Metadata endpoint, which is also the module base.
    pub metadata_url: String,
    /// Starts sign-in.
    pub sign_in_url: String,
    /// Assertion consumer service.
    pub acs_url: String,
    /// Single logout endpoint, for requests and responses.
    pub logout_url: String,
    /// Where users go when nothing else is known.
    pub application_url: String,
}

impl Saml2Urls {
    /// Derives the URLs for a request to `request_url`.
    ///
    /// The configured public origin wins over the request's origin so that
    /// a proxy in front of the host does not leak into published URLs.
    #[must_use]
    pub fn new(request_url: &Url, options: &SpOptions, module_path: &str) -> Self {
        let origin = options.public_origin().map_or_else(
            || request_url.origin().ascii_serialization(),
            |public| public.as_str().trim_end_matches('/').to_string(),
        );
        let module_path = module_path.trim_end_matches('/');
        Self::from_base(&format!("{origin}{module_path}"), &format!("{origin}/"))
    }

    /// Builds the URLs below `base`, the module's absolute URL.
    #[must_use]
    pub fn from_base(base: &str, application_url: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            metadata_url: base.to_string(),
            sign_in_url: format!("{base}/SignIn"),
            acs_url: format!("{base}/Acs"),
            logout_url: format!("{base}/Logout"),
            application_url: application_url.to_string(),
        }
    }
}
