//! Message identifiers and opaque tokens.

use rand::distr::{Alphanumeric, SampleString};

/// Generates a SAML message or assertion identifier.
///
/// The leading underscore keeps the value a valid `xs:ID` (an NCName may not
/// start with a digit).
#[must_use]
pub fn generate_message_id() -> String {
    format!("_id{}", uuid::Uuid::new_v4().simple())
}

/// Generates a random alphanumeric string of `len` characters.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates an opaque relay-state token.
#[must_use]
pub fn generate_relay_state() -> String {
    random_alphanumeric(24)
}
