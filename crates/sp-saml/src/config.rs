//! Engine configuration.
//!
//! Limits and validation policy are loaded from `SAML2_*` environment
//! variables with defaults suitable for production. Per-SP identity and key
//! material live in [`SpOptions`](crate::options::SpOptions) instead.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sp_crypto::SignatureAlgorithm;

use crate::error::{SamlError, SamlResult};
use crate::signature::AlgorithmPolicy;

/// Upper bound for every configured duration (ten years).
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Engine-wide limits and validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Allowed clock skew in seconds, applied to every time comparison.
    pub clock_skew_secs: u64,

    /// Maximum size of an encoded inbound payload.
    pub max_message_bytes: usize,

    /// Maximum size of an inflated HTTP-Redirect payload.
    pub max_inflated_bytes: usize,

    /// Maximum element nesting depth accepted by the XML parser.
    pub max_xml_depth: usize,

    /// Longest validity window an inbound message may carry. Consumed ids
    /// are remembered until their window ends.
    pub max_replay_retention_secs: u64,

    /// How long an issued request id can be answered.
    pub outstanding_request_lifetime_secs: u64,

    /// Signature algorithms accepted on inbound messages.
    pub allowed_signature_algorithms: Vec<SignatureAlgorithm>,

    /// Path of the SAML2 module below the application root.
    pub module_path: String,

    /// Maximum number of live entries in the in-memory replay store.
    pub replay_max_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: 300,
            max_message_bytes: 256 * 1024,
            max_inflated_bytes: 1024 * 1024,
            max_xml_depth: 64,
            max_replay_retention_secs: 3600,
            outstanding_request_lifetime_secs: 900,
            allowed_signature_algorithms: AlgorithmPolicy::default().allowed().to_vec(),
            module_path: "/Saml2".to_string(),
            replay_max_entries: 100_000,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the environment, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable is present but unparsable.
    pub fn from_env() -> SamlResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// absent keys.
    ///
    /// Recognised keys: `SAML2_CLOCK_SKEW_SECS`, `SAML2_MAX_MESSAGE_BYTES`,
    /// `SAML2_MAX_INFLATED_BYTES`, `SAML2_MAX_XML_DEPTH`,
    /// `SAML2_MAX_REPLAY_RETENTION_SECS`,
    /// `SAML2_OUTSTANDING_REQUEST_LIFETIME_SECS`,
    /// `SAML2_ALLOWED_SIGNATURE_ALGORITHMS` (comma separated, e.g.
    /// `RS256,ES256`), `SAML2_ALLOW_SHA1`, `SAML2_MODULE_PATH` and
    /// `SAML2_REPLAY_MAX_ENTRIES`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a value cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> SamlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut allowed_signature_algorithms = match lookup("SAML2_ALLOWED_SIGNATURE_ALGORITHMS") {
            Some(list) => parse_algorithms(&list)?,
            None => defaults.allowed_signature_algorithms,
        };
        if parse_or("SAML2_ALLOW_SHA1", &lookup, false)?
            && !allowed_signature_algorithms.contains(&SignatureAlgorithm::RsaSha1)
        {
            allowed_signature_algorithms.push(SignatureAlgorithm::RsaSha1);
        }

        let config = Self {
            clock_skew_secs: parse_or("SAML2_CLOCK_SKEW_SECS", &lookup, defaults.clock_skew_secs)?,
            max_message_bytes: parse_or(
                "SAML2_MAX_MESSAGE_BYTES",
                &lookup,
                defaults.max_message_bytes,
            )?,
            max_inflated_bytes: parse_or(
                "SAML2_MAX_INFLATED_BYTES",
                &lookup,
                defaults.max_inflated_bytes,
            )?,
            max_xml_depth: parse_or("SAML2_MAX_XML_DEPTH", &lookup, defaults.max_xml_depth)?,
            max_replay_retention_secs: parse_or(
                "SAML2_MAX_REPLAY_RETENTION_SECS",
                &lookup,
                defaults.max_replay_retention_secs,
            )?,
            outstanding_request_lifetime_secs: parse_or(
                "SAML2_OUTSTANDING_REQUEST_LIFETIME_SECS",
                &lookup,
                defaults.outstanding_request_lifetime_secs,
            )?,
            allowed_signature_algorithms,
            module_path: lookup("SAML2_MODULE_PATH").unwrap_or(defaults.module_path),
            replay_max_entries: parse_or(
                "SAML2_REPLAY_MAX_ENTRIES",
                &lookup,
                defaults.replay_max_entries,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> SamlResult<()> {
        if !self.module_path.starts_with('/') || self.module_path.ends_with('/') {
            return Err(SamlError::configuration(format!(
                "module path must start with '/' and not end with one, got '{}'",
                self.module_path
            )));
        }
        if self.max_message_bytes == 0 || self.max_inflated_bytes == 0 {
            return Err(SamlError::configuration("message size limits must be positive"));
        }
        if self.max_xml_depth < 8 {
            return Err(SamlError::configuration("max XML depth must be at least 8"));
        }
        if self.allowed_signature_algorithms.is_empty() {
            return Err(SamlError::configuration(
                "at least one signature algorithm must be allowed",
            ));
        }
        if self.max_replay_retention_secs == 0 || self.outstanding_request_lifetime_secs == 0 {
            return Err(SamlError::configuration("retention periods must be positive"));
        }
        if self.max_replay_retention_secs <= self.clock_skew_secs {
            return Err(SamlError::configuration(
                "replay retention must exceed the clock skew",
            ));
        }
        for (name, value) in [
            ("clock skew", self.clock_skew_secs),
            ("replay retention", self.max_replay_retention_secs),
            ("outstanding request lifetime", self.outstanding_request_lifetime_secs),
        ] {
            if value > MAX_DURATION_SECS {
                return Err(SamlError::configuration(format!("{name} is out of range")));
            }
        }
        Ok(())
    }

    /// Allowed clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        seconds(self.clock_skew_secs)
    }

    /// Maximum replay-cache retention.
    #[must_use]
    pub fn max_replay_retention(&self) -> Duration {
        seconds(self.max_replay_retention_secs)
    }

    /// Lifetime of an outstanding request id.
    #[must_use]
    pub fn outstanding_request_lifetime(&self) -> Duration {
        seconds(self.outstanding_request_lifetime_secs)
    }

    /// Builds the algorithm allow-list for inbound signatures.
    #[must_use]
    pub fn algorithm_policy(&self) -> AlgorithmPolicy {
        AlgorithmPolicy::new(self.allowed_signature_algorithms.iter().copied())
    }
}

fn seconds(value: u64) -> Duration {
    #[allow(clippy::cast_possible_wrap)]
    Duration::seconds(value.min(MAX_DURATION_SECS) as i64)
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> SamlResult<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SamlError::configuration(format!("{key} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_algorithms(list: &str) -> SamlResult<Vec<SignatureAlgorithm>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            SignatureAlgorithm::ALL
                .into_iter()
                .find(|alg| alg.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    SamlError::configuration(format!("unknown signature algorithm '{name}'"))
                })
        })
        .collect()
}
