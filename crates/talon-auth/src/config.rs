//! Engine configuration.

use crate::credentials::Algorithm;

/// Per-route policy for payload-hash verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadPolicy {
    /// The signed header must declare a hash and the body must match it.
    #[default]
    Required,
    /// A declared hash is verified, but a request without one passes.
    Optional,
    /// Payload verification is skipped entirely.
    Disabled,
}

/// Read-only configuration consumed at engine construction.
///
/// The engine holds no other state, so one config serves any number of
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Header carrying the `host:port` the client addressed. Reverse proxies
    /// commonly forward the original value under a custom name such as
    /// `x-forwarded-host`.
    pub host_header_name: String,
    /// Allowed absolute difference between the request timestamp and server
    /// time, in seconds. The boundary itself is accepted.
    pub clock_skew_secs: u64,
    /// MAC algorithms credentials may declare.
    pub allowed_algorithms: Vec<Algorithm>,
    /// Payload verification policy.
    pub payload_policy: PayloadPolicy,
    /// Query parameter carrying bewit tokens.
    pub bewit_param: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_header_name: "host".to_owned(),
            clock_skew_secs: 60,
            allowed_algorithms: Algorithm::all(),
            payload_policy: PayloadPolicy::default(),
            bewit_param: "bewit".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Recognized variables: `TALON_HOST_HEADER`, `TALON_CLOCK_SKEW_SECS`,
    /// `TALON_PAYLOAD_POLICY` (`required` | `optional` | `disabled`).
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("TALON_HOST_HEADER") {
            config.host_header_name = v.to_lowercase();
        }
        if let Ok(v) = std::env::var("TALON_CLOCK_SKEW_SECS") {
            if let Ok(secs) = v.parse() {
                config.clock_skew_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("TALON_PAYLOAD_POLICY") {
            match v.to_ascii_lowercase().as_str() {
                "required" => config.payload_policy = PayloadPolicy::Required,
                "optional" => config.payload_policy = PayloadPolicy::Optional,
                "disabled" => config.payload_policy = PayloadPolicy::Disabled,
                _ => {}
            }
        }

        config
    }
}
