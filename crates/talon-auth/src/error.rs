//! Error types for Hawk-style authentication.
//!
//! Every failure mode gets its own [`AuthError`] variant so internal logs can
//! record exactly which check failed, while [`AuthError::class`] collapses the
//! variants into the coarse classes a host should expose to clients. All
//! authentication failures share one client-visible message so a caller cannot
//! probe which check rejected the request.

/// Errors that can occur during request authentication, payload verification,
/// or response signing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is structurally invalid (bad attribute list,
    /// unknown scheme or key, missing required attribute, bad value charset).
    #[error("invalid authorization header: {0}")]
    BadHeaderFormat(String),

    /// The bewit query parameter could not be decoded into a token.
    #[error("invalid bewit: {0}")]
    BewitMalformed(String),

    /// The credential store failed while looking up an id. Not attributable
    /// to the client.
    #[error("credential lookup failed: {0}")]
    CredentialLookupFailed(String),

    /// No authentication was presented at all (no `Authorization` header, or
    /// no bewit parameter on the bewit strategy). Hosts running optional-auth
    /// routes treat this as "no attempt" rather than a failed one.
    #[error("missing authentication")]
    MissingAuthorization,

    /// The credential id is not known to the credential store.
    #[error("unknown credential id")]
    UnknownCredential,

    /// The resolved credential is unusable (empty key). The detail stays out
    /// of client-visible responses.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The credential declares a MAC algorithm this deployment does not allow.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The presented MAC does not match the computed MAC.
    #[error("bad mac")]
    BadMac,

    /// The request timestamp is outside the allowed clock-skew window.
    /// Carries the server clock so a well-behaved client can resynchronize
    /// and retry.
    #[error("stale timestamp (server time {server_now})")]
    StaleTimestamp {
        /// Server wall clock, unix seconds, at the time of the check.
        server_now: u64,
    },

    /// The `(id, nonce)` pair was already seen within the freshness window.
    #[error("replayed nonce")]
    ReplayedNonce,

    /// The bewit token expiry is in the past.
    #[error("bewit expired")]
    BewitExpired,

    /// Bewit authentication was attempted with a non-idempotent HTTP method.
    #[error("method {0} not allowed with bewit")]
    BewitMethodNotAllowed(String),

    /// The signed header declares no payload hash (or the body stream never
    /// finished), so body integrity cannot be claimed.
    #[error("missing payload hash")]
    PayloadHashMissing,

    /// The streamed body does not match the hash declared in the signed
    /// header.
    #[error("payload hash mismatch")]
    PayloadHashMismatch,
}

/// Coarse failure classes for mapping [`AuthError`] onto host responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed client input; report as a 400-class error, not an auth
    /// failure.
    BadRequest,
    /// Authentication failure; all variants in this class share one external
    /// message.
    Unauthorized,
    /// The request authenticated but its body failed integrity checks.
    PayloadInvalid,
    /// Server-side failure (credential store unreachable).
    Internal,
}

impl ErrorClass {
    /// The uniform message a host should surface for this class.
    ///
    /// Deliberately generic for [`ErrorClass::Unauthorized`]: unknown ids,
    /// bad MACs, replays, and expired bewits are indistinguishable to the
    /// client.
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "credentials invalid",
            Self::PayloadInvalid => "payload invalid",
            Self::Internal => "internal error",
        }
    }
}

impl AuthError {
    /// Classify this error for client-facing reporting.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BadHeaderFormat(_) | Self::BewitMalformed(_) => ErrorClass::BadRequest,
            Self::CredentialLookupFailed(_) => ErrorClass::Internal,
            Self::MissingAuthorization
            | Self::UnknownCredential
            | Self::InvalidCredentials
            | Self::UnsupportedAlgorithm(_)
            | Self::BadMac
            | Self::StaleTimestamp { .. }
            | Self::ReplayedNonce
            | Self::BewitExpired
            | Self::BewitMethodNotAllowed(_) => ErrorClass::Unauthorized,
            Self::PayloadHashMissing | Self::PayloadHashMismatch => ErrorClass::PayloadInvalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_classify_auth_failures_uniformly() {
        let errors = [
            AuthError::UnknownCredential,
            AuthError::BadMac,
            AuthError::StaleTimestamp { server_now: 0 },
            AuthError::ReplayedNonce,
            AuthError::BewitExpired,
        ];
        for err in errors {
            assert_eq!(err.class(), ErrorClass::Unauthorized);
            assert_eq!(err.class().client_message(), "credentials invalid");
        }
    }

    #[test]
    fn test_should_classify_format_errors_as_bad_request() {
        assert_eq!(
            AuthError::BadHeaderFormat("x".to_owned()).class(),
            ErrorClass::BadRequest
        );
        assert_eq!(
            AuthError::BewitMalformed("x".to_owned()).class(),
            ErrorClass::BadRequest
        );
    }

    #[test]
    fn test_should_classify_payload_errors_distinctly() {
        assert_eq!(
            AuthError::PayloadHashMismatch.class().client_message(),
            "payload invalid"
        );
        assert_eq!(
            AuthError::PayloadHashMissing.class(),
            ErrorClass::PayloadInvalid
        );
    }

    #[test]
    fn test_should_classify_store_failure_as_internal() {
        assert_eq!(
            AuthError::CredentialLookupFailed("down".to_owned()).class(),
            ErrorClass::Internal
        );
    }
}
