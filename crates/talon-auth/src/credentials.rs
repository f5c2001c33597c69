//! Credentials and the credential resolver contract.
//!
//! A [`Credential`] is the `{id, key, algorithm}` triple shared between a
//! client and the server. The engine looks one up per request through a
//! [`CredentialResolver`], which distinguishes "unknown id" from "store
//! failure" so the engine can report the former as an authentication failure
//! and the latter as a server error.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// MAC algorithms supported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// HMAC-SHA1.
    Sha1,
    /// HMAC-SHA256.
    Sha256,
}

impl Algorithm {
    /// Canonical lowercase name used in credential records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// All algorithms this build supports.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![Self::Sha1, Self::Sha256]
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            _ => Err(AuthError::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

/// A shared-secret credential.
///
/// Owned by the external credential store; the engine borrows one for the
/// duration of a single request and never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Public credential identifier carried in the `id` attribute.
    pub id: String,
    /// Shared secret key.
    pub key: Vec<u8>,
    /// MAC algorithm this credential signs with.
    pub algorithm: Algorithm,
}

impl Credential {
    /// Create a credential from an id, key bytes, and algorithm.
    pub fn new(id: impl Into<String>, key: impl Into<Vec<u8>>, algorithm: Algorithm) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            algorithm,
        }
    }
}

/// Error signalled by a [`CredentialResolver`] when the store itself fails.
///
/// Distinct from "unknown id" (which is `Ok(None)`): a store failure is a
/// server-side problem and must not be reported as an authentication failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("credential store error: {0}")]
pub struct ResolveError(pub String);

/// Trait for looking up credentials by id.
///
/// Implementations may be backed by a database, a network service, or
/// configuration; resolution is async so a slow store never blocks other
/// in-flight requests.
#[async_trait::async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve a credential id.
    ///
    /// Returns `Ok(Some)` when found, `Ok(None)` when the id is unknown, and
    /// `Err` when the store could not answer.
    async fn resolve(&self, id: &str) -> Result<Option<Credential>, ResolveError>;
}

/// In-memory credential resolver backed by a `HashMap`.
///
/// Suitable for tests and development. Production deployments implement
/// [`CredentialResolver`] against a real store.
///
/// # Examples
///
/// ```
/// use talon_auth::credentials::{Algorithm, Credential, StaticCredentialResolver};
///
/// let resolver = StaticCredentialResolver::new(vec![Credential::new(
///     "john",
///     b"werxhqb98rpaxn39848xrunpaw3489ruxnpa98w4rxn".to_vec(),
///     Algorithm::Sha256,
/// )]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialResolver {
    credentials: HashMap<String, Credential>,
}

impl StaticCredentialResolver {
    /// Create a resolver from an iterable of credentials, keyed by id.
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        Self {
            credentials: credentials
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, id: &str) -> Result<Option<Credential>, ResolveError> {
        Ok(self.credentials.get(id).cloned())
    }
}
