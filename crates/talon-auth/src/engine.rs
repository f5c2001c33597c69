//! The three-phase authentication engine.
//!
//! The host wires three lifecycle points into one [`AuthEngine`]:
//!
//! 1. [`AuthEngine::authenticate`] when the request head arrives,
//! 2. [`AuthEngine::verify_payload`] once the request body stream ends,
//! 3. [`AuthEngine::sign_response`] once the response body is produced.
//!
//! Request verification is a fail-fast pipeline: header parse → credential
//! resolution → timestamp freshness → nonce uniqueness → MAC comparison.
//! A failure at any stage short-circuits; no later stage runs. The engine
//! itself holds only read-only configuration and store handles, so a single
//! instance serves any number of concurrent requests; the nonce guard is the
//! one shared-mutation point and provides its own atomicity.
//!
//! Bewit requests use the single-phase [`AuthEngine::authenticate_bewit`]
//! instead; no payload or response phase applies to them.

use std::sync::Arc;

use http::HeaderMap;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, TRAILER, TRANSFER_ENCODING};
use http::request::Parts;
use tracing::debug;

use crate::artifacts::Artifacts;
use crate::bewit;
use crate::config::{EngineConfig, PayloadPolicy};
use crate::credentials::{Credential, CredentialResolver};
use crate::error::AuthError;
use crate::header::{format_server_authorization, parse_header, resolve_host};
use crate::mac::{MacKind, calculate_mac, fixed_time_eq};
use crate::nonce::NonceGuard;
use crate::payload::{PayloadHash, PayloadHasher};

/// Name of the response-authentication header (or trailer).
pub const SERVER_AUTHORIZATION: &str = "server-authorization";

/// A successfully authenticated request.
#[derive(Debug, Clone)]
pub struct Authenticated {
    /// The credential that signed the request.
    pub credentials: Credential,
    /// The signed fields, kept for payload verification and response signing.
    pub artifacts: Artifacts,
}

/// A failed authentication attempt.
///
/// Carries whatever was resolved before the failing stage so a host running
/// optional-auth routes can still see who attempted and with what.
#[derive(Debug, Clone)]
pub struct Unauthenticated {
    /// The specific failure; [`AuthError::class`] gives the client-facing
    /// class.
    pub reason: AuthError,
    /// Credentials, when resolution succeeded before the failure.
    pub credentials: Option<Credential>,
    /// Artifacts, when the header parsed before the failure.
    pub artifacts: Option<Artifacts>,
}

impl Unauthenticated {
    fn early(reason: AuthError) -> Self {
        Self {
            reason,
            credentials: None,
            artifacts: None,
        }
    }
}

/// Outcome of the authenticate phase.
pub type AuthOutcome = Result<Authenticated, Unauthenticated>;

/// Metadata for signing a response.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    /// The response `Content-Type`, folded into the payload hash.
    pub content_type: Option<String>,
    /// The finalized response payload hash, when the body is hashed.
    pub payload_hash: Option<PayloadHash>,
    /// Extension data to bind into the response MAC.
    pub ext: Option<String>,
}

impl ResponseMeta {
    /// Create a hasher for the response body, seeded with this metadata's
    /// content type. Feed it body chunks as they are emitted and store the
    /// finalized hash back into `payload_hash` before signing.
    #[must_use]
    pub fn hasher(&self, credentials: &Credential) -> PayloadHasher {
        PayloadHasher::new(credentials.algorithm, self.content_type.as_deref())
    }
}

/// The protocol engine: authenticates requests, verifies payloads, signs
/// responses, and verifies bewit tokens.
#[derive(Clone)]
pub struct AuthEngine {
    config: EngineConfig,
    resolver: Arc<dyn CredentialResolver>,
    nonces: Arc<dyn NonceGuard>,
}

impl std::fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthEngine {
    /// Create an engine from configuration and the two external stores.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn CredentialResolver>,
        nonces: Arc<dyn NonceGuard>,
    ) -> Self {
        Self {
            config,
            resolver,
            nonces,
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Authenticate a signed-header request against the server clock.
    pub async fn authenticate(&self, parts: &Parts) -> AuthOutcome {
        self.authenticate_at(parts, unix_now()).await
    }

    /// Authenticate a signed-header request against an explicit clock value
    /// (unix seconds). Used by tests and by hosts that pin a per-request
    /// clock read.
    pub async fn authenticate_at(&self, parts: &Parts, now_secs: u64) -> AuthOutcome {
        // Stage 1: header parse. Failures here are client errors, not
        // authentication failures.
        let raw = match parts.headers.get(AUTHORIZATION) {
            Some(value) => value.to_str().map_err(|_| {
                Unauthenticated::early(AuthError::BadHeaderFormat(
                    "non-ascii authorization header".to_owned(),
                ))
            })?,
            None => return Err(Unauthenticated::early(AuthError::MissingAuthorization)),
        };
        let attributes = parse_header(raw).map_err(Unauthenticated::early)?;
        let (host, port) =
            resolve_host(parts, &self.config.host_header_name).map_err(Unauthenticated::early)?;

        let artifacts = Artifacts {
            method: parts.method.as_str().to_owned(),
            resource: resource_of(parts),
            host,
            port,
            ts: attributes.ts,
            nonce: attributes.nonce,
            ext: attributes.ext,
            app: attributes.app,
            dlg: attributes.dlg,
            hash: attributes.hash,
            mac: attributes.mac,
        };

        debug!(id = %attributes.id, ts = artifacts.ts, nonce = %artifacts.nonce, "parsed authorization header");

        // Stage 2: credential resolution.
        let credentials = match self.resolve(&attributes.id).await {
            Ok(credentials) => credentials,
            Err(reason) => {
                return Err(Unauthenticated {
                    reason,
                    credentials: None,
                    artifacts: Some(artifacts),
                });
            }
        };

        let fail = |reason: AuthError, credentials: &Credential, artifacts: &Artifacts| {
            debug!(id = %credentials.id, %reason, "authentication failed");
            Unauthenticated {
                reason,
                credentials: Some(credentials.clone()),
                artifacts: Some(artifacts.clone()),
            }
        };

        // Stage 3: timestamp freshness, inclusive boundary.
        if artifacts.ts.abs_diff(now_secs) > self.config.clock_skew_secs {
            return Err(fail(
                AuthError::StaleTimestamp {
                    server_now: now_secs,
                },
                &credentials,
                &artifacts,
            ));
        }

        // Stage 4: nonce uniqueness.
        if !self
            .nonces
            .first_use(&credentials.id, &artifacts.nonce, artifacts.ts)
            .await
        {
            return Err(fail(AuthError::ReplayedNonce, &credentials, &artifacts));
        }

        // Stage 5: MAC comparison.
        let expected = match calculate_mac(MacKind::Header, &credentials, &artifacts) {
            Ok(mac) => mac,
            Err(reason) => return Err(fail(reason, &credentials, &artifacts)),
        };
        if !fixed_time_eq(expected.as_bytes(), artifacts.mac.as_bytes()) {
            return Err(fail(AuthError::BadMac, &credentials, &artifacts));
        }

        debug!(id = %credentials.id, "request authenticated");
        Ok(Authenticated {
            credentials,
            artifacts,
        })
    }

    /// Verify the request payload once its stream has ended.
    ///
    /// `finalized` is the hash produced by the request's [`PayloadHasher`],
    /// or `None` when the stream aborted before end-of-stream (which fails
    /// closed).
    pub fn verify_payload(
        &self,
        artifacts: &Artifacts,
        finalized: Option<&PayloadHash>,
    ) -> Result<(), AuthError> {
        if self.config.payload_policy == PayloadPolicy::Disabled {
            return Ok(());
        }

        let Some(declared) = artifacts.hash.as_deref() else {
            // The MAC never covered the body, so integrity cannot be claimed.
            return if self.config.payload_policy == PayloadPolicy::Optional {
                Ok(())
            } else {
                Err(AuthError::PayloadHashMissing)
            };
        };

        let Some(computed) = finalized else {
            return Err(AuthError::PayloadHashMissing);
        };

        if fixed_time_eq(computed.as_str().as_bytes(), declared.as_bytes()) {
            Ok(())
        } else {
            debug!("payload hash mismatch");
            Err(AuthError::PayloadHashMismatch)
        }
    }

    /// Create the hasher for an authenticated request's body.
    ///
    /// `content_type` is the request's `Content-Type` header value.
    #[must_use]
    pub fn payload_hasher(
        &self,
        credentials: &Credential,
        content_type: Option<&str>,
    ) -> PayloadHasher {
        PayloadHasher::new(credentials.algorithm, content_type)
    }

    /// Produce the `Server-Authorization` value for a response.
    ///
    /// The response MAC binds the original request's timestamp, nonce, and
    /// app/delegation identifiers, so it cannot be replayed against another
    /// request. Must only be called for requests that authenticated; the
    /// host wires this hook on [`Authenticated`] results only. A host ext
    /// or hash outside the header value charset is rejected rather than
    /// emitted.
    pub fn sign_response(
        &self,
        credentials: &Credential,
        artifacts: &Artifacts,
        meta: &ResponseMeta,
    ) -> Result<String, AuthError> {
        let response_artifacts = Artifacts {
            hash: meta.payload_hash.clone().map(String::from),
            ext: meta.ext.clone(),
            mac: String::new(),
            ..artifacts.clone()
        };

        let mac = calculate_mac(MacKind::Response, credentials, &response_artifacts)?;
        debug!(id = %credentials.id, "signed response");
        format_server_authorization(
            &mac,
            response_artifacts.hash.as_deref(),
            artifacts.ts,
            &artifacts.nonce,
            meta.ext.as_deref(),
        )
    }

    /// Authenticate a bewit-bearing request against the server clock.
    pub async fn authenticate_bewit(&self, parts: &Parts) -> AuthOutcome {
        self.authenticate_bewit_at(parts, unix_now()).await
    }

    /// Authenticate a bewit-bearing request against an explicit clock value.
    pub async fn authenticate_bewit_at(&self, parts: &Parts, now_secs: u64) -> AuthOutcome {
        let method = parts.method.as_str();
        if method != "GET" && method != "HEAD" {
            return Err(Unauthenticated::early(AuthError::BewitMethodNotAllowed(
                method.to_owned(),
            )));
        }

        // A request must pick one scheme; a bewit plus a signed header is
        // ambiguous and rejected outright.
        if parts.headers.contains_key(AUTHORIZATION) {
            return Err(Unauthenticated::early(AuthError::BadHeaderFormat(
                "multiple authentications".to_owned(),
            )));
        }

        let resource = resource_of(parts);
        let Some((token, stripped)) = bewit::strip_bewit(&resource, &self.config.bewit_param)
        else {
            return Err(Unauthenticated::early(AuthError::MissingAuthorization));
        };
        if token.is_empty() {
            return Err(Unauthenticated::early(AuthError::BewitMalformed(
                "empty bewit".to_owned(),
            )));
        }

        let token = bewit::decode(&token).map_err(Unauthenticated::early)?;
        debug!(id = %token.id, expiry = token.expiry, "decoded bewit");

        // The expiry second itself is still valid.
        if now_secs > token.expiry {
            return Err(Unauthenticated::early(AuthError::BewitExpired));
        }

        let (host, port) =
            resolve_host(parts, &self.config.host_header_name).map_err(Unauthenticated::early)?;
        let mut artifacts =
            bewit::bewit_artifacts(token.expiry, &host, port, &stripped, token.ext.as_deref());
        artifacts.mac.clone_from(&token.mac);

        let credentials = match self.resolve(&token.id).await {
            Ok(credentials) => credentials,
            Err(reason) => {
                return Err(Unauthenticated {
                    reason,
                    credentials: None,
                    artifacts: Some(artifacts),
                });
            }
        };

        let expected = match calculate_mac(MacKind::Bewit, &credentials, &artifacts) {
            Ok(mac) => mac,
            Err(reason) => {
                return Err(Unauthenticated {
                    reason,
                    credentials: Some(credentials),
                    artifacts: Some(artifacts),
                });
            }
        };
        if !fixed_time_eq(expected.as_bytes(), token.mac.as_bytes()) {
            debug!(id = %credentials.id, "bewit mac mismatch");
            return Err(Unauthenticated {
                reason: AuthError::BadMac,
                credentials: Some(credentials),
                artifacts: Some(artifacts),
            });
        }

        debug!(id = %credentials.id, "bewit authenticated");
        Ok(Authenticated {
            credentials,
            artifacts,
        })
    }

    /// Resolve a credential id, splitting store failure from unknown id and
    /// rejecting unusable credentials.
    async fn resolve(&self, id: &str) -> Result<Credential, AuthError> {
        let credentials = self
            .resolver
            .resolve(id)
            .await
            .map_err(|e| AuthError::CredentialLookupFailed(e.to_string()))?
            .ok_or(AuthError::UnknownCredential)?;

        if !self
            .config
            .allowed_algorithms
            .contains(&credentials.algorithm)
        {
            return Err(AuthError::UnsupportedAlgorithm(
                credentials.algorithm.to_string(),
            ));
        }
        if credentials.key.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(credentials)
    }
}

/// Switch a response to trailer-based authentication emission.
///
/// When the response body is hashed live, the MAC is only known after the
/// last byte, so `Server-Authorization` moves to a trailer. That forces
/// chunked framing, and a fixed `Content-Length` must not coexist with it.
pub fn prepare_trailer(headers: &mut HeaderMap) {
    headers.remove(CONTENT_LENGTH);
    headers.insert(
        TRAILER,
        http::HeaderValue::from_static(SERVER_AUTHORIZATION),
    );
    headers.insert(
        TRANSFER_ENCODING,
        http::HeaderValue::from_static("chunked"),
    );
}

/// Current unix time in seconds.
fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// The path-plus-query the client addressed.
fn resource_of(parts: &Parts) -> String {
    parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_owned(), ToString::to_string)
}
