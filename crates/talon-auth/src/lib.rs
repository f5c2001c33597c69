//! Hawk-style MAC authentication for HTTP servers.
//!
//! This crate is the protocol engine behind a pluggable server authentication
//! strategy: it verifies requests signed with a shared-key MAC carried in the
//! `Authorization` header, defends against replay with timestamps and
//! single-use nonces, verifies streamed request bodies against a signed
//! payload hash, authenticates the server's response back to the client, and
//! verifies bewit capability tokens embedded in GET/HEAD URLs.
//!
//! # Lifecycle
//!
//! A host server calls into the engine at three points:
//!
//! 1. [`AuthEngine::authenticate`] with the request head,
//! 2. [`AuthEngine::verify_payload`] after streaming the body through a
//!    [`PayloadHasher`],
//! 3. [`AuthEngine::sign_response`] once the response body is produced
//!    (moved to a trailer via [`prepare_trailer`] when the response body is
//!    hashed live).
//!
//! Bewit requests instead use the single-phase
//! [`AuthEngine::authenticate_bewit`].
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use talon_auth::credentials::{Algorithm, Credential, StaticCredentialResolver};
//! use talon_auth::nonce::MemoryNonceGuard;
//! use talon_auth::{AuthEngine, EngineConfig};
//!
//! let engine = AuthEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(StaticCredentialResolver::new(vec![Credential::new(
//!         "john",
//!         b"werxhqb98rpaxn39848xrunpaw3489ruxnpa98w4rxn".to_vec(),
//!         Algorithm::Sha256,
//!     )])),
//!     Arc::new(MemoryNonceGuard::new(120)),
//! );
//! // engine.authenticate(&parts).await drives the request phase.
//! ```
//!
//! # Modules
//!
//! - [`artifacts`] - The signed fields extracted from one request
//! - [`bewit`] - Capability-token encoding and decoding
//! - [`config`] - Engine configuration
//! - [`credentials`] - Credential type and resolver contract
//! - [`engine`] - The three-phase lifecycle orchestrator
//! - [`error`] - Failure taxonomy and client-facing classes
//! - [`header`] - `Authorization`/`Server-Authorization` wire codecs
//! - [`mac`] - Normalized-string canonicalization and MAC computation
//! - [`nonce`] - Replay defense contract and built-in guards
//! - [`payload`] - Streaming payload hashing

pub mod artifacts;
pub mod bewit;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod header;
pub mod mac;
pub mod nonce;
pub mod payload;

pub use artifacts::Artifacts;
pub use config::{EngineConfig, PayloadPolicy};
pub use credentials::{Algorithm, Credential, CredentialResolver, StaticCredentialResolver};
pub use engine::{
    AuthEngine, AuthOutcome, Authenticated, ResponseMeta, SERVER_AUTHORIZATION, Unauthenticated,
    prepare_trailer,
};
pub use error::{AuthError, ErrorClass};
pub use nonce::{AcceptAllGuard, MemoryNonceGuard, NonceGuard};
pub use payload::{PayloadHash, PayloadHasher, hash_payload};
