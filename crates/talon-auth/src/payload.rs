//! Streaming payload hashing.
//!
//! The payload hash covers `hawk.1.payload\n<content-type>\n<body>\n`, so
//! body tampering is detectable even though the request MAC itself only
//! covers headers. [`PayloadHasher`] accumulates body chunks in arrival order
//! without buffering the body; each in-flight request or response owns
//! exactly one hasher, created when the first chunk arrives and finalized at
//! end-of-stream. If the stream aborts before [`PayloadHasher::finalize`],
//! no hash exists and verification fails closed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

use crate::credentials::Algorithm;

/// Tag line seeding every payload hash.
const PAYLOAD_TAG: &str = "hawk.1.payload";

/// A finalized payload hash, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHash(String);

impl PayloadHash {
    /// The base64 hash value as declared in `hash` attributes.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<PayloadHash> for String {
    fn from(hash: PayloadHash) -> Self {
        hash.0
    }
}

enum DigestState {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl std::fmt::Debug for DigestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha1(_) => f.write_str("DigestState::Sha1"),
            Self::Sha256(_) => f.write_str("DigestState::Sha256"),
        }
    }
}

/// Incremental hasher over a request or response body stream.
///
/// Chunk boundaries do not affect the result: feeding `"abc"` then `"def"`
/// yields the same hash as feeding `"abcdef"` once, and feeding nothing is
/// the hash of an empty body.
///
/// # Examples
///
/// ```
/// use talon_auth::credentials::Algorithm;
/// use talon_auth::payload::PayloadHasher;
///
/// let mut hasher = PayloadHasher::new(Algorithm::Sha256, Some("text/plain"));
/// hasher.update(b"Thank you for flying Hawk");
/// let hash = hasher.finalize();
/// assert!(!hash.as_str().is_empty());
/// ```
#[derive(Debug)]
pub struct PayloadHasher {
    digest: DigestState,
}

impl PayloadHasher {
    /// Create a hasher for the given MAC algorithm and `Content-Type` header
    /// value.
    ///
    /// The content type is normalized (lowercased, parameters after `;`
    /// dropped, trimmed) before being folded into the hash; an absent header
    /// hashes as an empty line.
    #[must_use]
    pub fn new(algorithm: Algorithm, content_type: Option<&str>) -> Self {
        let header = format!(
            "{PAYLOAD_TAG}\n{}\n",
            normalize_content_type(content_type.unwrap_or(""))
        );

        let digest = match algorithm {
            Algorithm::Sha1 => {
                let mut d = <sha1::Sha1 as Digest>::new();
                Digest::update(&mut d, header.as_bytes());
                DigestState::Sha1(d)
            }
            Algorithm::Sha256 => {
                let mut d = <sha2::Sha256 as Digest>::new();
                Digest::update(&mut d, header.as_bytes());
                DigestState::Sha256(d)
            }
        };

        Self { digest }
    }

    /// Feed one body chunk, in transport arrival order.
    pub fn update(&mut self, chunk: &[u8]) {
        match &mut self.digest {
            DigestState::Sha1(d) => Digest::update(d, chunk),
            DigestState::Sha256(d) => Digest::update(d, chunk),
        }
    }

    /// Consume the hasher at end-of-stream and produce the hash.
    #[must_use]
    pub fn finalize(mut self) -> PayloadHash {
        self.update(b"\n");
        let bytes = match self.digest {
            DigestState::Sha1(d) => Digest::finalize(d).to_vec(),
            DigestState::Sha256(d) => Digest::finalize(d).to_vec(),
        };
        PayloadHash(BASE64_STANDARD.encode(bytes))
    }
}

/// Hash a fully buffered payload in one call.
///
/// Convenience for clients and tests; equivalent to one `update` of the whole
/// body.
#[must_use]
pub fn hash_payload(algorithm: Algorithm, content_type: Option<&str>, body: &[u8]) -> PayloadHash {
    let mut hasher = PayloadHasher::new(algorithm, content_type);
    hasher.update(body);
    hasher.finalize()
}

/// Normalize a `Content-Type` value for hashing: strip parameters, trim,
/// lowercase.
fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_be_independent_of_chunk_boundaries() {
        let mut chunked = PayloadHasher::new(Algorithm::Sha256, Some("text/plain"));
        chunked.update(b"abc");
        chunked.update(b"def");

        let whole = hash_payload(Algorithm::Sha256, Some("text/plain"), b"abcdef");
        assert_eq!(chunked.finalize(), whole);
    }

    #[test]
    fn test_should_hash_empty_body_without_chunks() {
        let zero_chunks = PayloadHasher::new(Algorithm::Sha256, None).finalize();
        let empty_chunk = hash_payload(Algorithm::Sha256, None, b"");
        assert_eq!(zero_chunks, empty_chunk);
    }

    #[test]
    fn test_should_fold_content_type_into_hash() {
        let plain = hash_payload(Algorithm::Sha256, Some("text/plain"), b"hello");
        let json = hash_payload(Algorithm::Sha256, Some("application/json"), b"hello");
        assert_ne!(plain, json);
    }

    #[test]
    fn test_should_ignore_content_type_parameters_and_case() {
        let bare = hash_payload(Algorithm::Sha256, Some("text/plain"), b"hello");
        let with_params = hash_payload(
            Algorithm::Sha256,
            Some("Text/Plain; charset=utf-8"),
            b"hello",
        );
        assert_eq!(bare, with_params);
    }

    #[test]
    fn test_should_detect_single_byte_change() {
        let a = hash_payload(Algorithm::Sha256, Some("text/plain"), b"hello");
        let b = hash_payload(Algorithm::Sha256, Some("text/plain"), b"hello!");
        assert_ne!(a, b);
    }

    #[test]
    fn test_should_hash_with_sha1_credential_algorithm() {
        let hash = hash_payload(Algorithm::Sha1, Some("text/plain"), b"hello");
        assert_eq!(hash.as_str().len(), 28);
    }
}
