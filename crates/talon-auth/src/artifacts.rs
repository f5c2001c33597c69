//! The set of signed fields extracted from one request.

/// Fields covered by a request MAC, captured at authentication time.
///
/// Built once per request and immutable afterwards; the same value feeds MAC
/// verification, payload verification, and response signing, so it is the
/// explicit per-request context the host threads through the three lifecycle
/// calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path plus query string, exactly as addressed by the client.
    pub resource: String,
    /// Host the client addressed, lowercase, without port.
    pub host: String,
    /// Port the client addressed.
    pub port: u16,
    /// Request timestamp, unix seconds.
    pub ts: u64,
    /// Client-chosen single-use nonce (empty for bewit requests).
    pub nonce: String,
    /// Application-supplied extension data, if any.
    pub ext: Option<String>,
    /// Application id for delegated access, if any.
    pub app: Option<String>,
    /// Delegated-by credential id, if any.
    pub dlg: Option<String>,
    /// Declared payload hash (base64), if the MAC covers the body.
    pub hash: Option<String>,
    /// The MAC presented by the client (base64).
    pub mac: String,
}

impl Artifacts {
    /// Whether the signed header declared a payload hash.
    #[must_use]
    pub fn covers_payload(&self) -> bool {
        self.hash.is_some()
    }
}
