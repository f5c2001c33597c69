//! MAC computation over the normalized request/response string.
//!
//! The MAC is `HMAC(key, normalized_string)` with the credential's algorithm,
//! base64-encoded for transport. The normalized string is a newline-terminated
//! field list in fixed order; absent optional fields are kept as empty lines
//! so field positions never shift:
//!
//! ```text
//! hawk.1.<kind>\n
//! <ts>\n<nonce>\n<METHOD>\n<resource>\n<host>\n<port>\n<hash?>\n<ext?>\n
//! [<app>\n<dlg?>\n]
//! ```
//!
//! The trailing `app`/`dlg` pair is only appended when `app` is present, and
//! `ext` is escaped (`\` and newline) so attacker-chosen extension data cannot
//! shift field boundaries.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use hmac::{Hmac, KeyInit, Mac};
use subtle::{Choice, ConstantTimeEq};

use crate::artifacts::Artifacts;
use crate::credentials::{Algorithm, Credential};
use crate::error::AuthError;

/// Protocol version tag prefixed to every normalized string.
const VERSION_PREFIX: &str = "hawk.1.";

type HmacSha1 = Hmac<sha1::Sha1>;
type HmacSha256 = Hmac<sha2::Sha256>;

/// The kind of value a MAC covers, selecting the normalized-string tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacKind {
    /// Request `Authorization` header MAC.
    Header,
    /// `Server-Authorization` response MAC.
    Response,
    /// URL-embedded capability token MAC.
    Bewit,
}

impl MacKind {
    /// The tag word embedded in the normalized string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Response => "response",
            Self::Bewit => "bewit",
        }
    }
}

impl fmt::Display for MacKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the normalized string a MAC is computed over.
///
/// # Examples
///
/// ```
/// use talon_auth::artifacts::Artifacts;
/// use talon_auth::mac::{MacKind, normalized_string};
///
/// let artifacts = Artifacts {
///     method: "GET".to_owned(),
///     resource: "/resource/1?b=1&a=2".to_owned(),
///     host: "example.com".to_owned(),
///     port: 8000,
///     ts: 1_353_832_234,
///     nonce: "j4h3g2".to_owned(),
///     ext: None,
///     app: None,
///     dlg: None,
///     hash: None,
///     mac: String::new(),
/// };
/// let normalized = normalized_string(MacKind::Header, &artifacts);
/// assert!(normalized.starts_with("hawk.1.header\n1353832234\nj4h3g2\nGET\n"));
/// assert!(normalized.ends_with("\n"));
/// ```
#[must_use]
pub fn normalized_string(kind: MacKind, artifacts: &Artifacts) -> String {
    let hash = artifacts.hash.as_deref().unwrap_or("");
    let ext = escape_ext(artifacts.ext.as_deref().unwrap_or(""));

    let mut normalized = format!(
        "{VERSION_PREFIX}{kind}\n{ts}\n{nonce}\n{method}\n{resource}\n{host}\n{port}\n{hash}\n{ext}\n",
        ts = artifacts.ts,
        nonce = artifacts.nonce,
        method = artifacts.method.to_uppercase(),
        resource = artifacts.resource,
        host = artifacts.host.to_lowercase(),
        port = artifacts.port,
    );

    if let Some(app) = &artifacts.app {
        let dlg = artifacts.dlg.as_deref().unwrap_or("");
        normalized.push_str(app);
        normalized.push('\n');
        normalized.push_str(dlg);
        normalized.push('\n');
    }

    normalized
}

/// Compute the base64-encoded MAC for the given kind and artifacts.
///
/// # Errors
///
/// Returns [`AuthError::InvalidCredentials`] when the credential key is empty.
pub fn calculate_mac(
    kind: MacKind,
    credentials: &Credential,
    artifacts: &Artifacts,
) -> Result<String, AuthError> {
    let normalized = normalized_string(kind, artifacts);
    hmac_base64(credentials, normalized.as_bytes())
}

/// Compute the timestamp MAC sent alongside a stale-timestamp rejection.
///
/// Lets a client trust the server clock carried in
/// [`AuthError::StaleTimestamp`] and resynchronize, because the value is
/// authenticated with the same shared key.
pub fn timestamp_message(credentials: &Credential, now: u64) -> Result<String, AuthError> {
    let normalized = format!("{VERSION_PREFIX}ts\n{now}\n");
    hmac_base64(credentials, normalized.as_bytes())
}

/// Compare two byte strings in constant time.
///
/// Scans up to the longer of the two lengths and folds a length-inequality
/// bit into the result, so neither the first differing position nor a length
/// difference is observable through timing.
#[must_use]
pub fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut mismatch = Choice::from(u8::from(a.len() != b.len()));
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        mismatch |= !x.ct_eq(&y);
    }
    !bool::from(mismatch)
}

/// Escape extension data so it cannot introduce field separators.
fn escape_ext(ext: &str) -> String {
    ext.replace('\\', "\\\\").replace('\n', "\\n")
}

fn hmac_base64(credentials: &Credential, data: &[u8]) -> Result<String, AuthError> {
    if credentials.key.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let digest = match credentials.algorithm {
        Algorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(&credentials.key)
                .map_err(|_| AuthError::InvalidCredentials)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(&credentials.key)
                .map_err(|_| AuthError::InvalidCredentials)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(BASE64_STANDARD.encode(digest))
}
