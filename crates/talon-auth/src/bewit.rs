//! Bewit capability tokens.
//!
//! A bewit pre-authorizes a single URL for a limited time without a signed
//! header exchange: the token `id\expiry\mac\ext` is base64url-encoded and
//! carried as a query parameter on GET/HEAD links. Because the token itself
//! rides in the query string, the MAC is computed over the resource with the
//! bewit parameter removed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;

use crate::artifacts::Artifacts;
use crate::credentials::Credential;
use crate::error::AuthError;
use crate::mac::{MacKind, calculate_mac};

/// Field delimiter inside the decoded token.
const DELIMITER: char = '\\';

/// A decoded bewit token. Stateless; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bewit {
    /// Credential identifier.
    pub id: String,
    /// Expiry, unix seconds. The expiry second itself is still valid.
    pub expiry: u64,
    /// MAC over the pre-authorized resource, base64.
    pub mac: String,
    /// Extension data bound into the MAC.
    pub ext: Option<String>,
}

/// Decode a bewit query-parameter value.
///
/// # Errors
///
/// Returns [`AuthError::BewitMalformed`] for undecodable base64, non-UTF-8
/// content, a field count other than four, an empty id or mac, or a
/// non-numeric expiry. These are client-input errors.
///
/// # Examples
///
/// ```
/// use talon_auth::bewit::decode;
///
/// // base64url of r"john\1380971520\MAsv...\some-ext"
/// let result = decode("not!base64url");
/// assert!(result.is_err());
/// ```
pub fn decode(token: &str) -> Result<Bewit, AuthError> {
    let raw = BASE64_URL
        .decode(token)
        .map_err(|_| AuthError::BewitMalformed("undecodable base64".to_owned()))?;
    let raw = String::from_utf8(raw)
        .map_err(|_| AuthError::BewitMalformed("non-utf8 token".to_owned()))?;

    let fields: Vec<&str> = raw.split(DELIMITER).collect();
    let [id, expiry, mac, ext] = fields.as_slice() else {
        return Err(AuthError::BewitMalformed("wrong field count".to_owned()));
    };

    if id.is_empty() || mac.is_empty() {
        return Err(AuthError::BewitMalformed("missing id or mac".to_owned()));
    }

    let expiry: u64 = expiry
        .parse()
        .map_err(|_| AuthError::BewitMalformed("non-numeric expiry".to_owned()))?;

    Ok(Bewit {
        id: (*id).to_owned(),
        expiry,
        mac: (*mac).to_owned(),
        ext: if ext.is_empty() {
            None
        } else {
            Some((*ext).to_owned())
        },
    })
}

/// Encode a bewit pre-authorizing `resource` on `host:port` until
/// `now + ttl_secs`.
///
/// This is the client-side half of the codec, also used by tests to produce
/// verifiable tokens. `resource` is the path plus any query string, without
/// a bewit parameter.
///
/// # Errors
///
/// Returns [`AuthError::BewitMalformed`] if the credential id or `ext`
/// contains the token delimiter, or a MAC computation error for unusable
/// credentials.
pub fn encode(
    credentials: &Credential,
    host: &str,
    port: u16,
    resource: &str,
    ttl_secs: u64,
    ext: Option<&str>,
    now: u64,
) -> Result<String, AuthError> {
    if credentials.id.contains(DELIMITER) {
        return Err(AuthError::BewitMalformed(
            "credential id contains delimiter".to_owned(),
        ));
    }
    // An unescaped delimiter in ext would shift the field count on decode.
    if ext.is_some_and(|e| e.contains(DELIMITER)) {
        return Err(AuthError::BewitMalformed(
            "ext contains delimiter".to_owned(),
        ));
    }

    let expiry = now + ttl_secs;
    let artifacts = bewit_artifacts(expiry, host, port, resource, ext);
    let mac = calculate_mac(MacKind::Bewit, credentials, &artifacts)?;

    let raw = format!(
        "{id}{DELIMITER}{expiry}{DELIMITER}{mac}{DELIMITER}{ext}",
        id = credentials.id,
        ext = ext.unwrap_or(""),
    );
    Ok(BASE64_URL.encode(raw))
}

/// Build the artifacts a bewit MAC covers.
///
/// The timestamp slot carries the expiry, the nonce is empty, and the method
/// is fixed to `GET` so one token serves both GET and HEAD.
#[must_use]
pub fn bewit_artifacts(
    expiry: u64,
    host: &str,
    port: u16,
    resource: &str,
    ext: Option<&str>,
) -> Artifacts {
    Artifacts {
        method: "GET".to_owned(),
        resource: resource.to_owned(),
        host: host.to_owned(),
        port,
        ts: expiry,
        nonce: String::new(),
        ext: ext.map(ToOwned::to_owned),
        app: None,
        dlg: None,
        hash: None,
        mac: String::new(),
    }
}

/// Split a request resource into the bewit token and the resource with the
/// bewit parameter removed (the form the MAC covers).
///
/// Returns `None` when the query carries no bewit parameter. Other query
/// parameters keep their original order and raw encoding, since that is what
/// the client signed.
#[must_use]
pub fn strip_bewit(resource: &str, param: &str) -> Option<(String, String)> {
    let (path, query) = resource.split_once('?')?;

    let mut token = None;
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            if key == param {
                let value = pair.split_once('=').map_or("", |(_, v)| v);
                token = Some(value.to_owned());
                false
            } else {
                true
            }
        })
        .collect();

    let token = token?;
    let stripped = if kept.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{}", kept.join("&"))
    };
    Some((token, stripped))
}
