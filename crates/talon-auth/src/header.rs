//! Wire codecs for the `Authorization` and `Server-Authorization` headers.
//!
//! Both directions use the same encoding: the scheme token `Hawk` followed by
//! a comma-separated `key="value"` attribute list. Attribute values may
//! contain commas, so parsing is a small scanner rather than a split; values
//! are restricted to printable ASCII minus `"` and `\`, enforced on parse and
//! on format alike, which keeps the format injection-free without escaping.
//! The two directions carry different attribute sets: requests require
//! `id`/`ts`/`nonce`/`mac`, while responses carry no `id` and require only
//! `mac`/`ts`/`nonce`.

use http::request::Parts;

use crate::error::AuthError;

/// The authentication scheme token.
pub const SCHEME: &str = "Hawk";

/// Attributes extracted from a request `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderAttributes {
    /// Credential identifier.
    pub id: String,
    /// Request timestamp, unix seconds.
    pub ts: u64,
    /// Single-use nonce.
    pub nonce: String,
    /// Presented MAC, base64.
    pub mac: String,
    /// Declared payload hash, base64.
    pub hash: Option<String>,
    /// Extension data.
    pub ext: Option<String>,
    /// Application id for delegated access.
    pub app: Option<String>,
    /// Delegated-by credential id.
    pub dlg: Option<String>,
}

/// Attributes extracted from a `Server-Authorization` response header.
///
/// Unlike a request header, the response carries no credential id; the client
/// pairs it with the request it just sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAuthorizationAttributes {
    /// Response MAC, base64.
    pub mac: String,
    /// Response payload hash, base64.
    pub hash: Option<String>,
    /// Echo of the request timestamp, unix seconds.
    pub ts: u64,
    /// Echo of the request nonce.
    pub nonce: String,
    /// Server extension data.
    pub ext: Option<String>,
}

/// Parse a request `Authorization` header value.
///
/// # Errors
///
/// Returns [`AuthError::BadHeaderFormat`] for an unknown scheme, malformed
/// attribute list, unknown or duplicate key, value outside the allowed
/// charset, missing required attribute, or non-numeric `ts`. These are
/// client-input errors, distinct from authentication failures.
///
/// # Examples
///
/// ```
/// use talon_auth::header::parse_header;
///
/// let attributes = parse_header(
///     r#"Hawk id="dh37fgj492je", ts="1353832234", nonce="j4h3g2", mac="bXx7a7p1h9qwqQ=""#,
/// )
/// .unwrap();
/// assert_eq!(attributes.id, "dh37fgj492je");
/// assert_eq!(attributes.ts, 1_353_832_234);
/// ```
pub fn parse_header(value: &str) -> Result<HeaderAttributes, AuthError> {
    let mut attributes = AttributeSet::parse(
        value,
        &["id", "ts", "nonce", "mac", "hash", "ext", "app", "dlg"],
    )?;

    Ok(HeaderAttributes {
        id: attributes.require("id")?,
        ts: parse_ts(&attributes.require("ts")?)?,
        nonce: attributes.require("nonce")?,
        mac: attributes.require("mac")?,
        hash: attributes.take("hash"),
        ext: attributes.take("ext"),
        app: attributes.take("app"),
        dlg: attributes.take("dlg"),
    })
}

/// Parse a `Server-Authorization` response header value.
///
/// This is the client-side half of response authentication, also used by
/// tests to close the loop on what the engine emits.
///
/// # Errors
///
/// Returns [`AuthError::BadHeaderFormat`] under the same rules as
/// [`parse_header`], except the required set is `mac`/`ts`/`nonce` and the
/// request-only attributes (`id`, `app`, `dlg`) are unknown here.
///
/// # Examples
///
/// ```
/// use talon_auth::header::parse_server_authorization;
///
/// let attributes = parse_server_authorization(
///     r#"Hawk mac="bXx7a7p1h9qwqQ=", ts="1353832234", nonce="j4h3g2""#,
/// )
/// .unwrap();
/// assert_eq!(attributes.nonce, "j4h3g2");
/// assert!(attributes.hash.is_none());
/// ```
pub fn parse_server_authorization(
    value: &str,
) -> Result<ServerAuthorizationAttributes, AuthError> {
    let mut attributes = AttributeSet::parse(value, &["mac", "hash", "ts", "nonce", "ext"])?;

    Ok(ServerAuthorizationAttributes {
        mac: attributes.require("mac")?,
        hash: attributes.take("hash"),
        ts: parse_ts(&attributes.require("ts")?)?,
        nonce: attributes.require("nonce")?,
        ext: attributes.take("ext"),
    })
}

/// Encode the `Server-Authorization` response value.
///
/// Echoes the request's `ts` and `nonce` so the client can pair the response
/// MAC with the request it answers.
///
/// # Errors
///
/// Returns [`AuthError::BadHeaderFormat`] when a value falls outside the
/// allowed charset. A host-supplied `ext` or `hash` containing `"` or `\`
/// could otherwise splice extra attributes into the emitted header.
pub fn format_server_authorization(
    mac: &str,
    hash: Option<&str>,
    ts: u64,
    nonce: &str,
    ext: Option<&str>,
) -> Result<String, AuthError> {
    for (key, value) in [
        ("mac", Some(mac)),
        ("hash", hash),
        ("nonce", Some(nonce)),
        ("ext", ext),
    ] {
        if let Some(value) = value
            && !value.chars().all(is_allowed_value_char)
        {
            return Err(AuthError::BadHeaderFormat(format!(
                "bad value for attribute {key}"
            )));
        }
    }

    let mut header = format!(r#"{SCHEME} mac="{mac}""#);
    if let Some(hash) = hash {
        header.push_str(&format!(r#", hash="{hash}""#));
    }
    header.push_str(&format!(r#", ts="{ts}", nonce="{nonce}""#));
    if let Some(ext) = ext {
        header.push_str(&format!(r#", ext="{ext}""#));
    }
    Ok(header)
}

/// Resolve the `(host, port)` pair the client addressed.
///
/// Reads the named header (normally `host`, but reverse proxies commonly
/// forward the original value under a custom name) and falls back to the
/// request scheme's default port when none is present. IPv6 literals keep
/// their brackets, matching what clients sign.
pub fn resolve_host(parts: &Parts, header_name: &str) -> Result<(String, u16), AuthError> {
    let raw = parts
        .headers
        .get(header_name)
        .ok_or_else(|| AuthError::BadHeaderFormat(format!("missing {header_name} header")))?
        .to_str()
        .map_err(|_| AuthError::BadHeaderFormat(format!("invalid {header_name} header")))?
        .trim();

    if raw.is_empty() {
        return Err(AuthError::BadHeaderFormat(format!(
            "empty {header_name} header"
        )));
    }

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        // Bracketed IPv6 literal, optionally followed by :port.
        let end = rest
            .find(']')
            .ok_or_else(|| AuthError::BadHeaderFormat("unterminated ipv6 host".to_owned()))?;
        let host = format!("[{}]", &rest[..end]);
        match rest[end + 1..].strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if rest[end + 1..].is_empty() => (host, None),
            None => {
                return Err(AuthError::BadHeaderFormat("invalid host header".to_owned()));
            }
        }
    } else {
        match raw.split_once(':') {
            Some((host, port)) => (host.to_owned(), Some(port)),
            None => (raw.to_owned(), None),
        }
    };

    if host.is_empty() {
        return Err(AuthError::BadHeaderFormat("invalid host header".to_owned()));
    }

    let port = match port {
        Some(p) => p
            .parse()
            .map_err(|_| AuthError::BadHeaderFormat("invalid host port".to_owned()))?,
        None => default_port(parts),
    };

    Ok((host.to_lowercase(), port))
}

fn default_port(parts: &Parts) -> u16 {
    match parts.uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    }
}

fn missing(key: &str) -> AuthError {
    AuthError::BadHeaderFormat(format!("missing required attribute: {key}"))
}

fn parse_ts(value: &str) -> Result<u64, AuthError> {
    value
        .parse()
        .map_err(|_| AuthError::BadHeaderFormat("non-numeric ts".to_owned()))
}

/// A scanned attribute list with scheme, unknown-key, and duplicate checks
/// already applied. Which keys are required is up to the caller.
struct AttributeSet(Vec<(String, String)>);

impl AttributeSet {
    fn parse(value: &str, allowed: &[&str]) -> Result<Self, AuthError> {
        let value = value.trim();
        let (scheme, rest) = value
            .split_once(char::is_whitespace)
            .ok_or_else(|| AuthError::BadHeaderFormat("missing attributes".to_owned()))?;

        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(AuthError::BadHeaderFormat(format!(
                "unknown scheme: {scheme}"
            )));
        }

        let pairs = parse_attributes(rest)?;
        for (i, (key, _)) in pairs.iter().enumerate() {
            if !allowed.contains(&key.as_str()) {
                return Err(AuthError::BadHeaderFormat(format!(
                    "unknown attribute: {key}"
                )));
            }
            if pairs[..i].iter().any(|(seen, _)| seen == key) {
                return Err(AuthError::BadHeaderFormat(format!(
                    "duplicate attribute: {key}"
                )));
            }
        }
        Ok(Self(pairs))
    }

    fn take(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    fn require(&mut self, key: &str) -> Result<String, AuthError> {
        self.take(key).ok_or_else(|| missing(key))
    }
}

/// Scan a `key="value", key="value"` list.
///
/// Values may contain any printable ASCII except `"` and `\`; keys are
/// ASCII word characters. Trailing garbage after the last pair is an error.
fn parse_attributes(s: &str) -> Result<Vec<(String, String)>, AuthError> {
    let mut pairs = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| AuthError::BadHeaderFormat("expected key=\"value\"".to_owned()))?;
        let key = rest[..eq].trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AuthError::BadHeaderFormat(format!("invalid key: {key}")));
        }

        let after_eq = &rest[eq + 1..];
        let value_body = after_eq
            .strip_prefix('"')
            .ok_or_else(|| AuthError::BadHeaderFormat("unquoted attribute value".to_owned()))?;
        let close = value_body
            .find('"')
            .ok_or_else(|| AuthError::BadHeaderFormat("unterminated attribute value".to_owned()))?;
        let value = &value_body[..close];

        if !value.chars().all(is_allowed_value_char) {
            return Err(AuthError::BadHeaderFormat(format!(
                "bad value for attribute {key}"
            )));
        }

        pairs.push((key.to_owned(), value.to_owned()));

        rest = value_body[close + 1..].trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
            if rest.is_empty() {
                return Err(AuthError::BadHeaderFormat("trailing comma".to_owned()));
            }
        } else if !rest.is_empty() {
            return Err(AuthError::BadHeaderFormat(
                "unexpected characters between attributes".to_owned(),
            ));
        }
    }

    if pairs.is_empty() {
        return Err(AuthError::BadHeaderFormat("empty attribute list".to_owned()));
    }

    Ok(pairs)
}

/// Printable ASCII minus `"` and `\`.
fn is_allowed_value_char(c: char) -> bool {
    matches!(c, ' '..='~') && c != '"' && c != '\\'
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_HEADER: &str = r#"Hawk id="dh37fgj492je", ts="1353832234", nonce="j4h3g2", hash="Yi9LfIIFRtBEPt74PVmbTF/xVAwPn7ub15ePICfgnuY=", ext="some-app-ext-data", mac="aSe1DERmZuRl3pI36/9BdZmnErTw3sNzOOAUlfeKjVw=""#;

    #[test]
    fn test_should_parse_full_header() {
        let attributes = parse_header(FULL_HEADER).expect("parse");
        assert_eq!(attributes.id, "dh37fgj492je");
        assert_eq!(attributes.ts, 1_353_832_234);
        assert_eq!(attributes.nonce, "j4h3g2");
        assert_eq!(attributes.ext.as_deref(), Some("some-app-ext-data"));
        assert!(attributes.hash.is_some());
        assert!(attributes.app.is_none());
    }

    #[test]
    fn test_should_allow_commas_inside_values() {
        let header = r#"Hawk id="a", ts="1", nonce="n", ext="x,y,z", mac="m""#;
        let attributes = parse_header(header).expect("parse");
        assert_eq!(attributes.ext.as_deref(), Some("x,y,z"));
    }

    #[test]
    fn test_should_reject_unknown_scheme() {
        let result = parse_header(r#"Basic id="a", ts="1", nonce="n", mac="m""#);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_reject_unknown_attribute() {
        let result = parse_header(r#"Hawk id="a", ts="1", nonce="n", mac="m", scope="x""#);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_reject_duplicate_attribute() {
        let result = parse_header(r#"Hawk id="a", id="b", ts="1", nonce="n", mac="m""#);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_reject_missing_required_attribute() {
        for header in [
            r#"Hawk ts="1", nonce="n", mac="m""#,
            r#"Hawk id="a", nonce="n", mac="m""#,
            r#"Hawk id="a", ts="1", mac="m""#,
            r#"Hawk id="a", ts="1", nonce="n""#,
        ] {
            let result = parse_header(header);
            assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
        }
    }

    #[test]
    fn test_should_reject_non_numeric_ts() {
        let result = parse_header(r#"Hawk id="a", ts="abc", nonce="n", mac="m""#);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_reject_unterminated_value() {
        let result = parse_header(r#"Hawk id="a, ts="1", nonce="n", mac="m""#);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_reject_bare_scheme() {
        let result = parse_header("Hawk");
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_format_server_authorization_with_all_fields() {
        let header = format_server_authorization(
            "macvalue",
            Some("hashvalue"),
            1_353_832_234,
            "j4h3g2",
            Some("response-ext"),
        )
        .expect("format");
        assert_eq!(
            header,
            r#"Hawk mac="macvalue", hash="hashvalue", ts="1353832234", nonce="j4h3g2", ext="response-ext""#
        );
    }

    #[test]
    fn test_should_roundtrip_formatted_header_through_parser() {
        let header =
            format_server_authorization("m", Some("h"), 7, "n", Some("x,y")).expect("format");
        let attributes = parse_server_authorization(&header).expect("parse");
        assert_eq!(attributes.mac, "m");
        assert_eq!(attributes.hash.as_deref(), Some("h"));
        assert_eq!(attributes.ts, 7);
        assert_eq!(attributes.nonce, "n");
        assert_eq!(attributes.ext.as_deref(), Some("x,y"));
    }

    #[test]
    fn test_should_parse_server_authorization_without_id() {
        let attributes =
            parse_server_authorization(r#"Hawk mac="m", ts="7", nonce="n""#).expect("parse");
        assert_eq!(attributes.mac, "m");
        assert!(attributes.hash.is_none());
        assert!(attributes.ext.is_none());
    }

    #[test]
    fn test_should_reject_request_attributes_in_server_authorization() {
        for header in [
            r#"Hawk id="a", mac="m", ts="7", nonce="n""#,
            r#"Hawk mac="m", ts="7", nonce="n", app="x""#,
        ] {
            let result = parse_server_authorization(header);
            assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
        }
    }

    #[test]
    fn test_should_reject_server_authorization_missing_mac() {
        let result = parse_server_authorization(r#"Hawk ts="7", nonce="n""#);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_refuse_formatting_values_outside_charset() {
        // A quote in ext would splice extra attributes into the header.
        let result = format_server_authorization("m", None, 7, "n", Some(r#"x", hash="forged"#));
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));

        let result = format_server_authorization("m", Some("h\\ash"), 7, "n", None);
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    fn parts_with_host(host: &str) -> Parts {
        let (parts, ()) = http::Request::builder()
            .method("GET")
            .uri("/resource/1?b=1&a=2")
            .header("host", host)
            .body(())
            .expect("request")
            .into_parts();
        parts
    }

    #[test]
    fn test_should_resolve_host_with_port() {
        let parts = parts_with_host("Example.COM:8080");
        let (host, port) = resolve_host(&parts, "host").expect("host");
        assert_eq!(host, "example.com");
        assert_eq!(port, 8080);
    }

    #[test]
    fn test_should_default_port_without_scheme() {
        let parts = parts_with_host("example.com");
        let (_, port) = resolve_host(&parts, "host").expect("host");
        assert_eq!(port, 80);
    }

    #[test]
    fn test_should_resolve_bracketed_ipv6_host() {
        let parts = parts_with_host("[::1]:8000");
        let (host, port) = resolve_host(&parts, "host").expect("host");
        assert_eq!(host, "[::1]");
        assert_eq!(port, 8000);
    }

    #[test]
    fn test_should_read_forwarded_host_header() {
        let (parts, ()) = http::Request::builder()
            .method("GET")
            .uri("/resource/1")
            .header("host", "internal:9999")
            .header("x-forwarded-host", "example.com:443")
            .body(())
            .expect("request")
            .into_parts();
        let (host, port) = resolve_host(&parts, "x-forwarded-host").expect("host");
        assert_eq!(host, "example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn test_should_reject_missing_host_header() {
        let (parts, ()) = http::Request::builder()
            .method("GET")
            .uri("/resource/1")
            .body(())
            .expect("request")
            .into_parts();
        let result = resolve_host(&parts, "host");
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }

    #[test]
    fn test_should_reject_bad_port() {
        let parts = parts_with_host("example.com:not-a-port");
        let result = resolve_host(&parts, "host");
        assert!(matches!(result, Err(AuthError::BadHeaderFormat(_))));
    }
}
