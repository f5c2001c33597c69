//! End-to-end lifecycle tests: signed request → payload verification →
//! response signing, plus bewit-link authentication.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::request::Parts;
use talon_auth::credentials::{Algorithm, Credential, StaticCredentialResolver};
use talon_auth::mac::{MacKind, calculate_mac, fixed_time_eq};
use talon_auth::nonce::MemoryNonceGuard;
use talon_auth::{
    Artifacts, AuthEngine, AuthError, EngineConfig, ResponseMeta, bewit, hash_payload,
    header::parse_server_authorization,
};

const NOW: u64 = 1_353_832_234;
const KEY: &[u8] = b"werxhqb98rpaxn39848xrunpaw3489ruxnpa98w4rxn";

fn john() -> Credential {
    Credential::new("john", KEY.to_vec(), Algorithm::Sha256)
}

fn engine() -> AuthEngine {
    AuthEngine::new(
        EngineConfig::default(),
        Arc::new(StaticCredentialResolver::new(vec![john()])),
        Arc::new(MemoryNonceGuard::new(120)),
    )
}

/// Build a signed request the way a client would.
fn signed_request(
    method: &str,
    resource: &str,
    nonce: &str,
    body_hash: Option<&str>,
) -> Parts {
    let artifacts = Artifacts {
        method: method.to_owned(),
        resource: resource.to_owned(),
        host: "example.com".to_owned(),
        port: 8000,
        ts: NOW,
        nonce: nonce.to_owned(),
        ext: None,
        app: None,
        dlg: None,
        hash: body_hash.map(ToOwned::to_owned),
        mac: String::new(),
    };
    let mac = calculate_mac(MacKind::Header, &john(), &artifacts).expect("mac");

    let mut header = format!(
        r#"Hawk id="john", ts="{NOW}", nonce="{nonce}""#,
    );
    if let Some(hash) = body_hash {
        header.push_str(&format!(r#", hash="{hash}""#));
    }
    header.push_str(&format!(r#", mac="{mac}""#));

    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(resource)
        .header("host", "example.com:8000")
        .header(AUTHORIZATION, header)
        .body(())
        .expect("request")
        .into_parts();
    parts
}

#[tokio::test]
async fn test_should_run_full_lifecycle_for_signed_post() {
    let engine = engine();
    let body = b"hello";
    let declared = hash_payload(Algorithm::Sha256, Some("text/plain"), body);
    let parts = signed_request("POST", "/resource", "j4h3g2", Some(declared.as_str()));

    // Phase 1: authenticate the request head.
    let authenticated = engine
        .authenticate_at(&parts, NOW)
        .await
        .expect("authenticated");
    assert_eq!(authenticated.credentials.id, "john");
    assert!(authenticated.artifacts.covers_payload());

    // Phase 2: stream the body through the hasher, then verify.
    let mut hasher = engine.payload_hasher(&authenticated.credentials, Some("text/plain"));
    hasher.update(b"he");
    hasher.update(b"llo");
    let finalized = hasher.finalize();
    engine
        .verify_payload(&authenticated.artifacts, Some(&finalized))
        .expect("payload verified");

    // Phase 3: sign the response, hashing its body as it is emitted.
    let mut meta = ResponseMeta {
        content_type: Some("text/plain".to_owned()),
        payload_hash: None,
        ext: None,
    };
    let mut response_hasher = meta.hasher(&authenticated.credentials);
    response_hasher.update(b"Success");
    meta.payload_hash = Some(response_hasher.finalize());

    let server_authorization = engine
        .sign_response(&authenticated.credentials, &authenticated.artifacts, &meta)
        .expect("signed");

    // The client re-derives the response MAC from its own artifacts and the
    // response hash; the header must verify.
    let response_attributes = parse_server_authorization(&server_authorization).expect("parse");
    let expected_artifacts = Artifacts {
        hash: response_attributes.hash.clone(),
        ext: None,
        mac: String::new(),
        ..authenticated.artifacts.clone()
    };
    let expected = calculate_mac(MacKind::Response, &authenticated.credentials, &expected_artifacts)
        .expect("mac");
    assert!(fixed_time_eq(
        expected.as_bytes(),
        response_attributes.mac.as_bytes()
    ));
    assert_eq!(response_attributes.ts, NOW);
    assert_eq!(response_attributes.nonce, "j4h3g2");
}

#[tokio::test]
async fn test_should_detect_mutated_payload_after_successful_auth() {
    let engine = engine();
    let declared = hash_payload(Algorithm::Sha256, Some("text/plain"), b"hello");
    let parts = signed_request("POST", "/resource", "n1", Some(declared.as_str()));

    let authenticated = engine
        .authenticate_at(&parts, NOW)
        .await
        .expect("header-level auth unaffected by body");

    // The transport delivered "hello!" instead of the signed "hello".
    let mut hasher = engine.payload_hasher(&authenticated.credentials, Some("text/plain"));
    hasher.update(b"hello!");
    let finalized = hasher.finalize();

    let result = engine.verify_payload(&authenticated.artifacts, Some(&finalized));
    assert!(matches!(result, Err(AuthError::PayloadHashMismatch)));
}

#[tokio::test]
async fn test_should_reject_whole_request_replay() {
    let engine = engine();
    let parts = signed_request("GET", "/resource", "once", None);

    assert!(engine.authenticate_at(&parts, NOW).await.is_ok());
    let replay = engine
        .authenticate_at(&parts, NOW + 5)
        .await
        .expect_err("replay rejected");
    assert!(matches!(replay.reason, AuthError::ReplayedNonce));
}

fn bewit_request(uri: &str, method: &str) -> Parts {
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "example.com:8080")
        .body(())
        .expect("request")
        .into_parts();
    parts
}

#[tokio::test]
async fn test_should_authenticate_bewit_link() {
    let engine = engine();
    let token = bewit::encode(&john(), "example.com", 8080, "/bewit", 60, None, NOW)
        .expect("encode");

    let parts = bewit_request(&format!("/bewit?bewit={token}"), "GET");
    let authenticated = engine
        .authenticate_bewit_at(&parts, NOW)
        .await
        .expect("authenticated");
    assert_eq!(authenticated.credentials.id, "john");
    assert_eq!(authenticated.artifacts.resource, "/bewit");
}

#[tokio::test]
async fn test_should_accept_bewit_one_second_before_expiry_and_reject_after() {
    let engine = engine();
    let token = bewit::encode(&john(), "example.com", 8080, "/bewit", 60, None, NOW)
        .expect("encode");
    let uri = format!("/bewit?bewit={token}");

    // Expiry is NOW + 60; the expiry second itself is still valid.
    assert!(
        engine
            .authenticate_bewit_at(&bewit_request(&uri, "GET"), NOW + 59)
            .await
            .is_ok()
    );
    assert!(
        engine
            .authenticate_bewit_at(&bewit_request(&uri, "GET"), NOW + 60)
            .await
            .is_ok()
    );
    let expired = engine
        .authenticate_bewit_at(&bewit_request(&uri, "GET"), NOW + 61)
        .await
        .expect_err("expired");
    assert!(matches!(expired.reason, AuthError::BewitExpired));
}

#[tokio::test]
async fn test_should_reject_bewit_for_different_resource() {
    let engine = engine();
    let token = bewit::encode(&john(), "example.com", 8080, "/bewit", 60, None, NOW)
        .expect("encode");

    let parts = bewit_request(&format!("/other?bewit={token}"), "GET");
    let failure = engine
        .authenticate_bewit_at(&parts, NOW)
        .await
        .expect_err("rejected");
    assert!(matches!(failure.reason, AuthError::BadMac));
}

#[tokio::test]
async fn test_should_reject_bewit_on_unsafe_method() {
    let engine = engine();
    let token = bewit::encode(&john(), "example.com", 8080, "/bewit", 60, None, NOW)
        .expect("encode");

    let parts = bewit_request(&format!("/bewit?bewit={token}"), "POST");
    let failure = engine
        .authenticate_bewit_at(&parts, NOW)
        .await
        .expect_err("rejected");
    assert!(matches!(failure.reason, AuthError::BewitMethodNotAllowed(_)));
}

#[tokio::test]
async fn test_should_reject_bewit_combined_with_signed_header() {
    let engine = engine();
    let token = bewit::encode(&john(), "example.com", 8080, "/bewit", 60, None, NOW)
        .expect("encode");

    let (parts, ()) = http::Request::builder()
        .method("GET")
        .uri(format!("/bewit?bewit={token}"))
        .header("host", "example.com:8080")
        .header(AUTHORIZATION, r#"Hawk id="john", ts="1", nonce="n", mac="m""#)
        .body(())
        .expect("request")
        .into_parts();

    let failure = engine
        .authenticate_bewit_at(&parts, NOW)
        .await
        .expect_err("rejected");
    assert!(matches!(failure.reason, AuthError::BadHeaderFormat(_)));
}

#[tokio::test]
async fn test_should_reject_garbage_bewit_as_client_error() {
    let engine = engine();
    let parts = bewit_request("/bewit?bewit=junk", "GET");
    let failure = engine
        .authenticate_bewit_at(&parts, NOW)
        .await
        .expect_err("rejected");
    assert!(matches!(failure.reason, AuthError::BewitMalformed(_)));
    assert_eq!(
        failure.reason.class(),
        talon_auth::ErrorClass::BadRequest
    );
}

#[tokio::test]
async fn test_should_authenticate_bewit_on_head_request() {
    let engine = engine();
    let token = bewit::encode(&john(), "example.com", 8080, "/bewit", 60, None, NOW)
        .expect("encode");

    let parts = bewit_request(&format!("/bewit?bewit={token}"), "HEAD");
    assert!(engine.authenticate_bewit_at(&parts, NOW).await.is_ok());
}
