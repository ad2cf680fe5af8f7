//! Common test utilities for integration tests
//!
//! Provides a stub authorization server (well-known, token and JWKS endpoints) and
//! helpers for minting ID tokens with a known key.

#![allow(dead_code)]

use dings_auth::SigningKey;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Stub authorization server
pub struct MockAuthorizationServer {
    pub server: MockServer,
    pub issuer: String,
    pub well_known_url: String,
    pub token_endpoint: String,
    pub authorize_endpoint: String,
    pub jwks_endpoint: String,
}

impl MockAuthorizationServer {
    /// Start a stub server; nothing is mounted yet
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();

        Self {
            issuer: base_url.clone(),
            well_known_url: format!("{base_url}/.well-known/oauth-authorization-server"),
            token_endpoint: format!("{base_url}/token"),
            authorize_endpoint: format!("{base_url}/authorize"),
            jwks_endpoint: format!("{base_url}/jwks"),
            server,
        }
    }

    /// Serve a complete metadata document
    pub async fn mock_well_known(&self) {
        self.mock_well_known_body(json!({
            "issuer": self.issuer,
            "token_endpoint": self.token_endpoint,
            "jwks_uri": self.jwks_endpoint,
            "authorization_endpoint": self.authorize_endpoint,
        }))
        .await;
    }

    /// Serve an arbitrary metadata document
    pub async fn mock_well_known_body(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Successful token-exchange response
    pub async fn mock_token_success(&self, access_token: &str, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
                "token_type": "Bearer",
                "expires_in": expires_in,
            })))
            .mount(&self.server)
            .await;
    }

    /// OAuth error response
    pub async fn mock_token_error(&self, status: u16, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    /// Publish the public halves of `keys`
    pub async fn mock_jwks(&self, keys: &[Arc<SigningKey>]) {
        let keys: Vec<_> = keys.iter().map(|k| k.public_jwk()).collect();
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Body of every request received at `path`, form-decoded
    pub async fn form_requests(&self, request_path: &str) -> Vec<Vec<(String, String)>> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .map(|r| {
                url::form_urlencoded::parse(&r.body)
                    .into_owned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of requests received at `path`
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

/// Look up one form field
pub fn form_value<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Shared RSA key, generated once per test binary
pub fn idp_key() -> Arc<SigningKey> {
    static KEY: OnceLock<Arc<SigningKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(SigningKey::generate().expect("key generation")))
        .clone()
}

/// Second RSA key, for wrong-key scenarios
pub fn other_key() -> Arc<SigningKey> {
    static KEY: OnceLock<Arc<SigningKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(SigningKey::generate().expect("key generation")))
        .clone()
}

/// Current UNIX time in seconds
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Mint an ID token for `sub` valid for five minutes
pub fn id_token(key: &SigningKey, issuer: &str, audience: &str, sub: &str) -> String {
    let now = now_secs();
    key.sign(&json!({
        "iss": issuer,
        "aud": audience,
        "sub": sub,
        "iat": now,
        "exp": now + 300,
    }))
    .expect("signing")
}

/// HTTP client with a short timeout for tests
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client")
}
