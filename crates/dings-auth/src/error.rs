//! Error taxonomy for the token-exchange core
//!
//! Startup-time errors ([`DiscoveryError`], [`SigningError`], [`ConfigError`]) abort
//! process start. Per-request errors ([`KeyNotFoundError`], [`InvalidTokenError`],
//! [`TokenExchangeError`], [`DownstreamError`]) are mapped to an HTTP status and an
//! [`ErrorResponse`] body at the HTTP boundary. Nothing in this crate retries.

use http::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Boxed error source preserved for operators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to resolve an authorization server's well-known metadata
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Network failure (timeout, DNS, connection reset)
    #[error("Request to {url} failed: {source}")]
    Transport {
        /// Well-known URL that was requested
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Non-200 response
    #[error("Well-known endpoint {url} returned HTTP {status}")]
    Status {
        /// Well-known URL that was requested
        url: String,
        /// Response status code
        status: u16,
    },

    /// Body is not JSON or lacks a required field
    #[error("Invalid metadata document from {url}: {reason}")]
    InvalidDocument {
        /// Well-known URL that was requested
        url: String,
        /// What was wrong with the document
        reason: String,
    },
}

/// Configured key material could not be turned into a signing key
#[derive(Debug, Error)]
pub enum SigningError {
    /// The JWKS document is not valid JSON or has no usable key
    #[error("Invalid private JWKS: {0}")]
    InvalidJwks(String),

    /// The key file could not be read
    #[error("Failed to read private JWKS from {path}: {source}")]
    Io {
        /// File that was read
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Key generation or encoding failed
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// JWS encoding failed
    #[error("Failed to sign client assertion: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// A verification key could not be obtained for a key id
#[derive(Debug, Error)]
pub enum KeyNotFoundError {
    /// The token header carries no `kid`
    #[error("Token header has no key id")]
    MissingKeyId,

    /// The issuer's JWKS does not contain the key id
    #[error("Key id '{kid}' not found in JWKS at {jwks_uri}")]
    UnknownKeyId {
        /// Requested key id
        kid: String,
        /// JWKS endpoint that was consulted
        jwks_uri: String,
    },

    /// Cache miss and the fetch budget for the current window is spent
    #[error("Key id '{kid}' not cached and JWKS fetch rate limit exceeded")]
    RateLimited {
        /// Requested key id
        kid: String,
    },

    /// The JWKS endpoint could not be read
    #[error("Failed to fetch JWKS from {jwks_uri}: {reason}")]
    Fetch {
        /// JWKS endpoint that was consulted
        jwks_uri: String,
        /// What went wrong
        reason: String,
    },
}

/// Which ID-token check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCheck {
    /// Not a decodable JWS or missing required claims
    Malformed,
    /// Signature does not verify against the issuer's key
    Signature,
    /// `aud` does not contain the expected client id
    Audience,
    /// `iss` is not the expected issuer
    Issuer,
    /// `exp` is in the past
    Expiry,
}

impl fmt::Display for TokenCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenCheck::Malformed => "format",
            TokenCheck::Signature => "signature",
            TokenCheck::Audience => "audience",
            TokenCheck::Issuer => "issuer",
            TokenCheck::Expiry => "expiry",
        };
        f.write_str(name)
    }
}

/// An inbound ID token failed verification
#[derive(Debug, Error)]
#[error("ID token {check} check failed: {reason}")]
pub struct InvalidTokenError {
    /// The check that failed
    pub check: TokenCheck,
    /// Human readable detail
    pub reason: String,
}

impl InvalidTokenError {
    pub(crate) fn new(check: TokenCheck, reason: impl Into<String>) -> Self {
        Self {
            check,
            reason: reason.into(),
        }
    }
}

/// A token endpoint call failed
///
/// `status` is `None` when the request never produced a response (timeout, DNS,
/// connection reset); the underlying client error is kept as `source`.
#[derive(Debug, Error)]
pub struct TokenExchangeError {
    /// Token endpoint that was called
    pub url: String,
    /// HTTP status, if a response was received
    pub status: Option<u16>,
    /// Response body, if one was read
    pub body: Option<String>,
    /// Underlying cause
    #[source]
    pub source: Option<BoxError>,
}

impl TokenExchangeError {
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        Self {
            url: url.to_string(),
            status: None,
            body: None,
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn rejected(url: &str, status: u16, body: String) -> Self {
        Self {
            url: url.to_string(),
            status: Some(status),
            body: Some(body),
            source: None,
        }
    }

    pub(crate) fn unparseable(url: &str, status: u16, body: String, source: serde_json::Error) -> Self {
        Self {
            url: url.to_string(),
            status: Some(status),
            body: Some(body),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for TokenExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.source) {
            (None, Some(source)) => write!(f, "Token request to {} failed: {}", self.url, source),
            (None, None) => write!(f, "Token request to {} failed", self.url),
            (Some(status), _) => write!(
                f,
                "Token endpoint {} returned HTTP {}: {}",
                self.url,
                status,
                self.body.as_deref().unwrap_or("<empty body>")
            ),
        }
    }
}

/// Configuration could not be loaded or is inconsistent
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// Semantically invalid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The downstream API call failed
#[derive(Debug, Error)]
pub enum DownstreamError {
    /// Network failure
    #[error("Request to {url} failed: {source}")]
    Transport {
        /// API URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response
    #[error("Downstream API {url} returned HTTP {status}: {body}")]
    Status {
        /// API URL
        url: String,
        /// Response status
        status: u16,
        /// Response body
        body: String,
    },
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Well-known metadata could not be resolved
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Key material is unusable
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// No verification key for a token
    #[error(transparent)]
    KeyNotFound(#[from] KeyNotFoundError),

    /// A token failed verification
    #[error(transparent)]
    InvalidToken(#[from] InvalidTokenError),

    /// A token endpoint call failed
    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    /// Configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Downstream API failure
    #[error(transparent)]
    Downstream(#[from] DownstreamError),
}

impl Error {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::Discovery(_) => "discovery_failed",
            Error::Signing(_) => "signing_failed",
            Error::KeyNotFound(_) => "key_not_found",
            Error::InvalidToken(_) => "invalid_token",
            Error::TokenExchange(_) => "token_exchange_failed",
            Error::Config(_) => "invalid_configuration",
            Error::Downstream(_) => "downstream_failed",
        }
    }

    /// HTTP status a request handler should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Discovery(_) | Error::Signing(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::KeyNotFound(_) | Error::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Error::TokenExchange(_) | Error::Downstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether this error can only happen while the process is starting
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Error::Discovery(_) | Error::Signing(_) | Error::Config(_)
        )
    }
}

/// Structured error body returned at the HTTP boundary
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// HTTP status code
    pub code: u16,
    /// Short description of what failed
    pub message: String,
    /// Underlying cause, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let cause = match err {
            Error::TokenExchange(e) => e
                .body
                .clone()
                .or_else(|| e.source.as_ref().map(|s| s.to_string())),
            Error::InvalidToken(e) => Some(e.check.to_string()),
            other => std::error::Error::source(other).map(|s| s.to_string()),
        };

        Self {
            code: err.status_code().as_u16(),
            message: err.to_string(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_token_maps_to_unauthorized() {
        let err = Error::from(InvalidTokenError::new(TokenCheck::Audience, "aud mismatch"));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.code(), "invalid_token");

        let body = ErrorResponse::from(&err);
        assert_eq!(body.code, 401);
        assert_eq!(body.cause.as_deref(), Some("audience"));
        assert!(body.message.contains("audience"));
    }

    #[test]
    fn test_token_exchange_error_keeps_upstream_body() {
        let err = Error::from(TokenExchangeError::rejected(
            "https://tokenx.example/token",
            400,
            r#"{"error":"invalid_request"}"#.to_string(),
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let body = ErrorResponse::from(&err);
        assert_eq!(body.code, 502);
        assert_eq!(body.cause.as_deref(), Some(r#"{"error":"invalid_request"}"#));
        assert!(body.message.contains("HTTP 400"));
    }

    #[test]
    fn test_startup_errors() {
        let err = Error::from(ConfigError::Invalid("no client id".to_string()));
        assert!(err.is_startup_error());

        let err = Error::from(KeyNotFoundError::MissingKeyId);
        assert!(!err.is_startup_error());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_error_response_serialization_skips_empty_cause() {
        let body = ErrorResponse {
            code: 500,
            message: "boom".to_string(),
            cause: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"code": 500, "message": "boom"}));
    }
}
