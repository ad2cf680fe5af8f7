//! RFC 7523 client assertions
//!
//! A client assertion is a short-lived JWT signed with the client's private key and
//! presented to a token endpoint in place of a shared secret.

use crate::clock::{self, Clock};
use crate::error::SigningError;
use crate::keys::SigningKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Lifetime of every assertion (`exp - iat`)
pub const CLIENT_ASSERTION_LIFETIME: Duration = Duration::from_secs(120);

/// `client_assertion_type` for JWT bearer assertions
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Claim layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssertionStyle {
    /// Token-exchange server style: `sub = iss` and `nbf = iat`
    #[default]
    TokenX,
    /// Bare RFC 7523 claims without `sub`/`nbf`
    Plain,
}

/// Claims of a client assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Client id
    pub iss: String,
    /// Client id (TokenX style only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Token endpoint or issuer the assertion is meant for
    pub aud: String,
    /// Issued at (UNIX seconds)
    pub iat: u64,
    /// Not before (TokenX style only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Expiry, always `iat + 120`
    pub exp: u64,
    /// Unique id (UUID v4)
    pub jti: String,
}

/// Signs client assertions for one registered client
#[derive(Debug, Clone)]
pub struct ClientAssertionSigner {
    client_id: String,
    key: Arc<SigningKey>,
    style: AssertionStyle,
    clock: Arc<dyn Clock>,
}

impl ClientAssertionSigner {
    /// Create a TokenX-style signer on the system clock
    pub fn new(client_id: impl Into<String>, key: Arc<SigningKey>) -> Self {
        Self {
            client_id: client_id.into(),
            key,
            style: AssertionStyle::default(),
            clock: clock::system(),
        }
    }

    /// Use a different claim layout
    pub fn with_style(mut self, style: AssertionStyle) -> Self {
        self.style = style;
        self
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Client id placed in `iss`
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Key id placed in the header
    pub fn key_id(&self) -> &str {
        self.key.key_id()
    }

    /// Build the claim set for `audience` at the current time
    pub fn claims(&self, audience: &str) -> ClientAssertionClaims {
        let iat = clock::unix_seconds(self.clock.now());
        let token_x = self.style == AssertionStyle::TokenX;

        ClientAssertionClaims {
            iss: self.client_id.clone(),
            sub: token_x.then(|| self.client_id.clone()),
            aud: audience.to_string(),
            iat,
            nbf: token_x.then_some(iat),
            exp: iat + CLIENT_ASSERTION_LIFETIME.as_secs(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Sign a fresh assertion for `audience`
    ///
    /// Header is `{alg: RS256, kid, typ: JWT}`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Encode`] if JWS encoding fails.
    pub fn sign(&self, audience: &str) -> Result<String, SigningError> {
        let claims = self.claims(audience);
        let assertion = self.key.sign(&claims)?;

        debug!(
            client_id = %self.client_id,
            aud = %audience,
            jti = %claims.jti,
            "Signed client assertion"
        );
        Ok(assertion)
    }
}
