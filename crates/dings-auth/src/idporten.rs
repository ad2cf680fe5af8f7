//! Authorization-code login against the identity provider
//!
//! Builds the authorize redirect, tracks pending `state` values and redeems the
//! returned code for an ID token (client_secret_post).

use crate::clock::Clock;
use crate::discovery::AuthorizationServerMetadata;
use crate::error::{ConfigError, TokenExchangeError};
use crate::exchange::post_token_request;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// How long a login may wait for its callback
pub const PENDING_LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

/// Parameters of the authorize redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest<'a> {
    /// Registered client id
    pub client_id: &'a str,
    /// Callback URL
    pub redirect_uri: &'a str,
    /// Space separated scopes
    pub scope: &'a str,
    /// Anti-CSRF value echoed back on the callback
    pub state: &'a str,
}

impl AuthorizationRequest<'_> {
    /// Authorize URL with `response_type=code` and `response_mode=query`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the metadata has no authorization endpoint
    /// or it is not a valid URL.
    pub fn url(&self, metadata: &AuthorizationServerMetadata) -> Result<url::Url, ConfigError> {
        let endpoint = metadata.authorization_endpoint.as_deref().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "issuer {} publishes no authorization_endpoint",
                metadata.issuer
            ))
        })?;

        let mut url = url::Url::parse(endpoint).map_err(|e| {
            ConfigError::Invalid(format!("invalid authorization_endpoint {endpoint}: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", self.client_id)
            .append_pair("redirect_uri", self.redirect_uri)
            .append_pair("scope", self.scope)
            .append_pair("state", self.state)
            .append_pair("response_type", "code")
            .append_pair("response_mode", "query");

        Ok(url)
    }
}

/// Fresh random `state` value
pub fn new_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Progress of one login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginState {
    /// No session
    Unauthenticated,
    /// Redirected to the identity provider
    AwaitingCallback,
    /// Code redeemed for ID and access tokens
    CodeExchanged,
    /// ID token verified
    Verified,
    /// Downstream access token obtained
    DownstreamTokenObtained,
    /// Access token cached and usable
    Ready,
    /// Metadata could not be resolved at startup
    DiscoveryFailed,
    /// ID token rejected
    VerificationFailed,
    /// Token exchange failed
    ExchangeFailed,
}

impl LoginState {
    /// Whether the login ended in failure
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            LoginState::DiscoveryFailed | LoginState::VerificationFailed | LoginState::ExchangeFailed
        )
    }

    /// Whether the user can recover by logging in again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LoginState::VerificationFailed | LoginState::ExchangeFailed
        )
    }
}

/// `state` values issued by `/login` and not yet redeemed
#[derive(Debug, Clone)]
pub struct PendingLogins {
    issued: Arc<DashMap<String, SystemTime>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PendingLogins {
    /// Create an empty store with [`PENDING_LOGIN_TTL`]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            issued: Arc::new(DashMap::new()),
            clock,
            ttl: PENDING_LOGIN_TTL,
        }
    }

    /// Remember a freshly issued `state`
    pub fn insert(&self, state: impl Into<String>) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.issued
            .retain(|_, issued_at| now.duration_since(*issued_at).is_ok_and(|age| age < ttl));
        self.issued.insert(state.into(), now);
    }

    /// Consume a `state`; `true` if it was issued and has not expired
    pub fn take(&self, state: &str) -> bool {
        let now = self.clock.now();
        self.issued
            .remove(state)
            .is_some_and(|(_, issued_at)| {
                now.duration_since(issued_at).is_ok_and(|age| age < self.ttl)
            })
    }

    /// Number of outstanding logins
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    /// Whether no login is outstanding
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

/// Token endpoint response to an authorization-code grant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdportenTokenResponse {
    /// Access token for the identity provider's own APIs
    pub access_token: String,
    /// ID token (the subject token for later exchanges)
    pub id_token: String,
    /// Usually `Bearer`
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

#[derive(Serialize)]
struct CodeGrant<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Redeems authorization codes
#[derive(Debug, Clone)]
pub struct CodeExchangeClient {
    client: reqwest::Client,
}

impl CodeExchangeClient {
    /// Create a client on a shared HTTP client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Redeem `code` at `token_endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`TokenExchangeError`] on network failure, a non-2xx response, or a
    /// body without `id_token`.
    pub async fn exchange_code(
        &self,
        token_endpoint: &str,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<IdportenTokenResponse, TokenExchangeError> {
        debug!(url = %token_endpoint, client_id = %client_id, "Redeeming authorization code");

        let form = CodeGrant {
            grant_type: "authorization_code",
            code,
            redirect_uri,
            client_id,
            client_secret: client_secret.expose_secret(),
        };

        post_token_request(&self.client, token_endpoint, &form).await
    }
}
