//! RFC 8693 token exchange
//!
//! The client posts a form-urlencoded token-exchange grant to a resolved token
//! endpoint and returns the parsed response. It never retries; retry policy belongs
//! to the caller.

use crate::assertion::CLIENT_ASSERTION_TYPE;
use crate::error::TokenExchangeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// `grant_type` for token exchange
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// `subject_token_type` for JWT subject tokens
pub const JWT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";

/// Form parameters of one token-exchange request
///
/// Carries exactly one audience. Built fresh per exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenExchangeRequest {
    /// Signed client assertion
    pub client_assertion: String,
    /// Always [`CLIENT_ASSERTION_TYPE`]
    pub client_assertion_type: &'static str,
    /// Always [`TOKEN_EXCHANGE_GRANT_TYPE`]
    pub grant_type: &'static str,
    /// Token being exchanged
    pub subject_token: String,
    /// Always [`JWT_TOKEN_TYPE`]
    pub subject_token_type: &'static str,
    /// Target audience
    pub audience: String,
}

impl TokenExchangeRequest {
    /// Build a request for one audience
    pub fn new(
        client_assertion: impl Into<String>,
        subject_token: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            client_assertion: client_assertion.into(),
            client_assertion_type: CLIENT_ASSERTION_TYPE,
            grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
            subject_token: subject_token.into(),
            subject_token_type: JWT_TOKEN_TYPE,
            audience: audience.into(),
        }
    }
}

/// Token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    /// Issued access token
    pub access_token: String,
    /// Type of the issued token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_token_type: Option<String>,
    /// Usually `Bearer`
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// Executes token-exchange grants
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    client: reqwest::Client,
}

impl TokenExchangeClient {
    /// Create a client on a shared HTTP client
    ///
    /// The HTTP client is expected to carry a finite timeout.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Exchange `request.subject_token` for an access token scoped to `request.audience`
    ///
    /// # Errors
    ///
    /// Returns [`TokenExchangeError`] with:
    /// - no status and the client error as source on network failure
    /// - the status and body on a non-2xx response
    /// - the status, body and parse error on a 2xx body without `access_token`
    pub async fn exchange(
        &self,
        token_endpoint: &str,
        request: &TokenExchangeRequest,
    ) -> Result<AccessTokenResponse, TokenExchangeError> {
        debug!(url = %token_endpoint, audience = %request.audience, "Exchanging token");
        let response: AccessTokenResponse =
            post_token_request(&self.client, token_endpoint, request).await?;
        debug!(
            url = %token_endpoint,
            audience = %request.audience,
            expires_in = response.expires_in,
            "Token exchange succeeded"
        );
        Ok(response)
    }
}

/// POST a form to a token endpoint and parse a JSON success body
pub(crate) async fn post_token_request<F, T>(
    client: &reqwest::Client,
    url: &str,
    form: &F,
) -> Result<T, TokenExchangeError>
where
    F: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| {
            error!(url = %url, error = %e, "Token request failed");
            TokenExchangeError::transport(url, e)
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        error!(url = %url, status = %status, error = %e, "Failed to read token response");
        TokenExchangeError::transport(url, e)
    })?;

    if !status.is_success() {
        warn!(url = %url, status = %status, "Token endpoint rejected request");
        return Err(TokenExchangeError::rejected(url, status.as_u16(), body));
    }

    serde_json::from_str(&body).map_err(|e| {
        warn!(url = %url, status = %status, error = %e, "Unparseable token response");
        TokenExchangeError::unparseable(url, status.as_u16(), body, e)
    })
}
