//! Cached token exchange for one target audience

use crate::assertion::ClientAssertionSigner;
use crate::cache::CredentialCache;
use crate::discovery::AuthorizationServerMetadata;
use crate::error::Result;
use crate::exchange::{TokenExchangeClient, TokenExchangeRequest};
use tracing::{debug, info};

/// Exchanges subject tokens for access tokens scoped to a single audience
///
/// Each audience gets its own service and therefore its own subject-keyed cache.
#[derive(Debug, Clone)]
pub struct TokenXService {
    metadata: AuthorizationServerMetadata,
    signer: ClientAssertionSigner,
    client: TokenExchangeClient,
    cache: CredentialCache,
    audience: String,
}

impl TokenXService {
    /// Assemble a service from resolved metadata and its collaborators
    pub fn new(
        metadata: AuthorizationServerMetadata,
        signer: ClientAssertionSigner,
        client: TokenExchangeClient,
        cache: CredentialCache,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            signer,
            client,
            cache,
            audience: audience.into(),
        }
    }

    /// Target audience
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Token-exchange server metadata
    pub fn metadata(&self) -> &AuthorizationServerMetadata {
        &self.metadata
    }

    /// Access token for `subject`, exchanging `subject_token` on a cache miss
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Signing`] if the assertion cannot be signed and
    /// [`crate::Error::TokenExchange`] if the exchange fails. Nothing is cached on
    /// failure.
    pub async fn access_token_for(&self, subject: &str, subject_token: &str) -> Result<String> {
        if let Some(token) = self.cache.get(subject) {
            debug!(audience = %self.audience, "Using cached access token");
            return Ok(token);
        }

        let assertion = self.signer.sign(&self.metadata.token_endpoint)?;
        let request = TokenExchangeRequest::new(assertion, subject_token, self.audience.as_str());
        let response = self
            .client
            .exchange(&self.metadata.token_endpoint, &request)
            .await?;

        let ttl = self.cache.put_response(subject, &response);
        info!(
            audience = %self.audience,
            cached_for_secs = ttl.as_secs(),
            "Obtained access token via token exchange"
        );

        Ok(response.access_token)
    }

    /// `Authorization` header value for `token`
    pub fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }
}
