//! Authorization server metadata resolution (RFC 8414 / OpenID Connect Discovery)
//!
//! Metadata is fetched once per well-known URL at startup and is immutable
//! afterwards. Resolution never retries; a failure is fatal to process start.

use crate::error::DiscoveryError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for well-known requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authorization server metadata
///
/// Only the fields this service relies on are kept; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// JWKS endpoint
    pub jwks_uri: String,
    /// Authorization endpoint (needed only for the authorization-code login)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
}

/// Wire shape, before required-field checks
#[derive(Debug, Deserialize)]
struct RawMetadata {
    issuer: Option<String>,
    token_endpoint: Option<String>,
    jwks_uri: Option<String>,
    authorization_endpoint: Option<String>,
}

impl AuthorizationServerMetadata {
    /// Parse and validate a metadata document
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidDocument`] if the body is not a JSON object or
    /// one of `issuer`, `token_endpoint`, `jwks_uri` is missing or empty.
    pub fn from_json(url: &str, body: &[u8]) -> Result<Self, DiscoveryError> {
        let raw: RawMetadata =
            serde_json::from_slice(body).map_err(|e| DiscoveryError::InvalidDocument {
                url: url.to_string(),
                reason: format!("not a JSON metadata document: {e}"),
            })?;

        let required = |value: Option<String>, field: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DiscoveryError::InvalidDocument {
                    url: url.to_string(),
                    reason: format!("missing required field '{field}'"),
                })
        };

        Ok(Self {
            issuer: required(raw.issuer, "issuer")?,
            token_endpoint: required(raw.token_endpoint, "token_endpoint")?,
            jwks_uri: required(raw.jwks_uri, "jwks_uri")?,
            authorization_endpoint: raw.authorization_endpoint.filter(|v| !v.trim().is_empty()),
        })
    }
}

/// Fetches and memoizes authorization server metadata
#[derive(Debug, Clone)]
pub struct DiscoveryResolver {
    client: reqwest::Client,
    resolved: Arc<DashMap<String, AuthorizationServerMetadata>>,
}

impl DiscoveryResolver {
    /// Create a resolver with its own client and [`DEFAULT_TIMEOUT`]
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create a resolver on a shared client
    ///
    /// The client is expected to carry a finite timeout.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            resolved: Arc::new(DashMap::new()),
        }
    }

    /// Resolve the metadata behind a well-known URL
    ///
    /// Repeated calls for the same URL return the first successful result without
    /// another request.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::Transport`] on network failure or timeout
    /// - [`DiscoveryError::Status`] on a non-200 response
    /// - [`DiscoveryError::InvalidDocument`] if the body lacks a required field
    pub async fn resolve(&self, well_known_url: &str) -> Result<AuthorizationServerMetadata, DiscoveryError> {
        if let Some(cached) = self.resolved.get(well_known_url) {
            debug!(url = %well_known_url, "Using resolved metadata");
            return Ok(cached.clone());
        }

        debug!(url = %well_known_url, "Fetching authorization server metadata");

        let transport = |source| DiscoveryError::Transport {
            url: well_known_url.to_string(),
            source,
        };

        let response = self
            .client
            .get(well_known_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DiscoveryError::Status {
                url: well_known_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        let metadata = AuthorizationServerMetadata::from_json(well_known_url, &body)?;

        info!(
            url = %well_known_url,
            issuer = %metadata.issuer,
            token_endpoint = %metadata.token_endpoint,
            "Resolved authorization server metadata"
        );

        self.resolved
            .insert(well_known_url.to_string(), metadata.clone());
        Ok(metadata)
    }
}
