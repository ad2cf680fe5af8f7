//! Calls to the protected downstream APIs

use crate::config::{AudienceConfig, DownstreamConfig};
use crate::error::DownstreamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, warn};

/// Where the downstream API runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Cloud cluster
    Gcp,
    /// On-premises cluster
    OnPrem,
}

impl Target {
    /// All targets
    pub const ALL: [Target; 2] = [Target::Gcp, Target::OnPrem];

    /// Token-exchange audience for this target
    pub fn audience<'a>(&self, audiences: &'a AudienceConfig) -> &'a str {
        match self {
            Target::Gcp => &audiences.gcp,
            Target::OnPrem => &audiences.onprem,
        }
    }

    /// API URL for this target
    pub fn api_url<'a>(&self, downstream: &'a DownstreamConfig) -> &'a str {
        match self {
            Target::Gcp => &downstream.gcp_api_url,
            Target::OnPrem => &downstream.onprem_api_url,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Gcp => f.write_str("gcp"),
            Target::OnPrem => f.write_str("onprem"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gcp" => Ok(Target::Gcp),
            "onprem" | "on-prem" | "fss" => Ok(Target::OnPrem),
            other => Err(format!("unknown target '{other}'")),
        }
    }
}

/// Sends bearer-authenticated requests to downstream APIs
#[derive(Debug, Clone)]
pub struct DownstreamClient {
    client: reqwest::Client,
}

impl DownstreamClient {
    /// Create a client on a shared HTTP client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// `GET api_url` with `Authorization: Bearer <access_token>`, returning the body
    ///
    /// # Errors
    ///
    /// Returns [`DownstreamError::Transport`] on network failure and
    /// [`DownstreamError::Status`] on a non-2xx response.
    pub async fn call(&self, api_url: &str, access_token: &str) -> Result<String, DownstreamError> {
        debug!(url = %api_url, "Calling downstream API");

        let transport = |source: reqwest::Error| {
            error!(url = %api_url, error = %source, "Downstream request failed");
            DownstreamError::Transport {
                url: api_url.to_string(),
                source,
            }
        };

        let response = self
            .client
            .get(api_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            warn!(url = %api_url, status = %status, "Downstream API returned error status");
            return Err(DownstreamError::Status {
                url: api_url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}
