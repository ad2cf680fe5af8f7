//! Service configuration
//!
//! The whole configuration is one explicit [`Config`] value assembled by the startup
//! routine and handed to each component's constructor. Loading never performs network
//! I/O; authorization server metadata is resolved afterwards by
//! [`crate::discovery::DiscoveryResolver`].
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults (the demo environment)
//! 2. An optional TOML, YAML or JSON file
//! 3. Environment variables prefixed `DINGS`, with `__` separating nested keys
//!    (e.g. `DINGS_TOKEN_X__CLIENT_ID=cluster:namespace:app1`)

use crate::error::ConfigError;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DINGS";

/// Default location of the mounted private JWKS secret
pub const DEFAULT_PRIVATE_JWKS_PATH: &str = "/var/run/secrets/nais.io/jwker/jwks";

/// Deployment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Profile {
    /// Local and CI runs
    #[default]
    #[serde(alias = "test")]
    Test,
    /// Shared development clusters
    #[serde(alias = "non_prod", alias = "nonprod")]
    NonProd,
    /// Production
    #[serde(alias = "prod")]
    Prod,
}

impl Profile {
    /// Whether ephemeral signing keys may be generated
    pub fn allows_ephemeral_keys(&self) -> bool {
        !matches!(self, Profile::Prod)
    }
}

/// Settings shared by every client that authenticates to an authorization server
pub trait ClientProperties {
    /// Well-known metadata URL of the authorization server
    fn well_known_url(&self) -> &str;

    /// Registered client id
    fn client_id(&self) -> &str;

    /// Inline private JWKS, if the client authenticates with a private key
    fn private_jwks(&self) -> Option<&SecretString>;
}

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub application: ApplicationConfig,
    /// Identity provider (authorization-code login)
    pub idporten: IdportenConfig,
    /// Token-exchange authorization server
    pub token_x: TokenXConfig,
    /// Downstream APIs
    pub downstream: DownstreamConfig,
    /// Outbound HTTP settings
    pub http: HttpConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Application settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Deployment profile
    pub profile: Profile,
    /// Bind address
    pub bind_address: String,
    /// Bind port
    pub port: u16,
    /// Redirect URI registered at the identity provider
    pub redirect_url: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Test,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            redirect_url: "http://localhost:8080/oauth2/callback".to_string(),
        }
    }
}

/// Identity provider client settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IdportenConfig {
    /// OpenID Connect discovery URL
    pub well_known_url: String,
    /// Client id registered at the identity provider
    pub client_id: String,
    /// Client secret (client_secret_post)
    pub client_secret: SecretString,
    /// Requested scopes, space separated
    pub scope: String,
}

impl Default for IdportenConfig {
    fn default() -> Self {
        Self {
            well_known_url:
                "https://oidc-ver2.difi.no/idporten-oidc-provider/.well-known/openid-configuration"
                    .to_string(),
            client_id: "client_id".to_string(),
            client_secret: SecretString::new("client_secret".to_string()),
            scope: "openid".to_string(),
        }
    }
}

impl ClientProperties for IdportenConfig {
    fn well_known_url(&self) -> &str {
        &self.well_known_url
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn private_jwks(&self) -> Option<&SecretString> {
        None
    }
}

/// Token-exchange client settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TokenXConfig {
    /// RFC 8414 metadata URL
    pub well_known_url: String,
    /// Client id registered at the token-exchange server
    pub client_id: String,
    /// Path to the mounted private JWKS
    pub private_jwks_path: PathBuf,
    /// Inline private JWKS (takes precedence over the file)
    pub private_jwks: Option<SecretString>,
    /// Target audiences
    pub audiences: AudienceConfig,
}

impl Default for TokenXConfig {
    fn default() -> Self {
        Self {
            well_known_url:
                "https://tokendings.dev-gcp.nais.io/.well-known/oauth-authorization-server"
                    .to_string(),
            client_id: "cluster:namespace:app1".to_string(),
            private_jwks_path: PathBuf::from(DEFAULT_PRIVATE_JWKS_PATH),
            private_jwks: None,
            audiences: AudienceConfig::default(),
        }
    }
}

impl ClientProperties for TokenXConfig {
    fn well_known_url(&self) -> &str {
        &self.well_known_url
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn private_jwks(&self) -> Option<&SecretString> {
        self.private_jwks.as_ref()
    }
}

/// Audiences of the downstream APIs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudienceConfig {
    /// API running in the cloud cluster
    pub gcp: String,
    /// API running on premises
    pub onprem: String,
}

impl Default for AudienceConfig {
    fn default() -> Self {
        Self {
            gcp: "dev-gcp:plattformsikkerhet:api-dings".to_string(),
            onprem: "dev-fss:plattformsikkerhet:api-dings".to_string(),
        }
    }
}

/// Downstream API locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Cloud API URL
    pub gcp_api_url: String,
    /// On-premises API URL
    pub onprem_api_url: String,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            gcp_api_url: "https://api-dings.dev-gcp.nais.io/hello".to_string(),
            onprem_api_url: "https://api-dings.dev-fss-pub.nais.io/hello".to_string(),
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for every outbound request, in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl HttpConfig {
    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the shared outbound HTTP client
    ///
    /// Redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the client cannot be constructed.
    pub fn client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("dings/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("Failed to create HTTP client: {e}")))
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or has an unknown extension, if any
    /// source fails to parse, or if the result does not pass [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        use config::{File, FileFormat};

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }

            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(ConfigError::UnsupportedFormat),
            };

            builder = builder.add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("idporten.well_known_url", &self.idporten.well_known_url),
            ("token_x.well_known_url", &self.token_x.well_known_url),
            ("downstream.gcp_api_url", &self.downstream.gcp_api_url),
            ("downstream.onprem_api_url", &self.downstream.onprem_api_url),
            ("application.redirect_url", &self.application.redirect_url),
        ] {
            url::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("{name} is not a valid URL: {e}")))?;
        }

        if self.idporten.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("idporten.client_id is empty".to_string()));
        }
        if self.token_x.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("token_x.client_id is empty".to_string()));
        }
        if self.token_x.audiences.gcp.trim().is_empty()
            || self.token_x.audiences.onprem.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "token_x.audiences must not be empty".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.application.profile == Profile::Prod
            && self.token_x.private_jwks.is_none()
            && !self.token_x.private_jwks_path.exists()
        {
            return Err(ConfigError::Invalid(format!(
                "PROD profile requires a private JWKS (inline or at {})",
                self.token_x.private_jwks_path.display()
            )));
        }

        Ok(())
    }
}
