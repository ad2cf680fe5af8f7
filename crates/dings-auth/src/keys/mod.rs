//! Key material
//!
//! [`KeyProvider`] decides where the client-assertion signing key comes from;
//! [`RemoteJwks`] supplies verification keys for inbound ID tokens.

mod jwks;
mod signing;

pub use jwks::{JWKS_CACHE_SIZE, JWKS_CACHE_TTL, JWKS_FETCHES_PER_MINUTE, RemoteJwks};
pub use signing::{GENERATED_KEY_BITS, SigningKey};

use crate::config::{ClientProperties, Profile, TokenXConfig};
use crate::error::{ConfigError, SigningError};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use tracing::{info, warn};

/// Source of the client-assertion signing key
#[derive(Debug)]
pub enum KeyProvider {
    /// Private JWKS mounted as a file
    FileBacked(PathBuf),
    /// Private JWKS passed directly in configuration
    Inline(SecretString),
    /// Key generated at startup (never in production)
    Ephemeral,
}

impl KeyProvider {
    /// Pick the key source for a profile
    ///
    /// Inline key material wins over a mounted file. Without either, an ephemeral
    /// key is used outside production.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the profile is [`Profile::Prod`] and no
    /// key material is configured.
    pub fn select(profile: Profile, config: &TokenXConfig) -> Result<Self, ConfigError> {
        if let Some(inline) = config.private_jwks() {
            return Ok(KeyProvider::Inline(SecretString::new(
                inline.expose_secret().clone(),
            )));
        }

        if config.private_jwks_path.exists() {
            return Ok(KeyProvider::FileBacked(config.private_jwks_path.clone()));
        }

        if profile.allows_ephemeral_keys() {
            warn!(
                profile = ?profile,
                path = %config.private_jwks_path.display(),
                "No private JWKS configured, signing with an ephemeral key"
            );
            return Ok(KeyProvider::Ephemeral);
        }

        Err(ConfigError::Invalid(format!(
            "no private JWKS configured for profile {profile:?} (looked for {})",
            config.private_jwks_path.display()
        )))
    }

    /// Produce the signing key
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] if the key file cannot be read or holds no usable
    /// RSA key.
    pub fn load(&self) -> Result<SigningKey, SigningError> {
        let key = match self {
            KeyProvider::FileBacked(path) => {
                let json = std::fs::read_to_string(path).map_err(|source| SigningError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                SigningKey::from_private_jwks(&json)?
            }
            KeyProvider::Inline(json) => SigningKey::from_private_jwks(json.expose_secret())?,
            KeyProvider::Ephemeral => SigningKey::generate()?,
        };

        info!(source = self.kind(), kid = %key.key_id(), "Loaded client assertion signing key");
        Ok(key)
    }

    fn kind(&self) -> &'static str {
        match self {
            KeyProvider::FileBacked(_) => "file",
            KeyProvider::Inline(_) => "inline",
            KeyProvider::Ephemeral => "ephemeral",
        }
    }
}
