//! ID-token verification
//!
//! Verifies the signature against the issuer's published keys, then `iss` and `aud`.
//!
//! Two checks go beyond that: `exp` is required and enforced with the default
//! leeway ([`TokenCheck::Expiry`]), and `sub` is required because it keys the
//! credential cache (a token without it is [`TokenCheck::Malformed`]). No other
//! claims are inspected.

use crate::error::{Error, InvalidTokenError, KeyNotFoundError, TokenCheck};
use crate::keys::RemoteJwks;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// `aud` as either a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    Single(String),
    /// Multiple audiences
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `client_id` is among the audiences
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Claims of a verified ID token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedClaims {
    /// Subject, used as the credential cache key
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: Audience,
    /// Expiry
    pub exp: u64,
    /// Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// All other claims
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verifies ID tokens issued by one identity provider
#[derive(Debug, Clone)]
pub struct IdTokenVerifier {
    jwks: RemoteJwks,
}

impl IdTokenVerifier {
    /// Create a verifier backed by the issuer's JWKS
    pub fn new(jwks: RemoteJwks) -> Self {
        Self { jwks }
    }

    /// Verify `id_token` and return its claims
    ///
    /// # Errors
    ///
    /// - [`Error::KeyNotFound`] if the header has no `kid` or no key can be obtained
    /// - [`Error::InvalidToken`] naming the failed check otherwise
    pub async fn verify(
        &self,
        id_token: &str,
        expected_client_id: &str,
        expected_issuer: &str,
    ) -> Result<DecodedClaims, Error> {
        let header = decode_header(id_token)
            .map_err(|e| InvalidTokenError::new(TokenCheck::Malformed, e.to_string()))?;

        if !matches!(
            header.alg,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            return Err(InvalidTokenError::new(
                TokenCheck::Malformed,
                format!("unsupported algorithm {:?}", header.alg),
            )
            .into());
        }

        let kid = header.kid.ok_or(KeyNotFoundError::MissingKeyId)?;
        let jwk = self.jwks.get(&kid).await?;

        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            InvalidTokenError::new(TokenCheck::Signature, format!("unusable key '{kid}': {e}"))
        })?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[expected_client_id]);
        validation.set_issuer(&[expected_issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<DecodedClaims>(id_token, &decoding_key, &validation).map_err(|e| {
            let check = check_for(e.kind());
            warn!(kid = %kid, check = %check, error = %e, "ID token rejected");
            InvalidTokenError::new(check, e.to_string())
        })?;

        debug!(kid = %kid, issuer = %data.claims.iss, "ID token verified");
        Ok(data.claims)
    }
}

fn check_for(kind: &ErrorKind) -> TokenCheck {
    match kind {
        ErrorKind::InvalidSignature => TokenCheck::Signature,
        ErrorKind::InvalidAudience => TokenCheck::Audience,
        ErrorKind::InvalidIssuer => TokenCheck::Issuer,
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => TokenCheck::Expiry,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "aud" => TokenCheck::Audience,
            "iss" => TokenCheck::Issuer,
            "exp" => TokenCheck::Expiry,
            _ => TokenCheck::Malformed,
        },
        _ => TokenCheck::Malformed,
    }
}
