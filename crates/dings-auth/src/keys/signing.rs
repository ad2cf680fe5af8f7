//! RSA signing key for client assertions
//!
//! Keys are imported from a private JWKS document (`kty=RSA` with `n`, `e`, `d`,
//! `p`, `q`) or generated in memory for non-production profiles.

use crate::error::SigningError;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
    RSAKeyParameters, RSAKeyType,
};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modulus size for generated keys
pub const GENERATED_KEY_BITS: usize = 2048;

/// One entry of a private JWKS document
#[derive(Debug, Deserialize, Serialize)]
struct PrivateJwk {
    kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
}

impl PrivateJwk {
    fn has_private_parts(&self) -> bool {
        self.kty == "RSA"
            && self.n.is_some()
            && self.e.is_some()
            && self.d.is_some()
            && self.p.is_some()
            && self.q.is_some()
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct PrivateJwkSet {
    keys: Vec<PrivateJwk>,
}

/// RSA private key with its key id
///
/// Immutable once loaded. The private half never leaves this type except through
/// [`SigningKey::to_private_jwks_json`].
pub struct SigningKey {
    kid: String,
    private_key: RsaPrivateKey,
    encoding_key: EncodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("bits", &(self.private_key.size() * 8))
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a fresh RSA-2048 key with a random UUID key id
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::KeyMaterial`] if generation fails.
    pub fn generate() -> Result<Self, SigningError> {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, GENERATED_KEY_BITS)
            .map_err(|e| SigningError::KeyMaterial(format!("RSA key generation failed: {e}")))?;
        Self::from_rsa(uuid::Uuid::new_v4().to_string(), private_key)
    }

    /// Import the first RSA key with private parameters from a JWKS document
    ///
    /// # Errors
    ///
    /// - [`SigningError::InvalidJwks`] if the document is not a JWKS or holds no RSA
    ///   key with `n`, `e`, `d`, `p` and `q`
    /// - [`SigningError::KeyMaterial`] if the chosen key has no `kid` or its
    ///   parameters do not form a valid RSA key
    pub fn from_private_jwks(json: &str) -> Result<Self, SigningError> {
        let set: PrivateJwkSet = serde_json::from_str(json)
            .map_err(|e| SigningError::InvalidJwks(format!("not a JWKS document: {e}")))?;

        if set.keys.is_empty() {
            return Err(SigningError::InvalidJwks("key set is empty".to_string()));
        }

        let jwk = set
            .keys
            .iter()
            .find(|k| k.has_private_parts())
            .ok_or_else(|| {
                SigningError::InvalidJwks(
                    "no RSA key with private parameters (n, e, d, p, q)".to_string(),
                )
            })?;

        let kid = jwk
            .kid
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SigningError::KeyMaterial("RSA key has no kid".to_string()))?;

        let n = decode_component(jwk.n.as_deref(), "n")?;
        let e = decode_component(jwk.e.as_deref(), "e")?;
        let d = decode_component(jwk.d.as_deref(), "d")?;
        let p = decode_component(jwk.p.as_deref(), "p")?;
        let q = decode_component(jwk.q.as_deref(), "q")?;

        let private_key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| SigningError::KeyMaterial(format!("invalid RSA parameters: {e}")))?;
        private_key
            .validate()
            .map_err(|e| SigningError::KeyMaterial(format!("invalid RSA key: {e}")))?;

        Self::from_rsa(kid, private_key)
    }

    fn from_rsa(kid: String, private_key: RsaPrivateKey) -> Result<Self, SigningError> {
        let pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| SigningError::KeyMaterial(format!("PKCS#1 encoding failed: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())?;

        Ok(Self {
            kid,
            private_key,
            encoding_key,
        })
    }

    /// Key id placed in the `kid` header of every assertion
    pub fn key_id(&self) -> &str {
        &self.kid
    }

    /// Sign `claims` as a compact JWS with header `{alg: RS256, kid, typ: JWT}`
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Encode`] if the claims cannot be serialized or signed.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, SigningError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header.typ = Some("JWT".to_string());
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
    }

    /// Public half as a JWK (`use=sig`, `alg=RS256`)
    pub fn public_jwk(&self) -> Jwk {
        Jwk {
            common: CommonParameters {
                public_key_use: Some(PublicKeyUse::Signature),
                key_algorithm: Some(KeyAlgorithm::RS256),
                key_id: Some(self.kid.clone()),
                ..Default::default()
            },
            algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
                key_type: RSAKeyType::RSA,
                n: encode_component(self.private_key.n()),
                e: encode_component(self.private_key.e()),
            }),
        }
    }

    /// Public JWKS containing only this key
    pub fn public_jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.public_jwk()],
        }
    }

    /// Serialize the full private key as a JWKS document
    ///
    /// Used to hand an ephemeral key to a test authorization server.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::KeyMaterial`] if the key does not have two primes.
    pub fn to_private_jwks_json(&self) -> Result<SecretString, SigningError> {
        let primes = self.private_key.primes();
        let [p, q] = primes else {
            return Err(SigningError::KeyMaterial(format!(
                "expected two primes, found {}",
                primes.len()
            )));
        };

        let set = PrivateJwkSet {
            keys: vec![PrivateJwk {
                kty: "RSA".to_string(),
                kid: Some(self.kid.clone()),
                key_use: Some("sig".to_string()),
                alg: Some("RS256".to_string()),
                n: Some(encode_component(self.private_key.n())),
                e: Some(encode_component(self.private_key.e())),
                d: Some(encode_component(self.private_key.d())),
                p: Some(encode_component(p)),
                q: Some(encode_component(q)),
            }],
        };

        serde_json::to_string(&set)
            .map(SecretString::new)
            .map_err(|e| SigningError::KeyMaterial(format!("JWKS serialization failed: {e}")))
    }
}

fn decode_component(value: Option<&str>, name: &str) -> Result<BigUint, SigningError> {
    let value =
        value.ok_or_else(|| SigningError::InvalidJwks(format!("missing parameter '{name}'")))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| SigningError::InvalidJwks(format!("parameter '{name}' is not base64url: {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encode_component(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}
