//! # dings-auth
//!
//! Token-exchange core of an OAuth 2.0 / OpenID Connect relying party.
//!
//! A user logs in at an identity provider (authorization-code flow). The returned ID
//! token is verified and then exchanged (RFC 8693) at a second authorization server
//! for an access token scoped to one downstream API. Exchanged tokens are cached per
//! subject until shortly before they expire.
//!
//! ## Components
//!
//! - [`discovery`]: resolves RFC 8414 / OIDC metadata once at startup
//! - [`keys`]: client-assertion signing key and the issuer's remote JWKS
//! - [`assertion`]: RFC 7523 client assertions (RS256, 120 s lifetime)
//! - [`exchange`]: the token-exchange grant
//! - [`cache`]: subject-keyed, time-bounded credential cache
//! - [`verifier`]: ID-token signature, issuer and audience checks
//! - [`service`]: cache-backed exchange for one audience
//! - [`idporten`]: authorization-code leg
//! - [`downstream`]: bearer calls to the protected APIs
//!
//! ## Startup
//!
//! ```rust,no_run
//! use dings_auth::{Config, DiscoveryResolver, KeyProvider};
//!
//! # async fn start() -> dings_auth::Result<()> {
//! let config = Config::load(None)?;
//! let http = config.http.client()?;
//! let resolver = DiscoveryResolver::with_client(http.clone());
//! let token_x = resolver.resolve(&config.token_x.well_known_url).await?;
//! let key = KeyProvider::select(config.application.profile, &config.token_x)?.load()?;
//! # let _ = (token_x, key);
//! # Ok(())
//! # }
//! ```

pub mod assertion;
pub mod cache;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod downstream;
pub mod error;
pub mod exchange;
pub mod idporten;
pub mod keys;
pub mod service;
pub mod verifier;

pub use assertion::{AssertionStyle, ClientAssertionClaims, ClientAssertionSigner};
pub use cache::CredentialCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientProperties, Config, Profile};
pub use discovery::{AuthorizationServerMetadata, DiscoveryResolver};
pub use downstream::{DownstreamClient, Target};
pub use error::{
    ConfigError, DiscoveryError, DownstreamError, Error, ErrorResponse, InvalidTokenError,
    KeyNotFoundError, Result, SigningError, TokenCheck, TokenExchangeError,
};
pub use exchange::{AccessTokenResponse, TokenExchangeClient, TokenExchangeRequest};
pub use idporten::{CodeExchangeClient, IdportenTokenResponse, LoginState, PendingLogins};
pub use keys::{KeyProvider, RemoteJwks, SigningKey};
pub use service::TokenXService;
pub use verifier::{DecodedClaims, IdTokenVerifier};
