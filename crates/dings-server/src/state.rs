//! Startup orchestration and shared request state

use dings_auth::{
    AuthorizationServerMetadata, ClientAssertionSigner, CodeExchangeClient, Config,
    CredentialCache, DiscoveryResolver, DownstreamClient, IdTokenVerifier, KeyProvider,
    PendingLogins, RemoteJwks, Target, TokenExchangeClient, TokenXService, clock,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// State shared by all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Config,
    idporten: AuthorizationServerMetadata,
    verifier: IdTokenVerifier,
    code_exchange: CodeExchangeClient,
    pending: PendingLogins,
    services: HashMap<Target, TokenXService>,
    downstream: DownstreamClient,
    ready: AtomicBool,
}

impl AppState {
    /// Resolve both authorization servers, load the signing key and build services
    ///
    /// # Errors
    ///
    /// Any error here is a startup failure: unreachable or invalid metadata,
    /// unusable key material, or an HTTP client that cannot be built.
    pub async fn bootstrap(config: Config) -> dings_auth::Result<Self> {
        let http = config.http.client()?;
        let resolver = DiscoveryResolver::with_client(http.clone());

        let idporten = resolver.resolve(&config.idporten.well_known_url).await?;
        let token_x = resolver.resolve(&config.token_x.well_known_url).await?;

        let key = Arc::new(
            KeyProvider::select(config.application.profile, &config.token_x)?.load()?,
        );
        let signer = ClientAssertionSigner::new(config.token_x.client_id.clone(), key);
        let exchange = TokenExchangeClient::new(http.clone());

        let services = Target::ALL
            .into_iter()
            .map(|target| {
                let audience = target.audience(&config.token_x.audiences);
                info!(target = %target, audience = %audience, "Configured token exchange target");
                let service = TokenXService::new(
                    token_x.clone(),
                    signer.clone(),
                    exchange.clone(),
                    CredentialCache::new(clock::system()),
                    audience,
                );
                (target, service)
            })
            .collect();

        let verifier = IdTokenVerifier::new(RemoteJwks::new(
            idporten.jwks_uri.clone(),
            http.clone(),
            clock::system(),
        ));

        Ok(Self {
            inner: Arc::new(Inner {
                idporten,
                verifier,
                code_exchange: CodeExchangeClient::new(http.clone()),
                pending: PendingLogins::new(clock::system()),
                services,
                downstream: DownstreamClient::new(http),
                ready: AtomicBool::new(false),
                config,
            }),
        })
    }

    /// Loaded configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Identity provider metadata
    pub fn idporten(&self) -> &AuthorizationServerMetadata {
        &self.inner.idporten
    }

    /// ID-token verifier for the identity provider
    pub fn verifier(&self) -> &IdTokenVerifier {
        &self.inner.verifier
    }

    /// Authorization-code client
    pub fn code_exchange(&self) -> &CodeExchangeClient {
        &self.inner.code_exchange
    }

    /// Outstanding login states
    pub fn pending(&self) -> &PendingLogins {
        &self.inner.pending
    }

    /// Token-exchange service for `target`
    pub fn service(&self, target: Target) -> Option<&TokenXService> {
        self.inner.services.get(&target)
    }

    /// Downstream API client
    pub fn downstream(&self) -> &DownstreamClient {
        &self.inner.downstream
    }

    /// Whether the service accepts traffic
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Flip readiness once the listener is bound
    pub fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::Release);
    }
}
