//! Full flow: discovery, assertion, exchange, cache and downstream call

mod common;

use common::{MockAuthorizationServer, form_value, http_client, id_token, idp_key};
use dings_auth::assertion::ClientAssertionClaims;
use dings_auth::{
    ClientAssertionSigner, CredentialCache, DiscoveryResolver, DownstreamClient, DownstreamError,
    Error, IdTokenVerifier, ManualClock, RemoteJwks, SigningKey, TokenExchangeClient,
    TokenXService, clock,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CLIENT_ID: &str = "cluster:team:app1";
const AUDIENCE: &str = "dev-gcp:team:api";

async fn service(
    tokenx: &MockAuthorizationServer,
    key: Arc<SigningKey>,
    clock: ManualClock,
) -> TokenXService {
    let metadata = DiscoveryResolver::with_client(http_client())
        .resolve(&tokenx.well_known_url)
        .await
        .unwrap();
    let signer = ClientAssertionSigner::new(CLIENT_ID, key).with_clock(Arc::new(clock.clone()));

    TokenXService::new(
        metadata,
        signer,
        TokenExchangeClient::new(http_client()),
        CredentialCache::new(Arc::new(clock)),
        AUDIENCE,
    )
}

#[tokio::test]
async fn test_assertion_targets_discovered_token_endpoint() {
    let tokenx = MockAuthorizationServer::start().await;
    tokenx.mock_well_known().await;
    tokenx.mock_token_success("abc", 200).await;

    let key = Arc::new(SigningKey::generate().unwrap());
    let service = service(&tokenx, key.clone(), ManualClock::new()).await;

    let token = service
        .access_token_for("user-1", "subject.id.token")
        .await
        .unwrap();
    assert_eq!(token, "abc");

    let forms = tokenx.form_requests("/token").await;
    assert_eq!(forms.len(), 1);
    let form = &forms[0];

    for field in [
        "client_assertion",
        "client_assertion_type",
        "grant_type",
        "subject_token",
        "subject_token_type",
        "audience",
    ] {
        assert!(form_value(form, field).is_some(), "missing form field {field}");
    }
    assert_eq!(form_value(form, "subject_token"), Some("subject.id.token"));
    assert_eq!(form_value(form, "audience"), Some(AUDIENCE));

    let assertion = form_value(form, "client_assertion").unwrap();
    let header = jsonwebtoken::decode_header(assertion).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.kid.as_deref(), Some(key.key_id()));

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[tokenx.token_endpoint.as_str()]);
    let claims = jsonwebtoken::decode::<ClientAssertionClaims>(
        assertion,
        &DecodingKey::from_jwk(&key.public_jwk()).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;

    assert_eq!(claims.aud, tokenx.token_endpoint);
    assert_eq!(claims.iss, CLIENT_ID);
    assert_eq!(claims.sub.as_deref(), Some(CLIENT_ID));
    assert_eq!(claims.exp - claims.iat, 120);
}

#[tokio::test]
async fn test_cached_token_skips_exchange_until_expiry() {
    let tokenx = MockAuthorizationServer::start().await;
    tokenx.mock_well_known().await;
    tokenx.mock_token_success("abc", 70).await;

    let clock = ManualClock::new();
    let service = service(&tokenx, idp_key(), clock.clone()).await;

    for _ in 0..3 {
        let token = service.access_token_for("user-1", "subject").await.unwrap();
        assert_eq!(token, "abc");
    }
    assert_eq!(tokenx.request_count("/token").await, 1);

    // Another subject gets its own exchange
    service.access_token_for("user-2", "subject").await.unwrap();
    assert_eq!(tokenx.request_count("/token").await, 2);

    // expires_in 70 less the safety margin
    clock.advance(Duration::from_secs(60));
    service.access_token_for("user-1", "subject").await.unwrap();
    assert_eq!(tokenx.request_count("/token").await, 3);
}

#[tokio::test]
async fn test_failed_exchange_is_not_cached() {
    let tokenx = MockAuthorizationServer::start().await;
    tokenx.mock_well_known().await;
    tokenx
        .mock_token_error(401, "invalid_client", "unknown key")
        .await;

    let service = service(&tokenx, idp_key(), ManualClock::new()).await;

    for _ in 0..2 {
        let err = service
            .access_token_for("user-1", "subject")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(ref e) if e.status == Some(401)));
        assert_eq!(err.status_code(), http::StatusCode::BAD_GATEWAY);
    }
    assert_eq!(tokenx.request_count("/token").await, 2);
}

#[tokio::test]
async fn test_login_to_downstream_call() {
    let idp = MockAuthorizationServer::start().await;
    idp.mock_well_known().await;
    idp.mock_jwks(&[idp_key()]).await;

    let tokenx = MockAuthorizationServer::start().await;
    tokenx.mock_well_known().await;
    tokenx.mock_token_success("downstream-token", 300).await;

    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(header("authorization", "Bearer downstream-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello user-7"))
        .expect(1)
        .mount(&api)
        .await;

    let resolver = DiscoveryResolver::with_client(http_client());
    let idp_metadata = resolver.resolve(&idp.well_known_url).await.unwrap();

    let verifier = IdTokenVerifier::new(RemoteJwks::new(
        idp_metadata.jwks_uri.clone(),
        http_client(),
        clock::system(),
    ));
    let id_token = id_token(&idp_key(), &idp_metadata.issuer, "idporten-client", "user-7");
    let claims = verifier
        .verify(&id_token, "idporten-client", &idp_metadata.issuer)
        .await
        .unwrap();

    let service = service(&tokenx, Arc::new(SigningKey::generate().unwrap()), ManualClock::new()).await;
    let token = service
        .access_token_for(&claims.sub, &id_token)
        .await
        .unwrap();

    let body = DownstreamClient::new(http_client())
        .call(&format!("{}/hello", api.uri()), &token)
        .await
        .unwrap();
    assert_eq!(body, "hello user-7");

    let forms = tokenx.form_requests("/token").await;
    assert_eq!(form_value(&forms[0], "subject_token"), Some(id_token.as_str()));
}

#[tokio::test]
async fn test_downstream_error_status() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&api)
        .await;

    let err = DownstreamClient::new(http_client())
        .call(&format!("{}/hello", api.uri()), "token")
        .await
        .unwrap_err();

    match err {
        DownstreamError::Status { status, body, .. } => {
            assert_eq!(status, 403);
            assert_eq!(body, "forbidden");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}
