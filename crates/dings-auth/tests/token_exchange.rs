//! Token-exchange grant against a stub token endpoint

mod common;

use common::{MockAuthorizationServer, form_value, http_client};
use dings_auth::exchange::{JWT_TOKEN_TYPE, TOKEN_EXCHANGE_GRANT_TYPE};
use dings_auth::{TokenExchangeClient, TokenExchangeRequest};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_successful_exchange() {
    let tokenx = MockAuthorizationServer::start().await;
    tokenx.mock_token_success("abc", 200).await;

    let client = TokenExchangeClient::new(http_client());
    let request = TokenExchangeRequest::new("assertion", "subject-token", "dev-gcp:team:api");
    let response = client
        .exchange(&tokenx.token_endpoint, &request)
        .await
        .unwrap();

    assert_eq!(response.access_token, "abc");
    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 200);
    assert_eq!(
        response.issued_token_type.as_deref(),
        Some("urn:ietf:params:oauth:token-type:access_token")
    );
}

#[tokio::test]
async fn test_request_is_form_encoded_with_all_fields() {
    let tokenx = MockAuthorizationServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "abc",
            "token_type": "Bearer",
            "expires_in": 60,
        })))
        .expect(1)
        .mount(&tokenx.server)
        .await;

    let client = TokenExchangeClient::new(http_client());
    let request = TokenExchangeRequest::new("signed.jwt.assertion", "id.token.jwt", "dev-fss:team:api");
    client
        .exchange(&tokenx.token_endpoint, &request)
        .await
        .unwrap();

    let forms = tokenx.form_requests("/token").await;
    assert_eq!(forms.len(), 1);
    let form = &forms[0];

    assert_eq!(form_value(form, "client_assertion"), Some("signed.jwt.assertion"));
    assert_eq!(
        form_value(form, "client_assertion_type"),
        Some("urn:ietf:params:oauth:client-assertion-type:jwt-bearer")
    );
    assert_eq!(form_value(form, "grant_type"), Some(TOKEN_EXCHANGE_GRANT_TYPE));
    assert_eq!(form_value(form, "subject_token"), Some("id.token.jwt"));
    assert_eq!(form_value(form, "subject_token_type"), Some(JWT_TOKEN_TYPE));
    assert_eq!(form_value(form, "audience"), Some("dev-fss:team:api"));
    assert_eq!(form.iter().filter(|(k, _)| k == "audience").count(), 1);
}

#[tokio::test]
async fn test_rejected_exchange_carries_status_and_body() {
    let tokenx = MockAuthorizationServer::start().await;
    tokenx
        .mock_token_error(400, "invalid_request", "audience unknown")
        .await;

    let client = TokenExchangeClient::new(http_client());
    let request = TokenExchangeRequest::new("assertion", "subject-token", "nope");
    let err = client
        .exchange(&tokenx.token_endpoint, &request)
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(400));
    assert_eq!(err.url, tokenx.token_endpoint);
    assert!(err.body.as_deref().unwrap().contains("invalid_request"));
}

#[tokio::test]
async fn test_unparseable_success_body_is_an_error() {
    let tokenx = MockAuthorizationServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&tokenx.server)
        .await;

    let client = TokenExchangeClient::new(http_client());
    let request = TokenExchangeRequest::new("assertion", "subject-token", "aud");
    let err = client
        .exchange(&tokenx.token_endpoint, &request)
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(200));
    assert_eq!(err.body.as_deref(), Some("<html>maintenance</html>"));
    assert!(err.source.is_some());
}

#[tokio::test]
async fn test_network_failure_has_no_status_and_keeps_cause() {
    let client = TokenExchangeClient::new(http_client());
    let request = TokenExchangeRequest::new("assertion", "subject-token", "aud");
    let err = client
        .exchange("http://127.0.0.1:1/token", &request)
        .await
        .unwrap_err();

    assert_eq!(err.status, None);
    assert_eq!(err.url, "http://127.0.0.1:1/token");
    assert!(err.source.is_some());
    assert!(err.to_string().contains("http://127.0.0.1:1/token"));
}
