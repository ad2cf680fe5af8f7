//! HTTP routes
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /internal/isalive` | Liveness |
//! | `GET /internal/isready` | Readiness (after bootstrap) |
//! | `GET /login` | Redirect to the identity provider |
//! | `GET /oauth2/callback` | Redeem the code and verify the ID token |
//! | `GET /api/{target}` | Exchange the caller's ID token and call the downstream API |

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dings_auth::idporten::{self, AuthorizationRequest};
use dings_auth::{LoginState, Target};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/internal/isalive", get(is_alive))
        .route("/internal/isready", get(is_ready))
        .route("/login", get(login))
        .route("/oauth2/callback", get(callback))
        .route("/api/{target}", get(call_api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn is_alive() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

async fn is_ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
    }
}

async fn login(State(state): State<AppState>) -> Result<Response, ApiError> {
    let config = state.config();
    let login_state = idporten::new_state();

    let url = AuthorizationRequest {
        client_id: &config.idporten.client_id,
        redirect_uri: &config.application.redirect_url,
        scope: &config.idporten.scope,
        state: &login_state,
    }
    .url(state.idporten())
    .map_err(dings_auth::Error::from)?;

    state.pending().insert(login_state);
    debug!(state = ?LoginState::AwaitingCallback, "Redirecting to identity provider");

    Ok((StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        return Err(ApiError::LoginDenied {
            error,
            description: params.error_description,
        });
    }

    let login_state = params.state.ok_or(ApiError::UnknownState)?;
    if !state.pending().take(&login_state) {
        return Err(ApiError::UnknownState);
    }
    let code = params.code.ok_or(ApiError::MissingCode)?;

    let config = state.config();
    let tokens = state
        .code_exchange()
        .exchange_code(
            &state.idporten().token_endpoint,
            &code,
            &config.application.redirect_url,
            &config.idporten.client_id,
            &config.idporten.client_secret,
        )
        .await
        .map_err(dings_auth::Error::from)?;
    debug!(state = ?LoginState::CodeExchanged, "Authorization code redeemed");

    let claims = state
        .verifier()
        .verify(
            &tokens.id_token,
            &config.idporten.client_id,
            &state.idporten().issuer,
        )
        .await?;
    info!(state = ?LoginState::Verified, "User logged in");

    Ok(Json(json!({
        "subject": claims.sub,
        "id_token": tokens.id_token,
    }))
    .into_response())
}

async fn call_api(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let target: Target = target
        .parse()
        .map_err(|_| ApiError::UnknownTarget(target.clone()))?;
    let service = state
        .service(target)
        .ok_or_else(|| ApiError::UnknownTarget(target.to_string()))?;

    let id_token = bearer_token(&headers).ok_or(ApiError::MissingBearer)?;

    let config = state.config();
    let claims = state
        .verifier()
        .verify(id_token, &config.idporten.client_id, &state.idporten().issuer)
        .await?;

    let access_token = service.access_token_for(&claims.sub, id_token).await?;
    debug!(target = %target, state = ?LoginState::Ready, "Calling downstream API");

    let body = state
        .downstream()
        .call(target.api_url(&config.downstream), &access_token)
        .await
        .map_err(dings_auth::Error::from)?;

    Ok(body.into_response())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer a.b.c"));
        assert_eq!(bearer_token(&headers), Some("a.b.c"));
    }
}
