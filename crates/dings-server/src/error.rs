//! Mapping of request failures to HTTP responses

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use dings_auth::{Error, ErrorResponse, LoginState};
use tracing::{error, warn};

/// `Link` header pointing failed logins back to the start of the flow
pub const RETRY_LOGIN_LINK: &str = "</login>; rel=\"login\"";

/// Failure of one request
#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the token-exchange core
    Core(dings_auth::Error),
    /// No `Authorization: Bearer` header
    MissingBearer,
    /// Callback `state` was never issued, already used or expired
    UnknownState,
    /// Callback without `code`
    MissingCode,
    /// The identity provider reported an error on the callback
    LoginDenied {
        /// OAuth error code
        error: String,
        /// Optional description
        description: Option<String>,
    },
    /// `/api/{target}` with an unknown target
    UnknownTarget(String),
}

impl From<dings_auth::Error> for ApiError {
    fn from(err: dings_auth::Error) -> Self {
        ApiError::Core(err)
    }
}

impl ApiError {
    /// Where the user's login stands after this failure
    pub fn login_state(&self) -> LoginState {
        match self {
            ApiError::Core(Error::Discovery(_) | Error::Config(_)) => LoginState::DiscoveryFailed,
            ApiError::Core(Error::KeyNotFound(_) | Error::InvalidToken(_)) => {
                LoginState::VerificationFailed
            }
            ApiError::Core(Error::TokenExchange(_) | Error::Signing(_)) => LoginState::ExchangeFailed,
            ApiError::Core(Error::Downstream(_)) => LoginState::DownstreamTokenObtained,
            ApiError::MissingBearer
            | ApiError::UnknownState
            | ApiError::MissingCode
            | ApiError::LoginDenied { .. }
            | ApiError::UnknownTarget(_) => LoginState::Unauthenticated,
        }
    }

    fn body(&self) -> ErrorResponse {
        let local = |status: StatusCode, message: String, cause: Option<String>| ErrorResponse {
            code: status.as_u16(),
            message,
            cause,
        };

        match self {
            ApiError::Core(err) => ErrorResponse::from(err),
            ApiError::MissingBearer => local(
                StatusCode::UNAUTHORIZED,
                "Missing bearer token".to_string(),
                None,
            ),
            ApiError::UnknownState => local(
                StatusCode::UNAUTHORIZED,
                "Unknown or expired login state".to_string(),
                None,
            ),
            ApiError::MissingCode => local(
                StatusCode::BAD_REQUEST,
                "Callback is missing the authorization code".to_string(),
                None,
            ),
            ApiError::LoginDenied { error, description } => local(
                StatusCode::UNAUTHORIZED,
                format!("Login failed: {error}"),
                description.clone(),
            ),
            ApiError::UnknownTarget(target) => local(
                StatusCode::NOT_FOUND,
                format!("Unknown target '{target}'"),
                None,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = self.body();
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let login_state = self.login_state();

        let fatal = login_state.is_terminal_failure() && !login_state.is_recoverable();
        if status.is_server_error() || fatal {
            error!(status = %status, login_state = ?login_state, message = %body.message, "Request failed");
        } else {
            warn!(status = %status, login_state = ?login_state, message = %body.message, "Request rejected");
        }

        let mut response = (status, Json(body)).into_response();
        if login_state.is_recoverable() {
            response.headers_mut().insert(
                header::LINK,
                header::HeaderValue::from_static(RETRY_LOGIN_LINK),
            );
        }
        response
    }
}
