//! # dings-server
//!
//! HTTP front of the relying party: ID-porten login, token exchange per downstream
//! target and the downstream call itself. All protocol work lives in
//! [`dings_auth`]; this crate wires it to axum routes.

pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
