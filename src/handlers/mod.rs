mod callback;
mod payments;
mod vouchers;

pub use callback::*;
pub use payments::*;
pub use vouchers::*;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::db::AppState;
use crate::middleware::session_auth;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Public endpoints: health and the Daraja result callback.
///
/// The callback route carries a permissive CORS layer so Daraja's preflight
/// OPTIONS probe is answered without a handler of its own.
pub fn public_router() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/payments/callback", post(mpesa_callback).layer(cors))
}

/// Session-authenticated API surface.
pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/payments/initiate", post(initiate_payment))
        .route("/api/payments/status", get(payment_status))
        .route("/api/vouchers/redeem", post(redeem_voucher))
        .layer(from_fn_with_state(state, session_auth))
}
