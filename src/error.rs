use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Caller already holds an unexpired VIP grant; carries its expiry so the
    /// client can show the remaining time instead of re-initiating.
    #[error("Subscription already active until {active_until}")]
    ActiveSubscription { active_until: i64 },

    /// Caller has a fresh PENDING payment request; carries the correlation id
    /// so the client can resume polling instead of double-initiating.
    #[error("Payment already in progress: {checkout_request_id}")]
    PendingPayment { checkout_request_id: String },

    /// Daraja rejected or was unreachable. The detail is logged server-side
    /// but the caller only sees a generic initiation failure.
    #[error("Upstream payment error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Expiry of the caller's existing grant (active-subscription conflict).
    #[serde(skip_serializing_if = "Option::is_none")]
    active_until: Option<i64>,
    /// Correlation id of the caller's in-flight request (pending conflict).
    #[serde(skip_serializing_if = "Option::is_none")]
    checkout_request_id: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, details: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            details,
            active_until: None,
            checkout_request_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("Not found", Some(msg.clone())),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("Bad request", Some(msg.clone())),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Unauthorized", None),
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new("Forbidden", Some(msg.clone())),
            ),
            AppError::ActiveSubscription { active_until } => {
                let mut body = ErrorResponse::new(
                    "Subscription already active",
                    Some("You already have an active VIP subscription".into()),
                );
                body.active_until = Some(*active_until);
                (StatusCode::CONFLICT, body)
            }
            AppError::PendingPayment { checkout_request_id } => {
                let mut body = ErrorResponse::new(
                    "Payment already in progress",
                    Some("A payment prompt was sent recently; poll its status".into()),
                );
                body.checkout_request_id = Some(checkout_request_id.clone());
                (StatusCode::CONFLICT, body)
            }
            AppError::Upstream(detail) => {
                tracing::error!("Daraja error: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse::new("Failed to initiate payment", None),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error", None),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error", None),
                )
            }
            AppError::Json(e) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("Invalid JSON", Some(e.to_string())),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error", None),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Shorthand for the common `Option -> NotFound` conversion in handlers.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

/// Canonical user-facing error strings.
pub mod msg {
    pub const PAYMENT_NOT_FOUND: &str = "Payment request not found";
    pub const VOUCHER_INVALID: &str = "Voucher cannot be redeemed";
}
