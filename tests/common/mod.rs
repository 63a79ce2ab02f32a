//! Test utilities and fixtures for PesaTips integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use pesatips::config::{MpesaConfig, MpesaEnv, PlanTable};
pub use pesatips::db::{init_db, queries, AppState};
pub use pesatips::entitlements::Ledger;
pub use pesatips::handlers;
pub use pesatips::models::*;
pub use pesatips::mpesa::MpesaClient;

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a future timestamp (days from now)
pub fn future_timestamp(days: i64) -> i64 {
    now() + (days * 86400)
}

/// Get a past timestamp (days ago)
pub fn past_timestamp(days: i64) -> i64 {
    now() - (days * 86400)
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Daraja config pointing at the sandbox with dummy credentials. No test
/// goes through the network; initiation tests stop at a failing precondition.
pub fn test_mpesa_config() -> MpesaConfig {
    MpesaConfig {
        env: MpesaEnv::Sandbox,
        consumer_key: "test-key".to_string(),
        consumer_secret: "test-secret".to_string(),
        short_code: "174379".to_string(),
        passkey: "test-passkey".to_string(),
        callback_url: "http://localhost:3000/payments/callback".to_string(),
    }
}

/// Create an AppState for testing with an in-memory database.
///
/// Pool size 1: every pooled handle must see the same in-memory database.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let plans = PlanTable::default();

    AppState {
        db: pool,
        ledger: Ledger::new(plans),
        plans,
        mpesa: Arc::new(MpesaClient::new(test_mpesa_config())),
    }
}

/// Create a Router with the full HTTP surface (public + authenticated API)
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::public_router())
        .merge(handlers::api_router(state.clone()))
        .with_state(state)
}

/// Create a test user
pub fn create_test_user(conn: &Connection, email: &str) -> User {
    queries::create_user(conn, email).expect("Failed to create test user")
}

/// Create a test user with a live session, returning the bearer token
pub fn create_user_with_session(conn: &Connection, email: &str) -> (User, String) {
    let user = create_test_user(conn, email);
    let (_, token) =
        queries::create_session(conn, &user.id, 86400).expect("Failed to create test session");
    (user, token)
}

/// Create a PENDING payment request for a user
pub fn create_pending_payment(conn: &Connection, user_id: &str, checkout_id: &str) -> PaymentRequest {
    queries::create_payment_request(
        conn,
        &CreatePaymentRequest {
            user_id: user_id.to_string(),
            merchant_request_id: format!("mr-{}", checkout_id),
            checkout_request_id: checkout_id.to_string(),
            amount: 250,
            plan: Plan::Weekly,
            phone: "254712345678".to_string(),
        },
    )
    .expect("Failed to create test payment request")
}

/// Backdate a payment request's created_at (for pending-window tests)
pub fn backdate_payment(conn: &Connection, checkout_id: &str, created_at: i64) {
    conn.execute(
        "UPDATE payment_requests SET created_at = ?1 WHERE checkout_request_id = ?2",
        rusqlite::params![created_at, checkout_id],
    )
    .expect("Failed to backdate payment request");
}

/// Create a test voucher
pub fn create_test_voucher(conn: &Connection, code: &str, plan: Plan, expires_at: i64) -> Voucher {
    queries::create_voucher(
        conn,
        &CreateVoucher {
            code: code.to_string(),
            plan,
            email: "voucher@example.com".to_string(),
            expires_at,
        },
    )
    .expect("Failed to create test voucher")
}

/// Daraja success callback payload for a checkout request
pub fn success_callback(checkout_id: &str, receipt: &str) -> serde_json::Value {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 250.0},
                        {"Name": "MpesaReceiptNumber", "Value": receipt},
                        {"Name": "TransactionDate", "Value": 20240101120000u64},
                        {"Name": "PhoneNumber", "Value": 254712345678u64}
                    ]
                }
            }
        }
    })
}

/// Daraja failure callback payload (e.g. 1032 = cancelled by user)
pub fn failure_callback(checkout_id: &str, result_code: i64) -> serde_json::Value {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_id,
                "ResultCode": result_code,
                "ResultDesc": "Request cancelled by user"
            }
        }
    })
}
