use serde::Serialize;

/// Minimal user record - only what the payment/entitlement core touches.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Phone number of record, backfilled opportunistically on first
    /// successful payment initiation if absent.
    pub phone: Option<String>,
    pub created_at: i64,
}

/// A bearer session. The token itself is never stored; only its SHA-256
/// hash is kept for lookup.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
}
