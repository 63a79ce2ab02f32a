use serde::Serialize;

use super::Plan;

/// An out-of-band entitlement grant: admin-issued, redeemable at most once
/// and only before expiry.
#[derive(Debug, Clone, Serialize)]
pub struct Voucher {
    pub id: String,
    /// Human-enterable code (unique).
    pub code: String,
    pub plan: Plan,
    /// Email the voucher was issued for (informational).
    pub email: String,
    pub redeemed: bool,
    pub redeemed_by: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct CreateVoucher {
    pub code: String,
    pub plan: Plan,
    pub email: String,
    pub expires_at: i64,
}
