use serde::{Deserialize, Serialize};

use super::Plan;

/// How an entitlement grant came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantSource {
    Mpesa,
    Voucher,
}

impl GrantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantSource::Mpesa => "mpesa",
            GrantSource::Voucher => "voucher",
        }
    }
}

impl std::str::FromStr for GrantSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpesa" => Ok(GrantSource::Mpesa),
            "voucher" => Ok(GrantSource::Voucher),
            _ => Err(()),
        }
    }
}

/// A time-boxed VIP entitlement grant.
///
/// Grants are never deleted: expiry is derived from `expires_at` being in
/// the past, and superseded grants are flipped to `active = false` by the
/// ledger before a new one is inserted.
#[derive(Debug, Clone, Serialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan: Plan,
    pub source: GrantSource,
    pub starts_at: i64,
    pub expires_at: i64,
    pub active: bool,
    pub created_at: i64,
}
