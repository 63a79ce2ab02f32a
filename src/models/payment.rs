use serde::{Deserialize, Serialize};

use super::Plan;

/// Lifecycle of a tracked payment request.
///
/// A request is PENDING from the moment Daraja accepts the STK push until a
/// callback resolves it. Resolution is one-way: SUCCESS and FAILED are
/// terminal and further callbacks for the same request are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(()),
        }
    }
}

/// One STK push attempt, keyed by Daraja's CheckoutRequestID.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub id: String,
    pub user_id: String,
    /// Daraja MerchantRequestID (informational).
    pub merchant_request_id: String,
    /// Daraja CheckoutRequestID - the sole correlation key for callbacks.
    pub checkout_request_id: String,
    pub amount: i64,
    pub plan: Plan,
    /// Normalized payer phone (2547XXXXXXXX, digits only).
    pub phone: String,
    pub status: PaymentStatus,
    /// M-Pesa receipt number, populated on success.
    pub receipt: Option<String>,
    /// Daraja ResultDesc from the resolving callback.
    pub result_desc: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug)]
pub struct CreatePaymentRequest {
    pub user_id: String,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub amount: i64,
    pub plan: Plan,
    pub phone: String,
}
