//! Prefixed ID generation for PesaTips entities.
//!
//! All IDs use a `pt_` brand prefix so our identifiers can never collide
//! with the processor-issued Daraja IDs (MerchantRequestID,
//! CheckoutRequestID, M-Pesa receipt numbers) stored alongside them.
//!
//! Format: `pt_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    User,
    Session,
    PaymentRequest,
    Subscription,
    Voucher,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "pt_usr",
            Self::Session => "pt_ses",
            Self::PaymentRequest => "pt_pay",
            Self::Subscription => "pt_sub",
            Self::Voucher => "pt_vch",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
