use axum::{extract::State, Extension};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::extractors::Json;
use crate::middleware::CurrentUser;
use crate::models::{GrantSource, Plan};

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub plan: Plan,
    pub expires_at: i64,
}

/// Redeem a voucher code for an immediate grant.
///
/// The conditional claim and the ledger activation share one transaction,
/// so a voucher is never burned without its grant existing. Unknown,
/// already-redeemed and expired codes all answer the same 403; the
/// distinction is logged, not disclosed.
pub async fn redeem_voucher(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>> {
    let now = Utc::now().timestamp();

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;

    let voucher = match queries::try_redeem_voucher(&tx, &request.code, &user.id, now)? {
        Some(v) => v,
        None => {
            match queries::get_voucher_by_code(&tx, &request.code)? {
                Some(v) if v.redeemed => {
                    tracing::info!(code = %v.code, user_id = %user.id, "voucher already redeemed")
                }
                Some(v) => {
                    tracing::info!(code = %v.code, user_id = %user.id, "voucher expired")
                }
                None => tracing::info!(user_id = %user.id, "unknown voucher code"),
            }
            return Err(AppError::Forbidden(msg::VOUCHER_INVALID.into()));
        }
    };

    let subscription =
        state
            .ledger
            .activate(&tx, &user.id, voucher.plan, GrantSource::Voucher, now)?;

    tx.commit()?;

    tracing::info!(
        user_id = %user.id,
        voucher_id = %voucher.id,
        plan = %voucher.plan,
        "voucher redeemed"
    );

    Ok(Json(RedeemResponse {
        plan: subscription.plan,
        expires_at: subscription.expires_at,
    }))
}
