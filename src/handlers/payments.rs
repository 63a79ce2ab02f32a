use axum::{extract::State, Extension};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::{Json, Query};
use crate::middleware::CurrentUser;
use crate::models::{CreatePaymentRequest, PaymentStatus, Plan};
use crate::mpesa::normalize_phone;

/// How long a PENDING request blocks a new initiation for the same user.
/// Daraja STK prompts time out well before this.
const PENDING_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub plan: Plan,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub checkout_request_id: String,
    pub amount: i64,
    /// Daraja's user-facing prompt text, passed through for display.
    pub customer_message: String,
}

/// Kick off an STK push for a plan purchase.
///
/// Preconditions are checked cheapest-first: phone shape, then an existing
/// active grant, then a fresh in-flight request. Only after Daraja accepts
/// the push is a PENDING request recorded, so every tracked row has a real
/// CheckoutRequestID behind it.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>> {
    let phone = normalize_phone(&request.phone)?;
    let now = Utc::now().timestamp();

    {
        let conn = state.db.get()?;

        if let Some(sub) = state.ledger.current(&conn, &user.id, now)? {
            return Err(AppError::ActiveSubscription {
                active_until: sub.expires_at,
            });
        }

        let cutoff = now - PENDING_WINDOW_SECS;
        if let Some(pending) = queries::find_recent_pending_request(&conn, &user.id, cutoff)? {
            return Err(AppError::PendingPayment {
                checkout_request_id: pending.checkout_request_id,
            });
        }
    }

    let amount = state.plans.price(request.plan);

    // Upstream call happens with no connection checked out; a slow Daraja
    // round trip must not starve the pool.
    let push = state
        .mpesa
        .stk_push(
            amount,
            &phone,
            "PesaTips",
            &format!("PesaTips {} VIP", request.plan),
        )
        .await?;

    let conn = state.db.get()?;
    let payment = queries::create_payment_request(
        &conn,
        &CreatePaymentRequest {
            user_id: user.id.clone(),
            merchant_request_id: push.merchant_request_id,
            checkout_request_id: push.checkout_request_id,
            amount,
            plan: request.plan,
            phone: phone.clone(),
        },
    )?;

    if user.phone.is_none() && queries::set_user_phone_if_absent(&conn, &user.id, &phone)? {
        tracing::debug!(user_id = %user.id, "backfilled phone of record");
    }

    tracing::info!(
        user_id = %user.id,
        checkout_request_id = %payment.checkout_request_id,
        plan = %request.plan,
        amount,
        "STK push accepted"
    );

    Ok(Json(InitiateResponse {
        checkout_request_id: payment.checkout_request_id,
        amount,
        customer_message: push.customer_message,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub checkout_request_id: String,
}

#[derive(Debug, Serialize)]
pub struct GrantSummary {
    pub plan: Plan,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub checkout_request_id: String,
    pub status: PaymentStatus,
    pub plan: Plan,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_desc: Option<String>,
    /// Present once the payment has been reconciled to a grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<GrantSummary>,
}

/// Poll the state of one payment request.
///
/// Lookup is scoped to the caller: a request belonging to someone else
/// answers 404 exactly like a request that never existed.
pub async fn payment_status(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>> {
    let conn = state.db.get()?;

    let payment =
        queries::get_payment_request_for_user(&conn, &query.checkout_request_id, &user.id)?
            .or_not_found(msg::PAYMENT_NOT_FOUND)?;

    let subscription = if payment.status == PaymentStatus::Success {
        state
            .ledger
            .current(&conn, &user.id, Utc::now().timestamp())?
            .map(|sub| GrantSummary {
                plan: sub.plan,
                expires_at: sub.expires_at,
            })
    } else {
        None
    };

    Ok(Json(StatusResponse {
        checkout_request_id: payment.checkout_request_id,
        status: payment.status,
        plan: payment.plan,
        amount: payment.amount,
        receipt: payment.receipt,
        result_desc: payment.result_desc,
        subscription,
    }))
}
