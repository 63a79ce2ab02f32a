use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use rusqlite::TransactionBehavior;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{GrantSource, PaymentStatus};
use crate::mpesa::{CallbackAck, CallbackEnvelope, StkCallback};

/// What reconciliation did with one callback. Only used for logging; the
/// HTTP answer is the same acknowledgement in every case.
enum ReconcileOutcome {
    Confirmed { checkout_request_id: String },
    Failed { checkout_request_id: String, result_code: i64 },
    AlreadyResolved { checkout_request_id: String },
    Unmatched { checkout_request_id: String },
    Malformed,
}

/// Daraja result callback.
///
/// Always acknowledges 200 regardless of what the payload did: Daraja's
/// retry behavior on non-200 answers is undocumented and a retry of a
/// payload we could not act on would change nothing. Internal faults are
/// logged at error level so a swallowed failure is still visible.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    match reconcile(&state, &body) {
        Ok(ReconcileOutcome::Confirmed { checkout_request_id }) => {
            tracing::info!(%checkout_request_id, "payment confirmed, grant activated");
        }
        Ok(ReconcileOutcome::Failed { checkout_request_id, result_code }) => {
            tracing::info!(%checkout_request_id, result_code, "payment failed");
        }
        Ok(ReconcileOutcome::AlreadyResolved { checkout_request_id }) => {
            tracing::info!(%checkout_request_id, "duplicate callback for resolved payment, ignored");
        }
        Ok(ReconcileOutcome::Unmatched { checkout_request_id }) => {
            tracing::warn!(%checkout_request_id, "callback matched no tracked payment");
        }
        Ok(ReconcileOutcome::Malformed) => {
            tracing::warn!("callback payload had no parseable stkCallback");
        }
        Err(e) => {
            tracing::error!("callback reconciliation failed: {}", e);
        }
    }

    Json(CallbackAck::received())
}

/// Apply one callback to the payment tracker and, on success, the
/// entitlement ledger.
///
/// The conditional resolve and the grant activation share one IMMEDIATE
/// transaction: concurrent duplicates serialize on the write lock and every
/// loser sees the row already resolved. Either both writes commit or
/// neither does.
fn reconcile(state: &AppState, body: &Bytes) -> Result<ReconcileOutcome> {
    let callback = match parse_callback(body) {
        Some(cb) => cb,
        None => return Ok(ReconcileOutcome::Malformed),
    };

    let checkout_request_id = callback.checkout_request_id.clone();
    let status = if callback.is_success() {
        PaymentStatus::Success
    } else {
        PaymentStatus::Failed
    };

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let resolved = queries::try_resolve_payment(
        &tx,
        &checkout_request_id,
        status,
        callback.receipt().as_deref(),
        callback.result_desc.as_deref(),
    )?;

    let payment = match resolved {
        Some(p) => p,
        None => {
            // Lost the resolve: either a duplicate of an earlier callback
            // or a CheckoutRequestID we never issued.
            let outcome =
                if queries::get_payment_request_by_checkout_id(&tx, &checkout_request_id)?.is_some()
                {
                    ReconcileOutcome::AlreadyResolved { checkout_request_id }
                } else {
                    ReconcileOutcome::Unmatched { checkout_request_id }
                };
            return Ok(outcome);
        }
    };

    if status == PaymentStatus::Success {
        // Metadata is informational. A discrepancy does not block the grant,
        // the processor has already moved the money.
        if let Some(paid) = callback.amount() {
            if paid as i64 != payment.amount {
                tracing::warn!(
                    %checkout_request_id,
                    tracked = payment.amount,
                    paid,
                    "confirmed amount differs from tracked request"
                );
            }
        }
        if let Some(payer) = callback.payer_phone() {
            if payer != payment.phone {
                tracing::warn!(
                    %checkout_request_id,
                    %payer,
                    pushed = %payment.phone,
                    "confirming phone differs from the one the push was sent to"
                );
            }
        }

        // Grant duration runs from confirmation, not from initiation.
        let now = Utc::now().timestamp();
        state
            .ledger
            .activate(&tx, &payment.user_id, payment.plan, GrantSource::Mpesa, now)?;
    }

    tx.commit()?;

    Ok(match status {
        PaymentStatus::Success => ReconcileOutcome::Confirmed { checkout_request_id },
        _ => ReconcileOutcome::Failed {
            checkout_request_id,
            result_code: callback.result_code,
        },
    })
}

fn parse_callback(body: &Bytes) -> Option<StkCallback> {
    serde_json::from_slice::<CallbackEnvelope>(body)
        .ok()?
        .stk_callback()
}
