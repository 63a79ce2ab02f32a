use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_one, FromRow, PAYMENT_REQUEST_COLS, SUBSCRIPTION_COLS, USER_COLS, VOUCHER_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Users ============

pub fn create_user(conn: &Connection, email: &str) -> Result<User> {
    let id = EntityType::User.gen_id();
    let now = now();
    let email = email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
        params![&id, &email, now],
    )?;

    Ok(User {
        id,
        email,
        phone: None,
        created_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

/// Backfill the phone number of record if the user has none.
/// Returns true if a backfill happened.
pub fn set_user_phone_if_absent(conn: &Connection, user_id: &str, phone: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET phone = ?1 WHERE id = ?2 AND phone IS NULL",
        params![phone, user_id],
    )?;
    Ok(affected > 0)
}

// ============ Sessions ============

/// SHA-256 hash of a bearer token, hex-encoded. Only hashes are stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a random session token (plaintext, shown once).
pub fn generate_session_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("pts_{}", hex::encode(bytes))
}

/// Create a session for a user. Returns the session row and the plaintext
/// token, which is never persisted.
pub fn create_session(conn: &Connection, user_id: &str, ttl_secs: i64) -> Result<(Session, String)> {
    let id = EntityType::Session.gen_id();
    let token = generate_session_token();
    let token_hash = hash_token(&token);
    let now = now();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, user_id, &token_hash, now, now + ttl_secs],
    )?;

    let session = Session {
        id,
        user_id: user_id.to_string(),
        token_hash,
        created_at: now,
        expires_at: now + ttl_secs,
    };
    Ok((session, token))
}

/// Resolve a bearer token to its (unexpired) session's user.
pub fn get_user_by_session_token(conn: &Connection, token: &str) -> Result<Option<User>> {
    let token_hash = hash_token(token);
    query_one(
        conn,
        "SELECT u.id, u.email, u.phone, u.created_at
         FROM sessions s JOIN users u ON u.id = s.user_id
         WHERE s.token_hash = ?1 AND s.expires_at > ?2",
        &[&token_hash, &now()],
    )
}

// ============ Payment Requests ============

pub fn create_payment_request(
    conn: &Connection,
    input: &CreatePaymentRequest,
) -> Result<PaymentRequest> {
    let id = EntityType::PaymentRequest.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO payment_requests
         (id, user_id, merchant_request_id, checkout_request_id, amount, plan, phone,
          status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)",
        params![
            &id,
            &input.user_id,
            &input.merchant_request_id,
            &input.checkout_request_id,
            input.amount,
            input.plan.as_str(),
            &input.phone,
            now
        ],
    )?;

    Ok(PaymentRequest {
        id,
        user_id: input.user_id.clone(),
        merchant_request_id: input.merchant_request_id.clone(),
        checkout_request_id: input.checkout_request_id.clone(),
        amount: input.amount,
        plan: input.plan,
        phone: input.phone.clone(),
        status: PaymentStatus::Pending,
        receipt: None,
        result_desc: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_payment_request_by_checkout_id(
    conn: &Connection,
    checkout_request_id: &str,
) -> Result<Option<PaymentRequest>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_requests WHERE checkout_request_id = ?1",
            PAYMENT_REQUEST_COLS
        ),
        &[&checkout_request_id],
    )
}

/// Ownership-scoped lookup for the status poller: a request belonging to a
/// different user is indistinguishable from a missing one.
pub fn get_payment_request_for_user(
    conn: &Connection,
    checkout_request_id: &str,
    user_id: &str,
) -> Result<Option<PaymentRequest>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_requests
             WHERE checkout_request_id = ?1 AND user_id = ?2",
            PAYMENT_REQUEST_COLS
        ),
        &[&checkout_request_id, &user_id],
    )
}

/// Find the user's most recent PENDING request created after `cutoff`.
///
/// Older pending requests age out of this collision check: they are not
/// finalized, they just stop blocking new attempts.
pub fn find_recent_pending_request(
    conn: &Connection,
    user_id: &str,
    cutoff: i64,
) -> Result<Option<PaymentRequest>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_requests
             WHERE user_id = ?1 AND status = 'pending' AND created_at > ?2
             ORDER BY created_at DESC LIMIT 1",
            PAYMENT_REQUEST_COLS
        ),
        &[&user_id, &cutoff],
    )
}

/// Conditionally resolve a PENDING request to a terminal status.
///
/// The `status = 'pending'` guard is the idempotency barrier: exactly one
/// caller observes the row transition, every duplicate callback gets `None`.
/// Run inside the reconciliation transaction.
pub fn try_resolve_payment(
    conn: &Connection,
    checkout_request_id: &str,
    status: PaymentStatus,
    receipt: Option<&str>,
    result_desc: Option<&str>,
) -> Result<Option<PaymentRequest>> {
    debug_assert!(status != PaymentStatus::Pending);
    conn.query_row(
        &format!(
            "UPDATE payment_requests
             SET status = ?1, receipt = ?2, result_desc = ?3, updated_at = ?4
             WHERE checkout_request_id = ?5 AND status = 'pending'
             RETURNING {}",
            PAYMENT_REQUEST_COLS
        ),
        params![status.as_str(), receipt, result_desc, now(), checkout_request_id],
        PaymentRequest::from_row,
    )
    .optional()
    .map_err(Into::into)
}

// ============ Subscriptions ============

/// Flip every active grant for a user to inactive. Returns rows affected.
pub fn deactivate_subscriptions(conn: &Connection, user_id: &str) -> Result<usize> {
    conn.execute(
        "UPDATE subscriptions SET active = 0 WHERE user_id = ?1 AND active = 1",
        params![user_id],
    )
    .map_err(Into::into)
}

pub fn insert_subscription(
    conn: &Connection,
    user_id: &str,
    plan: Plan,
    source: GrantSource,
    starts_at: i64,
    expires_at: i64,
) -> Result<Subscription> {
    let id = EntityType::Subscription.gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO subscriptions (id, user_id, plan, source, starts_at, expires_at, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![&id, user_id, plan.as_str(), source.as_str(), starts_at, expires_at, now],
    )?;

    Ok(Subscription {
        id,
        user_id: user_id.to_string(),
        plan,
        source,
        starts_at,
        expires_at,
        active: true,
        created_at: now,
    })
}

/// The grant, if any, that is active and unexpired at `at`.
pub fn get_active_subscription(
    conn: &Connection,
    user_id: &str,
    at: i64,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions
             WHERE user_id = ?1 AND active = 1 AND expires_at >= ?2
             ORDER BY expires_at DESC LIMIT 1",
            SUBSCRIPTION_COLS
        ),
        &[&user_id, &at],
    )
}

/// Count of active, unexpired grants for a user. Used by tests to verify
/// the single-active-grant invariant.
pub fn count_active_subscriptions(conn: &Connection, user_id: &str, at: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM subscriptions
         WHERE user_id = ?1 AND active = 1 AND expires_at > ?2",
        params![user_id, at],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Vouchers ============

pub fn create_voucher(conn: &Connection, input: &CreateVoucher) -> Result<Voucher> {
    let id = EntityType::Voucher.gen_id();
    let now = now();
    let code = input.code.trim().to_uppercase();

    conn.execute(
        "INSERT INTO vouchers (id, code, plan, email, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, &code, input.plan.as_str(), &input.email, now, input.expires_at],
    )?;

    Ok(Voucher {
        id,
        code,
        plan: input.plan,
        email: input.email.clone(),
        redeemed: false,
        redeemed_by: None,
        expires_at: input.expires_at,
        created_at: now,
    })
}

pub fn get_voucher_by_code(conn: &Connection, code: &str) -> Result<Option<Voucher>> {
    let code = code.trim().to_uppercase();
    query_one(
        conn,
        &format!("SELECT {} FROM vouchers WHERE code = ?1", VOUCHER_COLS),
        &[&code],
    )
}

/// Conditionally claim a voucher: unredeemed and unexpired, exactly once.
/// Returns the voucher if this caller won the claim. Run inside the
/// redemption transaction alongside the ledger activation.
pub fn try_redeem_voucher(
    conn: &Connection,
    code: &str,
    user_id: &str,
    at: i64,
) -> Result<Option<Voucher>> {
    let code = code.trim().to_uppercase();
    conn.query_row(
        &format!(
            "UPDATE vouchers SET redeemed = 1, redeemed_by = ?1
             WHERE code = ?2 AND redeemed = 0 AND expires_at > ?3
             RETURNING {}",
            VOUCHER_COLS
        ),
        params![user_id, &code, at],
        Voucher::from_row,
    )
    .optional()
    .map_err(Into::into)
}
