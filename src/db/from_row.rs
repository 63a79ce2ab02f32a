//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupted data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, phone, created_at";

pub const SUBSCRIPTION_COLS: &str =
    "id, user_id, plan, source, starts_at, expires_at, active, created_at";

pub const PAYMENT_REQUEST_COLS: &str = "id, user_id, merchant_request_id, checkout_request_id, amount, plan, phone, status, receipt, result_desc, created_at, updated_at";

pub const VOUCHER_COLS: &str =
    "id, code, plan, email, redeemed, redeemed_by, expires_at, created_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            phone: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            source: parse_enum(row, 3, "source")?,
            starts_at: row.get(4)?,
            expires_at: row.get(5)?,
            active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for PaymentRequest {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentRequest {
            id: row.get(0)?,
            user_id: row.get(1)?,
            merchant_request_id: row.get(2)?,
            checkout_request_id: row.get(3)?,
            amount: row.get(4)?,
            plan: parse_enum(row, 5, "plan")?,
            phone: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            receipt: row.get(8)?,
            result_desc: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for Voucher {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Voucher {
            id: row.get(0)?,
            code: row.get(1)?,
            plan: parse_enum(row, 2, "plan")?,
            email: row.get(3)?,
            redeemed: row.get(4)?,
            redeemed_by: row.get(5)?,
            expires_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}
