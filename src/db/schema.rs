use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Users (only what the payment/entitlement core touches)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

        -- Bearer sessions (token stored as SHA-256 hash only)
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_hash TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

        -- Entitlement grants (append-only; superseded rows get active = 0)
        -- Invariant: at most one row per user with active = 1 and a future
        -- expires_at. Maintained by every write path via deactivate-then-insert
        -- in one transaction, not by a uniqueness constraint.
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan TEXT NOT NULL CHECK (plan IN ('daily', 'weekly', 'monthly')),
            source TEXT NOT NULL CHECK (source IN ('mpesa', 'voucher')),
            starts_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user_active
            ON subscriptions(user_id, expires_at) WHERE active = 1;

        -- Tracked STK push attempts
        -- checkout_request_id is the sole correlation key for callbacks.
        CREATE TABLE IF NOT EXISTS payment_requests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            merchant_request_id TEXT NOT NULL,
            checkout_request_id TEXT NOT NULL UNIQUE,
            amount INTEGER NOT NULL,
            plan TEXT NOT NULL CHECK (plan IN ('daily', 'weekly', 'monthly')),
            phone TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'success', 'failed')),
            receipt TEXT,
            result_desc TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_requests_user_status
            ON payment_requests(user_id, status, created_at DESC);

        -- Admin-issued vouchers (redeemable once, before expiry)
        CREATE TABLE IF NOT EXISTS vouchers (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            plan TEXT NOT NULL CHECK (plan IN ('daily', 'weekly', 'monthly')),
            email TEXT NOT NULL,
            redeemed INTEGER NOT NULL DEFAULT 0,
            redeemed_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_vouchers_code ON vouchers(code);
        "#,
    )?;
    Ok(())
}
