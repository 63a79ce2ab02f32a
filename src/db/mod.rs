mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::PlanTable;
use crate::entitlements::Ledger;
use crate::mpesa::MpesaClient;

pub mod from_row;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Entitlement ledger - the only writer of subscription grants.
    pub ledger: Ledger,
    /// Plan price/duration table (also embedded in the ledger).
    pub plans: PlanTable,
    /// Daraja client for token fetch + STK push.
    pub mpesa: Arc<MpesaClient>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
