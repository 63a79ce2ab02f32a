//! The entitlement ledger: canonical truth of "does this user have VIP".
//!
//! Both grant paths (callback reconciliation and voucher redemption) go
//! through [`Ledger::activate`] so the single-active-grant invariant is
//! maintained in exactly one place.

use rusqlite::Connection;

use crate::config::PlanTable;
use crate::db::queries;
use crate::error::Result;
use crate::models::{GrantSource, Plan, Subscription};

#[derive(Clone)]
pub struct Ledger {
    plans: PlanTable,
}

impl Ledger {
    pub fn new(plans: PlanTable) -> Self {
        Self { plans }
    }

    /// Deactivate every active grant for the user, then insert one new
    /// active grant running from `anchor` for the plan's duration.
    ///
    /// The anchor is confirmation time (or redemption time), never the
    /// original payment initiation time. Callers that pair this with other
    /// writes must pass a connection inside an open transaction so the
    /// deactivate + insert commit or roll back together with them.
    pub fn activate(
        &self,
        conn: &Connection,
        user_id: &str,
        plan: Plan,
        source: GrantSource,
        anchor: i64,
    ) -> Result<Subscription> {
        let deactivated = queries::deactivate_subscriptions(conn, user_id)?;
        if deactivated > 0 {
            tracing::debug!(user_id, deactivated, "superseded prior grants");
        }
        let expires_at = anchor + self.plans.duration_secs(plan);
        queries::insert_subscription(conn, user_id, plan, source, anchor, expires_at)
    }

    /// The active grant whose expiry is at or after `at`, if any.
    ///
    /// This is the sole VIP predicate used by the rest of the system.
    pub fn current(&self, conn: &Connection, user_id: &str, at: i64) -> Result<Option<Subscription>> {
        queries::get_active_subscription(conn, user_id, at)
    }
}
