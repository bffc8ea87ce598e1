use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use upg_common::MicroUsdt;

use crate::db_types::{Currency, Order, OrderStatusType, WithdrawalStatus};

/// Result of mirroring a feed event into the transfers table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTransferResult {
    Inserted,
    AlreadyExists,
}

/// Outcome of the single idempotent credit mutation.
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    /// The order transitioned from Pending to Completed and the balance was credited.
    Credited(Order),
    /// The order was already completed with this external reference. Idempotent success.
    AlreadyCredited(Order),
    /// The order is in a terminal state that this reference did not produce
    /// (completed under a different reference, expired, or cancelled). Nothing was mutated.
    Stale(Order),
}

impl CreditOutcome {
    /// True for outcomes that leave the system in a terminal-correct state for the caller,
    /// i.e. the payment is reflected in a completed order.
    pub fn is_settled(&self) -> bool {
        matches!(self, CreditOutcome::Credited(_) | CreditOutcome::AlreadyCredited(_))
    }
}

/// Outcome of running a payment signal through the matching path.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Credited(Order),
    AlreadyCredited(Order),
    /// No pending order matched. The signal is preserved for rescan; nothing was mutated.
    NoMatch,
}

/// The `created_at` window a candidate order must fall into to match a payment.
#[derive(Debug, Clone, Copy)]
pub struct MatchWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl MatchWindow {
    /// A symmetric window of `half_width` on either side of `at`.
    pub fn around(at: DateTime<Utc>, half_width: Duration) -> Self {
        Self { since: at - half_width, until: at + half_width }
    }
}

/// One row of the pending-order statistics report.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderStatSummary {
    pub status: OrderStatusType,
    pub currency: Currency,
    pub count: i64,
    pub total: MicroUsdt,
}

/// Filter for the admin withdrawal listing. Empty filter returns everything,
/// newest requests first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawalFilter {
    pub agent_id: Option<String>,
    pub status: Option<WithdrawalStatus>,
}

impl WithdrawalFilter {
    pub fn for_agent<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_status(mut self, status: WithdrawalStatus) -> Self {
        self.status = Some(status);
        self
    }
}
