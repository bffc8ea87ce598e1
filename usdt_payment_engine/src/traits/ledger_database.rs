use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use upg_common::MicroUsdt;

use crate::{
    db_types::{ChainTransfer, ChainTransferEvent, Currency, NewOrder, Order, OrderId, TransferStatus, UserAccount},
    traits::data_objects::{CreditOutcome, InsertTransferResult, MatchWindow, OrderStatSummary},
};

/// Storage contract for orders, user balances and the mirrored transfer feed.
///
/// Implementations must make every status transition a conditional update keyed on the current
/// status (`UPDATE … WHERE status = …`): [`Self::try_credit_order`], [`Self::expire_due_orders`]
/// and [`Self::cancel_order`] race against each other by design and the conditional write is the
/// only thing that keeps an order from being both credited and expired.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone {
    /// The URL of the backing database.
    fn url(&self) -> &str;

    /// Creates a new pending top-up order.
    ///
    /// The stored `amount` is `base_amount` plus a freshly generated disambiguation tail. The
    /// implementation must guarantee that no two pending orders of the same currency lie within
    /// matching tolerance of each other, regenerating the tail as needed and failing with
    /// [`LedgerError::AmountCollision`] only when the amount space is genuinely exhausted.
    /// The order expires `expires_in` after creation.
    async fn create_pending_order(&self, order: NewOrder, expires_in: Duration) -> Result<Order, LedgerError>;

    /// Fetches the order with the given order number.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError>;

    /// Fetches the completed order credited by the given external reference, if any.
    async fn fetch_order_by_credited_ref(&self, external_ref: &str) -> Result<Option<Order>, LedgerError>;

    /// Finds the pending order best matching `amount` within the given currency tolerance and
    /// creation-time window. Smallest absolute difference wins; ties break on earliest creation.
    /// Read-only: callers must not infer side effects from a match.
    async fn find_candidate_order(
        &self,
        amount: MicroUsdt,
        currency: Currency,
        window: MatchWindow,
    ) -> Result<Option<Order>, LedgerError>;

    /// The single idempotent mutation point. In one transaction: conditionally transitions the
    /// order from Pending to Completed (this conditional write is the idempotency boundary),
    /// records the external reference, credits the user balance, and accrues agent commission
    /// when the order belongs to an agent.
    ///
    /// When the order is no longer pending, nothing is mutated and the returned outcome
    /// distinguishes the idempotent-success case (already completed under `external_ref`) from
    /// the stale case.
    async fn try_credit_order(
        &self,
        order_id: &OrderId,
        external_ref: &str,
        amount: MicroUsdt,
    ) -> Result<CreditOutcome, LedgerError>;

    /// Transitions all pending orders whose deadline has passed to Expired, returning them.
    /// Orders credited concurrently are untouched — the transition is conditional on Pending.
    async fn expire_due_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError>;

    /// Cancels a pending order. Returns `None` when the order exists but is not pending.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError>;

    /// Fetches a user's balance account, if one has been created by a credit.
    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError>;

    /// Mirrors a feed event into the transfers table, keyed by txid. Re-observing a known txid
    /// is a no-op reported as [`InsertTransferResult::AlreadyExists`].
    async fn upsert_transfer(&self, event: &ChainTransferEvent) -> Result<InsertTransferResult, LedgerError>;

    /// Fetches a mirrored transfer by txid.
    async fn fetch_transfer(&self, txid: &str) -> Result<Option<ChainTransfer>, LedgerError>;

    /// Updates the bookkeeping status of a mirrored transfer.
    async fn update_transfer_status(&self, txid: &str, status: TransferStatus) -> Result<ChainTransfer, LedgerError>;

    /// All mirrored transfers currently in the given status, oldest first.
    async fn fetch_transfers_by_status(&self, status: TransferStatus) -> Result<Vec<ChainTransfer>, LedgerError>;

    /// Uncredited transfers (Received or Unmatched) whose amount lies within `tolerance` of
    /// `amount` and whose event time falls in `window`. Used by rescan-by-order.
    async fn search_uncredited_transfers(
        &self,
        amount: MicroUsdt,
        tolerance: MicroUsdt,
        window: MatchWindow,
    ) -> Result<Vec<ChainTransfer>, LedgerError>;

    /// Order counts and totals grouped by status and currency, for the admin surface.
    async fn order_stats(&self) -> Result<Vec<OrderStatSummary>, LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("No mirrored transfer exists for txid {0}")]
    TransferNotFound(String),
    #[error("Could not allocate a collision-free amount for a {currency} order of {base_amount}")]
    AmountCollision { currency: Currency, base_amount: MicroUsdt },
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
