use std::fmt::Debug;

use chrono::Duration;
use log::*;
use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType, TransferStatus},
    traits::{CreditOutcome, LedgerDatabase, LedgerError, MatchOutcome, MatchWindow},
    OrderFlowApi,
};

/// How far around an order's creation time `rescan_by_order` searches the mirrored feed.
/// Deliberately much wider than the watcher's live matching window.
pub const RESCAN_WINDOW: Duration = Duration::hours(2);

/// `RescanApi` is the admin backfill tool. It is built entirely on the matching and crediting
/// primitives of [`OrderFlowApi`], so every operation here is idempotent: replaying a transfer
/// that already credited an order reports `AlreadyCredited` and changes nothing.
pub struct RescanApi<B> {
    orders: OrderFlowApi<B>,
}

impl<B> Debug for RescanApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RescanApi")
    }
}

impl<B> RescanApi<B> {
    pub fn new(orders: OrderFlowApi<B>) -> Self {
        Self { orders }
    }
}

impl<B> RescanApi<B>
where B: LedgerDatabase
{
    /// Replays the chain-watcher matching path for one mirrored transfer. The confirmation-depth
    /// gate is not re-applied: a mirrored record only exists once the watcher observed it, and
    /// the admin invoking a rescan is explicitly overriding the automation.
    pub async fn rescan_by_txid(&self, txid: &str, match_half_width: Duration) -> Result<MatchOutcome, RescanError> {
        info!("🔁️ Admin rescan by txid {txid}");
        let outcome = self.orders.process_transfer(txid, match_half_width).await?;
        match &outcome {
            MatchOutcome::Credited(order) => info!("🔁️ Rescan credited order {} from {txid}", order.order_id),
            MatchOutcome::AlreadyCredited(order) => {
                info!("🔁️ Transfer {txid} had already credited order {}", order.order_id)
            },
            MatchOutcome::NoMatch => info!("🔁️ Transfer {txid} still matches no order"),
        }
        Ok(outcome)
    }

    /// Searches the mirrored feed for a payment matching the order's amount within a widened
    /// time window (±[`RESCAN_WINDOW`] around creation) and replays it through the credit path.
    /// The credit is pinned to this specific order, bypassing the candidate search.
    pub async fn rescan_by_order(&self, order_id: &OrderId) -> Result<MatchOutcome, RescanError> {
        info!("🔁️ Admin rescan by order {order_id}");
        let db = self.orders.db();
        let order =
            db.fetch_order_by_order_id(order_id).await?.ok_or_else(|| RescanError::OrderNotFound(order_id.clone()))?;
        if order.status == OrderStatusType::Completed {
            info!("🔁️ Order {order_id} is already completed");
            return Ok(MatchOutcome::AlreadyCredited(order));
        }
        let window = MatchWindow::around(order.created_at, RESCAN_WINDOW);
        let candidates = db.search_uncredited_transfers(order.amount, order.currency.tolerance(), window).await?;
        // Closest amount first; by the pending-amount uniqueness invariant, the first candidate
        // within tolerance is the only possible match for this order.
        let Some(transfer) = candidates.into_iter().next() else {
            info!("🔁️ No mirrored transfer matches order {order_id} for {}", order.amount);
            return Ok(MatchOutcome::NoMatch);
        };
        match self.orders.try_credit(order_id, &transfer.txid, transfer.amount).await? {
            CreditOutcome::Credited(order) => {
                db.update_transfer_status(&transfer.txid, TransferStatus::Credited).await?;
                info!("🔁️ Rescan matched transfer {} to order {order_id}", transfer.txid);
                Ok(MatchOutcome::Credited(order))
            },
            CreditOutcome::AlreadyCredited(order) => {
                db.update_transfer_status(&transfer.txid, TransferStatus::Credited).await?;
                Ok(MatchOutcome::AlreadyCredited(order))
            },
            CreditOutcome::Stale(order) => {
                info!("🔁️ Order {order_id} is {} and cannot be credited by rescan", order.status);
                Ok(MatchOutcome::NoMatch)
            },
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RescanError {
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("No mirrored transfer exists for txid {0}")]
    TransferNotFound(String),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for RescanError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::TransferNotFound(txid) => RescanError::TransferNotFound(txid),
            LedgerError::OrderNotFound(oid) => RescanError::OrderNotFound(oid),
            other => RescanError::Ledger(other),
        }
    }
}
