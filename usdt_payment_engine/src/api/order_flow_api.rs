use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use upg_common::MicroUsdt;

use crate::{
    db_types::{Currency, NewOrder, Order, OrderId, TransferStatus, UserAccount},
    events::{EventProducers, OrderCreditedEvent, OrderExpiredEvent},
    traits::{CreditOutcome, LedgerDatabase, LedgerError, MatchOutcome, MatchWindow, OrderStatSummary},
};

/// How often the matching loop retries when a candidate goes stale between lookup and credit.
const MAX_MATCH_ATTEMPTS: usize = 3;

/// `OrderFlowApi` is the primary API for the order lifecycle: creating pending top-up orders,
/// turning payment signals into exactly-once credits, and expiring stale orders.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: LedgerDatabase
{
    /// Creates a new pending order with a collision-free disambiguated amount. The returned
    /// order carries the exact amount the user must pay and the expiry deadline.
    pub async fn create_order(&self, order: NewOrder, expires_in: Duration) -> Result<Order, LedgerError> {
        let order = self.db.create_pending_order(order, expires_in).await?;
        debug!("🔄️📦️ Order {} created. User {} must pay {}", order.order_id, order.user_id, order.amount);
        Ok(order)
    }

    /// Applies a payment to an order, at most once per external reference. See
    /// [`LedgerDatabase::try_credit_order`] for the idempotency contract. Publishes an
    /// `OrderCredited` event only when this call performed the credit.
    pub async fn try_credit(
        &self,
        order_id: &OrderId,
        external_ref: &str,
        amount: MicroUsdt,
    ) -> Result<CreditOutcome, LedgerError> {
        let outcome = self.db.try_credit_order(order_id, external_ref, amount).await?;
        if let CreditOutcome::Credited(order) = &outcome {
            self.call_order_credited_hook(order).await;
        }
        Ok(outcome)
    }

    /// Runs a mirrored transfer through the matching path: find the best pending USDT order
    /// around the transfer's event time and credit it by txid. The transfer's bookkeeping status
    /// is updated to `Credited` or `Unmatched` accordingly; unmatched transfers are preserved
    /// for admin rescan, never discarded.
    ///
    /// Safe to call repeatedly with the same txid: a transfer that already credited an order
    /// resolves to [`MatchOutcome::AlreadyCredited`] through the credit idempotency boundary.
    pub async fn process_transfer(&self, txid: &str, match_half_width: Duration) -> Result<MatchOutcome, LedgerError> {
        let transfer =
            self.db.fetch_transfer(txid).await?.ok_or_else(|| LedgerError::TransferNotFound(txid.to_string()))?;
        if let Some(order) = self.db.fetch_order_by_credited_ref(txid).await? {
            if transfer.status != TransferStatus::Credited {
                self.db.update_transfer_status(txid, TransferStatus::Credited).await?;
            }
            debug!("🔄️💰️ Transfer {txid} already credited order {}", order.order_id);
            return Ok(MatchOutcome::AlreadyCredited(order));
        }
        let window = MatchWindow::around(transfer.event_time, match_half_width);
        for _ in 0..MAX_MATCH_ATTEMPTS {
            let Some(candidate) = self.db.find_candidate_order(transfer.amount, Currency::Usdt, window).await? else {
                break;
            };
            match self.try_credit(&candidate.order_id, txid, transfer.amount).await? {
                CreditOutcome::Credited(order) => {
                    self.db.update_transfer_status(txid, TransferStatus::Credited).await?;
                    return Ok(MatchOutcome::Credited(order));
                },
                CreditOutcome::AlreadyCredited(order) => {
                    self.db.update_transfer_status(txid, TransferStatus::Credited).await?;
                    return Ok(MatchOutcome::AlreadyCredited(order));
                },
                // The candidate left Pending between lookup and credit. It is no longer a
                // candidate, so searching again either finds another order or gives up.
                CreditOutcome::Stale(order) => {
                    debug!("🔄️💰️ Candidate {} went stale while matching {txid}. Retrying", order.order_id);
                },
            }
        }
        warn!("🔄️💰️ No matching order for transfer {txid} of {}. Leaving it for rescan", transfer.amount);
        self.db.update_transfer_status(txid, TransferStatus::Unmatched).await?;
        Ok(MatchOutcome::NoMatch)
    }

    /// Applies a verified fiat gateway callback: the order is looked up by the number the
    /// gateway echoes back, the reported amount must lie within the order currency's tolerance
    /// of the order amount, and the credit is keyed on the gateway's trade number.
    ///
    /// Callers must treat only `Credited` and `AlreadyCredited` as terminal-correct; anything
    /// else should produce a non-success response so the gateway retries.
    pub async fn process_gateway_payment(
        &self,
        order_id: &OrderId,
        gateway_ref: &str,
        amount: MicroUsdt,
    ) -> Result<MatchOutcome, LedgerError> {
        let Some(order) = self.db.fetch_order_by_order_id(order_id).await? else {
            warn!("🔄️🌐️ Gateway callback {gateway_ref} names unknown order {order_id}");
            return Ok(MatchOutcome::NoMatch);
        };
        if (order.amount - amount).abs() > order.currency.tolerance() {
            warn!(
                "🔄️🌐️ Gateway callback {gateway_ref} reports {amount} for order {order_id}, which expects {}. Not \
                 crediting",
                order.amount
            );
            return Ok(MatchOutcome::NoMatch);
        }
        match self.try_credit(order_id, gateway_ref, amount).await? {
            CreditOutcome::Credited(order) => Ok(MatchOutcome::Credited(order)),
            CreditOutcome::AlreadyCredited(order) => Ok(MatchOutcome::AlreadyCredited(order)),
            CreditOutcome::Stale(order) => {
                warn!("🔄️🌐️ Gateway callback {gateway_ref} arrived for {} order {order_id}", order.status);
                Ok(MatchOutcome::NoMatch)
            },
        }
    }

    /// Expires all pending orders past their deadline, publishing an `OrderExpired` event for
    /// each. A concurrently credited order is never expired; the conditional update guarantees
    /// it without any sequencing assumptions.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError> {
        let expired = self.db.expire_due_orders(now).await?;
        for order in &expired {
            self.call_order_expired_hook(order).await;
        }
        Ok(expired)
    }

    /// Cancels a pending order (user abandoned the top-up). Returns `None` when the order was
    /// no longer pending — a credit that raced the cancellation wins and stays won.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let cancelled = self.db.cancel_order(order_id).await?;
        if let Some(order) = &cancelled {
            info!("🔄️📦️ Order {} cancelled", order.order_id);
        }
        Ok(cancelled)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn user_balance(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError> {
        self.db.fetch_user_account(user_id).await
    }

    pub async fn order_stats(&self) -> Result<Vec<OrderStatSummary>, LedgerError> {
        self.db.order_stats().await
    }

    async fn call_order_credited_hook(&self, order: &Order) {
        for emitter in &self.producers.order_credited_producer {
            debug!("🔄️💰️ Notifying order credited hook subscribers");
            let event = OrderCreditedEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_order_expired_hook(&self, order: &Order) {
        for emitter in &self.producers.order_expired_producer {
            debug!("🔄️🕰️ Notifying order expired hook subscribers");
            let event = OrderExpiredEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
