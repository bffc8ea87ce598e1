//! `SqliteLedger` is the concrete SQLite implementation of the engine's backend traits.
//!
//! It is constructed explicitly (no global state) and cloned freely; clones share one connection
//! pool. Call [`SqliteLedger::close`] on the last owner during shutdown, or just drop it and let
//! the pool unwind.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;
use upg_common::MicroUsdt;

use super::db::{agents, new_pool, orders, transfers, users, withdrawals};
use crate::{
    db_types::{
        Agent,
        ChainTransfer,
        ChainTransferEvent,
        Currency,
        NewOrder,
        Order,
        OrderId,
        TransferStatus,
        UserAccount,
        WithdrawalRequest,
        WithdrawalStatus,
    },
    helpers,
    traits::{
        AgentError,
        AgentManagement,
        CreditOutcome,
        InsertTransferResult,
        LedgerDatabase,
        LedgerError,
        MatchWindow,
        OrderStatSummary,
        WithdrawalFilter,
    },
};

/// Attempts at generating a collision-free disambiguated amount before giving up.
const MAX_TAIL_ATTEMPTS: usize = 20;

#[derive(Clone)]
pub struct SqliteLedger {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteLedger ({:?})", self.pool)
    }
}

impl SqliteLedger {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        super::MIGRATOR.run(&self.pool).await.map_err(|e| LedgerError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

impl LedgerDatabase for SqliteLedger {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_pending_order(&self, order: NewOrder, expires_in: Duration) -> Result<Order, LedgerError> {
        let tolerance = order.currency.tolerance();
        for attempt in 1..=MAX_TAIL_ATTEMPTS {
            let now = Utc::now();
            let order_id = OrderId(helpers::new_order_number(now));
            let amount = order.base_amount + helpers::random_amount_tail(order.currency);
            let mut tx = self.pool.begin().await?;
            if orders::pending_amount_collides(amount, order.currency, tolerance, &mut tx).await? {
                trace!("🗃️📦️ Amount {amount} collides with a pending order on attempt {attempt}, regenerating");
                continue;
            }
            match orders::insert_pending(&order, &order_id, amount, now + expires_in, now, &mut tx).await? {
                Some(order) => {
                    tx.commit().await?;
                    debug!("🗃️📦️ Order {} created for {amount} {}", order.order_id, order.currency);
                    return Ok(order);
                },
                // a concurrent creator won the partial unique index; regenerate
                None => continue,
            }
        }
        Err(LedgerError::AmountCollision { currency: order.currency, base_amount: order.base_amount })
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_credited_ref(&self, external_ref: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_credited_ref(external_ref, &mut conn).await?;
        Ok(order)
    }

    async fn find_candidate_order(
        &self,
        amount: MicroUsdt,
        currency: Currency,
        window: MatchWindow,
    ) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::find_candidate(amount, currency, currency.tolerance(), window, &mut conn).await
    }

    /// The single idempotent mutation point. One transaction covers the conditional status flip,
    /// the balance credit, and the commission accrual, so concurrent callers (chain watcher,
    /// webhook handler, rescan) can all race on the same order safely.
    async fn try_credit_order(
        &self,
        order_id: &OrderId,
        external_ref: &str,
        amount: MicroUsdt,
    ) -> Result<CreditOutcome, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        match orders::try_complete(order_id, external_ref, now, &mut tx).await? {
            Some(order) => {
                if order.amount != amount {
                    debug!(
                        "🗃️💰️ Order {} credited with {} against an observed payment of {amount}",
                        order.order_id, order.amount
                    );
                }
                users::credit_balance(order.user_id, order.amount, now, &mut tx).await?;
                if let Some(agent_id) = order.agent_id.as_deref() {
                    match agents::fetch(agent_id, &mut tx).await? {
                        Some(agent) => {
                            let accrual = agent.markup_per_unit * order.units;
                            if accrual.value() > 0 {
                                agents::accrue(agent_id, accrual, now, &mut tx).await?;
                                debug!("🗃️🧾️ Accrued {accrual} commission for agent {agent_id}");
                            }
                        },
                        None => {
                            warn!(
                                "🗃️🧾️ Order {} names agent {agent_id}, but no such agent exists. No commission \
                                 accrued.",
                                order.order_id
                            );
                        },
                    }
                }
                tx.commit().await?;
                info!("🗃️💰️ Order {} completed. {} credited to user {}", order.order_id, order.amount, order.user_id);
                Ok(CreditOutcome::Credited(order))
            },
            None => {
                // Not pending (or missing). Classify without mutating anything.
                let order = orders::fetch_order_by_order_id(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| LedgerError::OrderNotFound(order_id.clone()))?;
                if order.credited_ref.as_deref() == Some(external_ref) {
                    debug!("🗃️💰️ Order {} was already credited by {external_ref}", order.order_id);
                    Ok(CreditOutcome::AlreadyCredited(order))
                } else {
                    debug!("🗃️💰️ Order {} is {} and cannot be credited by {external_ref}", order.order_id, order.status);
                    Ok(CreditOutcome::Stale(order))
                }
            },
        }
    }

    async fn expire_due_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::expire_due(now, &mut conn).await
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::cancel(order_id, Utc::now(), &mut conn).await
    }

    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_account(user_id, &mut conn).await
    }

    async fn upsert_transfer(&self, event: &ChainTransferEvent) -> Result<InsertTransferResult, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transfers::idempotent_insert(event, Utc::now(), &mut conn).await
    }

    async fn fetch_transfer(&self, txid: &str) -> Result<Option<ChainTransfer>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transfers::fetch_transfer(txid, &mut conn).await
    }

    async fn update_transfer_status(&self, txid: &str, status: TransferStatus) -> Result<ChainTransfer, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transfers::update_status(txid, status, Utc::now(), &mut conn).await
    }

    async fn fetch_transfers_by_status(&self, status: TransferStatus) -> Result<Vec<ChainTransfer>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transfers::fetch_by_status(status, &mut conn).await
    }

    async fn search_uncredited_transfers(
        &self,
        amount: MicroUsdt,
        tolerance: MicroUsdt,
        window: MatchWindow,
    ) -> Result<Vec<ChainTransfer>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        transfers::search_uncredited(amount, tolerance, window, &mut conn).await
    }

    async fn order_stats(&self) -> Result<Vec<OrderStatSummary>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::stats(&mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AgentManagement for SqliteLedger {
    async fn upsert_agent(&self, agent_id: &str, markup_per_unit: MicroUsdt) -> Result<Agent, AgentError> {
        let mut conn = self.pool.acquire().await?;
        agents::upsert(agent_id, markup_per_unit, Utc::now(), &mut conn).await
    }

    async fn fetch_agent(&self, agent_id: &str) -> Result<Option<Agent>, AgentError> {
        let mut conn = self.pool.acquire().await?;
        let agent = agents::fetch(agent_id, &mut conn).await?;
        Ok(agent)
    }

    async fn create_withdrawal(
        &self,
        agent_id: &str,
        amount: MicroUsdt,
        fee: MicroUsdt,
        payout_address: &str,
    ) -> Result<WithdrawalRequest, AgentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        if !agents::freeze(agent_id, amount, now, &mut tx).await? {
            // Either the agent is unknown or the balance does not cover the request.
            // Nothing was frozen in both cases.
            let agent =
                agents::fetch(agent_id, &mut tx).await?.ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))?;
            return Err(AgentError::InsufficientBalance { requested: amount, available: agent.profit_available });
        }
        let request = withdrawals::insert(agent_id, amount, fee, payout_address, now, &mut tx).await?;
        tx.commit().await?;
        info!("🏧️ Agent {agent_id} requested withdrawal #{} of {amount} (fee {fee})", request.id);
        Ok(request)
    }

    async fn fetch_withdrawal(&self, request_id: i64) -> Result<Option<WithdrawalRequest>, AgentError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::fetch(request_id, &mut conn).await
    }

    async fn approve_withdrawal(&self, request_id: i64, reviewer: &str) -> Result<WithdrawalRequest, AgentError> {
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        let request = withdrawals::try_transition(
            request_id,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Approved,
            reviewer,
            None,
            None,
            now,
            &mut conn,
        )
        .await?;
        match request {
            Some(request) => {
                info!("🏧️ Withdrawal #{request_id} approved by {reviewer}");
                Ok(request)
            },
            None => Err(invalid_transition(request_id, WithdrawalStatus::Approved, &mut conn).await),
        }
    }

    async fn reject_withdrawal(
        &self,
        request_id: i64,
        reviewer: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, AgentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let request = withdrawals::try_transition(
            request_id,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Rejected,
            reviewer,
            Some(reason),
            None,
            now,
            &mut tx,
        )
        .await?;
        match request {
            Some(request) => {
                if !agents::unfreeze(&request.agent_id, request.amount, now, &mut tx).await? {
                    return Err(AgentError::DatabaseError(format!(
                        "Frozen balance for agent {} does not cover withdrawal #{request_id}. The ledger is \
                         inconsistent; rolling back.",
                        request.agent_id
                    )));
                }
                tx.commit().await?;
                info!("🏧️ Withdrawal #{request_id} rejected by {reviewer}. {} refunded", request.amount);
                Ok(request)
            },
            None => Err(invalid_transition(request_id, WithdrawalStatus::Rejected, &mut tx).await),
        }
    }

    async fn mark_withdrawal_paid(
        &self,
        request_id: i64,
        reviewer: &str,
        payout_ref: &str,
    ) -> Result<WithdrawalRequest, AgentError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let request = withdrawals::try_transition(
            request_id,
            WithdrawalStatus::Approved,
            WithdrawalStatus::Paid,
            reviewer,
            None,
            Some(payout_ref),
            now,
            &mut tx,
        )
        .await?;
        match request {
            Some(request) => {
                if !agents::settle(&request.agent_id, request.amount, now, &mut tx).await? {
                    return Err(AgentError::DatabaseError(format!(
                        "Frozen balance for agent {} does not cover withdrawal #{request_id}. The ledger is \
                         inconsistent; rolling back.",
                        request.agent_id
                    )));
                }
                tx.commit().await?;
                info!("🏧️ Withdrawal #{request_id} paid out as {payout_ref}");
                Ok(request)
            },
            None => Err(invalid_transition(request_id, WithdrawalStatus::Paid, &mut tx).await),
        }
    }

    async fn withdrawals(&self, filter: WithdrawalFilter) -> Result<Vec<WithdrawalRequest>, AgentError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::search(filter, &mut conn).await
    }
}

/// Builds the error for a failed conditional transition: either the request does not exist, or
/// it is in a state the transition does not start from.
async fn invalid_transition(
    request_id: i64,
    to: WithdrawalStatus,
    conn: &mut sqlx::SqliteConnection,
) -> AgentError {
    match withdrawals::fetch(request_id, conn).await {
        Ok(Some(request)) => {
            AgentError::InvalidStateTransition { request_id, from: request.status, to }
        },
        Ok(None) => AgentError::WithdrawalNotFound(request_id),
        Err(e) => e,
    }
}
