use thiserror::Error;
use upg_common::MicroUsdt;

use crate::{
    db_types::{Agent, WithdrawalRequest, WithdrawalStatus},
    traits::data_objects::WithdrawalFilter,
};

/// Storage contract for the agent commission ledger and the withdrawal workflow.
///
/// The withdrawal state machine is `Pending → Approved → Paid` with `Pending → Rejected` as the
/// only other edge. Every transition is a conditional update keyed on the current status, so two
/// admins acting on the same request concurrently resolve to exactly one winner; the loser gets
/// [`AgentError::InvalidStateTransition`] and no side effects.
///
/// Balance conservation: `profit_available + profit_frozen + total_paid` never decreases, and the
/// sum of Pending/Approved request amounts always equals `profit_frozen`.
#[allow(async_fn_in_trait)]
pub trait AgentManagement: Clone {
    /// Creates the agent, or updates its markup when it already exists. Balances are preserved.
    async fn upsert_agent(&self, agent_id: &str, markup_per_unit: MicroUsdt) -> Result<Agent, AgentError>;

    async fn fetch_agent(&self, agent_id: &str) -> Result<Option<Agent>, AgentError>;

    /// Freezes `amount` out of the agent's available profit and records a Pending request.
    /// The freeze is conditional on `profit_available >= amount`; on failure nothing changes and
    /// [`AgentError::InsufficientBalance`] is returned.
    async fn create_withdrawal(
        &self,
        agent_id: &str,
        amount: MicroUsdt,
        fee: MicroUsdt,
        payout_address: &str,
    ) -> Result<WithdrawalRequest, AgentError>;

    async fn fetch_withdrawal(&self, request_id: i64) -> Result<Option<WithdrawalRequest>, AgentError>;

    /// Pending → Approved. Pure status change; the amount stays frozen.
    async fn approve_withdrawal(&self, request_id: i64, reviewer: &str) -> Result<WithdrawalRequest, AgentError>;

    /// Pending → Rejected with a full refund: the frozen amount moves back to available.
    async fn reject_withdrawal(
        &self,
        request_id: i64,
        reviewer: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, AgentError>;

    /// Approved → Paid: the frozen amount moves to `total_paid` and the payout txid is recorded.
    async fn mark_withdrawal_paid(
        &self,
        request_id: i64,
        reviewer: &str,
        payout_ref: &str,
    ) -> Result<WithdrawalRequest, AgentError>;

    /// Withdrawal requests matching the filter, newest first.
    async fn withdrawals(&self, filter: WithdrawalFilter) -> Result<Vec<WithdrawalRequest>, AgentError>;
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The agent {0} does not exist")]
    AgentNotFound(String),
    #[error("The withdrawal request {0} does not exist")]
    WithdrawalNotFound(i64),
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: MicroUsdt, available: MicroUsdt },
    #[error("Withdrawal amount {0} is not positive or does not cover the fee")]
    InvalidAmount(MicroUsdt),
    #[error("Withdrawal request {request_id} cannot move from {from} to {to}")]
    InvalidStateTransition { request_id: i64, from: WithdrawalStatus, to: WithdrawalStatus },
}

impl From<sqlx::Error> for AgentError {
    fn from(e: sqlx::Error) -> Self {
        AgentError::DatabaseError(e.to_string())
    }
}
