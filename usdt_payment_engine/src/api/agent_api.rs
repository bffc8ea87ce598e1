use std::fmt::Debug;

use log::*;
use upg_common::MicroUsdt;

use crate::{
    db_types::{Agent, WithdrawalRequest},
    events::{EventProducers, WithdrawalStateChangedEvent},
    traits::{AgentError, AgentManagement, WithdrawalFilter},
};

/// `AgentApi` manages the agent commission ledger and drives the withdrawal workflow.
///
/// Commission accrual itself happens inside the credit transaction (see
/// [`crate::traits::LedgerDatabase::try_credit_order`]); this API covers everything else:
/// agent registration, balances, and the request/approve/reject/pay state machine.
pub struct AgentApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for AgentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgentApi")
    }
}

impl<B: Clone> Clone for AgentApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> AgentApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> AgentApi<B>
where B: AgentManagement
{
    /// Registers an agent or updates its per-unit markup.
    pub async fn upsert_agent(&self, agent_id: &str, markup_per_unit: MicroUsdt) -> Result<Agent, AgentError> {
        let agent = self.db.upsert_agent(agent_id, markup_per_unit).await?;
        debug!("🧾️ Agent {agent_id} registered with markup {markup_per_unit}/unit");
        Ok(agent)
    }

    /// The agent's balance sheet: available, frozen and paid-out commission.
    pub async fn agent_balance(&self, agent_id: &str) -> Result<Agent, AgentError> {
        self.db.fetch_agent(agent_id).await?.ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))
    }

    /// Freezes `amount` from the agent's available profit and opens a Pending withdrawal
    /// request. Fails with `InsufficientBalance` before anything is frozen.
    pub async fn request_withdrawal(
        &self,
        agent_id: &str,
        amount: MicroUsdt,
        fee: MicroUsdt,
        payout_address: &str,
    ) -> Result<WithdrawalRequest, AgentError> {
        if amount.value() <= 0 || amount <= fee {
            return Err(AgentError::InvalidAmount(amount));
        }
        let request = self.db.create_withdrawal(agent_id, amount, fee, payout_address).await?;
        self.call_withdrawal_hook(&request).await;
        Ok(request)
    }

    /// Pending → Approved. The amount stays frozen until the payout is recorded.
    pub async fn approve_withdrawal(&self, request_id: i64, reviewer: &str) -> Result<WithdrawalRequest, AgentError> {
        let request = self.db.approve_withdrawal(request_id, reviewer).await?;
        self.call_withdrawal_hook(&request).await;
        Ok(request)
    }

    /// Pending → Rejected, refunding the frozen amount in full.
    pub async fn reject_withdrawal(
        &self,
        request_id: i64,
        reviewer: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, AgentError> {
        let request = self.db.reject_withdrawal(request_id, reviewer, reason).await?;
        self.call_withdrawal_hook(&request).await;
        Ok(request)
    }

    /// Approved → Paid, moving the frozen amount to the paid-out total.
    pub async fn mark_withdrawal_paid(
        &self,
        request_id: i64,
        reviewer: &str,
        payout_ref: &str,
    ) -> Result<WithdrawalRequest, AgentError> {
        let request = self.db.mark_withdrawal_paid(request_id, reviewer, payout_ref).await?;
        self.call_withdrawal_hook(&request).await;
        Ok(request)
    }

    pub async fn fetch_withdrawal(&self, request_id: i64) -> Result<Option<WithdrawalRequest>, AgentError> {
        self.db.fetch_withdrawal(request_id).await
    }

    pub async fn withdrawals(&self, filter: WithdrawalFilter) -> Result<Vec<WithdrawalRequest>, AgentError> {
        self.db.withdrawals(filter).await
    }

    async fn call_withdrawal_hook(&self, request: &WithdrawalRequest) {
        for emitter in &self.producers.withdrawal_producer {
            debug!("🏧️ Notifying withdrawal state change hook subscribers");
            let event = WithdrawalStateChangedEvent::new(request.clone());
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
