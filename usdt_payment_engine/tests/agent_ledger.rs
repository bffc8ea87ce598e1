//! Tests for commission accrual, balance conservation and the withdrawal state machine.
use upg_common::MicroUsdt;
use usdt_payment_engine::{
    db_types::{Currency, NewOrder, WithdrawalStatus},
    AgentError,
    CreditOutcome,
    WithdrawalFilter,
};

mod support;
use support::{agent_api, new_ledger, order_api, EXPIRY};

#[tokio::test]
async fn commission_accrues_once_per_completed_order() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    let orders = order_api(db.clone());
    // markup of 0.05 USDT per unit
    agents.upsert_agent("agent-1", MicroUsdt::from(50_000)).await.unwrap();

    let order = orders
        .create_order(NewOrder::new(11, MicroUsdt::from_usdt(30), Currency::Usdt).for_agent("agent-1", 3), EXPIRY)
        .await
        .unwrap();
    let outcome = orders.try_credit(&order.order_id, "txid-ag01", order.amount).await.unwrap();
    assert!(matches!(outcome, CreditOutcome::Credited(_)));

    let agent = agents.agent_balance("agent-1").await.unwrap();
    assert_eq!(agent.profit_available, MicroUsdt::from(150_000), "0.05 x 3 units");

    // A duplicate credit attempt must not accrue again.
    orders.try_credit(&order.order_id, "txid-ag01", order.amount).await.unwrap();
    let agent = agents.agent_balance("agent-1").await.unwrap();
    assert_eq!(agent.profit_available, MicroUsdt::from(150_000));
}

#[tokio::test]
async fn withdrawal_below_available_freezes_exactly_once() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    agents.upsert_agent("agent-2", MicroUsdt::from(0)).await.unwrap();
    seed_profit(&db, &agents, "agent-2", MicroUsdt::from_usdt(40)).await;

    let request = agents
        .request_withdrawal("agent-2", MicroUsdt::from_usdt(25), MicroUsdt::from_usdt(1), "TPayout111")
        .await
        .unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(request.net_payout(), MicroUsdt::from_usdt(24));

    let agent = agents.agent_balance("agent-2").await.unwrap();
    assert_eq!(agent.profit_available, MicroUsdt::from_usdt(15));
    assert_eq!(agent.profit_frozen, MicroUsdt::from_usdt(25));
    assert_eq!(agent.total_earned(), MicroUsdt::from_usdt(40));
}

#[tokio::test]
async fn withdrawal_above_available_is_rejected_without_freezing() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    agents.upsert_agent("agent-3", MicroUsdt::from(0)).await.unwrap();
    seed_profit(&db, &agents, "agent-3", MicroUsdt::from_usdt(15)).await;

    let err = agents
        .request_withdrawal("agent-3", MicroUsdt::from_usdt(20), MicroUsdt::from_usdt(1), "TPayout111")
        .await
        .unwrap_err();
    match err {
        AgentError::InsufficientBalance { requested, available } => {
            assert_eq!(requested, MicroUsdt::from_usdt(20));
            assert_eq!(available, MicroUsdt::from_usdt(15));
        },
        other => panic!("expected InsufficientBalance, got {other}"),
    }
    let agent = agents.agent_balance("agent-3").await.unwrap();
    assert_eq!(agent.profit_frozen, MicroUsdt::from(0));
    assert_eq!(agent.profit_available, MicroUsdt::from_usdt(15));
}

#[tokio::test]
async fn rejection_refunds_the_frozen_amount_in_full() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    agents.upsert_agent("agent-4", MicroUsdt::from(0)).await.unwrap();
    seed_profit(&db, &agents, "agent-4", MicroUsdt::from_usdt(20)).await;

    let request = agents
        .request_withdrawal("agent-4", MicroUsdt::from_usdt(20), MicroUsdt::from_usdt(1), "TPayout111")
        .await
        .unwrap();
    let rejected = agents.reject_withdrawal(request.id, "admin", "payout address looks wrong").await.unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(rejected.reason.as_deref(), Some("payout address looks wrong"));
    assert_eq!(rejected.reviewed_by.as_deref(), Some("admin"));

    let agent = agents.agent_balance("agent-4").await.unwrap();
    assert_eq!(agent.profit_available, MicroUsdt::from_usdt(20));
    assert_eq!(agent.profit_frozen, MicroUsdt::from(0));
    assert_eq!(agent.total_paid, MicroUsdt::from(0));
}

#[tokio::test]
async fn full_payout_walkthrough_conserves_the_ledger() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    agents.upsert_agent("agent-5", MicroUsdt::from(0)).await.unwrap();
    seed_profit(&db, &agents, "agent-5", MicroUsdt::from_usdt(50)).await;
    let earned = agents.agent_balance("agent-5").await.unwrap().total_earned();

    let request = agents
        .request_withdrawal("agent-5", MicroUsdt::from_usdt(30), MicroUsdt::from_usdt(1), "TPayout111")
        .await
        .unwrap();
    assert_eq!(agents.agent_balance("agent-5").await.unwrap().total_earned(), earned);

    let approved = agents.approve_withdrawal(request.id, "admin").await.unwrap();
    assert_eq!(approved.status, WithdrawalStatus::Approved);
    // Approval is a pure status change.
    let agent = agents.agent_balance("agent-5").await.unwrap();
    assert_eq!(agent.profit_frozen, MicroUsdt::from_usdt(30));
    assert_eq!(agent.total_earned(), earned);

    let paid = agents.mark_withdrawal_paid(request.id, "admin", "txid-payout-01").await.unwrap();
    assert_eq!(paid.status, WithdrawalStatus::Paid);
    assert_eq!(paid.payout_ref.as_deref(), Some("txid-payout-01"));

    let agent = agents.agent_balance("agent-5").await.unwrap();
    assert_eq!(agent.profit_available, MicroUsdt::from_usdt(20));
    assert_eq!(agent.profit_frozen, MicroUsdt::from(0));
    assert_eq!(agent.total_paid, MicroUsdt::from_usdt(30));
    assert_eq!(agent.total_earned(), earned, "conservation: nothing minted or destroyed");
}

#[tokio::test]
async fn only_valid_state_transitions_are_accepted() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    agents.upsert_agent("agent-6", MicroUsdt::from(0)).await.unwrap();
    seed_profit(&db, &agents, "agent-6", MicroUsdt::from_usdt(10)).await;

    let request = agents
        .request_withdrawal("agent-6", MicroUsdt::from_usdt(10), MicroUsdt::from_usdt(1), "TPayout111")
        .await
        .unwrap();

    // Paying out an unapproved request is refused.
    let err = agents.mark_withdrawal_paid(request.id, "admin", "txid-x").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidStateTransition { .. }));

    agents.approve_withdrawal(request.id, "admin").await.unwrap();

    // A second approval loses the race against the first.
    let err = agents.approve_withdrawal(request.id, "other-admin").await.unwrap_err();
    match err {
        AgentError::InvalidStateTransition { from, to, .. } => {
            assert_eq!(from, WithdrawalStatus::Approved);
            assert_eq!(to, WithdrawalStatus::Approved);
        },
        other => panic!("expected InvalidStateTransition, got {other}"),
    }
    // Rejecting an approved request is refused too, and refunds nothing.
    let err = agents.reject_withdrawal(request.id, "admin", "too late").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidStateTransition { .. }));
    let agent = agents.agent_balance("agent-6").await.unwrap();
    assert_eq!(agent.profit_frozen, MicroUsdt::from_usdt(10));

    // Unknown request ids are reported as such.
    let err = agents.approve_withdrawal(99_999, "admin").await.unwrap_err();
    assert!(matches!(err, AgentError::WithdrawalNotFound(99_999)));
}

#[tokio::test]
async fn withdrawal_listing_filters_by_agent_and_status() {
    let db = new_ledger().await;
    let agents = agent_api(db.clone());
    for (agent_id, profit) in [("agent-7", 30), ("agent-8", 30)] {
        agents.upsert_agent(agent_id, MicroUsdt::from(0)).await.unwrap();
        seed_profit(&db, &agents, agent_id, MicroUsdt::from_usdt(profit)).await;
        agents.request_withdrawal(agent_id, MicroUsdt::from_usdt(5), MicroUsdt::from_usdt(1), "TPayout111").await.unwrap();
    }
    let second = agents
        .request_withdrawal("agent-7", MicroUsdt::from_usdt(6), MicroUsdt::from_usdt(1), "TPayout222")
        .await
        .unwrap();
    agents.approve_withdrawal(second.id, "admin").await.unwrap();

    let all = agents.withdrawals(WithdrawalFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    let for_seven = agents.withdrawals(WithdrawalFilter::default().for_agent("agent-7")).await.unwrap();
    assert_eq!(for_seven.len(), 2);
    let approved = agents
        .withdrawals(WithdrawalFilter::default().for_agent("agent-7").with_status(WithdrawalStatus::Approved))
        .await
        .unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, second.id);
}

/// Earns `profit` for the agent the only way profit can be earned: by completing agent orders.
async fn seed_profit(
    db: &usdt_payment_engine::SqliteLedger,
    agents: &usdt_payment_engine::AgentApi<usdt_payment_engine::SqliteLedger>,
    agent_id: &str,
    profit: MicroUsdt,
) {
    let orders = order_api(db.clone());
    // one unit at a markup equal to the whole target profit
    agents.upsert_agent(agent_id, profit).await.unwrap();
    let order = orders
        .create_order(NewOrder::new(9_000, MicroUsdt::from_usdt(1), Currency::Usdt).for_agent(agent_id, 1), EXPIRY)
        .await
        .unwrap();
    orders.try_credit(&order.order_id, &format!("txid-seed-{agent_id}-{}", order.id), order.amount).await.unwrap();
    // restore the agent's real markup configuration
    agents.upsert_agent(agent_id, MicroUsdt::from(0)).await.unwrap();
}
