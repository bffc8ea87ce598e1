//! End-to-end tests for the order crediting flow: idempotency, matching, expiry safety.
use chrono::{Duration, Utc};
use upg_common::MicroUsdt;
use usdt_payment_engine::{
    db_types::{Currency, NewOrder, OrderId, OrderStatusType, TransferStatus},
    CreditOutcome,
    LedgerDatabase,
    MatchOutcome,
};

mod support;
use support::{new_ledger, order_api, rescan_api, transfer_event, EXPIRY, MATCH_WINDOW};

#[tokio::test]
async fn credit_is_applied_exactly_once_per_txid() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api.create_order(NewOrder::new(101, MicroUsdt::from_usdt(10), Currency::Usdt), EXPIRY).await.unwrap();

    let first = api.try_credit(&order.order_id, "txid-aa01", order.amount).await.unwrap();
    assert!(matches!(first, CreditOutcome::Credited(_)));

    // Same reference again: idempotent success, no second credit.
    let second = api.try_credit(&order.order_id, "txid-aa01", order.amount).await.unwrap();
    assert!(matches!(second, CreditOutcome::AlreadyCredited(_)));

    let account = api.user_balance(101).await.unwrap().expect("account should exist after credit");
    assert_eq!(account.balance, order.amount);
}

#[tokio::test]
async fn completed_order_rejects_other_references() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api.create_order(NewOrder::new(102, MicroUsdt::from_usdt(5), Currency::Usdt), EXPIRY).await.unwrap();

    api.try_credit(&order.order_id, "txid-bb01", order.amount).await.unwrap();
    let outcome = api.try_credit(&order.order_id, "txid-bb02", order.amount).await.unwrap();
    assert!(matches!(outcome, CreditOutcome::Stale(_)));

    let account = api.user_balance(102).await.unwrap().unwrap();
    assert_eq!(account.balance, order.amount, "balance must reflect exactly one credit");
}

#[tokio::test]
async fn pending_amounts_stay_pairwise_distinct() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let mut amounts = Vec::new();
    for user in 0..8 {
        let order =
            api.create_order(NewOrder::new(user, MicroUsdt::from_usdt(10), Currency::Usdt), EXPIRY).await.unwrap();
        amounts.push(order.amount.value());
    }
    let tolerance = Currency::Usdt.tolerance().value();
    for (i, a) in amounts.iter().enumerate() {
        for b in amounts.iter().skip(i + 1) {
            assert!((a - b).abs() > tolerance, "pending amounts {a} and {b} are within tolerance");
        }
    }
}

#[tokio::test]
async fn transfer_matches_only_the_exact_order() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let first = api.create_order(NewOrder::new(201, MicroUsdt::from_usdt(10), Currency::Usdt), EXPIRY).await.unwrap();
    let second = api.create_order(NewOrder::new(202, MicroUsdt::from_usdt(10), Currency::Usdt), EXPIRY).await.unwrap();

    db.upsert_transfer(&transfer_event("txid-cc01", first.amount.value(), 5)).await.unwrap();
    let outcome = api.process_transfer("txid-cc01", MATCH_WINDOW).await.unwrap();
    match outcome {
        MatchOutcome::Credited(order) => assert_eq!(order.order_id, first.order_id),
        other => panic!("expected a credit, got {other:?}"),
    }

    // The other order is untouched.
    let second = api.fetch_order(&second.order_id).await.unwrap().unwrap();
    assert_eq!(second.status, OrderStatusType::Pending);
    assert!(api.user_balance(202).await.unwrap().is_none());
}

#[tokio::test]
async fn reprocessing_a_credited_transfer_is_idempotent() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api.create_order(NewOrder::new(301, MicroUsdt::from_usdt(20), Currency::Usdt), EXPIRY).await.unwrap();

    db.upsert_transfer(&transfer_event("txid-dd01", order.amount.value(), 3)).await.unwrap();
    assert!(matches!(api.process_transfer("txid-dd01", MATCH_WINDOW).await.unwrap(), MatchOutcome::Credited(_)));
    // Poll loop and a manual rescan can both submit the same txid.
    assert!(matches!(api.process_transfer("txid-dd01", MATCH_WINDOW).await.unwrap(), MatchOutcome::AlreadyCredited(_)));

    let account = api.user_balance(301).await.unwrap().unwrap();
    assert_eq!(account.balance, order.amount);
}

#[tokio::test]
async fn unmatched_transfer_is_kept_and_recoverable_by_rescan() {
    let db = new_ledger().await;
    let api = order_api(db.clone());

    db.upsert_transfer(&transfer_event("txid-ee01", 7_003_141, 9)).await.unwrap();
    assert!(matches!(api.process_transfer("txid-ee01", MATCH_WINDOW).await.unwrap(), MatchOutcome::NoMatch));
    let transfer = db.fetch_transfer("txid-ee01").await.unwrap().unwrap();
    assert_eq!(transfer.status, TransferStatus::Unmatched);

    // Rescanning it again finds no order either, but never discards the record.
    let rescan = rescan_api(db.clone());
    let outcome = rescan.rescan_by_txid("txid-ee01", MATCH_WINDOW).await.unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch));
    assert!(db.fetch_transfer("txid-ee01").await.unwrap().is_some());

    // A payment the watcher never matched (the order did not exist yet) is recovered by an
    // admin rescan pinned to the order.
    let order = api.create_order(NewOrder::new(401, MicroUsdt::from_usdt(8), Currency::Usdt), EXPIRY).await.unwrap();
    db.upsert_transfer(&transfer_event("txid-ee02", order.amount.value(), 9)).await.unwrap();
    let outcome = rescan.rescan_by_order(&order.order_id).await.unwrap();
    match outcome {
        MatchOutcome::Credited(credited) => {
            assert_eq!(credited.order_id, order.order_id);
            assert_eq!(credited.credited_ref.as_deref(), Some("txid-ee02"));
        },
        other => panic!("expected rescan to credit the order, got {other:?}"),
    }
    let transfer = db.fetch_transfer("txid-ee02").await.unwrap().unwrap();
    assert_eq!(transfer.status, TransferStatus::Credited);
    // Rescan by order is idempotent too.
    assert!(matches!(rescan.rescan_by_order(&order.order_id).await.unwrap(), MatchOutcome::AlreadyCredited(_)));
}

#[tokio::test]
async fn gateway_payment_credits_by_order_number() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api.create_order(NewOrder::new(501, MicroUsdt::from_usdt(50), Currency::Fiat), EXPIRY).await.unwrap();

    // Callback for an unknown order number leaves everything pending.
    let miss = api.process_gateway_payment(&OrderId("20200101000000000000".into()), "gw-1", order.amount).await.unwrap();
    assert!(matches!(miss, MatchOutcome::NoMatch));
    assert_eq!(api.fetch_order(&order.order_id).await.unwrap().unwrap().status, OrderStatusType::Pending);

    // Amount outside fiat tolerance is refused.
    let off = order.amount + MicroUsdt::from(20_000);
    let miss = api.process_gateway_payment(&order.order_id, "gw-1", off).await.unwrap();
    assert!(matches!(miss, MatchOutcome::NoMatch));

    // The real callback credits, retries are idempotent.
    let hit = api.process_gateway_payment(&order.order_id, "gw-1", order.amount).await.unwrap();
    assert!(matches!(hit, MatchOutcome::Credited(_)));
    let again = api.process_gateway_payment(&order.order_id, "gw-1", order.amount).await.unwrap();
    assert!(matches!(again, MatchOutcome::AlreadyCredited(_)));
    assert_eq!(api.user_balance(501).await.unwrap().unwrap().balance, order.amount);
}

#[tokio::test]
async fn expiry_only_touches_pending_orders() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let stale = api
        .create_order(NewOrder::new(601, MicroUsdt::from_usdt(3), Currency::Usdt), Duration::seconds(-5))
        .await
        .unwrap();
    let paid = api
        .create_order(NewOrder::new(602, MicroUsdt::from_usdt(4), Currency::Usdt), Duration::seconds(-5))
        .await
        .unwrap();
    api.try_credit(&paid.order_id, "txid-ff01", paid.amount).await.unwrap();

    let expired = api.expire_due(Utc::now()).await.unwrap();
    let expired_ids: Vec<_> = expired.iter().map(|o| o.order_id.clone()).collect();
    assert!(expired_ids.contains(&stale.order_id));
    assert!(!expired_ids.contains(&paid.order_id), "a credited order must never expire");

    assert_eq!(api.fetch_order(&paid.order_id).await.unwrap().unwrap().status, OrderStatusType::Completed);
    assert_eq!(api.fetch_order(&stale.order_id).await.unwrap().unwrap().status, OrderStatusType::Expired);

    // And the mirror image: an expired order cannot be credited afterwards.
    let outcome = api.try_credit(&stale.order_id, "txid-ff02", stale.amount).await.unwrap();
    assert!(matches!(outcome, CreditOutcome::Stale(_)));
    assert!(api.user_balance(601).await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_orders_leave_the_matching_pool() {
    let db = new_ledger().await;
    let api = order_api(db.clone());
    let order = api.create_order(NewOrder::new(701, MicroUsdt::from_usdt(8), Currency::Usdt), EXPIRY).await.unwrap();
    assert!(api.cancel_order(&order.order_id).await.unwrap().is_some());
    // Cancelling again is a no-op.
    assert!(api.cancel_order(&order.order_id).await.unwrap().is_none());

    db.upsert_transfer(&transfer_event("txid-gg01", order.amount.value(), 4)).await.unwrap();
    assert!(matches!(api.process_transfer("txid-gg01", MATCH_WINDOW).await.unwrap(), MatchOutcome::NoMatch));
}
