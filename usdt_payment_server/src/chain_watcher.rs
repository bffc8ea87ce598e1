//! The chain watcher: a supervised poll loop that mirrors the TRC20 transfer feed into the
//! ledger and drives matured transfers through the matching path.
//!
//! Transfers below the configured confirmation depth are deferred with no state change; they
//! reappear on a later poll with a deeper confirmation count. Unmatched transfers are preserved
//! and re-examined on every poll within the lookback window, so an order created shortly after
//! its payment arrived is still credited without admin intervention.
use chrono::Utc;
use log::*;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use usdt_payment_engine::{
    db_types::TransferStatus,
    events::EventProducers,
    InsertTransferResult,
    LedgerDatabase,
    MatchOutcome,
    OrderFlowApi,
    SqliteLedger,
};

use crate::{
    config::WatcherConfig,
    integrations::{FeedError, TransferFeed, TronGridFeed},
};

/// Starts the watcher task. Send `true` through the shutdown channel to stop it; the current
/// iteration finishes first, so a credit is never interrupted halfway.
pub fn start_chain_watcher(
    db: SqliteLedger,
    producers: EventProducers,
    feed: TronGridFeed,
    config: WatcherConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OrderFlowApi::new(db, producers);
        info!("⛓️ Chain watcher started. Polling every {:?}", config.poll_interval);
        let mut timer = tokio::time::interval(config.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // a closed channel means the server is gone; stop either way
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("⛓️ Chain watcher received shutdown signal");
                        break;
                    }
                },
                _ = timer.tick() => {
                    match poll_once(&api, &feed, &config).await {
                        Ok(summary) => {
                            if summary.observed > 0 {
                                info!(
                                    "⛓️ Poll complete. {} observed, {} new, {} credited, {} deferred",
                                    summary.observed, summary.mirrored, summary.credited, summary.deferred
                                );
                            }
                        },
                        Err(e) => error!("⛓️ Poll failed: {e}"),
                    }
                },
            }
        }
        info!("⛓️ Chain watcher stopped");
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PollSummary {
    pub observed: usize,
    pub mirrored: usize,
    pub credited: usize,
    pub deferred: usize,
    pub unmatched: usize,
}

/// One poll iteration: fetch feed events since the lookback horizon, mirror them, and run every
/// sufficiently confirmed, not-yet-credited transfer through the matching path.
pub async fn poll_once<B, F>(
    api: &OrderFlowApi<B>,
    feed: &F,
    config: &WatcherConfig,
) -> Result<PollSummary, FeedError>
where
    B: LedgerDatabase,
    F: TransferFeed,
{
    let lookback = Utc::now() - config.match_window;
    let events = feed.fetch_transfers(lookback).await?;
    let mut summary = PollSummary { observed: events.len(), ..Default::default() };
    for event in events {
        if !event.to_address.eq_ignore_ascii_case(&config.deposit_address) {
            trace!("⛓️ Ignoring transfer {} to foreign address {}", event.txid, event.to_address);
            continue;
        }
        match api.db().upsert_transfer(&event).await {
            Ok(InsertTransferResult::Inserted) => {
                info!("⛓️ Mirrored new transfer {} of {}", event.txid, event.amount());
                summary.mirrored += 1;
            },
            Ok(InsertTransferResult::AlreadyExists) => {},
            Err(e) => {
                error!("⛓️ Could not mirror transfer {}: {e}", event.txid);
                continue;
            },
        }
        if event.confirmations < config.min_confirmations {
            debug!(
                "⛓️ Deferring transfer {}: {}/{} confirmations",
                event.txid, event.confirmations, config.min_confirmations
            );
            summary.deferred += 1;
            continue;
        }
        // Skip transfers that already went through the credit path.
        match api.db().fetch_transfer(&event.txid).await {
            Ok(Some(t)) if t.status == TransferStatus::Credited => continue,
            Ok(_) => {},
            Err(e) => {
                error!("⛓️ Could not look up transfer {}: {e}", event.txid);
                continue;
            },
        }
        match api.process_transfer(&event.txid, config.match_window).await {
            Ok(MatchOutcome::Credited(order)) => {
                info!("⛓️ Transfer {} credited order {}", event.txid, order.order_id);
                summary.credited += 1;
            },
            Ok(MatchOutcome::AlreadyCredited(_)) => {},
            Ok(MatchOutcome::NoMatch) => summary.unmatched += 1,
            Err(e) => error!("⛓️ Error processing transfer {}: {e}", event.txid),
        }
    }
    Ok(summary)
}
