use chrono::Utc;
use log::*;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use usdt_payment_engine::{db_types::Order, events::EventProducers, OrderFlowApi, SqliteLedger};

/// Starts the expiry reaper: a fixed-interval sweep that transitions overdue pending orders to
/// Expired. The transition is conditional on the order still being pending, so the sweep can
/// never claw back an order the credit path just completed.
pub fn start_expiry_worker(
    db: SqliteLedger,
    producers: EventProducers,
    interval: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = OrderFlowApi::new(db, producers);
        info!("🕰️ Order expiry worker started. Sweeping every {interval:?}");
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // a closed channel means the server is gone; stop either way
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("🕰️ Expiry worker received shutdown signal");
                        break;
                    }
                },
                _ = timer.tick() => {
                    match api.expire_due(Utc::now()).await {
                        Ok(expired) if expired.is_empty() => trace!("🕰️ No orders due for expiry"),
                        Ok(expired) => {
                            info!("🕰️ {} orders expired", expired.len());
                            debug!("🕰️ Expired orders: {}", order_list(&expired));
                        },
                        Err(e) => error!("🕰️ Error running order expiry sweep: {e}"),
                    }
                },
            }
        }
        info!("🕰️ Expiry worker stopped");
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} user_id: {}", o.id, o.order_id, o.user_id))
        .collect::<Vec<String>>()
        .join(", ")
}
