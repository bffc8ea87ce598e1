// not every test file uses every helper
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use upg_common::Secret;
use usdt_payment_server::{
    config::{ServerConfig, WatcherConfig},
    integrations::{FeedError, TransferFeed},
};
use usdt_payment_engine::{
    db_types::ChainTransferEvent,
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    OrderFlowApi,
    SqliteLedger,
};

pub const DEPOSIT_ADDRESS: &str = "TDepositAddress111111111111111111";
pub const GATEWAY_KEY: &str = "test-gateway-key";

pub async fn new_ledger() -> SqliteLedger {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteLedger::new_with_url(&url, 5).await.expect("Error creating connection to test database")
}

pub fn order_api(db: SqliteLedger) -> OrderFlowApi<SqliteLedger> {
    OrderFlowApi::new(db, EventProducers::default())
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        gateway_key: Secret::new(GATEWAY_KEY.to_string()),
        watcher: test_watcher_config(),
        ..Default::default()
    }
}

pub fn test_watcher_config() -> WatcherConfig {
    WatcherConfig { deposit_address: DEPOSIT_ADDRESS.to_string(), min_confirmations: 2, ..Default::default() }
}

pub fn transfer_event(txid: &str, sun: i64, confirmations: i64) -> ChainTransferEvent {
    ChainTransferEvent {
        txid: txid.to_string(),
        to_address: DEPOSIT_ADDRESS.to_string(),
        value_sun: sun,
        block_number: 64_000_000,
        confirmations,
        event_time: Utc::now(),
    }
}

/// An in-memory feed the tests control directly.
#[derive(Clone, Default)]
pub struct MockFeed {
    events: Arc<Mutex<Vec<ChainTransferEvent>>>,
}

impl MockFeed {
    pub fn push(&self, event: ChainTransferEvent) {
        self.events.lock().unwrap().push(event);
    }

    /// Replaces the confirmation count on a queued event, as a later poll of a real feed would.
    pub fn set_confirmations(&self, txid: &str, confirmations: i64) {
        let mut events = self.events.lock().unwrap();
        for event in events.iter_mut().filter(|e| e.txid == txid) {
            event.confirmations = confirmations;
        }
    }
}

impl TransferFeed for MockFeed {
    async fn fetch_transfers(&self, _since: DateTime<Utc>) -> Result<Vec<ChainTransferEvent>, FeedError> {
        Ok(self.events.lock().unwrap().clone())
    }
}
