// not every test file uses every helper
#![allow(dead_code)]

use chrono::{Duration, Utc};
use usdt_payment_engine::{
    db_types::ChainTransferEvent,
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    AgentApi,
    OrderFlowApi,
    RescanApi,
    SqliteLedger,
};

pub const EXPIRY: Duration = Duration::minutes(10);
pub const MATCH_WINDOW: Duration = Duration::minutes(60);

/// A fresh, migrated ledger on its own database file.
pub async fn new_ledger() -> SqliteLedger {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteLedger::new_with_url(&url, 5).await.expect("Error creating connection to test database")
}

pub fn order_api(db: SqliteLedger) -> OrderFlowApi<SqliteLedger> {
    OrderFlowApi::new(db, EventProducers::default())
}

pub fn agent_api(db: SqliteLedger) -> AgentApi<SqliteLedger> {
    AgentApi::new(db, EventProducers::default())
}

pub fn rescan_api(db: SqliteLedger) -> RescanApi<SqliteLedger> {
    RescanApi::new(order_api(db))
}

/// A feed event for `sun` micro-units landing on the deposit address right now.
pub fn transfer_event(txid: &str, sun: i64, confirmations: i64) -> ChainTransferEvent {
    ChainTransferEvent {
        txid: txid.to_string(),
        to_address: "TDepositAddress111111111111111111".to_string(),
        value_sun: sun,
        block_number: 64_000_000,
        confirmations,
        event_time: Utc::now(),
    }
}
