//! The TRC20 transfer feed consumed by the chain watcher.
//!
//! [`TransferFeed`] is the seam the watcher polls through; [`TronGridFeed`] is the production
//! implementation against a TronGrid-style HTTP API, filtered to the configured deposit address
//! and token contract. All requests go through a bounded retry with backoff, so a rate-limited
//! or briefly unavailable feed degrades to a skipped poll instead of an error cascade.
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    RequestBuilder,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use usdt_payment_engine::db_types::ChainTransferEvent;

use crate::config::WatcherConfig;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const PAGE_LIMIT: u32 = 200;

/// A source of TRC20 transfer events for the deposit address.
#[allow(async_fn_in_trait)]
pub trait TransferFeed: Clone {
    /// All transfers to the deposit address observed since the given time, with their current
    /// confirmation depth. The same transfer may be (and will be) reported on several polls;
    /// consumers deduplicate by txid.
    async fn fetch_transfers(&self, since: DateTime<Utc>) -> Result<Vec<ChainTransferEvent>, FeedError>;
}

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Could not initialize the feed client. {0}")]
    Initialization(String),
    #[error("The transfer feed request failed. {0}")]
    Http(String),
    #[error("The transfer feed returned an unusable response. {0}")]
    InvalidResponse(String),
}

//------------------------------------------   TronGridFeed   --------------------------------------------------------
#[derive(Clone)]
pub struct TronGridFeed {
    client: Client,
    config: WatcherConfig,
}

impl TronGridFeed {
    pub fn new(config: WatcherConfig) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        let api_key = config.feed_api_key.reveal();
        if !api_key.is_empty() {
            let val =
                HeaderValue::from_str(api_key.as_str()).map_err(|e| FeedError::Initialization(e.to_string()))?;
            headers.insert("TRON-PRO-API-KEY", val);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FeedError::Initialization(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// The current chain tip, used to derive confirmation depths.
    async fn latest_block(&self) -> Result<i64, FeedError> {
        let url = format!("{}/wallet/getnowblock", self.config.feed_url);
        let block: NowBlock = self.send_with_retry(self.client.post(&url)).await?;
        Ok(block.block_header.raw_data.number)
    }

    /// The block a transaction landed in.
    async fn block_of(&self, txid: &str) -> Result<Option<i64>, FeedError> {
        let url = format!("{}/wallet/gettransactioninfobyid", self.config.feed_url);
        let info: TransactionInfo =
            self.send_with_retry(self.client.post(&url).json(&serde_json::json!({ "value": txid }))).await?;
        Ok(info.block_number)
    }

    async fn send_with_retry<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, FeedError> {
        let mut delay = BACKOFF_BASE;
        for attempt in 1..=MAX_ATTEMPTS {
            let req = req
                .try_clone()
                .ok_or_else(|| FeedError::Http("Request cannot be retried".to_string()))?;
            match req.send().await {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS || resp.status().is_server_error() => {
                    warn!("⛓️ Feed returned {} on attempt {attempt}. Backing off {delay:?}", resp.status());
                },
                Ok(resp) if resp.status().is_success() => {
                    return resp.json::<T>().await.map_err(|e| FeedError::InvalidResponse(e.to_string()));
                },
                Ok(resp) => return Err(FeedError::Http(format!("Feed returned status {}", resp.status()))),
                Err(e) => warn!("⛓️ Feed request failed on attempt {attempt}: {e}"),
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
        Err(FeedError::Http(format!("Feed request failed after {MAX_ATTEMPTS} attempts")))
    }
}

impl TransferFeed for TronGridFeed {
    async fn fetch_transfers(&self, since: DateTime<Utc>) -> Result<Vec<ChainTransferEvent>, FeedError> {
        let tip = self.latest_block().await?;
        let url = format!("{}/v1/accounts/{}/transactions/trc20", self.config.feed_url, self.config.deposit_address);
        let min_timestamp = since.timestamp_millis().to_string();
        let limit = PAGE_LIMIT.to_string();
        let req = self.client.get(&url).query(&[
            ("contract_address", self.config.usdt_contract.as_str()),
            ("only_to", "true"),
            ("only_confirmed", "true"),
            ("min_timestamp", min_timestamp.as_str()),
            ("limit", limit.as_str()),
        ]);
        let page: Trc20Page = self.send_with_retry(req).await?;
        trace!("⛓️ Feed returned {} transfer records", page.data.len());

        let mut events = Vec::with_capacity(page.data.len());
        for record in page.data {
            if !record.token_info.address.eq_ignore_ascii_case(&self.config.usdt_contract) {
                debug!("⛓️ Skipping transfer {} of foreign token {}", record.transaction_id, record.token_info.address);
                continue;
            }
            let value_sun: i64 = match record.value.parse() {
                Ok(v) => v,
                Err(e) => {
                    warn!("⛓️ Transfer {} carries unparsable value {:?}: {e}", record.transaction_id, record.value);
                    continue;
                },
            };
            let block_number = match self.block_of(&record.transaction_id).await? {
                Some(n) => n,
                None => {
                    // Not in a block yet; report zero confirmations so the watcher defers it.
                    debug!("⛓️ Transfer {} is not in a block yet", record.transaction_id);
                    0
                },
            };
            let confirmations = if block_number == 0 { 0 } else { (tip - block_number + 1).max(0) };
            let event_time = Utc
                .timestamp_millis_opt(record.block_timestamp)
                .single()
                .unwrap_or_else(Utc::now);
            events.push(ChainTransferEvent {
                txid: record.transaction_id,
                to_address: record.to,
                value_sun,
                block_number,
                confirmations,
                event_time,
            });
        }
        Ok(events)
    }
}

//---------------------------------------   Feed wire records   ------------------------------------------------------
#[derive(Debug, Deserialize)]
struct Trc20Page {
    #[serde(default)]
    data: Vec<Trc20Record>,
}

#[derive(Debug, Deserialize)]
struct Trc20Record {
    transaction_id: String,
    to: String,
    value: String,
    block_timestamp: i64,
    token_info: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    address: String,
}

#[derive(Debug, Deserialize)]
struct NowBlock {
    block_header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    raw_data: BlockRawData,
}

#[derive(Debug, Deserialize)]
struct BlockRawData {
    number: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionInfo {
    #[serde(default)]
    block_number: Option<i64>,
}
