use std::env;

use chrono::Duration;
use log::*;
use upg_common::{MicroUsdt, Secret};

const DEFAULT_UPG_HOST: &str = "127.0.0.1";
const DEFAULT_UPG_PORT: u16 = 8380;
const DEFAULT_ORDER_EXPIRY: Duration = Duration::minutes(10);
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_MIN_CONFIRMATIONS: i64 = 2;
const DEFAULT_MATCH_WINDOW: Duration = Duration::minutes(60);
/// 1 USDT flat withdrawal fee unless configured otherwise.
const DEFAULT_WITHDRAWAL_FEE: i64 = 1_000_000;
const DEFAULT_FEED_URL: &str = "https://api.trongrid.io";
const DEFAULT_USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Bearer token protecting the `/admin` scope.
    pub admin_token: Secret<String>,
    /// The shared key the fiat gateway signs callbacks with.
    pub gateway_key: Secret<String>,
    /// How long a pending order waits for a payment before it expires.
    pub order_expiry: Duration,
    /// How often the expiry reaper sweeps.
    pub reaper_interval: std::time::Duration,
    /// Flat fee recorded on withdrawal requests.
    pub withdrawal_fee: MicroUsdt,
    pub watcher: WatcherConfig,
}

#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// The deposit address incoming USDT transfers are filtered to.
    pub deposit_address: String,
    /// The token contract the feed is filtered to.
    pub usdt_contract: String,
    /// Base URL of the transfer feed.
    pub feed_url: String,
    /// Optional feed API key.
    pub feed_api_key: Secret<String>,
    pub poll_interval: std::time::Duration,
    /// Transfers below this confirmation depth are deferred to a later poll.
    pub min_confirmations: i64,
    /// Half-width of the order-creation window a transfer is matched against.
    pub match_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_UPG_HOST.to_string(),
            port: DEFAULT_UPG_PORT,
            database_url: String::default(),
            admin_token: Secret::default(),
            gateway_key: Secret::default(),
            order_expiry: DEFAULT_ORDER_EXPIRY,
            reaper_interval: std::time::Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            withdrawal_fee: MicroUsdt::from(DEFAULT_WITHDRAWAL_FEE),
            watcher: WatcherConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            deposit_address: String::default(),
            usdt_contract: DEFAULT_USDT_CONTRACT.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_api_key: Secret::default(),
            poll_interval: std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            match_window: DEFAULT_MATCH_WINDOW,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("UPG_HOST").ok().unwrap_or_else(|| DEFAULT_UPG_HOST.into());
        let port = env::var("UPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for UPG_PORT. {e} Using the default, {DEFAULT_UPG_PORT}, instead."
                    );
                    DEFAULT_UPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_UPG_PORT);
        let database_url = env::var("UPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ UPG_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let admin_token = env::var("UPG_ADMIN_TOKEN").map(Secret::new).unwrap_or_else(|_| {
            warn!("🚨️ UPG_ADMIN_TOKEN is not set. The admin API will reject every request.");
            Secret::default()
        });
        let gateway_key = env::var("UPG_GATEWAY_KEY").map(Secret::new).unwrap_or_else(|_| {
            warn!("🚨️ UPG_GATEWAY_KEY is not set. Fiat gateway callbacks will fail signature verification.");
            Secret::default()
        });
        let order_expiry = duration_from_env("UPG_ORDER_EXPIRY_MINUTES", DEFAULT_ORDER_EXPIRY, Duration::minutes);
        let reaper_interval = std::time::Duration::from_secs(
            u64_from_env("UPG_REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS),
        );
        let withdrawal_fee = env::var("UPG_WITHDRAWAL_FEE")
            .ok()
            .and_then(|s| {
                s.parse::<MicroUsdt>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for UPG_WITHDRAWAL_FEE. {e}"))
                    .ok()
            })
            .unwrap_or(MicroUsdt::from(DEFAULT_WITHDRAWAL_FEE));
        Self {
            host,
            port,
            database_url,
            admin_token,
            gateway_key,
            order_expiry,
            reaper_interval,
            withdrawal_fee,
            watcher: WatcherConfig::from_env_or_default(),
        }
    }
}

impl WatcherConfig {
    pub fn from_env_or_default() -> Self {
        let deposit_address = env::var("UPG_DEPOSIT_ADDRESS").ok().unwrap_or_else(|| {
            error!("🪛️ UPG_DEPOSIT_ADDRESS is not set. The chain watcher will not match any transfers.");
            String::default()
        });
        let usdt_contract = env::var("UPG_USDT_CONTRACT").ok().unwrap_or_else(|| {
            info!("🪛️ UPG_USDT_CONTRACT is not set. Using the mainnet USDT contract.");
            DEFAULT_USDT_CONTRACT.to_string()
        });
        let feed_url = env::var("UPG_FEED_URL").ok().unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
        let feed_api_key = env::var("UPG_FEED_API_KEY").map(Secret::new).unwrap_or_default();
        let poll_interval =
            std::time::Duration::from_secs(u64_from_env("UPG_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS));
        let min_confirmations = env::var("UPG_MIN_CONFIRMATIONS")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for UPG_MIN_CONFIRMATIONS. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_MIN_CONFIRMATIONS);
        let match_window = duration_from_env("UPG_MATCH_WINDOW_MINUTES", DEFAULT_MATCH_WINDOW, Duration::minutes);
        Self { deposit_address, usdt_contract, feed_url, feed_api_key, poll_interval, min_confirmations, match_window }
    }
}

fn u64_from_env(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}")).ok())
        .unwrap_or(default)
}

fn duration_from_env(var: &str, default: Duration, unit: fn(i64) -> Duration) -> Duration {
    env::var(var)
        .map_err(|_| {
            info!("🪛️ {var} is not set. Using the default value of {} minutes.", default.num_minutes());
        })
        .and_then(|s| {
            s.parse::<i64>().map(unit).map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_UPG_PORT);
        assert_eq!(config.order_expiry, Duration::minutes(10));
        assert_eq!(config.watcher.min_confirmations, 2);
        assert_eq!(config.withdrawal_fee, MicroUsdt::from_usdt(1));
    }
}
