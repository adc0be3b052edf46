//! Process configuration: CLI surface (spec.md §6) plus component tunables.
//! Env-driven via `clap`'s derive + `env` feature, dotenv loaded first.

use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl std::str::FromStr for Network {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

/// `hive --port 8080 --trading BTC-USD --private-key ... --network testnet`
#[derive(Parser, Debug, Clone)]
#[command(name = "hive", about = "Multi-strategy trading orchestrator")]
pub struct CliArgs {
    #[arg(long, env = "HIVE_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "HIVE_TRADING")]
    pub trading: Option<String>,

    #[arg(long, env = "HIVE_WALLET_ADDRESS")]
    pub wallet_address: Option<String>,

    #[arg(long, env = "HIVE_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[arg(long, env = "HIVE_NETWORK", default_value = "testnet")]
    pub network: Network,

    #[arg(long, env = "HIVE_DASHBOARD_URL")]
    pub dashboard_url: Option<String>,

    #[arg(long, env = "HIVE_MONITOR", default_value_t = false)]
    pub monitor: bool,

    #[arg(long, env = "HIVE_DATABASE_PATH", default_value = "./hive.db")]
    pub database_path: String,

    #[arg(long, env = "HIVE_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    #[arg(long, env = "HIVE_REST_BASE_URL", default_value = "https://api.hyperliquid.xyz")]
    pub rest_base_url: String,

    #[arg(long, env = "HIVE_WS_URL", default_value = "wss://api.hyperliquid.xyz/ws")]
    pub ws_url: String,

    #[arg(long, env = "HIVE_BOT_ID", default_value = "hive-0")]
    pub bot_id: String,

    #[arg(long, env = "HIVE_TICK_SIZE", default_value_t = 0.01)]
    pub tick_size: f64,

    #[arg(long, env = "HIVE_LOT_SIZE", default_value_t = 0.001)]
    pub lot_size: f64,
}

/// Process exit codes (spec.md §6).
pub mod exit_code {
    pub const CLEAN: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const RUNTIME_ERROR: i32 = 2;
}

/// Tunables for components D/E/F/H — defaults per spec.md §4–§5.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub tick_cadence: Duration,
    pub tick_soft_budget: Duration,
    pub book_staleness_threshold: Duration,
    pub unsubscribe_linger: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub http_request_timeout: Duration,
    pub order_ack_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub bot_offline_after: Duration,
    pub shutdown_grace_window: Duration,
    pub close_cancel_deadline: Duration,
    pub close_global_deadline: Duration,
    pub gateway_global_orders_per_sec: u32,
    pub auth_timestamp_freshness_window: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_cadence: Duration::from_secs(1),
            tick_soft_budget: Duration::from_millis(20),
            book_staleness_threshold: Duration::from_secs(5),
            unsubscribe_linger: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
            http_request_timeout: Duration::from_secs(10),
            order_ack_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            bot_offline_after: Duration::from_secs(120),
            shutdown_grace_window: Duration::from_secs(10),
            close_cancel_deadline: Duration::from_secs(30),
            close_global_deadline: Duration::from_secs(30),
            gateway_global_orders_per_sec: 20,
            // Open question: timestamp freshness is a deployment toggle; disabled by default.
            auth_timestamp_freshness_window: None,
        }
    }
}
