//! Configuration
//!
//! CLI arguments and environment variable handling using clap for the audit
//! binary, plus library-level engine tuning.

use clap::Parser;
use std::time::Duration;

/// Anchorage - integrity verification and recovery engine
#[derive(Parser, Debug, Clone)]
#[command(name = "anchorage")]
#[command(about = "Integrity audit sweep for blockchain-anchored asset metadata")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "anchorage")]
    pub mongodb_db: String,

    /// Base URL of the anchor bridge service
    #[arg(long, env = "ANCHOR_URL", default_value = "http://localhost:8091")]
    pub anchor_url: String,

    /// Base URL of the content-store bridge service
    #[arg(long, env = "CONTENT_STORE_URL", default_value = "http://localhost:8092")]
    pub content_store_url: String,

    /// Adapter call timeout in milliseconds
    #[arg(long, env = "ADAPTER_TIMEOUT_MS", default_value = "30000")]
    pub adapter_timeout_ms: u64,

    /// Attempt automatic recovery when a sweep detects divergence
    #[arg(long, env = "AUTO_RECOVER", default_value = "true")]
    pub auto_recover: bool,

    /// Wallet address recorded as the actor for sweep-triggered recoveries
    #[arg(long, env = "SWEEP_ACTOR", default_value = "system:audit")]
    pub sweep_actor: String,

    /// Seconds between sweeps; 0 runs a single sweep and exits
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "0")]
    pub sweep_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            adapter_timeout: self.adapter_timeout(),
            ..EngineConfig::default()
        }
    }
}

/// Engine tuning for library embedders.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout applied to each anchor / content-store call
    pub adapter_timeout: Duration,
    /// Default history page size
    pub history_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(30),
            history_page_size: 50,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ADAPTER_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.adapter_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("HISTORY_PAGE_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                config.history_page_size = size;
            }
        }

        config
    }
}
