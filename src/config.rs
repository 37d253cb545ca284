use std::collections::HashMap;

use serde::Deserialize;

/// Trading thresholds that have a well-known process-wide default but can be
/// overridden per market. Grounded on `configuration.py`'s `TradingConfig`; only the
/// two fields the source actually exposes through `get_*_with_gb` are overridable.
#[derive(Debug, Clone, Copy)]
pub struct TradingThresholds {
    pub sell_only_threshold: f64,
    pub min_price_limit: f64,
    pub max_price_limit: f64,
    pub price_precision_limit: f64,
    pub buy_price_diff_threshold: f64,
    pub sell_price_diff_threshold: f64,
    pub size_diff_percentage: f64,
    pub min_merge_size: f64,
    pub market_depth_calc_pct: f64,
    pub market_depth_calc_levels: usize,
    pub risk_aversion: f64,
    pub time_to_horizon_hours: f64,
    pub reward_skew_factor: f64,
    pub order_book_depth_skew_factor: f64,
    pub volatility_exit_threshold: f64,
    pub stop_loss_threshold: f64,
    pub stop_loss_spread_threshold: f64,
    pub stop_loss_sleep_period_mins: i64,
}

impl Default for TradingThresholds {
    fn default() -> Self {
        Self {
            sell_only_threshold: 0.8,
            min_price_limit: 0.1,
            max_price_limit: 0.9,
            price_precision_limit: 0.99,
            buy_price_diff_threshold: 0.001,
            sell_price_diff_threshold: 0.001,
            size_diff_percentage: 0.1,
            min_merge_size: 20.0,
            market_depth_calc_pct: 0.6,
            market_depth_calc_levels: 10,
            risk_aversion: 0.45,
            time_to_horizon_hours: 24.0,
            reward_skew_factor: 0.15,
            order_book_depth_skew_factor: 0.025,
            volatility_exit_threshold: 150.0,
            stop_loss_threshold: -4.0,
            stop_loss_spread_threshold: 0.04,
            stop_loss_sleep_period_mins: 90,
        }
    }
}

/// Per-market override entry. Only fields present are overridden; absent fields fall
/// back to the process default, matching the `gb.get_feature_value(name, default)`
/// semantics of the GrowthBook-backed source.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MarketOverride {
    pub risk_aversion: Option<f64>,
    pub order_book_depth_skew_factor: Option<f64>,
}

/// Stand-in for the GrowthBook-backed feature-flag service the source consults. The
/// real service is out of scope here; this loads a flat JSON map once at
/// startup from `overrides.json` (configurable path), keyed by `condition_id`. A
/// missing file is not an error — it just means no market has overrides.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    by_market: HashMap<String, MarketOverride>,
}

impl OverrideTable {
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(by_market) => OverrideTable { by_market },
                Err(e) => {
                    eprintln!("[CONFIG] failed to parse override file {path}: {e}, using empty table");
                    OverrideTable::default()
                }
            },
            Err(_) => OverrideTable::default(),
        }
    }

    pub fn risk_aversion(&self, condition_id: &str, thresholds: &TradingThresholds) -> f64 {
        self.by_market
            .get(condition_id)
            .and_then(|o| o.risk_aversion)
            .unwrap_or(thresholds.risk_aversion)
    }

    pub fn order_book_depth_skew_factor(&self, condition_id: &str, thresholds: &TradingThresholds) -> f64 {
        self.by_market
            .get(condition_id)
            .and_then(|o| o.order_book_depth_skew_factor)
            .unwrap_or(thresholds.order_book_depth_skew_factor)
    }
}

/// Process configuration loaded from environment variables, following this codebase's
/// `Config::from_env` convention.
#[derive(Clone)]
pub struct Config {
    pub polymarket_clob_ws: String,
    pub polymarket_user_ws: String,
    pub gamma_api_url: String,

    pub polymarket_private_key: Option<String>,
    pub polymarket_funder_address: Option<String>,

    pub thresholds: TradingThresholds,
    pub overrides: OverrideTable,

    /// Best-bid probe size (no rationale recoverable from the source; kept as a parameter).
    pub best_bid_probe_size: f64,
    pub best_bid_probe_retry_size: f64,

    pub position_update_interval_secs: u64,
    pub market_update_interval_secs: u64,
    pub stale_trade_timeout_secs: i64,
    pub http_timeout_secs: u64,

    pub risk_journal_dir: String,

    /// Path to the flat JSON list of candidate markets; see `markets::MarketSet`.
    pub markets_file: String,

    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            polymarket_clob_ws: std::env::var("PM_CLOB_WS")
                .unwrap_or_else(|_| "wss://ws-subscriptions-clob.polymarket.com/ws/market".into()),
            polymarket_user_ws: std::env::var("PM_USER_WS")
                .unwrap_or_else(|_| "wss://ws-subscriptions-clob.polymarket.com/ws/user".into()),
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| "https://gamma-api.polymarket.com".into()),
            polymarket_private_key: std::env::var("POLYMARKET_PRIVATE_KEY").ok(),
            polymarket_funder_address: std::env::var("POLYMARKET_FUNDER_ADDRESS").ok(),
            thresholds: TradingThresholds::default(),
            overrides: OverrideTable::load(
                &std::env::var("OVERRIDES_FILE").unwrap_or_else(|_| "overrides.json".into()),
            ),
            best_bid_probe_size: std::env::var("BEST_BID_PROBE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100.0),
            best_bid_probe_retry_size: std::env::var("BEST_BID_PROBE_RETRY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20.0),
            position_update_interval_secs: std::env::var("POSITION_UPDATE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            market_update_interval_secs: std::env::var("MARKET_UPDATE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            stale_trade_timeout_secs: std::env::var("STALE_TRADE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            risk_journal_dir: std::env::var("RISK_JOURNAL_DIR").unwrap_or_else(|_| "positions".into()),
            markets_file: std::env::var("MARKETS_FILE").unwrap_or_else(|_| "markets.json".into()),
            dry_run: std::env::var("DRY_RUN")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(true),
        }
    }
}
