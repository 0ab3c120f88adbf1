use crate::domain::services::bracket::{BracketPolicy, RetryPolicy};
use crate::domain::services::entry_controller::EntryPolicy;
use crate::domain::services::position_manager::ManagementPolicy;
use crate::domain::services::trailing::TrailingTunables;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Full trading configuration: symbols, risk policy, bracket policy,
/// trailing tunables and scheduler intervals.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub database_url: String,

    // Entry / sizing
    pub base_risk_pct: f64,
    pub min_leverage: f64,
    pub max_leverage: f64,
    pub min_confidence_threshold: f64,

    // Bracket policy
    pub stop_atr_mult: f64,
    pub reward_risk_ratio: f64,
    pub min_stop_pct: f64,
    pub default_tp_pct: f64,
    pub order_retry_attempts: u32,
    pub order_retry_delay_ms: u64,

    // Trailing / management
    pub trail_atr_factor: f64,
    pub tp_atr_factor: f64,
    pub step_threshold: f64,
    pub clamp_pct: f64,
    pub amend_epsilon: f64,
    pub adverse_close_window: usize,
    pub amend_pause_ms: u64,

    // Scheduling
    pub entry_interval_secs: u64,
    pub manage_interval_secs: u64,
    pub reconcile_lookback_days: i64,

    // Paper session (demo mode)
    pub paper_initial_balance: f64,
    pub paper_start_price: f64,
    pub paper_seed: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            database_url: "sqlite://data/ratel.db".to_string(),

            base_risk_pct: 0.01,
            min_leverage: 2.0,
            max_leverage: 25.0,
            min_confidence_threshold: 0.7,

            stop_atr_mult: 1.5,
            reward_risk_ratio: 2.0,
            min_stop_pct: 0.005,
            default_tp_pct: 0.10,
            order_retry_attempts: 3,
            order_retry_delay_ms: 1_000,

            trail_atr_factor: 1.0,
            tp_atr_factor: 2.0,
            step_threshold: 0.3,
            clamp_pct: 0.001,
            amend_epsilon: 5e-9,
            adverse_close_window: 3,
            amend_pause_ms: 300,

            entry_interval_secs: 5,
            manage_interval_secs: 2,
            reconcile_lookback_days: 30,

            paper_initial_balance: 10_000.0,
            paper_start_price: 100.0,
            paper_seed: 7,
        }
    }
}

impl TradingConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults with a warning on anything unparseable.
    pub fn from_env() -> TradingConfig {
        let mut config = TradingConfig::default();

        if let Ok(symbols) = std::env::var("SYMBOLS") {
            let parsed: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parsed.is_empty() {
                warn!("SYMBOLS is set but empty; keeping defaults");
            } else {
                config.symbols = parsed;
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        env_parse("BASE_RISK_PCT", &mut config.base_risk_pct);
        env_parse("MIN_LEVERAGE", &mut config.min_leverage);
        env_parse("MAX_LEVERAGE", &mut config.max_leverage);
        env_parse("MIN_CONFIDENCE_THRESHOLD", &mut config.min_confidence_threshold);

        env_parse("STOP_ATR_MULT", &mut config.stop_atr_mult);
        env_parse("RR_RATIO", &mut config.reward_risk_ratio);
        env_parse("MIN_SL_PERCENTAGE", &mut config.min_stop_pct);
        env_parse("DEFAULT_TP_PERCENTAGE", &mut config.default_tp_pct);
        env_parse("ORDER_RETRY_ATTEMPTS", &mut config.order_retry_attempts);
        env_parse("ORDER_RETRY_DELAY_MS", &mut config.order_retry_delay_ms);

        env_parse("TRAIL_ATR_FACTOR", &mut config.trail_atr_factor);
        env_parse("TP_ATR_FACTOR", &mut config.tp_atr_factor);
        env_parse("STEP_THRESHOLD", &mut config.step_threshold);
        env_parse("CLAMP_PCT", &mut config.clamp_pct);
        env_parse("AMEND_EPSILON", &mut config.amend_epsilon);
        env_parse("ADVERSE_CLOSE_EXIT", &mut config.adverse_close_window);
        env_parse("AMEND_PAUSE_MS", &mut config.amend_pause_ms);

        env_parse("ENTRY_INTERVAL_SECS", &mut config.entry_interval_secs);
        env_parse("MANAGE_INTERVAL_SECS", &mut config.manage_interval_secs);
        env_parse("RECONCILE_LOOKBACK_DAYS", &mut config.reconcile_lookback_days);

        env_parse("PAPER_INITIAL_BALANCE", &mut config.paper_initial_balance);
        env_parse("PAPER_START_PRICE", &mut config.paper_start_price);
        env_parse("PAPER_SEED", &mut config.paper_seed);

        config
    }

    pub fn entry_policy(&self) -> EntryPolicy {
        EntryPolicy {
            risk_pct: self.base_risk_pct,
            min_confidence: self.min_confidence_threshold,
            min_leverage: self.min_leverage,
            max_leverage: self.max_leverage,
        }
    }

    pub fn bracket_policy(&self) -> BracketPolicy {
        BracketPolicy {
            stop_atr_mult: self.stop_atr_mult,
            reward_risk_ratio: self.reward_risk_ratio,
            min_stop_pct: self.min_stop_pct,
            default_tp_pct: self.default_tp_pct,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.order_retry_attempts,
            delay: Duration::from_millis(self.order_retry_delay_ms),
        }
    }

    pub fn trailing_tunables(&self) -> TrailingTunables {
        TrailingTunables {
            trail_atr_factor: self.trail_atr_factor,
            tp_atr_factor: self.tp_atr_factor,
            step_threshold: self.step_threshold,
            clamp_pct: self.clamp_pct,
        }
    }

    pub fn management_policy(&self) -> ManagementPolicy {
        ManagementPolicy {
            adverse_close_window: self.adverse_close_window,
            amend_epsilon: self.amend_epsilon,
            amend_pause: Duration::from_millis(self.amend_pause_ms),
            trailing: self.trailing_tunables(),
        }
    }
}

/// Overwrite `target` from an environment variable when present and
/// parseable; warn and keep the default otherwise.
fn env_parse<T>(name: &str, target: &mut T)
where
    T: FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => warn!("Failed to parse {name}='{raw}': {e}, using default {target}"),
        }
    }
}
