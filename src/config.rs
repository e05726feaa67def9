use std::path::PathBuf;
use std::time::Duration;

use crate::models::SymbolPair;

/// First-run behavior when no sell reference exists yet.
///
/// The bot has never traded, so there is no anchor price to measure a dip
/// against. This is an explicit operator choice, not an inferred one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstBuyPolicy {
    /// Buy at the first observed price to establish a position.
    Immediate,
    /// Hold until a sell reference exists (i.e. wait for operator-seeded
    /// state or a reconciled position to produce one).
    Wait,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable '{0}' is not set or empty")]
    MissingVar(&'static str),
    #[error("environment variable '{0}' must be a valid number")]
    InvalidNumber(&'static str),
    #[error("{0}")]
    OutOfRange(String),
}

/// Runtime settings, loaded once at startup and immutable per run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_secret: String,
    pub pair: SymbolPair,
    /// Fractional drop from the last sell price that triggers a buy.
    pub buy_pct: f64,
    /// Fractional rise from the last buy price that triggers a sell.
    pub sell_pct: f64,
    /// Base-asset quantity per order.
    pub trade_amount: f64,
    pub check_interval: Duration,
    pub stop_loss_pct: Option<f64>,
    pub trailing_stop_pct: Option<f64>,
    /// Asset balance at or below this counts as holding nothing.
    pub dust_threshold: f64,
    pub first_buy_policy: FirstBuyPolicy,
    /// Re-reconcile against account balances every N ticks; 0 = startup only.
    pub reconcile_every_ticks: u32,
    pub state_file: PathBuf,
    pub advisor_enabled: bool,
    pub advisor_url: String,
    /// Simulated fills against in-memory balances instead of the live API.
    pub paper_mode: bool,
    pub paper_starting_cash: f64,
}

fn get_var(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(key)),
    }
}

fn get_f64(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        Err(_) => Ok(default),
    }
}

fn get_opt_f64(key: &'static str) -> Result<Option<f64>, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(key)),
        _ => Ok(None),
    }
}

fn get_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        Err(_) => Ok(default),
    }
}

fn get_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        Err(_) => Ok(default),
    }
}

fn get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// Credentials are required unless running in paper mode. Numeric
    /// ranges are validated eagerly; a violation halts startup before the
    /// loop ever runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let paper_mode = get_bool("PAPER_MODE", false);

        let (api_key, api_secret) = if paper_mode {
            (
                std::env::var("BINANCE_API_KEY").unwrap_or_default(),
                std::env::var("BINANCE_SECRET").unwrap_or_default(),
            )
        } else {
            (get_var("BINANCE_API_KEY")?, get_var("BINANCE_SECRET")?)
        };

        let symbol = std::env::var("SYMBOL").unwrap_or_else(|_| "BTC/USDT".to_string());
        let pair = SymbolPair::parse(&symbol).ok_or_else(|| {
            ConfigError::OutOfRange(format!(
                "SYMBOL must be in BASE/QUOTE form (e.g. BTC/USDT), got '{}'",
                symbol
            ))
        })?;

        // Thresholds are configured as percentages (1.0 = 1%) to match the
        // operator-facing convention; stored internally as fractions.
        let buy_pct = get_f64("BUY_THRESHOLD", 1.0)? / 100.0;
        let sell_pct = get_f64("SELL_THRESHOLD", 1.0)? / 100.0;
        let stop_loss_pct = get_opt_f64("STOP_LOSS_PERCENTAGE")?.map(|v| v / 100.0);
        let trailing_stop_pct = if get_bool("USE_TRAILING_STOP", false) {
            Some(get_f64("TRAILING_STOP_PERCENTAGE", 1.5)? / 100.0)
        } else {
            None
        };

        let trade_amount = get_f64("TRADE_AMOUNT", 0.001)?;
        let check_interval_secs = get_u64("CHECK_INTERVAL", 30)?;
        let dust_threshold = get_f64("DUST_THRESHOLD", 0.0001)?;
        let reconcile_every_ticks = get_u32("RECONCILE_EVERY_TICKS", 0)?;

        let first_buy_policy = match std::env::var("FIRST_BUY_POLICY")
            .unwrap_or_else(|_| "immediate".to_string())
            .to_lowercase()
            .as_str()
        {
            "immediate" => FirstBuyPolicy::Immediate,
            "wait" => FirstBuyPolicy::Wait,
            other => {
                return Err(ConfigError::OutOfRange(format!(
                    "FIRST_BUY_POLICY must be 'immediate' or 'wait', got '{}'",
                    other
                )))
            }
        };

        let settings = Self {
            api_key,
            api_secret,
            pair,
            buy_pct,
            sell_pct,
            trade_amount,
            check_interval: Duration::from_secs(check_interval_secs),
            stop_loss_pct,
            trailing_stop_pct,
            dust_threshold,
            first_buy_policy,
            reconcile_every_ticks,
            state_file: std::env::var("STATE_FILE")
                .unwrap_or_else(|_| "bot_state.json".to_string())
                .into(),
            advisor_enabled: get_bool("AI_ENABLED", false),
            advisor_url: std::env::var("AI_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            paper_mode,
            paper_starting_cash: get_f64("PAPER_STARTING_CASH", 10000.0)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
            if value <= 0.0 || value >= 1.0 {
                return Err(ConfigError::OutOfRange(format!(
                    "{} must be between 0 and 100 percent (exclusive), got {}%",
                    name,
                    value * 100.0
                )));
            }
            Ok(())
        }

        check_fraction("BUY_THRESHOLD", self.buy_pct)?;
        check_fraction("SELL_THRESHOLD", self.sell_pct)?;
        if let Some(v) = self.stop_loss_pct {
            check_fraction("STOP_LOSS_PERCENTAGE", v)?;
        }
        if let Some(v) = self.trailing_stop_pct {
            check_fraction("TRAILING_STOP_PERCENTAGE", v)?;
        }

        if self.trade_amount <= 0.0 {
            return Err(ConfigError::OutOfRange(
                "TRADE_AMOUNT must be positive".to_string(),
            ));
        }
        if self.check_interval < Duration::from_secs(1) {
            return Err(ConfigError::OutOfRange(
                "CHECK_INTERVAL must be at least 1 second".to_string(),
            ));
        }
        if self.dust_threshold < 0.0 {
            return Err(ConfigError::OutOfRange(
                "DUST_THRESHOLD must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
