use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the two holdings the bot currently considers itself in.
///
/// Exactly one side holds at any instant; it is the sole discriminator
/// for which signal direction is active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    /// Holding the quote currency (e.g. USDT), waiting to buy.
    Cash,
    /// Holding the base asset (e.g. BTC), waiting to sell.
    Asset,
}

impl Default for PositionSide {
    fn default() -> Self {
        PositionSide::Cash
    }
}

/// Proposed trading action for a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// Order side on the exchange. Separate from `Action` because `Hold`
/// never reaches the order path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Outcome classification for a sell that closes a buy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeResult {
    Win,
    Loss,
}

/// One executed trade, append-only, ordered by execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub amount: f64,
    /// Set only on a sell that closes a position.
    pub profit_pct: Option<f64>,
    /// Set only on a sell that closes a position.
    pub result: Option<TradeResult>,
}

/// Account balances for the traded pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balances {
    /// Base asset quantity (e.g. BTC).
    pub asset: f64,
    /// Quote currency quantity (e.g. USDT).
    pub cash: f64,
}

/// A filled order as reported by the exchange.
#[derive(Debug, Clone, Copy)]
pub struct OrderFill {
    pub price: f64,
    pub amount: f64,
}

/// Trading pair parsed from the `BASE/QUOTE` form (e.g. `BTC/USDT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPair {
    pub base: String,
    pub quote: String,
}

impl SymbolPair {
    /// Parse a `BASE/QUOTE` pair string.
    pub fn parse(s: &str) -> Option<Self> {
        let (base, quote) = s.split_once('/')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    /// Exchange symbol without the separator, e.g. `BTCUSDT`.
    pub fn exchange_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl std::fmt::Display for SymbolPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
