//! Exchange connectivity.
//!
//! The decision loop only sees the [`Exchange`] trait: latest price, account
//! balances, market orders. `BinanceClient` talks to the Binance spot
//! testnet over REST; `PaperExchange` simulates the account in memory for
//! dry runs and tests.

pub mod binance;
pub mod paper;

pub use binance::BinanceClient;
pub use paper::PaperExchange;

use async_trait::async_trait;

use crate::models::{Balances, OrderFill, OrderSide, SymbolPair};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("exchange request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange request timed out")]
    Timeout,
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("unexpected exchange response: {0}")]
    Malformed(String),
}

impl ExchangeError {
    /// Transient failures are retried by natural tick cadence; a rejection
    /// is an answer, not an outage.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Http(_) | ExchangeError::Timeout => true,
            ExchangeError::Rejected(_) | ExchangeError::Malformed(_) => false,
        }
    }
}

/// Narrow interface to the remote account.
///
/// All three calls may block on I/O and are wrapped in timeouts by the
/// caller; implementations should not retry internally.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Latest traded price for the pair.
    async fn get_price(&self, pair: &SymbolPair) -> Result<f64, ExchangeError>;

    /// Free balances for the pair's base asset and quote currency.
    async fn get_balances(&self, pair: &SymbolPair) -> Result<Balances, ExchangeError>;

    /// Place a market order and report the fill.
    async fn place_order(
        &self,
        pair: &SymbolPair,
        side: OrderSide,
        amount: f64,
    ) -> Result<OrderFill, ExchangeError>;
}
