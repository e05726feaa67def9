use async_trait::async_trait;
use std::sync::Mutex;

use super::{BinanceClient, Exchange, ExchangeError};
use crate::models::{Balances, OrderFill, OrderSide, SymbolPair};

/// Simulated exchange account.
///
/// Orders fill instantly at the last quoted price against in-memory
/// balances. Quotes come from a live (public, unsigned) feed when one is
/// attached, or from prices pushed in by tests.
pub struct PaperExchange {
    feed: Option<BinanceClient>,
    last_price: Mutex<Option<f64>>,
    balances: Mutex<Balances>,
}

impl PaperExchange {
    pub fn new(starting_cash: f64) -> Self {
        Self {
            feed: None,
            last_price: Mutex::new(None),
            balances: Mutex::new(Balances {
                asset: 0.0,
                cash: starting_cash,
            }),
        }
    }

    /// Quote from the real ticker while keeping fills simulated.
    pub fn with_live_feed(mut self, feed: BinanceClient) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Seed non-zero holdings, e.g. to simulate an account that already
    /// holds the asset.
    pub fn with_balances(self, balances: Balances) -> Self {
        *self.balances.lock().unwrap() = balances;
        self
    }

    /// Push the next quote (test/scripted mode, no live feed).
    pub fn set_price(&self, price: f64) {
        *self.last_price.lock().unwrap() = Some(price);
    }

    /// Overwrite holdings mid-run, e.g. to simulate a trade made outside
    /// the bot's control.
    pub fn set_balances(&self, balances: Balances) {
        *self.balances.lock().unwrap() = balances;
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_price(&self, pair: &SymbolPair) -> Result<f64, ExchangeError> {
        if let Some(feed) = &self.feed {
            let price = feed.get_price(pair).await?;
            *self.last_price.lock().unwrap() = Some(price);
            return Ok(price);
        }
        self.last_price
            .lock()
            .unwrap()
            .ok_or_else(|| ExchangeError::Malformed("no quote available yet".to_string()))
    }

    async fn get_balances(&self, _pair: &SymbolPair) -> Result<Balances, ExchangeError> {
        Ok(*self.balances.lock().unwrap())
    }

    async fn place_order(
        &self,
        pair: &SymbolPair,
        side: OrderSide,
        amount: f64,
    ) -> Result<OrderFill, ExchangeError> {
        let price = self.get_price(pair).await?;
        let mut balances = self.balances.lock().unwrap();

        match side {
            OrderSide::Buy => {
                let cost = price * amount;
                if balances.cash < cost {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient cash: need {:.2}, have {:.2}",
                        cost, balances.cash
                    )));
                }
                balances.cash -= cost;
                balances.asset += amount;
            }
            OrderSide::Sell => {
                if balances.asset < amount {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient asset: need {}, have {}",
                        amount, balances.asset
                    )));
                }
                balances.asset -= amount;
                balances.cash += price * amount;
            }
        }

        tracing::info!(
            symbol = %pair,
            side = side.as_str(),
            amount,
            price,
            "Paper fill"
        );

        Ok(OrderFill { price, amount })
    }
}
