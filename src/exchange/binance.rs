use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

use super::{Exchange, ExchangeError};
use crate::models::{Balances, OrderFill, OrderSide, SymbolPair};

type HmacSha256 = Hmac<Sha256>;

const TESTNET_BASE_URL: &str = "https://testnet.binance.vision";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for the Binance spot testnet.
///
/// Private endpoints are signed with HMAC-SHA256 over the query string,
/// keyed by the API secret, per the Binance signed-endpoint scheme.
pub struct BinanceClient {
    api_key: String,
    api_secret: String,
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    status: String,
    executed_qty: String,
    cummulative_quote_qty: String,
}

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: TESTNET_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different REST endpoint (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Verify connectivity before the loop starts.
    pub async fn ping(&self) -> Result<(), ExchangeError> {
        let url = format!("{}/api/v3/ping", self.base_url);
        self.client.get(&url).send().await?.error_for_status()?;
        Ok(())
    }

    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| ExchangeError::Malformed("invalid API secret length".to_string()))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, params: &str) -> Result<String, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={}", timestamp)
        } else {
            format!("{}&timestamp={}", params, timestamp)
        };
        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ExchangeError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ExchangeError::Rejected(format!("{}: {}", status, body)))
    }

    fn parse_f64(value: &str, what: &str) -> Result<f64, ExchangeError> {
        value
            .parse::<f64>()
            .map_err(|_| ExchangeError::Malformed(format!("unparseable {}: '{}'", what, value)))
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn get_price(&self, pair: &SymbolPair) -> Result<f64, ExchangeError> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            pair.exchange_symbol()
        );
        let response = Self::check_status(self.client.get(&url).send().await?).await?;
        let ticker: TickerPrice = response
            .json()
            .await
            .map_err(|e| ExchangeError::Malformed(e.to_string()))?;
        Self::parse_f64(&ticker.price, "ticker price")
    }

    async fn get_balances(&self, pair: &SymbolPair) -> Result<Balances, ExchangeError> {
        let query = self.signed_query("")?;
        let url = format!("{}/api/v3/account?{}", self.base_url, query);

        let response = Self::check_status(
            self.client
                .get(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await?,
        )
        .await?;

        let account: AccountInfo = response
            .json()
            .await
            .map_err(|e| ExchangeError::Malformed(e.to_string()))?;

        let mut balances = Balances::default();
        for entry in account.balances {
            if entry.asset == pair.base {
                balances.asset = Self::parse_f64(&entry.free, "asset balance")?;
            } else if entry.asset == pair.quote {
                balances.cash = Self::parse_f64(&entry.free, "cash balance")?;
            }
        }
        Ok(balances)
    }

    async fn place_order(
        &self,
        pair: &SymbolPair,
        side: OrderSide,
        amount: f64,
    ) -> Result<OrderFill, ExchangeError> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}",
            pair.exchange_symbol(),
            side.as_str(),
            amount
        );
        let query = self.signed_query(&params)?;
        let url = format!("{}/api/v3/order?{}", self.base_url, query);

        tracing::info!(symbol = %pair, side = side.as_str(), amount, "Placing market order");

        let response = Self::check_status(
            self.client
                .post(&url)
                .header("X-MBX-APIKEY", &self.api_key)
                .send()
                .await?,
        )
        .await?;

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::Malformed(e.to_string()))?;

        if order.status != "FILLED" {
            return Err(ExchangeError::Rejected(format!(
                "order not filled, status {}",
                order.status
            )));
        }

        let executed_qty = Self::parse_f64(&order.executed_qty, "executed quantity")?;
        let quote_qty = Self::parse_f64(&order.cummulative_quote_qty, "quote quantity")?;
        if executed_qty <= 0.0 {
            return Err(ExchangeError::Rejected("order filled zero quantity".to_string()));
        }

        Ok(OrderFill {
            price: quote_qty / executed_qty,
            amount: executed_qty,
        })
    }
}
