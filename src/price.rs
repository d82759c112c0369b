use anyhow::{Context, Result};
use ethers_core::types::Address;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::KeeperError;

/// Token address -> USD price of one whole token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    prices: HashMap<Address, f64>,
}

impl PriceTable {
    pub fn get(&self, token: &Address) -> Option<f64> {
        self.prices.get(token).copied()
    }

    pub fn insert(&mut self, token: Address, price: f64) {
        self.prices.insert(token, price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Parse a quote API response body and require a price for every token.
    /// Prices may be JSON numbers or decimal strings.
    pub fn from_response(body: &Value, tokens: &[Address]) -> Result<Self, KeeperError> {
        let obj = body
            .as_object()
            .ok_or_else(|| KeeperError::PriceApi(format!("expected a JSON object, got {body}")))?;

        let mut table = PriceTable::default();
        for (key, value) in obj {
            let Ok(token) = key.parse::<Address>() else {
                tracing::debug!(%key, "ignoring non-address key in price response");
                continue;
            };
            let price = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| KeeperError::PriceApi(format!("unparseable price {value} for {key}")))?;
            table.insert(token, price);
        }

        for token in tokens {
            if table.get(token).is_none() {
                return Err(KeeperError::MissingPrice(*token));
            }
        }
        Ok(table)
    }
}

/// USD value of the reference quantity of the reference token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePrice {
    pub value: f64,
    pub from_fallback: bool,
}

/// `price(token) * quantity`, or `fallback` when that product is exactly zero.
/// A zero quote is the API's way of saying it has no price, not a real price,
/// so a zero quote with no fallback configured is an error.
pub fn reference_price(
    table: &PriceTable,
    token: Address,
    quantity: f64,
    fallback: Option<f64>,
) -> Result<ReferencePrice, KeeperError> {
    let unit = table.get(&token).ok_or(KeeperError::MissingPrice(token))?;
    let value = unit * quantity;
    if value == 0.0 {
        let fallback = fallback.ok_or(KeeperError::MissingEnv("PSM_PRICE"))?;
        tracing::warn!(?token, fallback, "zero reference price from quote api; using fallback");
        return Ok(ReferencePrice { value: fallback, from_fallback: true });
    }
    Ok(ReferencePrice { value, from_fallback: false })
}

/// Client for the 1inch-style spot price endpoint (`POST {base}/{chain_id}`).
pub struct PriceClient {
    client: Client,
    endpoint: String,
    bearer: SecretString,
}

impl PriceClient {
    pub fn new(
        base_url: &str,
        chain_id: u64,
        bearer: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = format!("{}/{}", base_url.trim_end_matches('/'), chain_id);
        Self::with_endpoint(endpoint, bearer, timeout)
    }

    /// Use an exact endpoint URL (tests point this at a mock server).
    pub fn with_endpoint(
        endpoint: String,
        bearer: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint, bearer })
    }

    pub async fn fetch_prices(&self, tokens: &[Address], currency: &str) -> Result<PriceTable> {
        let body = serde_json::json!({
            "tokens": tokens.iter().map(|t| format!("{t:?}")).collect::<Vec<_>>(),
            "currency": currency,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.bearer.expose_secret())
            .json(&body)
            .send()
            .await
            .context("price api request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(KeeperError::PriceApi(format!("status {status}: {text}")).into());
        }

        let v = resp.json::<Value>().await.context("invalid json response from price api")?;
        let table = PriceTable::from_response(&v, tokens)?;
        tracing::info!(tokens = table.len(), "fetched token prices");
        Ok(table)
    }
}
