use super::auth::VenueAuth;
use super::types::*;
use crate::execution::OrderGateway;
use crate::feed::types::{NewOrder, OrderRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

pub struct VenueRest {
    client: Client,
    auth: Arc<VenueAuth>,
    base_url: String,
    venue: String,
    account: String,
}

/// Decode a venue response body. The venue answers rejections with
/// `{"ok": false, "error": "..."}`, sometimes with a 200 status.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &str, what: &str) -> Result<T> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(e) => e,
        Err(e) if status.is_success() => {
            return Err(anyhow::anyhow!(e).context(format!("{}: malformed response", what)));
        }
        Err(_) => anyhow::bail!("{} failed ({}): {}", what, status, body),
    };
    if !envelope.ok {
        anyhow::bail!(
            "{} rejected ({}): {}",
            what,
            status,
            envelope.error.unwrap_or_default()
        );
    }
    serde_json::from_str(body).with_context(|| format!("failed to parse {} response", what))
}

impl VenueRest {
    pub fn new(auth: Arc<VenueAuth>, base_url: &str, venue: &str, account: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
            venue: venue.to_string(),
            account: account.to_string(),
        })
    }

    /// API-wide liveness check.
    pub async fn heartbeat(&self) -> Result<()> {
        let url = format!("{}/heartbeat", self.base_url);
        let _: Envelope = self.send(self.client.get(&url), "heartbeat").await?;
        Ok(())
    }

    /// Pre-flight check that the configured venue is up.
    pub async fn venue_heartbeat(&self) -> Result<()> {
        let url = format!("{}/venues/{}/heartbeat", self.base_url, self.venue);
        let hb: VenueHeartbeat = self.send(self.client.get(&url), "venue heartbeat").await?;
        tracing::debug!(venue = %hb.venue, "venue heartbeat ok");
        Ok(())
    }

    pub async fn quote(&self, symbol: &str) -> Result<QuoteWire> {
        let url = format!(
            "{}/venues/{}/stocks/{}/quote",
            self.base_url, self.venue, symbol
        );
        self.send(self.client.get(&url), "quote").await
    }

    pub async fn order_book(&self, symbol: &str) -> Result<OrderBookWire> {
        let url = format!("{}/venues/{}/stocks/{}", self.base_url, self.venue, symbol);
        self.send(self.client.get(&url), "order book").await
    }

    /// Place an order.
    pub async fn create_order(&self, order: &CreateOrderRequest) -> Result<OrderWire> {
        let url = format!(
            "{}/venues/{}/stocks/{}/orders",
            self.base_url, self.venue, order.stock
        );
        let req = self.client.post(&url).headers(self.auth.headers()?).json(order);
        self.send(req, "place order").await
    }

    pub async fn cancel(&self, symbol: &str, order_id: u64) -> Result<OrderWire> {
        let url = format!(
            "{}/venues/{}/stocks/{}/orders/{}",
            self.base_url, self.venue, symbol, order_id
        );
        let req = self.client.delete(&url).headers(self.auth.headers()?);
        self.send(req, "cancel order").await
    }

    /// Every order on the account for one symbol, open or closed.
    pub async fn account_orders(&self, account: &str, symbol: &str) -> Result<Vec<OrderWire>> {
        let url = format!(
            "{}/venues/{}/accounts/{}/stocks/{}/orders",
            self.base_url, self.venue, account, symbol
        );
        let req = self.client.get(&url).headers(self.auth.headers()?);
        let resp: AccountOrdersResponse = self.send(req, "account orders").await?;
        Ok(resp.orders)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} request failed", what))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("{} body read failed", what))?;
        decode(status, &body, what)
    }
}

#[async_trait]
impl OrderGateway for VenueRest {
    async fn place_order(&self, order: &NewOrder) -> Result<OrderRecord> {
        let req = CreateOrderRequest::new(&self.account, &self.venue, order);
        Ok(self.create_order(&req).await?.into())
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<OrderRecord> {
        Ok(self.cancel(symbol, order_id).await?.into())
    }

    async fn fetch_open_orders(&self, account: &str, symbol: &str) -> Result<Vec<OrderRecord>> {
        let orders = self.account_orders(account, symbol).await?;
        Ok(orders.into_iter().map(OrderRecord::from).collect())
    }
}
