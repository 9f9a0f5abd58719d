//! REST polling adapters for the feed traits.

use super::types::{MarketSample, OrderRecord};
use super::{ExecutionFeed, MarketDataFeed};
use crate::execution::OrderGateway;
use crate::venue::rest::VenueRest;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

fn ticker(every: Duration) -> Interval {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Polls the venue order book and yields its top of book.
pub struct OrderBookPoller {
    rest: Arc<VenueRest>,
    symbol: String,
    interval: Interval,
}

impl OrderBookPoller {
    pub fn new(rest: Arc<VenueRest>, symbol: &str, every: Duration) -> Self {
        Self {
            rest,
            symbol: symbol.to_string(),
            interval: ticker(every),
        }
    }
}

#[async_trait]
impl MarketDataFeed for OrderBookPoller {
    async fn next_sample(&mut self) -> Result<MarketSample> {
        loop {
            self.interval.tick().await;
            let book = match self.rest.order_book(&self.symbol).await {
                Ok(book) => book,
                Err(e) => {
                    tracing::warn!(symbol = %self.symbol, "order book poll failed: {:#}", e);
                    continue;
                }
            };
            match MarketSample::try_from(book) {
                Ok(sample) => return Ok(sample),
                Err(e) => tracing::warn!(symbol = %self.symbol, "bad order book: {:#}", e),
            }
        }
    }
}

/// Polls the account's orders for one symbol. A failed poll yields an empty
/// batch; the next tick tries again.
pub struct OpenOrdersPoller {
    gateway: Arc<dyn OrderGateway>,
    account: String,
    symbol: String,
    interval: Interval,
}

impl OpenOrdersPoller {
    pub fn new(gateway: Arc<dyn OrderGateway>, account: &str, symbol: &str, every: Duration) -> Self {
        Self {
            gateway,
            account: account.to_string(),
            symbol: symbol.to_string(),
            interval: ticker(every),
        }
    }
}

#[async_trait]
impl ExecutionFeed for OpenOrdersPoller {
    async fn next_batch(&mut self) -> Result<Vec<OrderRecord>> {
        self.interval.tick().await;
        match self
            .gateway
            .fetch_open_orders(&self.account, &self.symbol)
            .await
        {
            Ok(orders) => {
                tracing::debug!(count = orders.len(), "polled account orders");
                Ok(orders)
            }
            Err(e) => {
                tracing::warn!(
                    account = %self.account,
                    symbol = %self.symbol,
                    "order poll failed: {:#}",
                    e
                );
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{Direction, NewOrder, OrderKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every other fetch.
    struct FlakyGateway {
        calls: AtomicUsize,
    }

    fn record(id: u64) -> OrderRecord {
        OrderRecord {
            id,
            symbol: "SDI".to_string(),
            venue: "EPOREX".to_string(),
            account: "FMB75081984".to_string(),
            direction: Direction::Sell,
            original_qty: 100,
            qty: 100,
            price: 5000,
            kind: OrderKind::Limit,
            total_filled: 0,
            open: true,
            created_at: None,
            last_seen: None,
            fills: vec![],
        }
    }

    #[async_trait]
    impl OrderGateway for FlakyGateway {
        async fn place_order(&self, _order: &NewOrder) -> Result<OrderRecord> {
            anyhow::bail!("not used")
        }
        async fn cancel_order(&self, _symbol: &str, _order_id: u64) -> Result<OrderRecord> {
            anyhow::bail!("not used")
        }
        async fn fetch_open_orders(&self, _account: &str, _symbol: &str) -> Result<Vec<OrderRecord>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                anyhow::bail!("503 service unavailable");
            }
            Ok(vec![record(7)])
        }
    }

    #[tokio::test]
    async fn test_failed_poll_yields_empty_batch_and_recovers() {
        let gateway = Arc::new(FlakyGateway {
            calls: AtomicUsize::new(0),
        });
        let mut poller =
            OpenOrdersPoller::new(gateway, "FMB75081984", "SDI", Duration::from_millis(1));

        assert_eq!(poller.next_batch().await.unwrap().len(), 1);
        assert!(poller.next_batch().await.unwrap().is_empty());
        assert_eq!(poller.next_batch().await.unwrap()[0].id, 7);
    }
}
