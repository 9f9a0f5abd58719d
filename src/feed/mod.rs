pub mod poll;
pub mod types;

use crate::engine::positions::PositionLedger;
use crate::engine::reconcile::ReconciliationEngine;
use crate::engine::stats::StatisticsAggregator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use types::{MarketSample, OrderRecord};

/// A source of top-of-book samples. An `Err` means the feed is gone for good.
#[async_trait]
pub trait MarketDataFeed: Send {
    async fn next_sample(&mut self) -> Result<MarketSample>;
}

/// A source of order views. Each batch may repeat orders seen before.
#[async_trait]
pub trait ExecutionFeed: Send {
    async fn next_batch(&mut self) -> Result<Vec<OrderRecord>>;
}

/// Pump market data into the statistics window until the feed fails.
pub async fn run_market_data<F: MarketDataFeed>(
    mut feed: F,
    stats: Arc<StatisticsAggregator>,
    ledger: Arc<PositionLedger>,
    symbol: String,
) -> Result<()> {
    let mut was_ready = stats.is_ready();
    loop {
        let sample = feed
            .next_sample()
            .await
            .context("market data feed terminated")?;
        if let Some(last) = sample.last {
            ledger.mark(&symbol, last);
        }
        stats.record_sample(sample);
        if !was_ready && stats.is_ready() {
            was_ready = true;
            tracing::info!(
                symbol = %symbol,
                window = stats.capacity(),
                "statistics window full, quoting enabled"
            );
        }
    }
}

/// Pump order views into reconciliation until the feed fails.
pub async fn run_executions<F: ExecutionFeed>(
    mut feed: F,
    recon: Arc<ReconciliationEngine>,
) -> Result<()> {
    loop {
        let batch = feed
            .next_batch()
            .await
            .context("execution feed terminated")?;
        for order in batch {
            recon.reconcile(order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::orders::OrderRegistry;
    use crate::feed::types::{BookLevel, Direction, Fill, OrderKind};
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;

    struct ScriptedSamples(VecDeque<MarketSample>);

    #[async_trait]
    impl MarketDataFeed for ScriptedSamples {
        async fn next_sample(&mut self) -> Result<MarketSample> {
            self.0.pop_front().context("script exhausted")
        }
    }

    struct ScriptedBatches(VecDeque<Vec<OrderRecord>>);

    #[async_trait]
    impl ExecutionFeed for ScriptedBatches {
        async fn next_batch(&mut self) -> Result<Vec<OrderRecord>> {
            self.0.pop_front().context("script exhausted")
        }
    }

    fn sample(bid: i64, ask: i64, last: Option<i64>) -> MarketSample {
        MarketSample {
            bid: Some(BookLevel { price: bid, size: 10 }),
            ask: Some(BookLevel { price: ask, size: 10 }),
            last,
            ts: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn filled_buy(id: u64, qty: i64) -> OrderRecord {
        OrderRecord {
            id,
            symbol: "SDI".to_string(),
            venue: "EPOREX".to_string(),
            account: "FMB75081984".to_string(),
            direction: Direction::Buy,
            original_qty: qty,
            qty: 0,
            price: 100,
            kind: OrderKind::Limit,
            total_filled: qty,
            open: false,
            created_at: None,
            last_seen: None,
            fills: vec![Fill {
                price: 100,
                qty,
                ts: Some(Utc.timestamp_opt(1_700_000_010, 0).unwrap()),
            }],
        }
    }

    #[tokio::test]
    async fn test_market_data_fills_window_then_reports_termination() {
        let stats = Arc::new(StatisticsAggregator::new(2));
        let ledger = Arc::new(PositionLedger::new());
        let feed = ScriptedSamples(VecDeque::from(vec![
            sample(99, 101, None),
            sample(100, 102, Some(101)),
        ]));

        let result = run_market_data(feed, stats.clone(), ledger.clone(), "SDI".into()).await;
        assert!(result.is_err(), "exhausted feed must surface as an error");
        assert!(stats.is_ready());
        assert_eq!(ledger.snapshot("SDI").last_price, Some(101));
    }

    #[tokio::test]
    async fn test_executions_reconcile_repeated_views_once() {
        let recon = Arc::new(ReconciliationEngine::new(
            Arc::new(PositionLedger::new()),
            Arc::new(OrderRegistry::new()),
        ));
        let feed = ScriptedBatches(VecDeque::from(vec![
            vec![filled_buy(1, 10)],
            vec![filled_buy(1, 10), filled_buy(2, 5)],
        ]));

        assert!(run_executions(feed, recon.clone()).await.is_err());
        let snap = recon.ledger().snapshot("SDI");
        assert_eq!(snap.owned, 15);
        assert_eq!(snap.balance, -1500);
    }
}
