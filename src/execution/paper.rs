//! In-process venue for paper trading against live market data.
//!
//! Orders that cross the latest top of book fill at once at the opposite
//! price. Resting limit orders fill at their own price with probability
//! `fill_rate` on each poll where the opposite side has reached them.

use super::OrderGateway;
use crate::engine::stats::StatisticsAggregator;
use crate::feed::types::{Direction, Fill, MarketSample, NewOrder, OrderKind, OrderRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

struct Book {
    next_id: u64,
    orders: BTreeMap<u64, OrderRecord>,
    last_fill_at: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl Book {
    /// Fill timestamps must strictly increase or reconciliation would drop
    /// the later of two fills stamped in the same instant.
    fn fill_ts(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_fill_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_fill_at = Some(ts);
        ts
    }

    fn fill(&mut self, id: u64, price: i64) {
        let ts = self.fill_ts();
        if let Some(order) = self.orders.get_mut(&id) {
            let qty = order.qty;
            order.fills.push(Fill {
                price,
                qty,
                ts: Some(ts),
            });
            order.total_filled += qty;
            order.qty = 0;
            order.open = false;
            tracing::debug!(order_id = id, price, qty, "paper fill");
        }
    }
}

/// Price the order would trade at right now, if it crosses.
fn crossing_price(
    direction: Direction,
    limit: Option<i64>,
    top: Option<&MarketSample>,
) -> Option<i64> {
    let top = top?;
    let opposite = match direction {
        Direction::Buy => top.ask?,
        Direction::Sell => top.bid?,
    };
    let crosses = match (direction, limit) {
        (_, None) => true,
        (Direction::Buy, Some(limit)) => limit >= opposite.price,
        (Direction::Sell, Some(limit)) => limit <= opposite.price,
    };
    crosses.then_some(opposite.price)
}

pub struct PaperGateway {
    stats: Arc<StatisticsAggregator>,
    account: String,
    venue: String,
    fill_rate: f64,
    book: Mutex<Book>,
}

impl PaperGateway {
    pub fn new(stats: Arc<StatisticsAggregator>, account: &str, venue: &str, fill_rate: f64) -> Self {
        Self::with_rng(stats, account, venue, fill_rate, StdRng::from_entropy())
    }

    /// Deterministic fills for tests.
    pub fn with_seed(
        stats: Arc<StatisticsAggregator>,
        account: &str,
        venue: &str,
        fill_rate: f64,
        seed: u64,
    ) -> Self {
        Self::with_rng(stats, account, venue, fill_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        stats: Arc<StatisticsAggregator>,
        account: &str,
        venue: &str,
        fill_rate: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            stats,
            account: account.to_string(),
            venue: venue.to_string(),
            fill_rate: fill_rate.clamp(0.0, 1.0),
            book: Mutex::new(Book {
                next_id: 1,
                orders: BTreeMap::new(),
                last_fill_at: None,
                rng,
            }),
        }
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_order(&self, order: &NewOrder) -> Result<OrderRecord> {
        if order.qty <= 0 {
            anyhow::bail!("paper venue rejected order: qty must be positive");
        }
        let top = self.stats.latest();
        let limit = (order.kind != OrderKind::Market).then_some(order.price);
        let cross = crossing_price(order.direction, limit, top.as_ref());

        let mut book = self.book.lock().unwrap_or_else(PoisonError::into_inner);
        let id = book.next_id;
        book.next_id += 1;
        book.orders.insert(
            id,
            OrderRecord {
                id,
                symbol: order.symbol.clone(),
                venue: self.venue.clone(),
                account: self.account.clone(),
                direction: order.direction,
                original_qty: order.qty,
                qty: order.qty,
                price: order.price,
                kind: order.kind,
                total_filled: 0,
                open: true,
                created_at: Some(top.as_ref().map_or_else(Utc::now, |s| s.ts)),
                last_seen: None,
                fills: Vec::new(),
            },
        );

        match (cross, order.kind) {
            (Some(price), _) => book.fill(id, price),
            (None, OrderKind::Limit) => {}
            // Unmatched market, IOC and FOK orders die immediately
            (None, _) => {
                if let Some(o) = book.orders.get_mut(&id) {
                    o.open = false;
                    o.qty = 0;
                }
            }
        }

        book.orders
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("paper order {} vanished", id))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<OrderRecord> {
        let mut book = self.book.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(order) = book.orders.get_mut(&order_id) else {
            anyhow::bail!("paper venue: unknown order {}", order_id);
        };
        if !order.open {
            anyhow::bail!("paper venue: order {} is already closed", order_id);
        }
        order.open = false;
        order.qty = 0;
        Ok(order.clone())
    }

    async fn fetch_open_orders(&self, account: &str, symbol: &str) -> Result<Vec<OrderRecord>> {
        let top = self.stats.latest();
        let mut book = self.book.lock().unwrap_or_else(PoisonError::into_inner);

        let resting: Vec<(u64, Direction, i64)> = book
            .orders
            .values()
            .filter(|o| o.open)
            .map(|o| (o.id, o.direction, o.price))
            .collect();
        for (id, direction, price) in resting {
            if crossing_price(direction, Some(price), top.as_ref()).is_none() {
                continue;
            }
            // Roll fill probability; makers trade at their own price
            if book.rng.gen::<f64>() < self.fill_rate {
                book.fill(id, price);
            }
        }

        Ok(book
            .orders
            .values()
            .filter(|o| o.account == account && o.symbol == symbol)
            .cloned()
            .collect())
    }
}
