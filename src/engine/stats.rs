use crate::feed::types::{BookLevel, MarketSample};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Aggregate view over the current sample window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsSnapshot {
    pub avg_bid_price: Option<f64>,
    pub avg_bid_size: Option<f64>,
    pub avg_ask_price: Option<f64>,
    pub avg_ask_size: Option<f64>,
    pub min_bid: Option<i64>,
    pub max_bid: Option<i64>,
    pub min_ask: Option<i64>,
    pub max_ask: Option<i64>,
    pub ready: bool,
    pub samples: usize,
    pub last_sample_at: Option<DateTime<Utc>>,
}

/// Running totals for one side of the book.
#[derive(Default)]
struct SideAccumulator {
    count: u32,
    price_sum: i64,
    size_sum: i64,
    min: Option<i64>,
    max: Option<i64>,
}

impl SideAccumulator {
    fn push(&mut self, level: &BookLevel) {
        self.count += 1;
        self.price_sum += level.price;
        self.size_sum += level.size;
        self.min = Some(self.min.map_or(level.price, |m| m.min(level.price)));
        self.max = Some(self.max.map_or(level.price, |m| m.max(level.price)));
    }

    fn avg_price(&self) -> Option<f64> {
        (self.count > 0).then(|| self.price_sum as f64 / self.count as f64)
    }

    fn avg_size(&self) -> Option<f64> {
        (self.count > 0).then(|| self.size_sum as f64 / self.count as f64)
    }
}

struct Window {
    samples: VecDeque<MarketSample>,
    ready: bool,
}

/// Bounded sliding window of top-of-book samples.
///
/// Readiness latches the first time the window holds `capacity` samples and
/// stays set for the lifetime of the aggregator.
pub struct StatisticsAggregator {
    capacity: usize,
    window: Mutex<Window>,
}

impl StatisticsAggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Mutex::new(Window {
                samples: VecDeque::with_capacity(capacity),
                ready: false,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record_sample(&self, sample: MarketSample) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        if window.samples.len() >= self.capacity {
            window.samples.pop_front();
        }
        window.samples.push_back(sample);
        if window.samples.len() == self.capacity {
            window.ready = true;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready
    }

    /// Most recent sample, if any.
    pub fn latest(&self) -> Option<MarketSample> {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .back()
            .cloned()
    }

    /// Recompute statistics over exactly the samples currently in the window.
    /// A side with no liquidity in a sample is left out of that side's figures.
    pub fn snapshot(&self) -> StatsSnapshot {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        let mut bids = SideAccumulator::default();
        let mut asks = SideAccumulator::default();
        for sample in &window.samples {
            if let Some(bid) = &sample.bid {
                bids.push(bid);
            }
            if let Some(ask) = &sample.ask {
                asks.push(ask);
            }
        }

        StatsSnapshot {
            avg_bid_price: bids.avg_price(),
            avg_bid_size: bids.avg_size(),
            avg_ask_price: asks.avg_price(),
            avg_ask_size: asks.avg_size(),
            min_bid: bids.min,
            max_bid: bids.max,
            min_ask: asks.min,
            max_ask: asks.max,
            ready: window.ready,
            samples: window.samples.len(),
            last_sample_at: window.samples.back().map(|s| s.ts),
        }
    }
}
