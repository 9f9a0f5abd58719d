//! Level market-making strategy: one resting order per side, priced off the
//! sample window and bounded by an inventory limit.

use super::positions::{PositionLedger, PositionSnapshot};
use super::reconcile::ReconciliationEngine;
use super::stats::{StatisticsAggregator, StatsSnapshot};
use crate::config::StrategyConfig;
use crate::execution::executor::OrderExecutor;
use crate::feed::types::{Direction, NewOrder, OrderKind};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub symbol: String,
    pub order_qty: i64,
    pub inventory_limit: i64,
    pub tighten_band: i64,
    pub stale_after: Duration,
    pub reprice_tolerance: Option<f64>,
    pub order_kind: OrderKind,
    /// Shrink the side that would grow inventory by half the position.
    pub skew_inventory: bool,
    /// Hold off entirely unless the buy target sits below the sell target.
    pub require_uncrossed: bool,
}

impl StrategyParams {
    pub fn new(symbol: &str, config: &StrategyConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            order_qty: config.order_qty,
            inventory_limit: config.inventory_limit,
            tighten_band: config.tighten_band,
            stale_after: Duration::seconds(config.stale_after_secs),
            reprice_tolerance: config.reprice_tolerance,
            order_kind: config.order_kind,
            skew_inventory: config.skew_inventory,
            require_uncrossed: config.require_uncrossed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideState {
    NoOrder,
    OrderOpen { order_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Stale,
    Drifted,
}

/// One thing `tick` did (or declined to do) on one side.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NotReady,
    Crossed { buy: i64, sell: i64 },
    NoTarget { side: Direction },
    NoSize { side: Direction, qty: i64 },
    Released { side: Direction, order_id: u64 },
    Placed { side: Direction, order_id: u64, price: i64 },
    Cancelled { side: Direction, order_id: u64, reason: CancelReason },
    InventoryBlocked { side: Direction, owned: i64 },
    Failed { side: Direction, error: String },
}

/// Buy and sell targets for the current window and inventory.
///
/// Near flat inventory the quotes tighten to the extremes seen in the
/// window; otherwise they sit at the window averages.
pub fn targets(stats: &StatsSnapshot, owned: i64, tighten_band: i64) -> (Option<i64>, Option<i64>) {
    let (buy, sell) = if owned.abs() <= tighten_band {
        (
            stats.min_ask.map(|p| p as f64),
            stats.max_bid.map(|p| p as f64),
        )
    } else {
        (stats.avg_bid_price, stats.avg_ask_price)
    };
    let positive = |p: f64| {
        let p = p as i64;
        (p > 0).then_some(p)
    };
    (buy.and_then(positive), sell.and_then(positive))
}

/// Buy and sell sizes. With `skew`, half the position comes off the side
/// that would add to it and goes onto the side that would reduce it.
pub fn order_sizes(order_qty: i64, owned: i64, skew: bool) -> (i64, i64) {
    if skew {
        (order_qty - owned / 2, order_qty + owned / 2)
    } else {
        (order_qty, order_qty)
    }
}

/// Whether placing `qty` more on `side` keeps inventory within `limit`.
pub fn within_limit(side: Direction, owned: i64, qty: i64, limit: i64) -> bool {
    match side {
        Direction::Buy => owned + qty <= limit,
        Direction::Sell => owned - qty >= -limit,
    }
}

pub struct StrategyEngine {
    params: StrategyParams,
    stats: Arc<StatisticsAggregator>,
    recon: Arc<ReconciliationEngine>,
    executor: Arc<OrderExecutor>,
    bid: SideState,
    ask: SideState,
}

impl StrategyEngine {
    pub fn new(
        params: StrategyParams,
        stats: Arc<StatisticsAggregator>,
        recon: Arc<ReconciliationEngine>,
        executor: Arc<OrderExecutor>,
    ) -> Self {
        Self {
            params,
            stats,
            recon,
            executor,
            bid: SideState::NoOrder,
            ask: SideState::NoOrder,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.params.symbol
    }

    pub fn side_state(&self, side: Direction) -> SideState {
        match side {
            Direction::Buy => self.bid,
            Direction::Sell => self.ask,
        }
    }

    fn set_side(&mut self, side: Direction, state: SideState) {
        match side {
            Direction::Buy => self.bid = state,
            Direction::Sell => self.ask = state,
        }
    }

    fn ledger(&self) -> &Arc<PositionLedger> {
        self.recon.ledger()
    }

    pub fn position_snapshot(&self, symbol: &str) -> PositionSnapshot {
        self.ledger().snapshot(symbol)
    }

    /// Window statistics; only this engine's symbol is tracked.
    pub fn stats_snapshot(&self, symbol: &str) -> Option<StatsSnapshot> {
        (symbol == self.params.symbol).then(|| self.stats.snapshot())
    }

    /// Run one decision cycle over both sides.
    pub async fn tick(&mut self) -> Vec<Decision> {
        let stats = self.stats.snapshot();
        if !stats.ready {
            tracing::debug!(
                samples = stats.samples,
                window = self.stats.capacity(),
                "statistics not ready, skipping tick"
            );
            return vec![Decision::NotReady];
        }

        let position = self.ledger().snapshot(&self.params.symbol);
        tracing::info!(
            symbol = %self.params.symbol,
            cash = position.balance,
            owned = position.owned,
            nav = ?position.nav,
            "position"
        );

        let now = stats.last_sample_at.unwrap_or_else(Utc::now);
        let (buy, sell) = targets(&stats, position.owned, self.params.tighten_band);
        tracing::debug!(buy = ?buy, sell = ?sell, "targets");

        if self.params.require_uncrossed {
            if let (Some(buy), Some(sell)) = (buy, sell) {
                if buy >= sell {
                    tracing::debug!(buy, sell, "targets crossed, holding");
                    return vec![Decision::Crossed { buy, sell }];
                }
            }
        }

        let (buy_qty, sell_qty) =
            order_sizes(self.params.order_qty, position.owned, self.params.skew_inventory);
        let mut decisions = Vec::new();
        self.step_side(Direction::Buy, buy, buy_qty, position.owned, now, &mut decisions)
            .await;
        self.step_side(Direction::Sell, sell, sell_qty, position.owned, now, &mut decisions)
            .await;
        decisions
    }

    async fn step_side(
        &mut self,
        side: Direction,
        target: Option<i64>,
        qty: i64,
        owned: i64,
        now: DateTime<Utc>,
        decisions: &mut Vec<Decision>,
    ) {
        if let SideState::OrderOpen { order_id } = self.side_state(side) {
            match self.recon.registry().get(order_id) {
                Some(order) if order.open => {
                    let stale = order
                        .created_at
                        .is_some_and(|created| now - created > self.params.stale_after);
                    let drifted = match (self.params.reprice_tolerance, target) {
                        (Some(tol), Some(target)) => {
                            (order.price - target).abs() as f64 > tol * target as f64
                        }
                        _ => false,
                    };
                    let reason = if stale {
                        CancelReason::Stale
                    } else if drifted {
                        CancelReason::Drifted
                    } else {
                        return;
                    };

                    // Stay OrderOpen until the registry shows the order closed
                    match self.executor.cancel_order(&self.params.symbol, order_id).await {
                        Ok(record) => {
                            self.recon.reconcile(record);
                            decisions.push(Decision::Cancelled { side, order_id, reason });
                        }
                        Err(e) => {
                            tracing::warn!(order_id, side = %side, "cancel failed: {:#}", e);
                            decisions.push(Decision::Failed {
                                side,
                                error: format!("{:#}", e),
                            });
                        }
                    }
                    return;
                }
                Some(_) => {
                    tracing::debug!(order_id, side = %side, "order closed, side free");
                    self.set_side(side, SideState::NoOrder);
                    decisions.push(Decision::Released { side, order_id });
                }
                None => {
                    tracing::warn!(order_id, side = %side, "tracked order missing from registry");
                    return;
                }
            }
        }

        let Some(price) = target else {
            decisions.push(Decision::NoTarget { side });
            return;
        };
        if qty <= 0 {
            decisions.push(Decision::NoSize { side, qty });
            return;
        }
        if !within_limit(side, owned, qty, self.params.inventory_limit) {
            tracing::debug!(side = %side, owned, "inventory limit reached");
            decisions.push(Decision::InventoryBlocked { side, owned });
            return;
        }

        let order = NewOrder {
            symbol: self.params.symbol.clone(),
            direction: side,
            qty,
            price,
            kind: self.params.order_kind,
        };
        match self.executor.submit_order(&order).await {
            Ok(record) => {
                let order_id = record.id;
                self.recon.reconcile(record);
                self.set_side(side, SideState::OrderOpen { order_id });
                decisions.push(Decision::Placed { side, order_id, price });
            }
            Err(e) => {
                tracing::warn!(side = %side, price, "place failed: {:#}", e);
                decisions.push(Decision::Failed {
                    side,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    /// Cancel every open order on this symbol. Returns how many cancels the
    /// venue accepted.
    pub async fn cancel_all(&mut self) -> usize {
        let open: Vec<u64> = self
            .recon
            .registry()
            .open_orders()
            .into_iter()
            .filter(|o| o.symbol == self.params.symbol)
            .map(|o| o.id)
            .collect();

        let mut cancelled = 0;
        for order_id in open {
            match self.executor.cancel_order(&self.params.symbol, order_id).await {
                Ok(record) => {
                    self.recon.reconcile(record);
                    cancelled += 1;
                }
                Err(e) => tracing::warn!(order_id, "shutdown cancel failed: {:#}", e),
            }
        }
        cancelled
    }
}
