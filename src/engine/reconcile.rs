//! Fill deduplication across the poll and push order feeds.
//!
//! Both feeds report an order's full fill history. Only fills timestamped
//! strictly after the stored record's `last_seen` are counted, so applying
//! the two views of the same order in either order lands on the same ledger.

use super::orders::OrderRegistry;
use super::positions::PositionLedger;
use crate::feed::types::OrderRecord;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// What a single `reconcile` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub order_id: u64,
    pub cash_delta: i64,
    pub qty_delta: i64,
    /// Fills counted into the ledger by this call.
    pub counted_fills: usize,
    /// Fills dropped for lacking a usable timestamp.
    pub skipped_fills: usize,
    /// The observed view was older than the stored record and was not kept.
    pub stale: bool,
}

/// Gross totals of fills newer than a cutoff.
#[derive(Default)]
struct NewFills {
    cash: i64,
    qty: i64,
    newest: Option<DateTime<Utc>>,
    counted: usize,
    skipped: usize,
}

fn collect_new_fills(observed: &OrderRecord, cutoff: Option<DateTime<Utc>>) -> NewFills {
    let mut out = NewFills::default();
    for fill in &observed.fills {
        let Some(ts) = fill.ts else {
            out.skipped += 1;
            tracing::warn!(
                order_id = observed.id,
                price = fill.price,
                qty = fill.qty,
                "fill has no usable timestamp, excluded from position"
            );
            continue;
        };
        if cutoff.is_some_and(|c| ts <= c) {
            continue;
        }
        tracing::debug!(
            order_id = observed.id,
            price = fill.price,
            qty = fill.qty,
            ts = %ts,
            "counting new fill"
        );
        out.cash += fill.price * fill.qty;
        out.qty += fill.qty;
        out.newest = Some(out.newest.map_or(ts, |n| n.max(ts)));
        out.counted += 1;
    }
    out
}

fn max_ts(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// The only writer of `PositionLedger` fills and `OrderRegistry` records.
pub struct ReconciliationEngine {
    ledger: Arc<PositionLedger>,
    registry: Arc<OrderRegistry>,
    // Serializes read-compute-write so concurrent feeds cannot both count
    // the same fill.
    gate: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(ledger: Arc<PositionLedger>, registry: Arc<OrderRegistry>) -> Self {
        Self {
            ledger,
            registry,
            gate: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<OrderRegistry> {
        &self.registry
    }

    /// Fold a freshly observed view of an order into the ledger and registry.
    pub fn reconcile(&self, observed: OrderRecord) -> ReconcileOutcome {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.registry.get(observed.id);
        let cutoff = previous.as_ref().and_then(|p| p.last_seen);
        let fresh = collect_new_fills(&observed, cutoff);

        if observed.total_filled > observed.original_qty
            || observed.fills_qty() > observed.original_qty
        {
            tracing::warn!(
                order_id = observed.id,
                original_qty = observed.original_qty,
                total_filled = observed.total_filled,
                fills_qty = observed.fills_qty(),
                "venue reports more filled than ordered, applying anyway"
            );
        }

        let sign = observed.direction.qty_sign();
        let cash_delta = -sign * fresh.cash;
        let qty_delta = sign * fresh.qty;
        if fresh.counted > 0 {
            self.ledger.apply(&observed.symbol, cash_delta, qty_delta);
            tracing::info!(
                order_id = observed.id,
                symbol = %observed.symbol,
                direction = %observed.direction,
                fills = fresh.counted,
                cash_delta,
                qty_delta,
                "fills applied"
            );
        }

        let stale = previous
            .as_ref()
            .is_some_and(|p| observed.total_filled < p.total_filled);

        let stored = match previous {
            Some(mut prev) if stale => {
                tracing::warn!(
                    order_id = observed.id,
                    stored_filled = prev.total_filled,
                    observed_filled = observed.total_filled,
                    "older view of order, keeping stored record"
                );
                prev.open = prev.open && observed.open;
                prev.last_seen = max_ts(prev.last_seen, fresh.newest);
                prev
            }
            Some(prev) => {
                if !prev.open && observed.open {
                    tracing::debug!(order_id = observed.id, "order already closed, ignoring reopen");
                }
                OrderRecord {
                    open: prev.open && observed.open,
                    last_seen: max_ts(prev.last_seen, fresh.newest),
                    ..observed
                }
            }
            None => OrderRecord {
                last_seen: fresh.newest,
                ..observed
            },
        };
        let order_id = stored.id;
        self.registry.put(stored);

        ReconcileOutcome {
            order_id,
            cash_delta,
            qty_delta,
            counted_fills: fresh.counted,
            skipped_fills: fresh.skipped,
            stale,
        }
    }
}
