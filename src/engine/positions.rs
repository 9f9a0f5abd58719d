use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    pub symbol: String,
    pub owned: i64,
    pub balance: i64, // cents
}

/// Point-in-time view of a position, marked to the latest trade price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub owned: i64,
    pub balance: i64,
    pub last_price: Option<i64>,
    /// `balance + owned * last_price`; `None` until a trade price is seen.
    pub nav: Option<i64>,
}

#[derive(Default)]
struct LedgerState {
    positions: HashMap<String, Position>,
    marks: HashMap<String, i64>,
}

/// Owned quantity and cash per symbol. Fill deltas are the only way a
/// position changes.
#[derive(Default)]
pub struct PositionLedger {
    state: Mutex<LedgerState>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additive update. No feasibility checks: the venue enforces those.
    pub fn apply(&self, symbol: &str, cash_delta: i64, qty_delta: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = state
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                ..Default::default()
            });
        pos.balance += cash_delta;
        pos.owned += qty_delta;
    }

    /// Record the latest observed last-trade price for a symbol.
    pub fn mark(&self, symbol: &str, last_price: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.marks.insert(symbol.to_string(), last_price);
    }

    pub fn snapshot(&self, symbol: &str) -> PositionSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (owned, balance) = state
            .positions
            .get(symbol)
            .map_or((0, 0), |p| (p.owned, p.balance));
        let last_price = state.marks.get(symbol).copied();
        PositionSnapshot {
            symbol: symbol.to_string(),
            owned,
            balance,
            last_price,
            nav: last_price.map(|last| balance + owned * last),
        }
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .positions
            .contains_key(symbol)
    }
}
