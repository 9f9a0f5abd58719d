use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized internal types used by the engine (venue-agnostic).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }

    /// Sign applied to a fill's quantity when it hits the ledger.
    pub fn qty_sign(&self) -> i64 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
    Limit,
    Market,
    FillOrKill,
    ImmediateOrCancel,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Limit => "limit",
            OrderKind::Market => "market",
            OrderKind::FillOrKill => "fill-or-kill",
            OrderKind::ImmediateOrCancel => "immediate-or-cancel",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution against an order, as reported by the venue.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub price: i64,
    pub qty: i64,
    /// `None` when the venue sent a missing or unparsable timestamp.
    pub ts: Option<DateTime<Utc>>,
}

/// Last-known state of an order. Used both for freshly observed views
/// (from a poll, the execution stream or a gateway response) and for the
/// stored record in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: u64,
    pub symbol: String,
    pub venue: String,
    pub account: String,
    pub direction: Direction,
    pub original_qty: i64,
    /// Quantity still resting on the book.
    pub qty: i64,
    pub price: i64,
    pub kind: OrderKind,
    pub total_filled: i64,
    pub open: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Latest fill timestamp already counted into the ledger. Always `None`
    /// on an observed view; set by reconciliation on the stored record.
    pub last_seen: Option<DateTime<Utc>>,
    pub fills: Vec<Fill>,
}

impl OrderRecord {
    pub fn fills_qty(&self) -> i64 {
        self.fills.iter().map(|f| f.qty).sum()
    }
}

/// Best price level on one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    pub price: i64,
    pub size: i64,
}

/// A top-of-book observation. Either side may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSample {
    pub bid: Option<BookLevel>,
    pub ask: Option<BookLevel>,
    /// Last trade price, when the source carries one (quotes do, books don't).
    pub last: Option<i64>,
    pub ts: DateTime<Utc>,
}

/// Parameters for a new order sent through the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub direction: Direction,
    pub qty: i64,
    pub price: i64,
    pub kind: OrderKind,
}
