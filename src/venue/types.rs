use crate::feed::types::{BookLevel, Direction, Fill, MarketSample, NewOrder, OrderKind, OrderRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parse a venue timestamp (RFC 3339 with nanoseconds).
pub fn parse_ts(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Every venue response carries this envelope; `ok=false` means rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub account: String,
    pub venue: String,
    pub stock: String,
    pub price: i64,
    pub qty: i64,
    pub direction: Direction,
    #[serde(rename = "orderType")]
    pub order_type: OrderKind,
}

impl CreateOrderRequest {
    pub fn new(account: &str, venue: &str, order: &NewOrder) -> Self {
        Self {
            account: account.to_string(),
            venue: venue.to_string(),
            stock: order.symbol.clone(),
            price: order.price,
            qty: order.qty,
            direction: order.direction,
            order_type: order.kind,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillWire {
    pub price: i64,
    pub qty: i64,
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWire {
    pub id: u64,
    pub symbol: String,
    pub venue: String,
    #[serde(default)]
    pub account: String,
    pub direction: Direction,
    pub original_qty: i64,
    #[serde(default)]
    pub qty: i64,
    #[serde(default)]
    pub price: i64,
    pub order_type: OrderKind,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub fills: Vec<FillWire>,
    #[serde(default)]
    pub total_filled: i64,
    pub open: bool,
}

impl From<OrderWire> for OrderRecord {
    fn from(wire: OrderWire) -> Self {
        let mut fills: Vec<Fill> = wire
            .fills
            .into_iter()
            .map(|f| Fill {
                price: f.price,
                qty: f.qty,
                ts: parse_ts(f.ts.as_deref()),
            })
            .collect();
        // Keep timestamped fills in time order; untimed ones go last.
        fills.sort_by_key(|f| (f.ts.is_none(), f.ts));

        OrderRecord {
            id: wire.id,
            symbol: wire.symbol,
            venue: wire.venue,
            account: wire.account,
            direction: wire.direction,
            original_qty: wire.original_qty,
            qty: wire.qty,
            price: wire.price,
            kind: wire.order_type,
            total_filled: wire.total_filled,
            open: wire.open,
            created_at: parse_ts(wire.ts.as_deref()),
            last_seen: None,
            fills,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountOrdersResponse {
    #[serde(default)]
    pub venue: String,
    pub orders: Vec<OrderWire>,
}

/// Executions channel message: the full order plus the trade that touched it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct ExecutionWire {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub symbol: String,
    pub order: OrderWire,
    #[serde(default)]
    pub standing_id: u64,
    #[serde(default)]
    pub incoming_id: u64,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub filled: i64,
    #[serde(default)]
    pub filled_at: Option<String>,
    #[serde(default)]
    pub standing_complete: bool,
    #[serde(default)]
    pub incoming_complete: bool,
}

/// Quote as returned by the REST quote endpoint and inside tickertape messages.
/// `bid`/`ask` are absent when that side of the book is empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct QuoteWire {
    pub symbol: String,
    pub venue: String,
    #[serde(default)]
    pub bid: Option<i64>,
    #[serde(default)]
    pub ask: Option<i64>,
    #[serde(default)]
    pub bid_size: i64,
    #[serde(default)]
    pub ask_size: i64,
    #[serde(default)]
    pub bid_depth: i64,
    #[serde(default)]
    pub ask_depth: i64,
    #[serde(default)]
    pub last: Option<i64>,
    #[serde(default)]
    pub last_size: Option<i64>,
    #[serde(default)]
    pub last_trade: Option<String>,
    pub quote_time: String,
}

impl TryFrom<QuoteWire> for MarketSample {
    type Error = anyhow::Error;

    fn try_from(quote: QuoteWire) -> Result<Self> {
        let ts = parse_ts(Some(&quote.quote_time))
            .with_context(|| format!("unparsable quoteTime {:?}", quote.quote_time))?;
        Ok(MarketSample {
            bid: quote.bid.filter(|&p| p > 0).map(|price| BookLevel {
                price,
                size: quote.bid_size,
            }),
            ask: quote.ask.filter(|&p| p > 0).map(|price| BookLevel {
                price,
                size: quote.ask_size,
            }),
            last: quote.last.filter(|&p| p > 0),
            ts,
        })
    }
}

/// Tickertape channel message.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerWire {
    pub quote: QuoteWire,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct BookEntryWire {
    pub price: i64,
    pub qty: i64,
    #[serde(default)]
    pub is_buy: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct OrderBookWire {
    pub venue: String,
    pub symbol: String,
    #[serde(default)]
    pub bids: Option<Vec<BookEntryWire>>,
    #[serde(default)]
    pub asks: Option<Vec<BookEntryWire>>,
    pub ts: String,
}

impl TryFrom<OrderBookWire> for MarketSample {
    type Error = anyhow::Error;

    fn try_from(book: OrderBookWire) -> Result<Self> {
        let ts = parse_ts(Some(&book.ts))
            .with_context(|| format!("unparsable order book ts {:?}", book.ts))?;
        let top = |side: &Option<Vec<BookEntryWire>>| {
            side.as_ref()
                .and_then(|levels| levels.first())
                .map(|l| BookLevel {
                    price: l.price,
                    size: l.qty,
                })
        };
        Ok(MarketSample {
            bid: top(&book.bids),
            ask: top(&book.asks),
            last: None,
            ts,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct VenueHeartbeat {
    pub venue: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_JSON: &str = r#"{
        "ok": true,
        "symbol": "SDI",
        "venue": "EPOREX",
        "direction": "buy",
        "originalQty": 100,
        "qty": 20,
        "price": 5100,
        "orderType": "limit",
        "id": 12345,
        "account": "FMB75081984",
        "ts": "2015-07-05T22:16:18.000000000Z",
        "fills": [
            {"price": 5050, "qty": 30, "ts": "2015-07-05T22:16:19.250000000Z"},
            {"price": 5040, "qty": 50, "ts": "2015-07-05T22:16:18.500000000Z"}
        ],
        "totalFilled": 80,
        "open": true
    }"#;

    #[test]
    fn test_order_decodes_into_record() {
        let wire: OrderWire = serde_json::from_str(ORDER_JSON).unwrap();
        let record = OrderRecord::from(wire);
        assert_eq!(record.id, 12345);
        assert_eq!(record.direction, Direction::Buy);
        assert_eq!(record.kind, OrderKind::Limit);
        assert_eq!(record.original_qty, 100);
        assert_eq!(record.total_filled, 80);
        assert!(record.open);
        assert!(record.created_at.is_some());
        assert!(record.last_seen.is_none());
        // Fills come back sorted by timestamp
        assert_eq!(record.fills[0].price, 5040);
        assert_eq!(record.fills[1].price, 5050);
    }

    #[test]
    fn test_bad_fill_timestamp_becomes_none() {
        let json = ORDER_JSON.replace("2015-07-05T22:16:19.250000000Z", "not-a-time");
        let record = OrderRecord::from(serde_json::from_str::<OrderWire>(&json).unwrap());
        assert_eq!(record.fills.len(), 2);
        assert!(record.fills[1].ts.is_none());
    }

    #[test]
    fn test_unknown_direction_is_decode_error() {
        let json = ORDER_JSON.replace("\"buy\"", "\"hold\"");
        assert!(serde_json::from_str::<OrderWire>(&json).is_err());
    }

    #[test]
    fn test_order_kinds_decode() {
        for (raw, kind) in [
            ("market", OrderKind::Market),
            ("fill-or-kill", OrderKind::FillOrKill),
            ("immediate-or-cancel", OrderKind::ImmediateOrCancel),
        ] {
            let json = ORDER_JSON.replace("\"limit\"", &format!("\"{}\"", raw));
            let wire: OrderWire = serde_json::from_str(&json).unwrap();
            assert_eq!(wire.order_type, kind);
        }
    }

    #[test]
    fn test_create_order_request_shape() {
        let req = CreateOrderRequest::new(
            "ACC1",
            "EPOREX",
            &NewOrder {
                symbol: "SDI".to_string(),
                direction: Direction::Sell,
                qty: 100,
                price: 4999,
                kind: OrderKind::ImmediateOrCancel,
            },
        );
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["stock"], "SDI");
        assert_eq!(v["direction"], "sell");
        assert_eq!(v["orderType"], "immediate-or-cancel");
        assert_eq!(v["price"], 4999);
    }

    #[test]
    fn test_ticker_quote_without_bid() {
        let json = r#"{"ok": true, "quote": {
            "symbol": "SDI", "venue": "EPOREX",
            "ask": 5125, "askSize": 300, "bidSize": 0,
            "last": 5100, "lastSize": 10,
            "quoteTime": "2015-07-05T22:16:18.123456789Z"
        }}"#;
        let ticker: TickerWire = serde_json::from_str(json).unwrap();
        let sample = MarketSample::try_from(ticker.quote).unwrap();
        assert!(sample.bid.is_none());
        assert_eq!(sample.ask, Some(BookLevel { price: 5125, size: 300 }));
        assert_eq!(sample.last, Some(5100));
    }

    #[test]
    fn test_quote_with_bad_time_is_rejected() {
        let json = r#"{"symbol": "SDI", "venue": "EPOREX", "bid": 1, "quoteTime": "yesterday"}"#;
        let quote: QuoteWire = serde_json::from_str(json).unwrap();
        assert!(MarketSample::try_from(quote).is_err());
    }

    #[test]
    fn test_order_book_top_levels() {
        let json = r#"{"ok": true, "venue": "EPOREX", "symbol": "SDI",
            "bids": [{"price": 5000, "qty": 100, "isBuy": true}, {"price": 4990, "qty": 5, "isBuy": true}],
            "asks": null,
            "ts": "2015-07-05T22:16:18.000000000Z"}"#;
        let book: OrderBookWire = serde_json::from_str(json).unwrap();
        let sample = MarketSample::try_from(book).unwrap();
        assert_eq!(sample.bid, Some(BookLevel { price: 5000, size: 100 }));
        assert!(sample.ask.is_none());
        assert!(sample.last.is_none());
    }

    #[test]
    fn test_execution_message_decodes() {
        let json = format!(
            r#"{{"ok": true, "account": "FMB75081984", "venue": "EPOREX", "symbol": "SDI",
                "order": {}, "standingId": 12345, "incomingId": 12399, "price": 5050,
                "filled": 30, "filledAt": "2015-07-05T22:16:19.250000000Z",
                "standingComplete": false, "incomingComplete": true}}"#,
            ORDER_JSON
        );
        let exec: ExecutionWire = serde_json::from_str(&json).unwrap();
        assert_eq!(exec.order.id, 12345);
        assert_eq!(exec.filled, 30);
    }

    #[test]
    fn test_error_envelope() {
        let env: Envelope = serde_json::from_str(r#"{"ok": false, "error": "No such order"}"#).unwrap();
        assert!(!env.ok);
        assert_eq!(env.error.as_deref(), Some("No such order"));
    }
}
