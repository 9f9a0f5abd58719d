use super::auth::{VenueAuth, AUTH_HEADER};
use super::types::{ExecutionWire, TickerWire};
use crate::feed::types::{MarketSample, OrderRecord};
use crate::feed::{ExecutionFeed, MarketDataFeed};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// One venue WebSocket. There is no reconnect: once the socket closes every
/// further read is an error.
struct VenueSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    label: &'static str,
}

impl VenueSocket {
    async fn connect(url: &str, auth: &VenueAuth, label: &'static str) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .context("failed to build WS request")?;
        request.headers_mut().insert(
            AUTH_HEADER,
            HeaderValue::from_str(auth.api_key())
                .map_err(|e| anyhow::anyhow!("invalid header value: {}", e))?,
        );

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("{} WS connection failed", label))?;
        tracing::info!(url, "{} WS connected", label);
        Ok(Self { stream, label })
    }

    /// Next text frame. Answers pings along the way.
    async fn next_text(&mut self) -> Result<String> {
        while let Some(msg) = self.stream.next().await {
            let msg = msg.with_context(|| format!("{} WS read error", self.label))?;
            match msg {
                Message::Text(text) => return Ok(text.to_string()),
                Message::Ping(data) => {
                    self.stream.send(Message::Pong(data)).await?;
                }
                Message::Close(frame) => {
                    tracing::warn!(?frame, "{} WS received close frame", self.label);
                    break;
                }
                _ => {}
            }
        }
        anyhow::bail!("{} WS closed", self.label)
    }
}

fn decode_ticker(text: &str) -> Result<MarketSample> {
    let msg: TickerWire = serde_json::from_str(text).context("failed to parse tickertape message")?;
    MarketSample::try_from(msg.quote)
}

fn decode_execution(text: &str) -> Result<OrderRecord> {
    let msg: ExecutionWire =
        serde_json::from_str(text).context("failed to parse execution message")?;
    tracing::debug!(
        order_id = msg.order.id,
        price = msg.price,
        filled = msg.filled,
        "execution report"
    );
    Ok(msg.order.into())
}

/// Streaming quotes for one symbol.
pub struct QuoteStream {
    socket: VenueSocket,
}

impl QuoteStream {
    pub async fn connect(
        auth: &VenueAuth,
        ws_base: &str,
        account: &str,
        venue: &str,
        symbol: &str,
    ) -> Result<Self> {
        let url = format!(
            "{}/{}/venues/{}/tickertape/stocks/{}",
            ws_base.trim_end_matches('/'),
            account,
            venue,
            symbol
        );
        Ok(Self {
            socket: VenueSocket::connect(&url, auth, "tickertape").await?,
        })
    }
}

#[async_trait]
impl MarketDataFeed for QuoteStream {
    async fn next_sample(&mut self) -> Result<MarketSample> {
        loop {
            let text = self.socket.next_text().await?;
            match decode_ticker(&text) {
                Ok(sample) => return Ok(sample),
                Err(e) => tracing::warn!("tickertape message skipped: {:#}", e),
            }
        }
    }
}

/// Streaming execution reports for the account on one symbol.
pub struct ExecutionStream {
    socket: VenueSocket,
}

impl ExecutionStream {
    pub async fn connect(
        auth: &VenueAuth,
        ws_base: &str,
        account: &str,
        venue: &str,
        symbol: &str,
    ) -> Result<Self> {
        let url = format!(
            "{}/{}/venues/{}/executions/stocks/{}",
            ws_base.trim_end_matches('/'),
            account,
            venue,
            symbol
        );
        Ok(Self {
            socket: VenueSocket::connect(&url, auth, "executions").await?,
        })
    }
}

#[async_trait]
impl ExecutionFeed for ExecutionStream {
    async fn next_batch(&mut self) -> Result<Vec<OrderRecord>> {
        loop {
            let text = self.socket.next_text().await?;
            match decode_execution(&text) {
                Ok(order) => return Ok(vec![order]),
                Err(e) => tracing::warn!("execution message skipped: {:#}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Direction;

    #[test]
    fn test_decode_ticker_message() {
        let text = r#"{
            "ok": true,
            "quote": {
                "symbol": "SDI", "venue": "EPOREX",
                "bid": 5100, "ask": 5125, "bidSize": 392, "askSize": 711,
                "bidDepth": 2748, "askDepth": 2237,
                "last": 5125, "lastSize": 52,
                "lastTrade": "2015-07-13T05:38:17.33640392Z",
                "quoteTime": "2015-07-13T05:38:17.33640392Z"
            }
        }"#;
        let sample = decode_ticker(text).unwrap();
        assert_eq!(sample.bid.unwrap().price, 5100);
        assert_eq!(sample.ask.unwrap().size, 711);
        assert_eq!(sample.last, Some(5125));
    }

    #[test]
    fn test_decode_ticker_one_sided_book() {
        let text = r#"{"ok": true, "quote": {
            "symbol": "SDI", "venue": "EPOREX", "askSize": 0, "bidSize": 0,
            "ask": 5125, "quoteTime": "2015-07-13T05:38:17Z"}}"#;
        let sample = decode_ticker(text).unwrap();
        assert!(sample.bid.is_none());
        assert_eq!(sample.ask.unwrap().price, 5125);
    }

    #[test]
    fn test_decode_ticker_rejects_garbage() {
        assert!(decode_ticker("not json").is_err());
        assert!(decode_ticker(r#"{"ok": true}"#).is_err());
    }

    #[test]
    fn test_decode_execution_carries_full_order() {
        let text = r#"{
            "ok": true, "account": "FMB75081984", "venue": "EPOREX", "symbol": "SDI",
            "order": {
                "ok": true, "symbol": "SDI", "venue": "EPOREX", "direction": "buy",
                "originalQty": 100, "qty": 80, "price": 5000, "orderType": "limit",
                "id": 1234, "account": "FMB75081984",
                "ts": "2015-07-13T05:38:17.33640392Z",
                "fills": [{"price": 4990, "qty": 20, "ts": "2015-07-13T05:38:18Z"}],
                "totalFilled": 20, "open": true
            },
            "standingId": 1234, "incomingId": 1240, "price": 4990, "filled": 20,
            "filledAt": "2015-07-13T05:38:18Z",
            "standingComplete": false, "incomingComplete": true
        }"#;
        let order = decode_execution(text).unwrap();
        assert_eq!(order.id, 1234);
        assert_eq!(order.direction, Direction::Buy);
        assert_eq!(order.total_filled, 20);
        assert_eq!(order.fills.len(), 1);
        assert!(order.fills[0].ts.is_some());
    }
}
