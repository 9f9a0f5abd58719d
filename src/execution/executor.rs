use super::OrderGateway;
use crate::feed::types::{NewOrder, OrderKind, OrderRecord};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Validates and logs order traffic before it reaches the gateway.
pub struct OrderExecutor {
    gateway: Arc<dyn OrderGateway>,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn OrderGateway>) -> Self {
        Self { gateway }
    }

    /// Submit order with validation
    pub async fn submit_order(&self, order: &NewOrder) -> Result<OrderRecord> {
        if order.qty <= 0 {
            anyhow::bail!("quantity must be > 0, got {}", order.qty);
        }
        if order.kind != OrderKind::Market && order.price <= 0 {
            anyhow::bail!("price must be > 0 for {} orders, got {}", order.kind, order.price);
        }

        let record = self
            .gateway
            .place_order(order)
            .await
            .context("order submission failed")?;

        tracing::info!(
            symbol = %order.symbol,
            order_id = record.id,
            direction = %order.direction,
            qty = order.qty,
            price = order.price,
            kind = %order.kind,
            "order submitted"
        );
        Ok(record)
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<OrderRecord> {
        let record = self
            .gateway
            .cancel_order(symbol, order_id)
            .await
            .with_context(|| format!("cancel of order {} failed", order_id))?;
        tracing::info!(
            symbol = %symbol,
            order_id,
            total_filled = record.total_filled,
            "order cancelled"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::Direction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGateway {
        placed: AtomicUsize,
    }

    #[async_trait]
    impl OrderGateway for CountingGateway {
        async fn place_order(&self, order: &NewOrder) -> Result<OrderRecord> {
            let id = self.placed.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok(OrderRecord {
                id,
                symbol: order.symbol.clone(),
                venue: "EPOREX".to_string(),
                account: "FMB75081984".to_string(),
                direction: order.direction,
                original_qty: order.qty,
                qty: order.qty,
                price: order.price,
                kind: order.kind,
                total_filled: 0,
                open: true,
                created_at: None,
                last_seen: None,
                fills: vec![],
            })
        }
        async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<OrderRecord> {
            anyhow::bail!("unknown order {}", order_id)
        }
        async fn fetch_open_orders(&self, _account: &str, _symbol: &str) -> Result<Vec<OrderRecord>> {
            Ok(vec![])
        }
    }

    fn new_order(qty: i64, price: i64, kind: OrderKind) -> NewOrder {
        NewOrder {
            symbol: "SDI".to_string(),
            direction: Direction::Buy,
            qty,
            price,
            kind,
        }
    }

    #[tokio::test]
    async fn test_invalid_orders_never_reach_gateway() {
        let gateway = Arc::new(CountingGateway::default());
        let executor = OrderExecutor::new(gateway.clone());

        assert!(executor.submit_order(&new_order(0, 100, OrderKind::Limit)).await.is_err());
        assert!(executor.submit_order(&new_order(10, 0, OrderKind::Limit)).await.is_err());
        assert_eq!(gateway.placed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_market_order_needs_no_price() {
        let gateway = Arc::new(CountingGateway::default());
        let executor = OrderExecutor::new(gateway.clone());

        let record = executor
            .submit_order(&new_order(10, 0, OrderKind::Market))
            .await
            .unwrap();
        assert_eq!(record.id, 1);
        assert!(record.open);
    }

    #[tokio::test]
    async fn test_cancel_error_carries_order_id() {
        let executor = OrderExecutor::new(Arc::new(CountingGateway::default()));
        let err = executor.cancel_order("SDI", 77).await.unwrap_err();
        assert!(format!("{:#}", err).contains("77"));
    }
}
