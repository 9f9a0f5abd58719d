pub mod executor;
pub mod paper;

use crate::feed::types::{NewOrder, OrderRecord};
use anyhow::Result;
use async_trait::async_trait;

/// Executes order operations against a venue. Every call returns the order's
/// resulting representation, which the caller feeds back into reconciliation.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_order(&self, order: &NewOrder) -> Result<OrderRecord>;
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<OrderRecord>;
    /// All orders the venue knows for the account and symbol, open or not.
    async fn fetch_open_orders(&self, account: &str, symbol: &str) -> Result<Vec<OrderRecord>>;
}
