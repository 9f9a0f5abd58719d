use crate::feed::types::OrderRecord;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Last-known state of every order created or observed, keyed by venue id.
/// Records are never removed; a closed order stays for reference.
#[derive(Default)]
pub struct OrderRegistry {
    orders: Mutex<HashMap<u64, OrderRecord>>, // order id -> record
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<OrderRecord> {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Insert or replace the record for `order.id`.
    pub fn put(&self, order: OrderRecord) {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order.id, order);
    }

    /// Records still resting on the book.
    pub fn open_orders(&self) -> Vec<OrderRecord> {
        let orders = self.orders.lock().unwrap_or_else(PoisonError::into_inner);
        let mut open: Vec<OrderRecord> = orders.values().filter(|o| o.open).cloned().collect();
        open.sort_by_key(|o| o.id);
        open
    }

    pub fn is_open(&self, id: u64) -> bool {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|o| o.open)
    }

    pub fn len(&self) -> usize {
        self.orders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
