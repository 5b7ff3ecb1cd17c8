//! Price level: the FIFO queue of orders resting at one price
//!
//! Ordering is strictly by insertion; the single-matcher discipline
//! makes insertion order equal arrival order, so the front of the
//! queue is always the order with time priority.

use std::collections::VecDeque;

use common::numeric::{Price, Quantity};
use common::types::OrderId;

use crate::domain::BookOrder;

/// All orders resting at a single price, oldest first
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<BookOrder>,
    total: Quantity,
}

impl PriceLevel {
    /// Create an empty level at the given price
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total: Quantity::zero(),
        }
    }

    /// The price shared by every order in this level
    pub fn price(&self) -> Price {
        self.price
    }

    /// Append an order at the back of the queue
    pub fn push_back(&mut self, order: BookOrder) {
        debug_assert_eq!(order.price, self.price);
        self.total = self.total + order.remaining;
        self.orders.push_back(order);
    }

    /// The oldest order at this price
    pub fn peek_front(&self) -> Option<&BookOrder> {
        self.orders.front()
    }

    /// Remove and return the oldest order
    pub fn pop_front(&mut self) -> Option<BookOrder> {
        let order = self.orders.pop_front()?;
        self.total = self.total.saturating_sub(order.remaining);
        Some(order)
    }

    /// Remove a specific order wherever it sits in the queue
    ///
    /// O(n) scan; cancellations are rare relative to fills.
    pub fn remove(&mut self, order_id: OrderId) -> Option<BookOrder> {
        let position = self.orders.iter().position(|o| o.id == order_id)?;
        let order = self.orders.remove(position)?;
        self.total = self.total.saturating_sub(order.remaining);
        Some(order)
    }

    /// Set the remaining quantity of one order, popping it when zero
    ///
    /// Used to reflect committed durable state back into the book.
    /// Returns false if the order is not in this level.
    pub fn set_remaining(&mut self, order_id: OrderId, remaining: Quantity) -> bool {
        let Some(position) = self.orders.iter().position(|o| o.id == order_id) else {
            return false;
        };
        let old = self.orders[position].remaining;
        if remaining.is_zero() {
            self.orders.remove(position);
        } else {
            self.orders[position].remaining = remaining;
        }
        self.total = self.total.saturating_sub(old) + remaining;
        true
    }

    /// True when no orders rest here; an empty level must be removed
    /// from its side book
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Sum of remaining quantities
    pub fn total_quantity(&self) -> Quantity {
        self.total
    }
}
