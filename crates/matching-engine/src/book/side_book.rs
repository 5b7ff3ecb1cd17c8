//! One side of an instrument's book
//!
//! Price levels are kept in a BTreeMap keyed by price; the most
//! aggressive price is the last key for bids and the first for asks.
//! BTreeMap gives O(log n) level insertion, O(1)-ish best lookup and
//! deterministic iteration.

use std::collections::BTreeMap;

use common::numeric::{Price, Quantity};
use common::types::{OrderId, Side};

use crate::domain::{BookOrder, DepthLevel};

use super::price_level::PriceLevel;

/// Price-ordered collection of levels for one side
#[derive(Debug, Clone)]
pub struct SideBook {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl SideBook {
    /// Create an empty side book
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Which side this book holds
    pub fn side(&self) -> Side {
        self.side
    }

    /// The most aggressive price: highest bid or lowest ask
    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.keys().next_back().copied(),
            Side::Sell => self.levels.keys().next().copied(),
        }
    }

    /// The oldest order at the best price
    pub fn peek_best(&self) -> Option<&BookOrder> {
        let best = self.best_price()?;
        self.levels.get(&best)?.peek_front()
    }

    /// Place an order into the level matching its price, creating the
    /// level if absent
    pub fn insert(&mut self, order: BookOrder) {
        debug_assert_eq!(order.side, self.side);
        self.levels
            .entry(order.price)
            .or_insert_with(|| PriceLevel::new(order.price))
            .push_back(order);
    }

    /// Remove a specific order, dropping its level when emptied
    pub fn remove(&mut self, order_id: OrderId, price: Price) -> Option<BookOrder> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Reflect a committed remaining back into the book
    ///
    /// Pops the order at zero and drops the level when that empties it.
    pub fn set_remaining(&mut self, order_id: OrderId, price: Price, remaining: Quantity) -> bool {
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };
        let updated = level.set_remaining(order_id, remaining);
        if updated && level.is_empty() {
            self.levels.remove(&price);
        }
        updated
    }

    /// Aggregated top-N levels, best first
    pub fn depth(&self, n: usize) -> Vec<DepthLevel> {
        let view = |level: &PriceLevel| DepthLevel {
            price: level.price(),
            quantity: level.total_quantity(),
            orders: level.len(),
        };
        match self.side {
            Side::Buy => self.levels.values().rev().take(n).map(view).collect(),
            Side::Sell => self.levels.values().take(n).map(view).collect(),
        }
    }

    /// True when no orders rest on this side
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of resting orders across all levels
    pub fn order_count(&self) -> usize {
        self.levels.values().map(|l| l.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(side: Side, price: &str, qty: &str) -> BookOrder {
        BookOrder {
            id: OrderId::new(),
            side,
            price: price.parse().unwrap(),
            remaining: qty.parse().unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_best_bid_is_highest() {
        let mut book = SideBook::new(Side::Buy);
        book.insert(entry(Side::Buy, "100", "1"));
        book.insert(entry(Side::Buy, "102", "1"));
        book.insert(entry(Side::Buy, "101", "1"));

        assert_eq!(book.best_price(), Some("102".parse().unwrap()));
    }

    #[test]
    fn test_best_ask_is_lowest() {
        let mut book = SideBook::new(Side::Sell);
        book.insert(entry(Side::Sell, "100", "1"));
        book.insert(entry(Side::Sell, "98", "1"));
        book.insert(entry(Side::Sell, "101", "1"));

        assert_eq!(book.best_price(), Some("98".parse().unwrap()));
    }

    #[test]
    fn test_peek_best_is_oldest_at_best() {
        let mut book = SideBook::new(Side::Sell);
        let first = entry(Side::Sell, "100", "1");
        let first_id = first.id;
        book.insert(first);
        book.insert(entry(Side::Sell, "100", "2"));
        book.insert(entry(Side::Sell, "99", "3"));

        // Best moved to 99; its only order is the front.
        assert_eq!(book.peek_best().unwrap().price, "99".parse().unwrap());

        book.remove(book.peek_best().unwrap().id, "99".parse().unwrap());
        assert_eq!(book.peek_best().unwrap().id, first_id);
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut book = SideBook::new(Side::Buy);
        let order = entry(Side::Buy, "100", "1");
        let (id, price) = (order.id, order.price);
        book.insert(order);

        assert!(book.remove(id, price).is_some());
        assert!(book.is_empty());
        assert_eq!(book.level_count(), 0);
    }

    #[test]
    fn test_set_remaining_zero_drops_level() {
        let mut book = SideBook::new(Side::Sell);
        let order = entry(Side::Sell, "100", "5");
        let (id, price) = (order.id, order.price);
        book.insert(order);

        assert!(book.set_remaining(id, price, Quantity::zero()));
        assert!(book.is_empty());
    }

    #[test]
    fn test_depth_aggregates_per_level() {
        let mut book = SideBook::new(Side::Buy);
        book.insert(entry(Side::Buy, "100", "1"));
        book.insert(entry(Side::Buy, "100", "2"));
        book.insert(entry(Side::Buy, "99", "4"));
        book.insert(entry(Side::Buy, "98", "8"));

        let depth = book.depth(2);
        assert_eq!(depth.len(), 2);
        assert_eq!(depth[0].price, "100".parse().unwrap());
        assert_eq!(depth[0].quantity, "3".parse().unwrap());
        assert_eq!(depth[0].orders, 2);
        assert_eq!(depth[1].price, "99".parse().unwrap());
    }
}
