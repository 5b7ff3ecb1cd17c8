//! Order and trade entities
//!
//! `Order` is the durable entity the kernel mutates; `Trade` is the
//! immutable record of a single match between two orders. The store is
//! the authority for both; in-memory book entries are projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::numeric::{Price, Quantity};
use crate::types::{OrderId, OrderStatus, OrderType, Side, Symbol, TradeId};

/// An order as accepted by the exchange
///
/// Invariants: `remaining <= quantity`; `remaining` only decreases;
/// `status == Filled` exactly when `remaining` is zero; a cancelled
/// order is never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// Client that placed the order
    pub client_id: String,
    /// Instrument being traded
    pub instrument: Symbol,
    /// Buy or sell
    pub side: Side,
    /// Limit or market
    pub order_type: OrderType,
    /// Limit price (None for market orders)
    pub price: Option<Price>,
    /// Original submitted size, immutable after creation
    pub quantity: Quantity,
    /// Unfilled size, 0 <= remaining <= quantity
    pub remaining: Quantity,
    /// Current lifecycle state
    pub status: OrderStatus,
    /// Client-supplied token making retried submissions safe
    pub idempotency_key: Option<String>,
    /// Assigned at acceptance
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a newly accepted order with `remaining = quantity`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: String,
        instrument: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Price>,
        quantity: Quantity,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            client_id,
            instrument,
            side,
            order_type,
            price,
            quantity,
            remaining: quantity,
            status: OrderStatus::Open,
            idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// Quantity executed so far
    pub fn filled_quantity(&self) -> Quantity {
        self.quantity.saturating_sub(self.remaining)
    }

    /// Set `remaining` and derive `status` in lockstep
    ///
    /// Cancelled orders are left untouched.
    pub fn set_remaining(&mut self, remaining: Quantity, at: DateTime<Utc>) {
        if self.status == OrderStatus::Cancelled {
            return;
        }
        self.remaining = remaining.min(self.quantity);
        self.status = if self.remaining.is_zero() {
            OrderStatus::Filled
        } else if self.remaining < self.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };
        self.updated_at = at;
    }

    /// Apply a fill of `qty`, clamped at the current remaining
    pub fn apply_fill(&mut self, qty: Quantity, at: DateTime<Utc>) {
        let remaining = self.remaining.saturating_sub(qty);
        self.set_remaining(remaining, at);
    }

    /// True while the order can still be cancelled
    pub fn can_cancel(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }

    /// True if the order is eligible to rest in a book
    pub fn is_resting_limit(&self) -> bool {
        self.order_type == OrderType::Limit
            && self.can_cancel()
            && !self.remaining.is_zero()
            && self.price.is_some()
    }
}

/// A single execution between a buy and a sell order
///
/// Immutable after creation. The price is always the resting order's
/// price at the moment of the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique trade identifier
    pub id: TradeId,
    /// Buy-side order
    pub buy_order_id: OrderId,
    /// Sell-side order
    pub sell_order_id: OrderId,
    /// Instrument both legs belong to
    pub instrument: Symbol,
    /// Execution price (the resting order's price)
    pub price: Price,
    /// Executed quantity, positive
    pub quantity: Quantity,
    /// When the trade was recorded
    pub traded_at: DateTime<Utc>,
}

impl Trade {
    /// Create a new trade record
    pub fn new(
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        instrument: Symbol,
        price: Price,
        quantity: Quantity,
        traded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TradeId::new(),
            buy_order_id,
            sell_order_id,
            instrument,
            price,
            quantity,
            traded_at,
        }
    }

    /// The order id on the given side of this trade
    pub fn order_on(&self, side: Side) -> OrderId {
        match side {
            Side::Buy => self.buy_order_id,
            Side::Sell => self.sell_order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit_order(qty: &str) -> Order {
        Order::new(
            "alice".to_string(),
            Symbol::new("BTC-USD"),
            Side::Buy,
            OrderType::Limit,
            Some("100".parse().unwrap()),
            qty.parse().unwrap(),
            None,
        )
    }

    #[test]
    fn test_new_order_is_open_with_full_remaining() {
        let order = limit_order("10");
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.remaining, order.quantity);
        assert!(order.filled_quantity().is_zero());
        assert!(order.is_resting_limit());
    }

    #[test]
    fn test_apply_fill_partial_then_full() {
        let mut order = limit_order("10");

        order.apply_fill("4".parse().unwrap(), Utc::now());
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining, "6".parse().unwrap());
        assert_eq!(order.filled_quantity(), "4".parse().unwrap());

        order.apply_fill("6".parse().unwrap(), Utc::now());
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.remaining.is_zero());
        assert!(!order.can_cancel());
        assert!(!order.is_resting_limit());
    }

    #[test]
    fn test_fill_clamped_at_remaining() {
        let mut order = limit_order("3");
        order.apply_fill("5".parse().unwrap(), Utc::now());
        assert!(order.remaining.is_zero());
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_cancelled_order_is_frozen() {
        let mut order = limit_order("10");
        order.status = OrderStatus::Cancelled;

        order.apply_fill("2".parse().unwrap(), Utc::now());
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.remaining, "10".parse().unwrap());
        assert!(!order.can_cancel());
    }

    #[test]
    fn test_market_order_never_rests() {
        let order = Order::new(
            "bob".to_string(),
            Symbol::new("BTC-USD"),
            Side::Sell,
            OrderType::Market,
            None,
            "1".parse().unwrap(),
            None,
        );
        assert!(!order.is_resting_limit());
    }

    #[test]
    fn test_trade_order_on() {
        let buy = OrderId::new();
        let sell = OrderId::new();
        let trade = Trade::new(
            buy,
            sell,
            Symbol::new("BTC-USD"),
            "100".parse().unwrap(),
            "1".parse().unwrap(),
            Utc::now(),
        );
        assert_eq!(trade.order_on(Side::Buy), buy);
        assert_eq!(trade.order_on(Side::Sell), sell);
    }
}
