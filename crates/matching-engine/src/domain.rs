//! Kernel-facing projections of the domain types
//!
//! The book holds [`BookOrder`] entries - the slice of an order the
//! matcher needs for price-time priority. The full [`Order`] lives in
//! the durable store; book entries are reconciled against it at every
//! durability-unit boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::numeric::{Price, Quantity};
use common::order::{Order, Trade};
use common::types::{OrderId, OrderType, Side, Symbol};

/// An order as it rests in a price level
#[derive(Debug, Clone, PartialEq)]
pub struct BookOrder {
    /// Order identifier
    pub id: OrderId,
    /// Buy or sell
    pub side: Side,
    /// The level this entry belongs to
    pub price: Price,
    /// Unfilled quantity as last reconciled with the store
    pub remaining: Quantity,
    /// Acceptance timestamp, drives time priority on recovery
    pub created_at: DateTime<Utc>,
}

impl BookOrder {
    /// Project a resting limit order into its book entry
    ///
    /// Returns None unless the order is eligible to rest.
    pub fn from_order(order: &Order) -> Option<Self> {
        if !order.is_resting_limit() {
            return None;
        }
        Some(Self {
            id: order.id,
            side: order.side,
            price: order.price?,
            remaining: order.remaining,
            created_at: order.created_at,
        })
    }
}

/// A validated submission, before acceptance
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Submitting client
    pub client_id: String,
    /// Instrument to trade
    pub instrument: Symbol,
    /// Buy or sell
    pub side: Side,
    /// Limit or market
    pub order_type: OrderType,
    /// Required for limit, forbidden for market
    pub price: Option<Price>,
    /// Must be positive
    pub quantity: Quantity,
    /// Optional replay-safety token
    pub idempotency_key: Option<String>,
}

/// What a submission produced: the accepted (possibly already
/// terminal) order and the trades executed as a direct consequence
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    /// The order row after the matching pass
    pub order: Order,
    /// Trades in the order the matcher produced them
    pub trades: Vec<Trade>,
}

/// One aggregated price level in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthLevel {
    /// Level price
    pub price: Price,
    /// Sum of remaining quantities at this price
    pub quantity: Quantity,
    /// Number of resting orders
    pub orders: usize,
}

/// Consistent view of one instrument's book
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    /// Instrument
    pub instrument: Symbol,
    /// Bid levels, best (highest) first
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<DepthLevel>,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}
