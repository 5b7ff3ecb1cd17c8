//! OrderStore trait definition
//!
//! The store is the arbiter between the matcher and concurrent
//! cancellations: every unit locks the affected rows, re-reads their
//! durable state under exclusion, and either commits atomically or
//! reports the skew it observed. Memory is only mutated after a unit
//! commits.

use async_trait::async_trait;
use common::numeric::Quantity;
use common::order::{Order, Trade};
use common::types::{OrderId, Symbol};

use crate::error::StoreResult;

/// Result of persisting an order acceptance
#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    /// The order row was inserted
    Accepted(Order),
    /// An order with the same idempotency key already exists; the
    /// caller should replay it instead of treating this as an error
    Replayed(Order),
}

/// One proposed trade plus the expected post-trade remainings
///
/// The expectations are what the matcher computed from memory; the
/// store verifies them against the locked rows and reports skew when
/// durable state no longer supports the proposed quantity.
#[derive(Debug, Clone)]
pub struct TradeUnit {
    /// The aggressing order being matched
    pub incoming_id: OrderId,
    /// The resting order being consumed
    pub resting_id: OrderId,
    /// Trade to record; its quantity is the proposed fill
    pub trade: Trade,
    /// Expected incoming remaining after the fill
    pub expected_incoming_remaining: Quantity,
    /// Expected resting remaining after the fill
    pub expected_resting_remaining: Quantity,
}

/// Result of a trade durability unit
#[derive(Debug, Clone)]
pub enum TradeUnitOutcome {
    /// Trade inserted and both legs updated; memory should be set to
    /// the returned remainings (they are the durable truth)
    Committed {
        trade: Trade,
        incoming_remaining: Quantity,
        resting_remaining: Quantity,
    },
    /// Durable remainings no longer support the proposed quantity
    /// (a cancel or another writer got there first); nothing was
    /// written. Remainings are the effective durable values: zero for
    /// rows that are no longer open.
    Skewed {
        incoming_remaining: Quantity,
        resting_remaining: Quantity,
    },
}

/// Transactional persistence used by the matcher and the order
/// lifecycle paths
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a newly accepted order
    ///
    /// Enforces idempotency-key uniqueness: when a key collides, the
    /// previously accepted order is returned as `Replayed`.
    async fn persist_accept(&self, order: Order) -> StoreResult<AcceptOutcome>;

    /// Atomically record a trade and update both legs
    ///
    /// Within one transaction: lock both order rows, re-read their
    /// remainings, abort with `Skewed` if either cannot cover the
    /// proposed quantity, otherwise insert the trade row and write the
    /// new remainings/statuses. Failure leaves durable state unchanged.
    async fn persist_trade_unit(&self, unit: TradeUnit) -> StoreResult<TradeUnitOutcome>;

    /// Cancel an order
    ///
    /// Locks the row, refuses with a typed error if it is already
    /// filled or cancelled, otherwise marks it cancelled and returns
    /// the updated row.
    async fn persist_cancel(&self, order_id: OrderId) -> StoreResult<Order>;

    /// Reconcile the incoming order at the end of a matching pass
    ///
    /// Takes the minimum of the durable remaining and the in-memory
    /// value (defensive against a concurrent cancel landing mid-pass)
    /// and derives the status. With `cancel_residue` set, an unfilled
    /// remainder is cancelled instead of left open - the market-order
    /// path. Returns the authoritative row.
    async fn finalize_incoming(
        &self,
        order_id: OrderId,
        remaining: Quantity,
        cancel_residue: bool,
    ) -> StoreResult<Order>;

    /// All resting limit orders, ordered by `created_at` ascending
    ///
    /// Recovery feed: limit orders with status open or partially
    /// filled and a price.
    async fn load_open(&self) -> StoreResult<Vec<Order>>;

    /// Fetch one order row
    async fn get_order(&self, order_id: OrderId) -> StoreResult<Option<Order>>;

    /// Trades involving the given order, oldest first
    async fn trades_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Trade>>;

    /// Most recent trades for an instrument, oldest first
    async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> StoreResult<Vec<Trade>>;

    /// Round-trip check for the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}
