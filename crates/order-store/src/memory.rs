//! In-memory order store implementation
//!
//! Backs tests and the `memory` database backend. A single mutex over
//! the maps stands in for row locking: every unit runs to completion
//! under it, which gives the same atomicity the Postgres
//! implementation gets from transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use common::numeric::Quantity;
use common::order::{Order, Trade};
use common::types::{OrderId, OrderStatus, Symbol};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AcceptOutcome, OrderStore, TradeUnit, TradeUnitOutcome};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    idempotency_keys: HashMap<String, OrderId>,
    trades: Vec<Trade>,
}

impl Inner {
    fn order(&self, id: OrderId) -> StoreResult<&Order> {
        self.orders.get(&id).ok_or(StoreError::OrderNotFound(id))
    }

    /// Apply a fill to one row, returning its new remaining
    fn fill_order(&mut self, id: OrderId, q: Quantity, now: DateTime<Utc>) -> StoreResult<Quantity> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;
        order.apply_fill(q, now);
        Ok(order.remaining)
    }
}

/// In-memory order store
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
}

impl MemoryOrderStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Remaining quantity a unit may consume from a row: zero once the
    /// order has left the open states
    fn effective_remaining(order: &Order) -> Quantity {
        if order.can_cancel() {
            order.remaining
        } else {
            Quantity::zero()
        }
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn persist_accept(&self, order: Order) -> StoreResult<AcceptOutcome> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(key) = &order.idempotency_key {
            if let Some(existing_id) = inner.idempotency_keys.get(key) {
                let existing = inner
                    .orders
                    .get(existing_id)
                    .cloned()
                    .ok_or(StoreError::OrderNotFound(*existing_id))?;
                return Ok(AcceptOutcome::Replayed(existing));
            }
            inner.idempotency_keys.insert(key.clone(), order.id);
        }

        inner.orders.insert(order.id, order.clone());
        Ok(AcceptOutcome::Accepted(order))
    }

    async fn persist_trade_unit(&self, unit: TradeUnit) -> StoreResult<TradeUnitOutcome> {
        let mut inner = self.inner.lock().unwrap();

        let available_incoming = Self::effective_remaining(inner.order(unit.incoming_id)?);
        let available_resting = Self::effective_remaining(inner.order(unit.resting_id)?);
        let q = unit.trade.quantity;

        if available_incoming < q || available_resting < q {
            return Ok(TradeUnitOutcome::Skewed {
                incoming_remaining: available_incoming,
                resting_remaining: available_resting,
            });
        }

        let now = Utc::now();
        let incoming_remaining = inner.fill_order(unit.incoming_id, q, now)?;
        let resting_remaining = inner.fill_order(unit.resting_id, q, now)?;

        inner.trades.push(unit.trade.clone());
        Ok(TradeUnitOutcome::Committed {
            trade: unit.trade,
            incoming_remaining,
            resting_remaining,
        })
    }

    async fn persist_cancel(&self, order_id: OrderId) -> StoreResult<Order> {
        let mut inner = self.inner.lock().unwrap();

        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if !order.can_cancel() {
            return Err(StoreError::NotCancellable {
                id: order_id,
                status: order.status,
            });
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn finalize_incoming(
        &self,
        order_id: OrderId,
        remaining: Quantity,
        cancel_residue: bool,
    ) -> StoreResult<Order> {
        let mut inner = self.inner.lock().unwrap();

        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if order.status == OrderStatus::Cancelled {
            return Ok(order.clone());
        }

        let now = Utc::now();
        order.set_remaining(order.remaining.min(remaining), now);
        if cancel_residue && !order.remaining.is_zero() {
            order.status = OrderStatus::Cancelled;
            order.updated_at = now;
        }
        Ok(order.clone())
    }

    async fn load_open(&self) -> StoreResult<Vec<Order>> {
        let inner = self.inner.lock().unwrap();
        let mut open: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.is_resting_limit())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn get_order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn trades_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Trade>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .trades
            .iter()
            .filter(|t| t.buy_order_id == order_id || t.sell_order_id == order_id)
            .cloned()
            .collect())
    }

    async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> StoreResult<Vec<Trade>> {
        let inner = self.inner.lock().unwrap();
        let matching: Vec<Trade> = inner
            .trades
            .iter()
            .filter(|t| &t.instrument == instrument)
            .cloned()
            .collect();
        let start = matching.len().saturating_sub(limit as usize);
        Ok(matching[start..].to_vec())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{OrderType, Side};

    fn limit_order(side: Side, price: &str, qty: &str) -> Order {
        Order::new(
            "alice".to_string(),
            Symbol::new("BTC-USD"),
            side,
            OrderType::Limit,
            Some(price.parse().unwrap()),
            qty.parse().unwrap(),
            None,
        )
    }

    fn unit_for(buy: &Order, sell: &Order, incoming: OrderId, qty: &str) -> TradeUnit {
        let q: Quantity = qty.parse().unwrap();
        let resting_id = if incoming == buy.id { sell.id } else { buy.id };
        TradeUnit {
            incoming_id: incoming,
            resting_id,
            trade: Trade::new(
                buy.id,
                sell.id,
                buy.instrument.clone(),
                sell.price.unwrap(),
                q,
                Utc::now(),
            ),
            expected_incoming_remaining: Quantity::zero(),
            expected_resting_remaining: Quantity::zero(),
        }
    }

    #[tokio::test]
    async fn test_accept_and_get() {
        let store = MemoryOrderStore::new();
        let order = limit_order(Side::Buy, "100", "10");
        let id = order.id;

        match store.persist_accept(order).await.unwrap() {
            AcceptOutcome::Accepted(o) => assert_eq!(o.id, id),
            AcceptOutcome::Replayed(_) => panic!("fresh order replayed"),
        }
        assert!(store.get_order(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_idempotency_replay() {
        let store = MemoryOrderStore::new();
        let mut first = limit_order(Side::Buy, "100", "10");
        first.idempotency_key = Some("key-1".to_string());
        let first_id = first.id;
        store.persist_accept(first).await.unwrap();

        let mut second = limit_order(Side::Buy, "100", "10");
        second.idempotency_key = Some("key-1".to_string());

        match store.persist_accept(second).await.unwrap() {
            AcceptOutcome::Replayed(o) => assert_eq!(o.id, first_id),
            AcceptOutcome::Accepted(_) => panic!("duplicate key accepted twice"),
        }
    }

    #[tokio::test]
    async fn test_trade_unit_commits_and_updates_both_legs() {
        let store = MemoryOrderStore::new();
        let buy = limit_order(Side::Buy, "100", "10");
        let sell = limit_order(Side::Sell, "100", "4");
        store.persist_accept(buy.clone()).await.unwrap();
        store.persist_accept(sell.clone()).await.unwrap();

        let outcome = store
            .persist_trade_unit(unit_for(&buy, &sell, buy.id, "4"))
            .await
            .unwrap();

        match outcome {
            TradeUnitOutcome::Committed {
                incoming_remaining,
                resting_remaining,
                ..
            } => {
                assert_eq!(incoming_remaining, "6".parse().unwrap());
                assert!(resting_remaining.is_zero());
            }
            TradeUnitOutcome::Skewed { .. } => panic!("unexpected skew"),
        }

        let buy_row = store.get_order(buy.id).await.unwrap().unwrap();
        assert_eq!(buy_row.status, OrderStatus::PartiallyFilled);
        let sell_row = store.get_order(sell.id).await.unwrap().unwrap();
        assert_eq!(sell_row.status, OrderStatus::Filled);
        assert_eq!(store.trades_for_order(buy.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trade_unit_skews_after_cancel() {
        let store = MemoryOrderStore::new();
        let buy = limit_order(Side::Buy, "100", "10");
        let sell = limit_order(Side::Sell, "100", "10");
        store.persist_accept(buy.clone()).await.unwrap();
        store.persist_accept(sell.clone()).await.unwrap();

        // The resting leg is cancelled before the unit runs.
        store.persist_cancel(sell.id).await.unwrap();

        let outcome = store
            .persist_trade_unit(unit_for(&buy, &sell, buy.id, "10"))
            .await
            .unwrap();

        match outcome {
            TradeUnitOutcome::Skewed {
                incoming_remaining,
                resting_remaining,
            } => {
                assert_eq!(incoming_remaining, "10".parse().unwrap());
                assert!(resting_remaining.is_zero());
            }
            TradeUnitOutcome::Committed { .. } => panic!("traded against a cancelled order"),
        }
        assert!(store.trades_for_order(buy.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_refuses_filled() {
        let store = MemoryOrderStore::new();
        let buy = limit_order(Side::Buy, "100", "5");
        let sell = limit_order(Side::Sell, "100", "5");
        store.persist_accept(buy.clone()).await.unwrap();
        store.persist_accept(sell.clone()).await.unwrap();
        store
            .persist_trade_unit(unit_for(&buy, &sell, buy.id, "5"))
            .await
            .unwrap();

        let err = store.persist_cancel(sell.id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotCancellable {
                status: OrderStatus::Filled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let store = MemoryOrderStore::new();
        let err = store.persist_cancel(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_finalize_takes_minimum_and_respects_cancel() {
        let store = MemoryOrderStore::new();
        let order = limit_order(Side::Buy, "100", "10");
        store.persist_accept(order.clone()).await.unwrap();

        let row = store
            .finalize_incoming(order.id, "7".parse().unwrap(), false)
            .await
            .unwrap();
        assert_eq!(row.remaining, "7".parse().unwrap());
        assert_eq!(row.status, OrderStatus::PartiallyFilled);

        // A concurrent cancel wins over the matcher's view.
        store.persist_cancel(order.id).await.unwrap();
        let row = store
            .finalize_incoming(order.id, "3".parse().unwrap(), false)
            .await
            .unwrap();
        assert_eq!(row.status, OrderStatus::Cancelled);
        assert_eq!(row.remaining, "7".parse().unwrap());
    }

    #[tokio::test]
    async fn test_finalize_cancels_market_residue() {
        let store = MemoryOrderStore::new();
        let order = Order::new(
            "bob".to_string(),
            Symbol::new("BTC-USD"),
            Side::Buy,
            OrderType::Market,
            None,
            "3".parse().unwrap(),
            None,
        );
        store.persist_accept(order.clone()).await.unwrap();

        let row = store
            .finalize_incoming(order.id, "1".parse().unwrap(), true)
            .await
            .unwrap();
        assert_eq!(row.status, OrderStatus::Cancelled);
        assert_eq!(row.remaining, "1".parse().unwrap());
    }

    #[tokio::test]
    async fn test_load_open_orders_by_creation() {
        let store = MemoryOrderStore::new();
        let first = limit_order(Side::Buy, "99", "1");
        let mut second = limit_order(Side::Sell, "101", "2");
        second.created_at = first.created_at + chrono::Duration::milliseconds(5);
        let market = Order::new(
            "carol".to_string(),
            Symbol::new("BTC-USD"),
            Side::Buy,
            OrderType::Market,
            None,
            "1".parse().unwrap(),
            None,
        );

        store.persist_accept(second.clone()).await.unwrap();
        store.persist_accept(first.clone()).await.unwrap();
        store.persist_accept(market).await.unwrap();

        let open = store.load_open().await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, first.id);
        assert_eq!(open[1].id, second.id);
    }

    #[tokio::test]
    async fn test_trades_for_instrument_limit() {
        let store = MemoryOrderStore::new();
        let symbol = Symbol::new("BTC-USD");
        for _ in 0..5 {
            let buy = limit_order(Side::Buy, "100", "1");
            let sell = limit_order(Side::Sell, "100", "1");
            store.persist_accept(buy.clone()).await.unwrap();
            store.persist_accept(sell.clone()).await.unwrap();
            store
                .persist_trade_unit(unit_for(&buy, &sell, buy.id, "1"))
                .await
                .unwrap();
        }

        let trades = store.trades_for_instrument(&symbol, 3).await.unwrap();
        assert_eq!(trades.len(), 3);
    }
}
