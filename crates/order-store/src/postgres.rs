//! PostgreSQL order store implementation
//!
//! Every mutating operation runs in a single transaction and takes
//! `FOR UPDATE` row locks on the orders it touches, locking in id
//! order so that matcher units and cancellations never deadlock each
//! other. Serialization failures and lock timeouts surface as
//! [`StoreError::Transient`] so the matcher can retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use common::numeric::{Price, Quantity};
use common::order::{Order, Trade};
use common::types::{OrderId, OrderStatus, OrderType, Side, Symbol, TradeId};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AcceptOutcome, OrderStore, TradeUnit, TradeUnitOutcome};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        client_id TEXT NOT NULL,
        instrument TEXT NOT NULL,
        side TEXT NOT NULL,
        order_type TEXT NOT NULL,
        price NUMERIC,
        quantity NUMERIC NOT NULL,
        remaining NUMERIC NOT NULL,
        status TEXT NOT NULL,
        idempotency_key TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS orders_idempotency_key_idx
        ON orders (idempotency_key) WHERE idempotency_key IS NOT NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS orders_instrument_status_idx
        ON orders (instrument, status)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS trades (
        id UUID PRIMARY KEY,
        buy_order_id UUID NOT NULL REFERENCES orders (id),
        sell_order_id UUID NOT NULL REFERENCES orders (id),
        instrument TEXT NOT NULL,
        price NUMERIC NOT NULL,
        quantity NUMERIC NOT NULL,
        traded_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS trades_instrument_traded_at_idx
        ON trades (instrument, traded_at)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS trades_buy_order_idx ON trades (buy_order_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS trades_sell_order_idx ON trades (sell_order_id)
    "#,
];

/// PostgreSQL order store
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Connect a pool to the given database URL
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(classify)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if absent
    ///
    /// Statements are idempotent; a failure here is fatal at boot.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Schema(e.to_string()))?;
        }
        info!("Durable schema verified");
        Ok(())
    }

    fn row_to_order(row: &PgRow) -> StoreResult<Order> {
        let side: String = row.get("side");
        let order_type: String = row.get("order_type");
        let status: String = row.get("status");
        let price: Option<Decimal> = row.get("price");
        let quantity: Decimal = row.get("quantity");
        let remaining: Decimal = row.get("remaining");

        Ok(Order {
            id: OrderId::from_uuid(row.get("id")),
            client_id: row.get("client_id"),
            instrument: Symbol(row.get("instrument")),
            side: side.parse::<Side>().map_err(StoreError::Schema)?,
            order_type: order_type
                .parse::<OrderType>()
                .map_err(StoreError::Schema)?,
            price: match price {
                Some(p) => Some(
                    Price::try_new(p)
                        .ok_or_else(|| StoreError::Schema(format!("non-positive price {}", p)))?,
                ),
                None => None,
            },
            quantity: quantity_from(quantity)?,
            remaining: quantity_from(remaining)?,
            status: status.parse::<OrderStatus>().map_err(StoreError::Schema)?,
            idempotency_key: row.get("idempotency_key"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_trade(row: &PgRow) -> StoreResult<Trade> {
        let price: Decimal = row.get("price");
        let quantity: Decimal = row.get("quantity");

        Ok(Trade {
            id: TradeId(row.get("id")),
            buy_order_id: OrderId::from_uuid(row.get("buy_order_id")),
            sell_order_id: OrderId::from_uuid(row.get("sell_order_id")),
            instrument: Symbol(row.get("instrument")),
            price: Price::try_new(price)
                .ok_or_else(|| StoreError::Schema(format!("non-positive trade price {}", price)))?,
            quantity: quantity_from(quantity)?,
            traded_at: row.get("traded_at"),
        })
    }

    /// Lock one order row and return its effective remaining: zero
    /// once the row has left the open states
    async fn lock_row(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: OrderId,
    ) -> StoreResult<(Quantity, Quantity, OrderStatus)> {
        let row = sqlx::query(
            "SELECT remaining, quantity, status FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify)?
        .ok_or(StoreError::OrderNotFound(id))?;

        let status: String = row.get("status");
        let status = status.parse::<OrderStatus>().map_err(StoreError::Schema)?;
        let remaining = quantity_from(row.get::<Decimal, _>("remaining"))?;
        let quantity = quantity_from(row.get::<Decimal, _>("quantity"))?;

        let effective = match status {
            OrderStatus::Open | OrderStatus::PartiallyFilled => remaining,
            _ => Quantity::zero(),
        };
        Ok((effective, quantity, status))
    }

    async fn write_fill(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: OrderId,
        remaining: Quantity,
        total: Quantity,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let status = if remaining.is_zero() {
            OrderStatus::Filled
        } else if remaining < total {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };
        sqlx::query("UPDATE orders SET remaining = $1, status = $2, updated_at = $3 WHERE id = $4")
            .bind(remaining.as_decimal())
            .bind(status.to_string())
            .bind(at)
            .bind(id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

fn quantity_from(value: Decimal) -> StoreResult<Quantity> {
    Quantity::try_new(value).ok_or_else(|| StoreError::Schema(format!("negative quantity {}", value)))
}

/// Map a sqlx error onto the store taxonomy
///
/// 40001 (serialization failure), 40P01 (deadlock) and 55P03 (lock not
/// available) are retriable; missing relations are schema errors.
fn classify(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("40001") | Some("40P01") | Some("55P03") => StoreError::Transient(db.to_string()),
            Some("42P01") | Some("42703") => StoreError::Schema(db.to_string()),
            _ => StoreError::Backend(e.to_string()),
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Transient(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

fn is_unique_violation(e: &sqlx::Error, index: &str) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(index)
        }
        _ => false,
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn persist_accept(&self, order: Order) -> StoreResult<AcceptOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, client_id, instrument, side, order_type, price,
                quantity, remaining, status, idempotency_key,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.client_id)
        .bind(order.instrument.as_str())
        .bind(order.side.to_string())
        .bind(order.order_type.to_string())
        .bind(order.price.map(|p| p.as_decimal()))
        .bind(order.quantity.as_decimal())
        .bind(order.remaining.as_decimal())
        .bind(order.status.to_string())
        .bind(&order.idempotency_key)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(AcceptOutcome::Accepted(order)),
            Err(e) if is_unique_violation(&e, "orders_idempotency_key_idx") => {
                // Lost the insert race; the winner's row is the answer.
                let key = order.idempotency_key.as_deref().unwrap_or_default();
                let row = sqlx::query("SELECT * FROM orders WHERE idempotency_key = $1")
                    .bind(key)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(classify)?;
                Ok(AcceptOutcome::Replayed(Self::row_to_order(&row)?))
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn persist_trade_unit(&self, unit: TradeUnit) -> StoreResult<TradeUnitOutcome> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Lock both legs in id order so concurrent units cannot deadlock.
        let first_incoming = unit.incoming_id.as_uuid() <= unit.resting_id.as_uuid();
        let (incoming, resting) = if first_incoming {
            let i = Self::lock_row(&mut tx, unit.incoming_id).await?;
            let r = Self::lock_row(&mut tx, unit.resting_id).await?;
            (i, r)
        } else {
            let r = Self::lock_row(&mut tx, unit.resting_id).await?;
            let i = Self::lock_row(&mut tx, unit.incoming_id).await?;
            (i, r)
        };

        let (incoming_available, incoming_total, _) = incoming;
        let (resting_available, resting_total, _) = resting;
        let q = unit.trade.quantity;

        if incoming_available < q || resting_available < q {
            tx.rollback().await.map_err(classify)?;
            return Ok(TradeUnitOutcome::Skewed {
                incoming_remaining: incoming_available,
                resting_remaining: resting_available,
            });
        }

        let trade = unit.trade;
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, buy_order_id, sell_order_id, instrument,
                price, quantity, traded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(trade.id.as_uuid())
        .bind(trade.buy_order_id.as_uuid())
        .bind(trade.sell_order_id.as_uuid())
        .bind(trade.instrument.as_str())
        .bind(trade.price.as_decimal())
        .bind(trade.quantity.as_decimal())
        .bind(trade.traded_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        let now = Utc::now();
        let incoming_remaining = incoming_available - q;
        let resting_remaining = resting_available - q;
        if incoming_remaining != unit.expected_incoming_remaining
            || resting_remaining != unit.expected_resting_remaining
        {
            // The unit still commits: row locks make the durable
            // values authoritative, the caller reconciles from them.
            debug!(
                incoming = %incoming_remaining,
                resting = %resting_remaining,
                "Durable remainings drifted from the matcher's view"
            );
        }
        Self::write_fill(&mut tx, unit.incoming_id, incoming_remaining, incoming_total, now)
            .await?;
        Self::write_fill(&mut tx, unit.resting_id, resting_remaining, resting_total, now).await?;

        tx.commit().await.map_err(classify)?;
        Ok(TradeUnitOutcome::Committed {
            trade,
            incoming_remaining,
            resting_remaining,
        })
    }

    async fn persist_cancel(&self, order_id: OrderId) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let mut order = Self::row_to_order(&row)?;

        if !order.can_cancel() {
            tx.rollback().await.map_err(classify)?;
            return Err(StoreError::NotCancellable {
                id: order_id,
                status: order.status,
            });
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(order.status.to_string())
            .bind(order.updated_at)
            .bind(order_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(order)
    }

    async fn finalize_incoming(
        &self,
        order_id: OrderId,
        remaining: Quantity,
        cancel_residue: bool,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?
            .ok_or(StoreError::OrderNotFound(order_id))?;
        let mut order = Self::row_to_order(&row)?;

        if order.status == OrderStatus::Cancelled {
            tx.rollback().await.map_err(classify)?;
            return Ok(order);
        }

        let now = Utc::now();
        order.set_remaining(order.remaining.min(remaining), now);
        if cancel_residue && !order.remaining.is_zero() {
            order.status = OrderStatus::Cancelled;
            order.updated_at = now;
        }

        sqlx::query(
            "UPDATE orders SET remaining = $1, status = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(order.remaining.as_decimal())
        .bind(order.status.to_string())
        .bind(order.updated_at)
        .bind(order_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(order)
    }

    async fn load_open(&self) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE order_type = 'limit'
              AND status IN ('open', 'partially_filled')
              AND price IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn get_order(&self, order_id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_order(&row)?)),
            None => Ok(None),
        }
    }

    async fn trades_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM trades
            WHERE buy_order_id = $1 OR sell_order_id = $1
            ORDER BY traded_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> StoreResult<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM trades
                WHERE instrument = $1
                ORDER BY traded_at DESC
                LIMIT $2
            ) recent
            ORDER BY traded_at ASC
            "#,
        )
        .bind(instrument.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.iter().map(Self::row_to_trade).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
