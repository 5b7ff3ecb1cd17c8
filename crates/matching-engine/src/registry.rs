//! Engine: the instrument registry and operation router
//!
//! Maps each symbol to its instrument book (lazily created), owns the
//! shared store handle, and exposes the operations the outside world
//! uses: submit, cancel, snapshot, recovery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};

use common::order::Order;
use common::types::{OrderId, OrderType, Symbol};
use order_store::{AcceptOutcome, OrderStore, StoreError};

use crate::book::{Arrival, InstrumentBook};
use crate::domain::{BookSnapshot, NewOrder, SubmitOutcome};
use crate::error::{EngineError, EngineResult};
use crate::matcher::{Matcher, MatchingConfig};

/// The exchange-wide matching engine
///
/// Distinct instruments match concurrently; a single instrument is
/// strictly serial through its book's matcher latch.
pub struct Engine {
    store: Arc<dyn OrderStore>,
    books: RwLock<HashMap<Symbol, Arc<InstrumentBook>>>,
    matcher: Matcher,
}

impl Engine {
    /// Create an engine over the given store
    pub fn new(store: Arc<dyn OrderStore>, config: MatchingConfig) -> Self {
        Self {
            matcher: Matcher::new(Arc::clone(&store), config),
            store,
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Submit a validated order and wait for its matching pass
    ///
    /// Returns the accepted order together with every trade executed
    /// as a direct consequence of this submission. A duplicate
    /// idempotency key replays the previously accepted order and its
    /// trades instead of erroring.
    pub async fn submit(&self, new_order: NewOrder) -> EngineResult<SubmitOutcome> {
        validate(&new_order)?;

        let order = Order::new(
            new_order.client_id,
            new_order.instrument,
            new_order.side,
            new_order.order_type,
            new_order.price,
            new_order.quantity,
            new_order.idempotency_key,
        );

        let order = match self.store.persist_accept(order).await? {
            AcceptOutcome::Accepted(order) => order,
            AcceptOutcome::Replayed(existing) => {
                debug!(order_id = %existing.id, "Idempotent replay");
                let trades = self.store.trades_for_order(existing.id).await?;
                return Ok(SubmitOutcome {
                    order: existing,
                    trades,
                });
            }
        };

        info!(
            order_id = %order.id,
            instrument = %order.instrument,
            side = %order.side,
            order_type = %order.order_type,
            quantity = %order.quantity,
            "Order accepted"
        );

        let book = self.book(&order.instrument).await;
        let (reply, result) = oneshot::channel();
        if book.enqueue(Arrival { order, reply }) {
            // Won the latch: this submission starts the drain.
            let matcher = self.matcher.clone();
            let book = Arc::clone(&book);
            tokio::spawn(async move { matcher.drain(book).await });
        }

        result.await.map_err(|_| EngineError::MatcherGone)?
    }

    /// Cancel an order
    ///
    /// The durable store arbitrates: if a matcher unit committed
    /// first, the cancel sees the filled row and refuses; otherwise
    /// the row is cancelled and the matcher will observe it as skew.
    /// Memory removal happens under the book mutex afterwards.
    pub async fn cancel(&self, order_id: OrderId) -> EngineResult<Order> {
        let order = match self.store.persist_cancel(order_id).await {
            Ok(order) => order,
            Err(StoreError::OrderNotFound(id)) => return Err(EngineError::OrderNotFound(id)),
            Err(StoreError::NotCancellable { id, status }) => {
                return Err(EngineError::NotCancellable { id, status })
            }
            Err(e) => return Err(e.into()),
        };

        let book = self.books.read().await.get(&order.instrument).cloned();
        if let Some(book) = book {
            book.remove_resting(order_id).await;
        }

        info!(order_id = %order_id, instrument = %order.instrument, "Order cancelled");
        Ok(order)
    }

    /// Aggregated top-N view of one instrument's book
    ///
    /// Consistent per instrument: taken under the book mutex, never
    /// mid-pass. An instrument with no book yet yields empty sides.
    pub async fn snapshot(&self, instrument: &Symbol, depth: usize) -> BookSnapshot {
        let book = self.books.read().await.get(instrument).cloned();
        match book {
            Some(book) => book.snapshot(depth).await,
            None => BookSnapshot {
                instrument: instrument.clone(),
                bids: Vec::new(),
                asks: Vec::new(),
                taken_at: Utc::now(),
            },
        }
    }

    /// Symbols with an instrument book
    pub async fn instruments(&self) -> Vec<Symbol> {
        self.books.read().await.keys().cloned().collect()
    }

    /// Rebuild the books from persisted open orders
    ///
    /// Runs at boot before any arrival is accepted. No matching is
    /// performed: durable state is a quiescent state, because it was
    /// only ever advanced by committed units that preserve the
    /// non-crossing invariant. Returns the number of restored orders.
    pub async fn recover(&self) -> EngineResult<usize> {
        let open = self.store.load_open().await?;
        let mut restored = 0;
        for order in &open {
            let book = self.book(&order.instrument).await;
            if book.insert_recovered(order).await {
                restored += 1;
            }
        }
        info!(orders = restored, "Recovery complete");
        Ok(restored)
    }

    async fn book(&self, instrument: &Symbol) -> Arc<InstrumentBook> {
        if let Some(book) = self.books.read().await.get(instrument) {
            return Arc::clone(book);
        }
        let mut books = self.books.write().await;
        Arc::clone(
            books
                .entry(instrument.clone())
                .or_insert_with(|| Arc::new(InstrumentBook::new(instrument.clone()))),
        )
    }
}

/// Client-input validation; failures are non-retriable
fn validate(new_order: &NewOrder) -> EngineResult<()> {
    if new_order.client_id.trim().is_empty() {
        return Err(EngineError::Validation("client_id is required".into()));
    }
    if new_order.instrument.is_empty() {
        return Err(EngineError::Validation("instrument is required".into()));
    }
    if new_order.quantity.is_zero() {
        return Err(EngineError::Validation("quantity must be positive".into()));
    }
    match new_order.order_type {
        OrderType::Limit if new_order.price.is_none() => {
            Err(EngineError::Validation("limit orders require a price".into()))
        }
        OrderType::Market if new_order.price.is_some() => Err(EngineError::Validation(
            "market orders must not carry a price".into(),
        )),
        _ => Ok(()),
    }
}
