//! Instrument book: two side books plus the per-instrument
//! serialization machinery
//!
//! Each instrument owns its bids, asks, an id index for fast
//! cancellation, an arrival queue and a matcher-active latch. The
//! book state sits behind a tokio mutex that doubles as the
//! serialization token: the matcher holds it for a whole matching
//! pass (suspending only at durability-unit boundaries), and
//! snapshots/cancellations take the same mutex, so they never observe
//! a half-applied pass.

pub mod price_level;
pub mod side_book;

pub use price_level::PriceLevel;
pub use side_book::SideBook;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::{oneshot, Mutex, MutexGuard};

use common::numeric::{Price, Quantity};
use common::order::Order;
use common::types::{OrderId, Side, Symbol};

use crate::domain::{BookOrder, BookSnapshot, SubmitOutcome};
use crate::error::EngineError;

/// The two sides plus the id index, guarded by the book mutex
pub(crate) struct BookState {
    bids: SideBook,
    asks: SideBook,
    /// order id -> (side, price) of its resting location
    index: HashMap<OrderId, (Side, Price)>,
}

impl BookState {
    fn new() -> Self {
        Self {
            bids: SideBook::new(Side::Buy),
            asks: SideBook::new(Side::Sell),
            index: HashMap::new(),
        }
    }

    fn side_book(&self, side: Side) -> &SideBook {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_book_mut(&mut self, side: Side) -> &mut SideBook {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// The book an order of `side` would trade against
    pub(crate) fn opposite(&self, side: Side) -> &SideBook {
        self.side_book(side.opposite())
    }

    pub(crate) fn insert(&mut self, order: BookOrder) {
        self.index.insert(order.id, (order.side, order.price));
        self.side_book_mut(order.side).insert(order);
    }

    pub(crate) fn remove(&mut self, order_id: OrderId) -> Option<BookOrder> {
        let (side, price) = self.index.remove(&order_id)?;
        self.side_book_mut(side).remove(order_id, price)
    }

    /// True if the order currently rests in either side
    pub(crate) fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Reflect a committed remaining; drops the entry (and its index
    /// slot) at zero
    pub(crate) fn set_remaining(&mut self, order_id: OrderId, remaining: Quantity) -> bool {
        let Some(&(side, price)) = self.index.get(&order_id) else {
            return false;
        };
        let updated = self.side_book_mut(side).set_remaining(order_id, price, remaining);
        if updated && remaining.is_zero() {
            self.index.remove(&order_id);
        }
        updated
    }

    pub(crate) fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub(crate) fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    fn snapshot(&self, instrument: Symbol, depth: usize) -> BookSnapshot {
        BookSnapshot {
            instrument,
            bids: self.bids.depth(depth),
            asks: self.asks.depth(depth),
            taken_at: Utc::now(),
        }
    }
}

/// One queued submission awaiting its matching pass
pub(crate) struct Arrival {
    pub order: Order,
    pub reply: oneshot::Sender<Result<SubmitOutcome, EngineError>>,
}

/// Book, arrival queue and matcher latch for a single instrument
pub struct InstrumentBook {
    symbol: Symbol,
    state: Mutex<BookState>,
    queue: parking_lot::Mutex<VecDeque<Arrival>>,
    matcher_active: AtomicBool,
}

impl InstrumentBook {
    pub(crate) fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: Mutex::new(BookState::new()),
            queue: parking_lot::Mutex::new(VecDeque::new()),
            matcher_active: AtomicBool::new(false),
        }
    }

    /// The instrument this book serves
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Enqueue an arrival and try to claim the matcher latch
    ///
    /// Returns true when the caller won the latch and must start the
    /// drain loop. Both the push-and-test-and-set here and the
    /// pop-or-release in [`next_arrival`](Self::next_arrival) happen
    /// under the queue lock, which closes the lost-wakeup race: a
    /// submitter either hands its arrival to the running drain or
    /// becomes the drain.
    pub(crate) fn enqueue(&self, arrival: Arrival) -> bool {
        let mut queue = self.queue.lock();
        queue.push_back(arrival);
        !self.matcher_active.swap(true, Ordering::AcqRel)
    }

    /// Pop the next arrival, releasing the latch when the queue is
    /// observed empty
    pub(crate) fn next_arrival(&self) -> Option<Arrival> {
        let mut queue = self.queue.lock();
        match queue.pop_front() {
            Some(arrival) => Some(arrival),
            None => {
                self.matcher_active.store(false, Ordering::Release);
                None
            }
        }
    }

    /// Acquire the serialization token
    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().await
    }

    /// Consistent aggregated view of the book
    ///
    /// Taken under the book mutex, so no matcher mutation is in
    /// flight for this instrument.
    pub async fn snapshot(&self, depth: usize) -> BookSnapshot {
        let state = self.state.lock().await;
        state.snapshot(self.symbol.clone(), depth)
    }

    /// Recovery path: place a persisted open order into the book
    /// through the same insertion path submissions use
    pub(crate) async fn insert_recovered(&self, order: &Order) -> bool {
        let Some(entry) = BookOrder::from_order(order) else {
            return false;
        };
        let mut state = self.state.lock().await;
        state.insert(entry);
        true
    }

    /// Remove a resting order after its durable cancel committed
    pub(crate) async fn remove_resting(&self, order_id: OrderId) -> bool {
        let mut state = self.state.lock().await;
        state.remove(order_id).is_some()
    }

    /// Number of resting orders across both sides
    pub async fn resting_orders(&self) -> usize {
        let state = self.state.lock().await;
        state.bids.order_count() + state.asks.order_count()
    }
}
