//! The matching pass: price-time priority against the durable store
//!
//! One matcher drains one instrument's arrival queue at a time. For
//! each incoming order it walks the opposite book best-price-first,
//! oldest-first within a level, and commits every fill through a
//! durability unit before touching memory. The store re-reads both
//! legs under row locks inside the unit, so a concurrent cancel is
//! observed as skew here rather than as a race.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use common::numeric::Quantity;
use common::order::{Order, Trade};
use common::types::{OrderType, Side};
use order_store::{OrderStore, StoreError, TradeUnit, TradeUnitOutcome};

use crate::book::{Arrival, BookState, InstrumentBook};
use crate::domain::{BookOrder, SubmitOutcome};
use crate::error::{EngineError, EngineResult};

/// Tunables for the matching pass
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    /// How many times a durability unit is retried on transient
    /// store failures before the pass surfaces the error
    pub max_unit_retries: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_unit_retries: 5,
        }
    }
}

/// Runs matching passes for whichever instrument book it is handed
#[derive(Clone)]
pub(crate) struct Matcher {
    store: Arc<dyn OrderStore>,
    config: MatchingConfig,
}

impl Matcher {
    pub(crate) fn new(store: Arc<dyn OrderStore>, config: MatchingConfig) -> Self {
        Self { store, config }
    }

    /// Drain the arrival queue until it is observed empty
    ///
    /// The queue pop releases the matcher latch atomically with the
    /// emptiness check, so exactly one drain runs per instrument.
    pub(crate) async fn drain(&self, book: Arc<InstrumentBook>) {
        while let Some(arrival) = book.next_arrival() {
            let Arrival { order, reply } = arrival;
            let order_id = order.id;
            let result = self.match_incoming(&book, order).await;
            if let Err(e) = &result {
                warn!(order_id = %order_id, error = %e, "Matching pass failed");
            }
            // The submitter may have stopped waiting; durable state is
            // committed either way.
            let _ = reply.send(result);
        }
    }

    /// Match one incoming order to quiescence
    async fn match_incoming(
        &self,
        book: &InstrumentBook,
        incoming: Order,
    ) -> EngineResult<SubmitOutcome> {
        let mut state = book.lock_state().await;

        // Rest an eligible limit order before matching. It cannot
        // cross its own side, and pre-inserting keeps memory
        // consistent with durable state if the pass is interrupted.
        if let Some(entry) = BookOrder::from_order(&incoming) {
            state.insert(entry);
        }

        let mut remaining = incoming.remaining;
        let mut trades = Vec::new();
        let loop_result = self
            .match_loop(&mut state, &incoming, &mut remaining, &mut trades)
            .await;

        if let Err(e) = loop_result {
            // Committed units are already reflected in both stores;
            // leave the incoming resting at its last committed
            // remaining and surface.
            state.set_remaining(incoming.id, remaining);
            return Err(e);
        }

        // Reconcile the incoming row against the store; a cancel that
        // landed mid-pass wins here. Market residue is cancelled, a
        // market order never rests.
        let cancel_residue = incoming.order_type == OrderType::Market;
        let final_order = self
            .finalize(&incoming, remaining, cancel_residue)
            .await?;

        if final_order.is_resting_limit() {
            state.set_remaining(incoming.id, final_order.remaining);
        } else if state.contains(incoming.id) {
            state.remove(incoming.id);
        }

        if let (Some(bid), Some(ask)) = (state.best_bid(), state.best_ask()) {
            debug_assert!(bid < ask, "book crossed after matching pass");
        }

        Ok(SubmitOutcome {
            order: final_order,
            trades,
        })
    }

    async fn match_loop(
        &self,
        state: &mut BookState,
        incoming: &Order,
        remaining: &mut Quantity,
        trades: &mut Vec<Trade>,
    ) -> EngineResult<()> {
        while !remaining.is_zero() {
            let Some(best) = state.opposite(incoming.side).best_price() else {
                break;
            };

            if incoming.order_type == OrderType::Limit {
                let limit = incoming
                    .price
                    .ok_or_else(|| EngineError::Validation("limit order without price".into()))?;
                let crosses = match incoming.side {
                    Side::Buy => best <= limit,
                    Side::Sell => best >= limit,
                };
                if !crosses {
                    break;
                }
            }

            let Some(resting) = state.opposite(incoming.side).peek_best().cloned() else {
                break;
            };

            let q = (*remaining).min(resting.remaining);
            let (buy_id, sell_id) = match incoming.side {
                Side::Buy => (incoming.id, resting.id),
                Side::Sell => (resting.id, incoming.id),
            };
            // Trade at the resting order's price.
            let trade = Trade::new(
                buy_id,
                sell_id,
                incoming.instrument.clone(),
                resting.price,
                q,
                Utc::now(),
            );
            let unit = TradeUnit {
                incoming_id: incoming.id,
                resting_id: resting.id,
                trade,
                expected_incoming_remaining: *remaining - q,
                expected_resting_remaining: resting.remaining - q,
            };

            match self.commit_unit(unit).await? {
                TradeUnitOutcome::Committed {
                    trade,
                    incoming_remaining,
                    resting_remaining,
                } => {
                    debug!(
                        trade_id = %trade.id,
                        price = %trade.price,
                        quantity = %trade.quantity,
                        "Trade committed"
                    );
                    *remaining = incoming_remaining;
                    state.set_remaining(resting.id, resting_remaining);
                    trades.push(trade);
                }
                TradeUnitOutcome::Skewed {
                    incoming_remaining,
                    resting_remaining,
                } => {
                    debug!(
                        resting_id = %resting.id,
                        durable_remaining = %resting_remaining,
                        "Durable state skewed, reconciling"
                    );
                    if resting_remaining.is_zero() {
                        // Externally drained (cancelled or gone); skip it.
                        state.remove(resting.id);
                    } else {
                        state.set_remaining(resting.id, resting_remaining);
                    }
                    *remaining = (*remaining).min(incoming_remaining);
                }
            }
        }
        Ok(())
    }

    /// Run one durability unit with bounded retries on transient
    /// failures
    async fn commit_unit(&self, unit: TradeUnit) -> EngineResult<TradeUnitOutcome> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.store.persist_trade_unit(unit.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && attempt < self.config.max_unit_retries => {
                    warn!(attempt, error = %e, "Transient failure in trade unit, retrying");
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(EngineError::UnitRetriesExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn finalize(
        &self,
        incoming: &Order,
        remaining: Quantity,
        cancel_residue: bool,
    ) -> EngineResult<Order> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .store
                .finalize_incoming(incoming.id, remaining, cancel_residue)
                .await
            {
                Ok(order) => return Ok(order),
                Err(e) if e.is_transient() && attempt < self.config.max_unit_retries => {
                    warn!(attempt, error = %e, "Transient failure finalizing order, retrying");
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                Err(StoreError::Transient(msg)) => {
                    return Err(EngineError::UnitRetriesExhausted {
                        attempts: attempt,
                        source: StoreError::Transient(msg),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
