//! Matching engine error types

use common::types::{OrderId, OrderStatus};
use order_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the matching engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Client-visible, non-retriable input error
    #[error("validation failed: {0}")]
    Validation(String),

    /// Cancel or query target does not exist
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Cancel refused: order already filled or cancelled
    #[error("order {id} cannot be cancelled: status is {status}")]
    NotCancellable { id: OrderId, status: OrderStatus },

    /// A durability unit kept failing transiently; the pass gave up
    #[error("durable unit failed after {attempts} attempts: {source}")]
    UnitRetriesExhausted { attempts: u32, source: StoreError },

    /// Store failure outside the retry protocol
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The matcher task dropped the reply channel
    #[error("matcher terminated before replying")]
    MatcherGone,
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
