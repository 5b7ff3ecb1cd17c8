//! Store error types

use common::types::{OrderId, OrderStatus};
use thiserror::Error;

/// Errors that can occur in the durable store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Order row does not exist
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Cancel refused because the order is in a terminal state
    #[error("order {id} cannot be cancelled: status is {status}")]
    NotCancellable { id: OrderId, status: OrderStatus },

    /// Retriable failure: contention, serialization skew, lost connection
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Durable schema does not match what the kernel expects
    #[error("schema error: {0}")]
    Schema(String),

    /// Any other backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True if retrying the operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
