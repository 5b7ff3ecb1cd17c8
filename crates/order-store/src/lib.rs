//! Durable order and trade persistence
//!
//! This crate is the authority for on-disk state. The matching kernel
//! commits every trade and order mutation through the [`OrderStore`]
//! trait before reflecting it in memory, so that a crash at any point
//! leaves the durable state at the last committed unit.
//!
//! Two implementations are provided:
//!
//! - [`MemoryOrderStore`] - in-process maps, used by tests and the
//!   `memory` backend
//! - `PgOrderStore` - PostgreSQL via sqlx (behind the `postgres`
//!   feature)

pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryOrderStore;
#[cfg(feature = "postgres")]
pub use postgres::PgOrderStore;
pub use traits::{AcceptOutcome, OrderStore, TradeUnit, TradeUnitOutcome};
