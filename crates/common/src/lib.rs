//! Shared domain types for the exchange
//!
//! This crate provides the fundamental types used across all crates:
//! identifiers, enums, decimal numeric wrappers, and the order/trade
//! entities that the matching kernel and the durable store exchange.
//!
//! # Modules
//!
//! - [`types`] - Identifiers and enums (OrderId, Side, Symbol, etc.)
//! - [`numeric`] - Decimal `Price` and `Quantity` wrappers
//! - [`order`] - The `Order` and `Trade` entities

pub mod numeric;
pub mod order;
pub mod types;

pub use numeric::{Price, Quantity};
pub use order::{Order, Trade};
pub use types::{OrderId, OrderStatus, OrderType, Side, Symbol, TradeId};
