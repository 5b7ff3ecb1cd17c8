//! Price-time priority matching kernel
//!
//! Per instrument, the engine keeps a two-sided book of resting limit
//! orders and continuously pairs crossing orders into trades. Every
//! acceptance, fill and cancellation is committed to the durable
//! store before it is reflected in memory, and each instrument is
//! matched by at most one task at a time.
//!
//! # Components
//!
//! - [`book`] - price levels, side books, and the per-instrument
//!   serialization machinery
//! - `matcher` - the matching pass itself
//! - [`registry`] - the [`Engine`] facade: routing, validation,
//!   snapshots, recovery

pub mod book;
pub mod domain;
pub mod error;
mod matcher;
pub mod registry;

pub use domain::{BookSnapshot, DepthLevel, NewOrder, SubmitOutcome};
pub use error::{EngineError, EngineResult};
pub use matcher::MatchingConfig;
pub use registry::Engine;
