//! Observability infrastructure for the exchange
//!
//! Structured logging via tracing.
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("clobd", LogFormat::Pretty)?;
//! tracing::info!("Service started");
//! ```

pub mod logging;

pub use logging::{init_logging, LogFormat};
