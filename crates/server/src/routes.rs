//! Router construction and shared handler state

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use matching_engine::Engine;
use order_store::OrderStore;

use crate::handlers;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn OrderStore>,
    /// Upper bound for book snapshot depth requests
    pub max_depth: usize,
}

impl ApiState {
    pub fn new(engine: Arc<Engine>, store: Arc<dyn OrderStore>, max_depth: usize) -> Self {
        Self {
            engine,
            store,
            max_depth,
        }
    }
}

/// Build the API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/orders", post(handlers::submit_order))
        .route(
            "/orders/:id",
            get(handlers::get_order).delete(handlers::cancel_order),
        )
        .route("/book", get(handlers::list_instruments))
        .route("/book/:instrument", get(handlers::get_book))
        .route("/trades", get(handlers::get_trades))
        .route("/health", get(handlers::health))
        .with_state(state)
}
