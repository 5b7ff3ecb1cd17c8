//! HTTP handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use common::types::{OrderId, Symbol};
use matching_engine::{BookSnapshot, SubmitOutcome};

use crate::error::ApiError;
use crate::models::{
    DepthQuery, HealthResponse, InstrumentsResponse, OrderResponse, SubmitOrderRequest,
    TradesQuery, TradesResponse,
};
use crate::routes::ApiState;

const DEFAULT_DEPTH: usize = 20;
const DEFAULT_TRADE_LIMIT: u32 = 100;

/// `POST /orders` - submit an order, wait for its matching pass
pub async fn submit_order(
    State(state): State<ApiState>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let outcome = state.engine.submit(req.into()).await?;
    Ok(Json(outcome))
}

/// `DELETE /orders/:id` - cancel an order
pub async fn cancel_order(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.engine.cancel(OrderId::from_uuid(id)).await?;
    let trades = state.store.trades_for_order(order.id).await?;
    Ok(Json(OrderResponse { order, trades }))
}

/// `GET /orders/:id` - fetch an order and its trades from the store
pub async fn get_order(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {}", order_id)))?;
    let trades = state.store.trades_for_order(order_id).await?;
    Ok(Json(OrderResponse { order, trades }))
}

/// `GET /book/:instrument` - aggregated top-N levels
pub async fn get_book(
    State(state): State<ApiState>,
    Path(instrument): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<BookSnapshot>, ApiError> {
    let depth = query
        .depth
        .unwrap_or(DEFAULT_DEPTH)
        .min(state.max_depth)
        .max(1);
    let snapshot = state.engine.snapshot(&Symbol::new(instrument), depth).await;
    Ok(Json(snapshot))
}

/// `GET /book` - instruments with an active book
pub async fn list_instruments(
    State(state): State<ApiState>,
) -> Result<Json<InstrumentsResponse>, ApiError> {
    let mut instruments = state.engine.instruments().await;
    instruments.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(Json(InstrumentsResponse { instruments }))
}

/// `GET /trades` - trades by order or by instrument
///
/// Served straight from the durable store; never touches the matcher.
pub async fn get_trades(
    State(state): State<ApiState>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<TradesResponse>, ApiError> {
    let trades = match (query.order_id, query.instrument) {
        (Some(order_id), None) => {
            state
                .store
                .trades_for_order(OrderId::from_uuid(order_id))
                .await?
        }
        (None, Some(instrument)) => {
            let limit = query.limit.unwrap_or(DEFAULT_TRADE_LIMIT);
            state
                .store
                .trades_for_instrument(&Symbol::new(instrument), limit)
                .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of order_id or instrument is required".to_string(),
            ))
        }
    };
    Ok(Json(TradesResponse { trades }))
}

/// `GET /health` - liveness plus a store round-trip
pub async fn health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, ApiError> {
    state.store.ping().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}
