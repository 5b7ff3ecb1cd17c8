//! Request and response bodies

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::numeric::{Price, Quantity};
use common::order::{Order, Trade};
use common::types::{OrderType, Side, Symbol};
use matching_engine::NewOrder;

/// Body of `POST /orders`
#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub client_id: String,
    pub instrument: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Option<Price>,
    pub quantity: Quantity,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl From<SubmitOrderRequest> for NewOrder {
    fn from(req: SubmitOrderRequest) -> Self {
        NewOrder {
            client_id: req.client_id,
            instrument: Symbol::new(req.instrument),
            side: req.side,
            order_type: req.order_type,
            price: req.price,
            quantity: req.quantity,
            idempotency_key: req.idempotency_key,
        }
    }
}

/// Order plus the trades it is involved in
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
    pub trades: Vec<Trade>,
}

/// Query string of `GET /book/:instrument`
#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    #[serde(default)]
    pub depth: Option<usize>,
}

/// Query string of `GET /trades`: exactly one of `order_id` or
/// `instrument` must be given
#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    #[serde(default)]
    pub order_id: Option<Uuid>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Body of `GET /trades`
#[derive(Debug, Serialize)]
pub struct TradesResponse {
    pub trades: Vec<Trade>,
}

/// Body of `GET /book`
#[derive(Debug, Serialize)]
pub struct InstrumentsResponse {
    pub instruments: Vec<Symbol>,
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
