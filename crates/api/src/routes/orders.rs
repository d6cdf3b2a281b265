//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CustomerId, Money, OrderId};
use domain::{Aggregate, Order, OrderItem, OrderStatus};
use fulfillment::{OrderLine, OrderRevision};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<OrderItemRequest> for OrderLine {
    fn from(req: OrderItemRequest) -> Self {
        OrderLine::new(
            req.product_name,
            req.quantity,
            Money::from_cents(req.unit_price_cents),
        )
    }
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct ReviseOrderRequest {
    pub status: Option<String>,
    pub total_cents: Option<i64>,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub min_total_cents: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    /// Absent only when the line total does not fit in cents.
    pub total_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub order_number: String,
    pub status: OrderStatus,
    pub item_count: usize,
    pub total_quantity: u64,
    pub line_total_cents: i64,
    pub can_process: bool,
    pub can_cancel: bool,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            total_cents: item.total_price().ok().map(|total| total.cents()),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            customer_id: order.customer_id().to_string(),
            status: order.status(),
            items: order.items().iter().map(OrderItemResponse::from).collect(),
            total_cents: order.total_amount().cents(),
            version: order.version().as_i64(),
            created_at: order.created_at().to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
        }
    }
}

pub(crate) fn to_responses(orders: &[Order]) -> Vec<OrderResponse> {
    orders.iter().map(OrderResponse::from).collect()
}

pub(crate) fn parse_status(raw: &str) -> Result<OrderStatus, ApiError> {
    raw.parse()
        .map_err(|e: domain::ParseOrderStatusError| ApiError::BadRequest(e.to_string()))
}

// -- Handlers --

/// POST /orders: place an order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let customer_id: CustomerId = parse_id("customer", &req.customer_id)?;
    let lines = req.items.into_iter().map(OrderLine::from).collect();

    let order = state.service.create_order(customer_id, lines).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.service.get_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders/number/{number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.service.get_order_by_number(&number).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /orders: all orders, or those matching `status` or above `min_total_cents`.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = match (query.status.as_deref(), query.min_total_cents) {
        (Some(status), None) => {
            state
                .service
                .orders_with_status(parse_status(status)?)
                .await?
        }
        (None, Some(cents)) => {
            state
                .service
                .orders_above_amount(Money::from_cents(cents))
                .await?
        }
        (None, None) => state.service.list_orders().await?,
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "filter by status or min_total_cents, not both".to_string(),
            ));
        }
    };
    Ok(Json(to_responses(&orders)))
}

/// GET /orders/{id}/summary
#[tracing::instrument(skip(state))]
pub async fn summary<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderSummaryResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.service.get_order(order_id).await?;

    Ok(Json(OrderSummaryResponse {
        order_number: order.order_number().to_string(),
        status: order.status(),
        item_count: order.item_count(),
        total_quantity: order.total_quantity(),
        line_total_cents: state.service.order_line_total(order_id).await?.cents(),
        can_process: state.service.can_process_order(order_id).await?,
        can_cancel: state.service.can_cancel_order(order_id).await?,
    }))
}

/// POST /orders/{id}/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<OrderItemRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.service.add_order_item(order_id, req.into()).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PUT /orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let status = parse_status(&req.status)?;
    let order = state.service.update_order_status(order_id, status).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let order = state.service.cancel_order(order_id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}: revise status and/or total of a PENDING order.
#[tracing::instrument(skip(state, req))]
pub async fn revise<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ReviseOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    let revision = OrderRevision {
        status: req.status.as_deref().map(parse_status).transpose()?,
        total_amount: req.total_cents.map(Money::from_cents),
    };
    let order = state.service.revise_order(order_id, revision).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/{id}: remove a DELIVERED or CANCELLED order.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id: OrderId = parse_id("order", &id)?;
    state.service.delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
