//! Customer endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::CustomerId;
use domain::Customer;
use serde::{Deserialize, Serialize};
use store::Store;

use super::orders::{OrderResponse, parse_status, to_responses};
use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct CustomerOrdersQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub total_spent_cents: i64,
}

impl From<&Customer> for CustomerResponse {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id.to_string(),
            name: customer.name.clone(),
            email: customer.email.clone(),
            total_spent_cents: customer.total_spent.cents(),
        }
    }
}

/// POST /customers
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), ApiError> {
    let customer = state
        .service
        .register_customer(&req.name, &req.email)
        .await?;
    Ok((StatusCode::CREATED, Json(CustomerResponse::from(&customer))))
}

/// GET /customers/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer_id: CustomerId = parse_id("customer", &id)?;
    let customer = state.service.get_customer(customer_id).await?;
    Ok(Json(CustomerResponse::from(&customer)))
}

/// GET /customers/{id}/orders: newest first, optionally by `status`.
#[tracing::instrument(skip(state, query))]
pub async fn orders<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(query): Query<CustomerOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id: CustomerId = parse_id("customer", &id)?;
    let orders = match query.status.as_deref() {
        Some(status) => {
            state
                .service
                .orders_for_customer_with_status(customer_id, parse_status(status)?)
                .await?
        }
        None => state.service.orders_for_customer(customer_id).await?,
    };
    Ok(Json(to_responses(&orders)))
}
