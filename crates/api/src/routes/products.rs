//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, ProductId};
use domain::{Aggregate, Product};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;
const DEFAULT_TOP_SELLING_LIMIT: usize = 10;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ListProductsQuery {
    pub filter: Option<String>,
    pub name: Option<String>,
    pub threshold: Option<u32>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
    pub sales_count: u64,
    pub version: i64,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            price_cents: product.price.cents(),
            stock: product.stock,
            sales_count: product.sales_count,
            version: product.version().as_i64(),
        }
    }
}

fn to_responses(products: &[Product]) -> Vec<ProductResponse> {
    products.iter().map(ProductResponse::from).collect()
}

/// POST /products
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .service
        .register_product(&req.name, Money::from_cents(req.price_cents), req.stock)
        .await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id("product", &id)?;
    let product = state.service.get_product(product_id).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// GET /products: the catalog, optionally narrowed by `filter` or `name`.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    if let Some(name) = query.name.as_deref() {
        let product = state.service.product_by_name(name).await?;
        return Ok(Json(vec![ProductResponse::from(&product)]));
    }

    let service = &state.service;
    let products = match query.filter.as_deref() {
        None => service.list_products().await?,
        Some("in-stock") => service.products_in_stock().await?,
        Some("out-of-stock") => service.products_out_of_stock().await?,
        Some("low-stock") => {
            let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
            service.low_stock_products(threshold).await?
        }
        Some("top-selling") => {
            let limit = query.limit.unwrap_or(DEFAULT_TOP_SELLING_LIMIT);
            service.top_selling_products(limit).await?
        }
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Unknown product filter {other:?}"
            )));
        }
    };
    Ok(Json(to_responses(&products)))
}

/// POST /products/{id}/restock: return units to stock outside any order.
#[tracing::instrument(skip(state, req))]
pub async fn restock<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product_id: ProductId = parse_id("product", &id)?;
    let product = state
        .service
        .inventory()
        .release(product_id, req.quantity)
        .await?;
    tracing::info!(%product_id, quantity = req.quantity, stock = product.stock, "product restocked");
    Ok(Json(ProductResponse::from(&product)))
}
