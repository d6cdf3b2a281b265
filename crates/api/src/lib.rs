//! HTTP API server for storefront order fulfillment.
//!
//! Exposes the fulfillment service as REST endpoints, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use cache::InMemoryCache;
use fulfillment::{FulfillmentConfig, FulfillmentService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub service: FulfillmentService<S, InMemoryCache>,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(store: S, cache: InMemoryCache, config: FulfillmentConfig) -> Arc<Self> {
        Arc::new(Self {
            service: FulfillmentService::with_config(store, cache, config),
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{customers, health, metrics, orders, products};

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check::<S>))
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route("/orders/number/{number}", get(orders::get_by_number::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>)
                .patch(orders::revise::<S>)
                .delete(orders::delete::<S>),
        )
        .route("/orders/{id}/summary", get(orders::summary::<S>))
        .route("/orders/{id}/items", post(orders::add_item::<S>))
        .route("/orders/{id}/status", put(orders::update_status::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route(
            "/products",
            post(products::create::<S>).get(products::list::<S>),
        )
        .route("/products/{id}", get(products::get::<S>))
        .route("/products/{id}/restock", post(products::restock::<S>))
        .route("/customers", post(customers::create::<S>))
        .route("/customers/{id}", get(customers::get::<S>))
        .route("/customers/{id}/orders", get(customers::orders::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
