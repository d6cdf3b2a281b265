//! Fulfillment service against PostgreSQL.
//!
//! These tests share one PostgreSQL container and truncate the tables
//! before each test, so they are marked `#[serial]`.
//!
//! ```bash
//! cargo test -p fulfillment --test postgres_fulfillment
//! ```

use std::sync::Arc;

use cache::InMemoryCache;
use common::{CustomerId, Money, ProductId};
use domain::{Aggregate, OrderStatus};
use fulfillment::{FulfillmentError, FulfillmentService, OrderLine};
use serial_test::serial;
use sqlx::PgPool;
use store::{PostgresStore, Store};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

type Service = FulfillmentService<PostgresStore, InMemoryCache>;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let store = PostgresStore::connect(&connection_string).await.unwrap();
            store.run_migrations().await.unwrap();

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Service over a fresh pool with empty tables, a widget and a customer.
async fn setup(stock: u32) -> (Service, CustomerId, ProductId) {
    let info = get_container_info().await;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();
    sqlx::query("TRUNCATE TABLE order_items, orders, products, customers")
        .execute(&pool)
        .await
        .unwrap();

    let service = FulfillmentService::new(PostgresStore::new(pool), InMemoryCache::default());
    let customer = service
        .register_customer("Ada", "ada@example.com")
        .await
        .unwrap()
        .id;
    let widget = service
        .register_product("Widget", Money::from_cents(500), stock)
        .await
        .unwrap()
        .id;
    (service, customer, widget)
}

fn widgets(quantity: u32) -> Vec<OrderLine> {
    vec![OrderLine::new("Widget", quantity, Money::from_cents(500))]
}

async fn stock(service: &Service, id: ProductId) -> u32 {
    service.store().get_product(id).await.unwrap().unwrap().stock
}

#[tokio::test]
#[serial]
async fn create_then_cancel_round_trip() {
    let (service, customer, widget) = setup(10).await;

    let order = service.create_order(customer, widgets(3)).await.unwrap();
    assert_eq!(stock(&service, widget).await, 7);
    assert_eq!(
        service.get_customer(customer).await.unwrap().total_spent,
        Money::from_cents(1500)
    );
    let by_number = service
        .get_order_by_number(order.order_number().as_str())
        .await
        .unwrap();
    assert_eq!(by_number.id(), order.id());

    let cancelled = service.cancel_order(order.id()).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(stock(&service, widget).await, 10);
    let product = service.store().get_product(widget).await.unwrap().unwrap();
    assert_eq!(product.sales_count, 0);
    assert_eq!(
        service.get_customer(customer).await.unwrap().total_spent,
        Money::zero()
    );
    assert_eq!(
        service.get_order(order.id()).await.unwrap().status(),
        OrderStatus::Cancelled
    );

    service.delete_order(order.id()).await.unwrap();
    assert!(service.store().get_order(order.id()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn shortfall_leaves_database_untouched() {
    let (service, customer, widget) = setup(2).await;

    let err = service.create_order(customer, widgets(5)).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::OutOfStock { .. }));
    assert_eq!(stock(&service, widget).await, 2);
    assert!(service.list_orders().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn racing_cancel_and_ship_serialize() {
    let (service, customer, widget) = setup(10).await;
    let order = service.create_order(customer, widgets(2)).await.unwrap();
    service.process_order(order.id()).await.unwrap();

    let (cancelled, shipped) = tokio::join!(
        service.cancel_order(order.id()),
        service.ship_order(order.id())
    );

    let stored = service.store().get_order(order.id()).await.unwrap().unwrap();
    match (cancelled, shipped) {
        (Ok(_), Err(FulfillmentError::InvalidOrderStatus { current, .. })) => {
            assert_eq!(current, OrderStatus::Cancelled);
            assert_eq!(stored.status(), OrderStatus::Cancelled);
            assert_eq!(stock(&service, widget).await, 10);
        }
        (Err(FulfillmentError::InvalidOrderStatus { current, .. }), Ok(_)) => {
            assert_eq!(current, OrderStatus::Shipped);
            assert_eq!(stored.status(), OrderStatus::Shipped);
            assert_eq!(stock(&service, widget).await, 8);
        }
        (cancelled, shipped) => {
            panic!("expected exactly one winner, got {cancelled:?} and {shipped:?}")
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_orders_never_oversell() {
    let (service, customer, widget) = setup(7).await;

    let attempts = (0..10).map(|_| service.create_order(customer, widgets(2)));
    let results = futures_util::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, FulfillmentError::OutOfStock { .. }))
    );
    assert_eq!(stock(&service, widget).await, 1);
    assert_eq!(
        service.get_customer(customer).await.unwrap().total_spent,
        Money::from_cents(3000)
    );
}
