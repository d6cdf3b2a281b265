//! End-to-end fulfillment behavior against the in-memory store and cache.

use cache::{Cache, CacheKey, CachedValue, InMemoryCache};
use common::{CustomerId, Money, ProductId};
use domain::{Aggregate, OrderStatus, Product};
use fulfillment::{Entity, FulfillmentError, FulfillmentService, OrderLine};
use futures_util::future::join_all;
use proptest::prelude::*;
use store::{InMemoryStore, Store};

type Service = FulfillmentService<InMemoryStore, InMemoryCache>;

fn service() -> Service {
    FulfillmentService::new(InMemoryStore::new(), InMemoryCache::default())
}

async fn customer(service: &Service) -> CustomerId {
    service
        .register_customer("Grace", "grace@example.com")
        .await
        .unwrap()
        .id
}

async fn product(service: &Service, name: &str, cents: i64, stock: u32) -> ProductId {
    service
        .register_product(name, Money::from_cents(cents), stock)
        .await
        .unwrap()
        .id
}

async fn stored_product(service: &Service, id: ProductId) -> Product {
    service.store().get_product(id).await.unwrap().unwrap()
}

async fn spent(service: &Service, id: CustomerId) -> Money {
    service.get_customer(id).await.unwrap().total_spent
}

#[tokio::test]
async fn create_then_cancel_restores_everything() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 10).await;

    let order = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 3, Money::from_cents(500))],
        )
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.total_amount(), Money::from_cents(1500));
    assert!(order.order_number().as_str().starts_with("ORD-"));
    assert_eq!(stored_product(&service, widget).await.stock, 7);
    assert_eq!(stored_product(&service, widget).await.sales_count, 3);
    assert_eq!(spent(&service, customer).await, Money::from_cents(1500));

    let cancelled = service.cancel_order(order.id()).await.unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(stored_product(&service, widget).await.stock, 10);
    assert_eq!(stored_product(&service, widget).await.sales_count, 0);
    assert_eq!(spent(&service, customer).await, Money::zero());

    let err = service.cancel_order(order.id()).await.unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InvalidOrderStatus {
            current: OrderStatus::Cancelled,
            attempted_action: "cancel",
        }
    ));
    assert_eq!(stored_product(&service, widget).await.stock, 10);
    assert_eq!(spent(&service, customer).await, Money::zero());
}

#[tokio::test]
async fn shortfall_creates_nothing() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 2).await;

    let err = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 5, Money::from_cents(500))],
        )
        .await
        .unwrap_err();

    match err {
        FulfillmentError::OutOfStock {
            product_name,
            requested,
            available,
        } => {
            assert_eq!(product_name, "Widget");
            assert_eq!((requested, available), (5, 2));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stored_product(&service, widget).await.stock, 2);
    assert_eq!(service.store().order_count().await, 0);
    assert_eq!(spent(&service, customer).await, Money::zero());
}

#[tokio::test]
async fn partial_shortfall_rolls_back_other_lines() {
    let service = service();
    let customer = customer(&service).await;
    let bolt = product(&service, "Bolt", 100, 50).await;
    product(&service, "Nut", 100, 1).await;

    let err = service
        .create_order(
            customer,
            vec![
                OrderLine::new("Bolt", 10, Money::from_cents(100)),
                OrderLine::new("Nut", 2, Money::from_cents(100)),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::OutOfStock { .. }));
    assert_eq!(stored_product(&service, bolt).await.stock, 50);
    assert_eq!(service.store().order_count().await, 0);
}

#[tokio::test]
async fn total_beyond_money_range_is_rejected() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 10).await;

    let err = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 3, Money::from_cents(i64::MAX / 2))],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FulfillmentError::InvalidArgument { .. }));
    assert_eq!(stored_product(&service, widget).await.stock, 10);
    assert_eq!(service.store().order_count().await, 0);
    assert_eq!(spent(&service, customer).await, Money::zero());

    let order = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 2, Money::from_cents(i64::MAX / 2))],
        )
        .await
        .unwrap();
    let err = service
        .add_order_item(order.id(), OrderLine::new("Widget", 1, Money::from_cents(500)))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidArgument { .. }));
    assert_eq!(stored_product(&service, widget).await.stock, 8);
    assert_eq!(spent(&service, customer).await, order.total_amount());
}

#[tokio::test]
async fn unknown_references_are_not_found() {
    let service = service();
    let customer = customer(&service).await;
    product(&service, "Widget", 500, 10).await;

    let err = service
        .create_order(
            CustomerId::new(),
            vec![OrderLine::new("Widget", 1, Money::from_cents(500))],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::NotFound {
            entity: Entity::Customer,
            ..
        }
    ));

    let err = service
        .create_order(
            customer,
            vec![OrderLine::new("Gizmo", 1, Money::from_cents(500))],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::NotFound {
            entity: Entity::Product,
            ..
        }
    ));
}

#[tokio::test]
async fn full_lifecycle_and_illegal_transitions() {
    let service = service();
    let customer = customer(&service).await;
    product(&service, "Widget", 500, 10).await;
    let order = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 1, Money::from_cents(500))],
        )
        .await
        .unwrap();

    let err = service.deliver_order(order.id()).await.unwrap_err();
    assert!(matches!(err, FulfillmentError::InvalidOrderStatus { .. }));
    assert_eq!(
        service.get_order(order.id()).await.unwrap().status(),
        OrderStatus::Pending
    );

    service.process_order(order.id()).await.unwrap();
    service.ship_order(order.id()).await.unwrap();

    let err = service.cancel_order(order.id()).await.unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InvalidOrderStatus {
            current: OrderStatus::Shipped,
            attempted_action: "cancel",
        }
    ));

    let delivered = service.deliver_order(order.id()).await.unwrap();
    assert_eq!(delivered.status(), OrderStatus::Delivered);
    assert!(delivered.version() > order.version());

    // a delivered sale stands
    assert_eq!(spent(&service, customer).await, Money::from_cents(500));
}

#[tokio::test]
async fn added_items_are_reversed_on_cancel() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 10).await;
    let gadget = product(&service, "Gadget", 1200, 4).await;

    let order = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 2, Money::from_cents(500))],
        )
        .await
        .unwrap();
    let order = service
        .add_order_item(order.id(), OrderLine::new("Gadget", 3, Money::from_cents(1200)))
        .await
        .unwrap();

    assert_eq!(order.item_count(), 2);
    assert_eq!(order.total_amount(), Money::from_cents(4600));
    assert_eq!(stored_product(&service, gadget).await.stock, 1);
    assert_eq!(spent(&service, customer).await, Money::from_cents(4600));

    let err = service
        .add_order_item(order.id(), OrderLine::new("Gadget", 2, Money::from_cents(1200)))
        .await
        .unwrap_err();
    assert!(matches!(err, FulfillmentError::OutOfStock { .. }));

    service.cancel_order(order.id()).await.unwrap();
    assert_eq!(stored_product(&service, widget).await.stock, 10);
    assert_eq!(stored_product(&service, gadget).await.stock, 4);
    assert_eq!(spent(&service, customer).await, Money::zero());
}

#[tokio::test]
async fn items_cannot_be_added_after_pending() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 10).await;
    let order = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 1, Money::from_cents(500))],
        )
        .await
        .unwrap();
    service.process_order(order.id()).await.unwrap();

    let err = service
        .add_order_item(order.id(), OrderLine::new("Widget", 1, Money::from_cents(500)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::InvalidOrderStatus {
            current: OrderStatus::Processing,
            attempted_action: "add items to",
        }
    ));
    assert_eq!(stored_product(&service, widget).await.stock, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 7).await;

    let attempts = (0..10).map(|_| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .create_order(
                    customer,
                    vec![OrderLine::new("Widget", 2, Money::from_cents(500))],
                )
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let placed = results.iter().filter(|r| r.is_ok()).count() as u32;
    assert_eq!(placed, 3);
    assert!(results.iter().all(|r| match r {
        Ok(_) => true,
        Err(e) => matches!(e, FulfillmentError::OutOfStock { .. }),
    }));

    let stored = stored_product(&service, widget).await;
    assert_eq!(stored.stock, 1);
    assert_eq!(stored.sales_count, 6);
    assert_eq!(spent(&service, customer).await, Money::from_cents(3000));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancel_and_ship_serialize() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 100).await;

    for _ in 0..16 {
        let order = service
            .create_order(
                customer,
                vec![OrderLine::new("Widget", 2, Money::from_cents(500))],
            )
            .await
            .unwrap();
        service.process_order(order.id()).await.unwrap();
        let stock_before = stored_product(&service, widget).await.stock;

        let cancel = tokio::spawn({
            let service = service.clone();
            let order_id = order.id();
            async move { service.cancel_order(order_id).await }
        });
        let ship = tokio::spawn({
            let service = service.clone();
            let order_id = order.id();
            async move { service.ship_order(order_id).await }
        });
        let (cancelled, shipped) = (cancel.await.unwrap(), ship.await.unwrap());

        let stored = service.store().get_order(order.id()).await.unwrap().unwrap();
        match (cancelled, shipped) {
            (Ok(_), Err(e)) => {
                assert!(matches!(
                    e,
                    FulfillmentError::InvalidOrderStatus {
                        current: OrderStatus::Cancelled,
                        attempted_action: "ship",
                    }
                ));
                assert_eq!(stored.status(), OrderStatus::Cancelled);
                assert_eq!(stored_product(&service, widget).await.stock, stock_before + 2);
            }
            (Err(e), Ok(_)) => {
                assert!(matches!(
                    e,
                    FulfillmentError::InvalidOrderStatus {
                        current: OrderStatus::Shipped,
                        attempted_action: "cancel",
                    }
                ));
                assert_eq!(stored.status(), OrderStatus::Shipped);
                assert_eq!(stored_product(&service, widget).await.stock, stock_before);
            }
            (cancelled, shipped) => {
                panic!("expected exactly one winner, got {cancelled:?} and {shipped:?}")
            }
        }
    }
}

#[tokio::test]
async fn cached_reads_follow_mutations() {
    let service = service();
    let customer = customer(&service).await;
    let widget = product(&service, "Widget", 500, 10).await;

    // warm every region touched below
    let before = service.get_product(widget).await.unwrap();
    service.product_by_name("Widget").await.unwrap();
    service.products_in_stock().await.unwrap();
    service.top_selling_products(5).await.unwrap();
    assert!(service.orders_for_customer(customer).await.unwrap().is_empty());
    assert!(
        service
            .orders_with_status(OrderStatus::Pending)
            .await
            .unwrap()
            .is_empty()
    );

    let order = service
        .create_order(
            customer,
            vec![OrderLine::new("Widget", 4, Money::from_cents(500))],
        )
        .await
        .unwrap();

    assert_eq!(service.get_product(widget).await.unwrap().stock, before.stock - 4);
    assert_eq!(service.product_by_name("Widget").await.unwrap().stock, 6);
    assert_eq!(service.products_in_stock().await.unwrap()[0].stock, 6);
    assert_eq!(service.top_selling_products(5).await.unwrap()[0].sales_count, 4);
    assert_eq!(service.orders_for_customer(customer).await.unwrap().len(), 1);
    assert_eq!(
        service
            .orders_with_status(OrderStatus::Pending)
            .await
            .unwrap()
            .len(),
        1
    );

    service.process_order(order.id()).await.unwrap();
    assert!(
        service
            .orders_with_status(OrderStatus::Pending)
            .await
            .unwrap()
            .is_empty()
    );
    let cached = service
        .cache()
        .get(&CacheKey::Order(order.id()))
        .await
        .and_then(CachedValue::into_order)
        .unwrap();
    assert_eq!(cached.status(), OrderStatus::Processing);
    assert_eq!(
        service
            .get_order_by_number(order.order_number().as_str())
            .await
            .unwrap()
            .status(),
        OrderStatus::Processing
    );

    service.cancel_order(order.id()).await.unwrap();
    assert_eq!(service.get_product(widget).await.unwrap().stock, 10);
    service.delete_order(order.id()).await.unwrap();
    assert!(service.cache().get(&CacheKey::Order(order.id())).await.is_none());
    assert!(service.orders_for_customer(customer).await.unwrap().is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Create(u32),
    Cancel(usize),
    Advance(usize),
    Add(usize, u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..6).prop_map(Op::Create),
        any::<usize>().prop_map(Op::Cancel),
        any::<usize>().prop_map(Op::Advance),
        (any::<usize>(), 1u32..4).prop_map(|(i, q)| Op::Add(i, q)),
    ]
}

const INITIAL_STOCK: u32 = 20;
const PRICE_CENTS: i64 = 250;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Stock, sales and spend always account exactly for the orders that
    /// are not cancelled, whatever sequence of operations succeeds or fails.
    #[test]
    fn ledgers_balance_after_any_sequence(ops in prop::collection::vec(op(), 1..25)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let service = service();
            let customer = customer(&service).await;
            let widget = product(&service, "Widget", PRICE_CENTS, INITIAL_STOCK).await;
            let mut orders = Vec::new();

            for op in ops {
                match op {
                    Op::Create(quantity) => {
                        let line = OrderLine::new("Widget", quantity, Money::from_cents(PRICE_CENTS));
                        if let Ok(order) = service.create_order(customer, vec![line]).await {
                            orders.push(order.id());
                        }
                    }
                    Op::Cancel(i) if !orders.is_empty() => {
                        let _ = service.cancel_order(orders[i % orders.len()]).await;
                    }
                    Op::Advance(i) if !orders.is_empty() => {
                        let id = orders[i % orders.len()];
                        if let Ok(order) = service.get_order(id).await
                            && let Some(next) = match order.status() {
                                OrderStatus::Pending => Some(OrderStatus::Processing),
                                OrderStatus::Processing => Some(OrderStatus::Shipped),
                                OrderStatus::Shipped => Some(OrderStatus::Delivered),
                                _ => None,
                            }
                        {
                            service.update_order_status(id, next).await.unwrap();
                        }
                    }
                    Op::Add(i, quantity) if !orders.is_empty() => {
                        let line = OrderLine::new("Widget", quantity, Money::from_cents(PRICE_CENTS));
                        let _ = service.add_order_item(orders[i % orders.len()], line).await;
                    }
                    _ => {}
                }
            }

            let mut live_units = 0u64;
            let mut live_total = Money::zero();
            for id in &orders {
                let order = service.store().get_order(*id).await.unwrap().unwrap();
                if order.status() != OrderStatus::Cancelled {
                    live_units += order.total_quantity();
                    live_total += order.total_amount();
                }
            }

            let stored = stored_product(&service, widget).await;
            prop_assert_eq!(u64::from(stored.stock) + live_units, u64::from(INITIAL_STOCK));
            prop_assert_eq!(stored.sales_count, live_units);
            prop_assert_eq!(spent(&service, customer).await, live_total);
            Ok(())
        })?;
    }
}
