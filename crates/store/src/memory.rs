use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId, Version};
use domain::{Aggregate, Customer, Order, OrderStatus, Product};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{Store, Transaction},
};

#[derive(Debug, Clone, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    fn product_by_name(&self, name: &str) -> Option<&Product> {
        self.products.values().find(|p| p.name == name)
    }

    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Product::aggregate_type(), id))
    }

    fn customer_mut(&mut self, id: CustomerId) -> Result<&mut Customer> {
        self.customers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Customer::aggregate_type(), id))
    }

    fn save_product(&mut self, product: &Product) -> Result<Version> {
        if self
            .products
            .values()
            .any(|p| p.id != product.id && p.name == product.name)
        {
            return Err(StoreError::Duplicate {
                entity: "product name",
                key: product.name.clone(),
            });
        }
        let version = next_version(self.products.get(&product.id), product)?;
        let mut saved = product.clone();
        saved.version = version;
        self.products.insert(product.id, saved);
        Ok(version)
    }

    fn save_customer(&mut self, customer: &Customer) -> Result<Version> {
        if self
            .customers
            .values()
            .any(|c| c.id != customer.id && c.email == customer.email)
        {
            return Err(StoreError::Duplicate {
                entity: "customer email",
                key: customer.email.clone(),
            });
        }
        let version = next_version(self.customers.get(&customer.id), customer)?;
        let mut saved = customer.clone();
        saved.version = version;
        self.customers.insert(customer.id, saved);
        Ok(version)
    }

    /// Orders matching `predicate`, newest first.
    fn orders_where(&self, predicate: impl Fn(&Order) -> bool) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|o| predicate(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.order_number().as_str().cmp(b.order_number().as_str()))
        });
        orders
    }
}

/// Compare-and-swap check shared by every write path.
fn next_version<A: Aggregate>(stored: Option<&A>, incoming: &A) -> Result<Version> {
    let actual = stored.map_or(Version::initial(), |a| a.version());
    if actual != incoming.version() {
        return Err(StoreError::ConcurrencyConflict {
            entity: A::aggregate_type(),
            id: incoming.id().to_string(),
            expected: incoming.version(),
            actual,
        });
    }
    Ok(actual.next())
}

/// In-memory store for tests and local runs.
///
/// A transaction holds the store's single lock for its whole lifetime and
/// works on a private copy of the data, which replaces the shared state on
/// commit. Transactions are therefore fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Removes all products, customers, and orders.
    pub async fn clear(&self) {
        *self.state.lock().await = State::default();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = State::clone(&guard);
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>> {
        Ok(self.state.lock().await.product_by_name(name).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> =
            self.state.lock().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn save_product(&self, product: &Product) -> Result<Version> {
        self.state.lock().await.save_product(product)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.state.lock().await.customers.get(&id).cloned())
    }

    async fn save_customer(&self, customer: &Customer) -> Result<Version> {
        self.state.lock().await.save_customer(customer)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.order_number().as_str() == order_number)
            .cloned())
    }

    async fn find_orders_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders_where(|o| o.customer_id() == customer_id))
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders_where(|_| true))
    }

    async fn find_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders_where(|o| o.status() == status))
    }

    async fn find_orders_above_amount(&self, amount: Money) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders_where(|o| o.total_amount() > amount))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn product_by_name(&mut self, name: &str) -> Result<Option<Product>> {
        Ok(self.working.product_by_name(name).cloned())
    }

    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn reserve_stock(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        let product = self.working.product_mut(id)?;
        product.reserve(quantity)?;
        product.version = product.version.next();
        Ok(product.clone())
    }

    async fn release_stock(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        let product = self.working.product_mut(id)?;
        product.release(quantity)?;
        product.version = product.version.next();
        Ok(product.clone())
    }

    async fn record_sale(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        let product = self.working.product_mut(id)?;
        product.record_sale(quantity);
        product.version = product.version.next();
        Ok(product.clone())
    }

    async fn revert_sale(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        let product = self.working.product_mut(id)?;
        product.revert_sale(quantity);
        product.version = product.version.next();
        Ok(product.clone())
    }

    async fn credit_spend(&mut self, id: CustomerId, amount: Money) -> Result<Customer> {
        let customer = self.working.customer_mut(id)?;
        customer.credit(amount);
        customer.version = customer.version.next();
        Ok(customer.clone())
    }

    async fn debit_spend(&mut self, id: CustomerId, amount: Money) -> Result<Customer> {
        let customer = self.working.customer_mut(id)?;
        customer.debit(amount);
        customer.version = customer.version.next();
        Ok(customer.clone())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Version> {
        if !self.working.customers.contains_key(&order.customer_id()) {
            return Err(StoreError::not_found(
                Customer::aggregate_type(),
                order.customer_id(),
            ));
        }
        if self
            .working
            .orders
            .values()
            .any(|o| o.order_number() == order.order_number())
        {
            return Err(StoreError::Duplicate {
                entity: "order number",
                key: order.order_number().to_string(),
            });
        }
        let version = next_version(self.working.orders.get(&order.id()), order)?;
        let mut saved = order.clone();
        saved.set_version(version);
        self.working.orders.insert(order.id(), saved);
        Ok(version)
    }

    async fn update_order(&mut self, order: &Order) -> Result<Version> {
        let stored = self
            .working
            .orders
            .get(&order.id())
            .ok_or_else(|| StoreError::not_found(Order::aggregate_type(), order.id()))?;
        let version = next_version(Some(stored), order)?;
        let mut saved = order.clone();
        saved.set_version(version);
        self.working.orders.insert(order.id(), saved);
        Ok(version)
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<()> {
        self.working
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(Order::aggregate_type(), id))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderItem;

    async fn seeded() -> (InMemoryStore, Product, Customer) {
        let store = InMemoryStore::new();
        let mut product = Product::new("Widget", Money::from_cents(500), 10);
        product.version = store.save_product(&product).await.unwrap();
        let mut customer = Customer::new("Ada", "ada@example.com");
        customer.version = store.save_customer(&customer).await.unwrap();
        (store, product, customer)
    }

    fn order_for(customer: &Customer, product: &Product, quantity: u32) -> Order {
        let item = OrderItem::new(product.id, &product.name, quantity, product.price);
        Order::place(customer.id, vec![item]).unwrap()
    }

    #[tokio::test]
    async fn save_product_inserts_then_checks_version() {
        let (store, mut product, _) = seeded().await;
        assert_eq!(product.version, Version::first());

        product.price = Money::from_cents(600);
        let v2 = store.save_product(&product).await.unwrap();
        assert_eq!(v2.as_i64(), 2);

        // product still carries version 1
        let result = store.save_product(&product).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { entity: "Product", .. })
        ));
    }

    #[tokio::test]
    async fn product_names_are_unique() {
        let (store, _, _) = seeded().await;
        let twin = Product::new("Widget", Money::from_cents(100), 1);
        assert!(matches!(
            store.save_product(&twin).await,
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let (store, product, _) = seeded().await;

        let mut tx = store.begin().await.unwrap();
        let updated = tx.reserve_stock(product.id, 4).await.unwrap();
        assert_eq!(updated.stock, 6);
        tx.commit().await.unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 6);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let (store, product, customer) = seeded().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.reserve_stock(product.id, 4).await.unwrap();
            tx.credit_spend(customer.id, Money::from_cents(2000))
                .await
                .unwrap();
        }

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
        let customer = store.get_customer(customer.id).await.unwrap().unwrap();
        assert_eq!(customer.total_spent, Money::zero());
    }

    #[tokio::test]
    async fn reserve_beyond_stock_fails() {
        let (store, product, _) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let result = tx.reserve_stock(product.id, 11).await;
        assert!(matches!(
            result,
            Err(StoreError::InsufficientStock {
                requested: 11,
                available: 10,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn ledger_on_unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.release_stock(ProductId::new(), 1).await,
            Err(StoreError::NotFound { entity: "Product", .. })
        ));
    }

    #[tokio::test]
    async fn debit_spend_floors_at_zero() {
        let (store, _, customer) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.credit_spend(customer.id, Money::from_cents(100))
            .await
            .unwrap();
        let after = tx
            .debit_spend(customer.id, Money::from_cents(300))
            .await
            .unwrap();
        assert_eq!(after.total_spent, Money::zero());
    }

    #[tokio::test]
    async fn order_insert_and_cas_update() {
        let (store, product, customer) = seeded().await;
        let mut order = order_for(&customer, &product, 2);

        let mut tx = store.begin().await.unwrap();
        let v1 = tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order.set_version(v1);

        let mut stale = order.clone();
        order.process().unwrap();
        let mut tx = store.begin().await.unwrap();
        let v2 = tx.update_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(v2.as_i64(), 2);

        stale.cancel().unwrap();
        let mut tx = store.begin().await.unwrap();
        let result = tx.update_order(&stale).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { entity: "Order", .. })
        ));
        drop(tx);

        let stored = store.get_order(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Processing);
        assert_eq!(stored.version(), v2);
    }

    #[tokio::test]
    async fn order_queries() {
        let (store, product, customer) = seeded().await;
        let small = order_for(&customer, &product, 1);
        let large = order_for(&customer, &product, 5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&small).await.unwrap();
        tx.insert_order(&large).await.unwrap();
        tx.commit().await.unwrap();

        let by_number = store
            .find_order_by_number(large.order_number().as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_number.id(), large.id());

        assert_eq!(
            store.find_orders_by_customer(customer.id).await.unwrap().len(),
            2
        );
        assert_eq!(
            store
                .find_orders_by_status(OrderStatus::Pending)
                .await
                .unwrap()
                .len(),
            2
        );
        let above = store
            .find_orders_above_amount(Money::from_cents(1000))
            .await
            .unwrap();
        assert_eq!(above.len(), 1);
        assert_eq!(above[0].id(), large.id());
        assert_eq!(store.order_count().await, 2);
        assert_eq!(store.list_orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn insert_order_requires_customer() {
        let (store, product, _) = seeded().await;
        let stranger = Customer::new("Nobody", "nobody@example.com");
        let order = order_for(&stranger, &product, 1);

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.insert_order(&order).await,
            Err(StoreError::NotFound { entity: "Customer", .. })
        ));
    }

    #[tokio::test]
    async fn delete_order_removes_it() {
        let (store, product, customer) = seeded().await;
        let order = order_for(&customer, &product, 1);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.delete_order(order.id()).await.unwrap();
        assert!(matches!(
            tx.delete_order(order.id()).await,
            Err(StoreError::NotFound { .. })
        ));
        tx.commit().await.unwrap();

        assert!(store.get_order(order.id()).await.unwrap().is_none());
    }
}
