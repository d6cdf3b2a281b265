use std::collections::HashMap;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, OrderItemId, ProductId, Version};
use domain::{
    Aggregate, Customer, Order, OrderItem, OrderNumber, OrderParts, OrderStatus, Product,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, Transaction},
};

/// PostgreSQL-backed store.
///
/// Transactions run at the default READ COMMITTED level and rely on row
/// locks (`SELECT ... FOR UPDATE`) plus guarded updates, so two transactions
/// touching the same product or order serialize on that row.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a default pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: to_u32(row.try_get("stock")?, "stock")?,
        sales_count: u64::try_from(row.try_get::<i64, _>("sales_count")?)
            .map_err(|_| StoreError::InvalidData("negative sales_count".to_string()))?,
        version: Version::new(row.try_get("version")?),
    })
}

fn row_to_customer(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        total_spent: Money::from_cents(row.try_get("total_spent_cents")?),
        version: Version::new(row.try_get("version")?),
    })
}

/// Order columns without items; see [`attach_items`].
fn row_to_order_parts(row: &PgRow) -> Result<OrderParts> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::InvalidData(e.to_string()))?;

    Ok(OrderParts {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_number: OrderNumber::from_stored(row.try_get::<String, _>("order_number")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        status,
        items: Vec::new(),
        total_amount: Money::from_cents(row.try_get("total_cents")?),
        version: Version::new(row.try_get("version")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{column} out of range: {value}")))
}

/// Loads the items of every order in `parts` with one query.
async fn attach_items(conn: &mut PgConnection, parts: Vec<OrderParts>) -> Result<Vec<Order>> {
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = parts.iter().map(|p| p.id.as_uuid()).collect();
    let rows = sqlx::query(
        r#"
        SELECT order_id, id, product_id, product_name, quantity, unit_price_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, position
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let order_id: Uuid = row.try_get("order_id")?;
        items_by_order
            .entry(order_id)
            .or_default()
            .push(row_to_item(row)?);
    }

    Ok(parts
        .into_iter()
        .map(|mut p| {
            p.items = items_by_order.remove(&p.id.as_uuid()).unwrap_or_default();
            Order::from_parts(p)
        })
        .collect())
}

async fn orders_from_rows(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
    let parts = rows
        .iter()
        .map(row_to_order_parts)
        .collect::<Result<Vec<_>>>()?;
    attach_items(conn, parts).await
}

async fn single_order(conn: &mut PgConnection, row: Option<PgRow>) -> Result<Option<Order>> {
    match row {
        Some(row) => Ok(orders_from_rows(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Maps transaction aborts to a retryable error.
fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    {
        metrics::counter!("store_transactions_aborted_total").increment(1);
        return StoreError::TransactionAborted(db_err.message().to_string());
    }
    StoreError::Database(err)
}

/// Maps unique and foreign key violations on writes to domain errors.
fn map_write_error(err: sqlx::Error, key: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        let entity = match db_err.constraint() {
            Some("unique_product_name") => Some("product name"),
            Some("unique_customer_email") => Some("customer email"),
            Some("unique_order_number") => Some("order number"),
            Some("orders_customer_id_fkey") => {
                return StoreError::not_found(Customer::aggregate_type(), key);
            }
            _ => None,
        };
        if let Some(entity) = entity {
            return StoreError::Duplicate {
                entity,
                key: key.to_string(),
            };
        }
    }
    map_db_error(err)
}

async fn insert_items(conn: &mut PgConnection, order: &Order) -> Result<()> {
    for (position, item) in order.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, position, product_id, product_name, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(order.id().as_uuid())
        .bind(position as i32)
        .bind(item.product_id.as_uuid())
        .bind(&item.product_name)
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.cents())
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    }
    Ok(())
}

/// Reports why a versioned update touched no rows.
async fn version_conflict(
    conn: &mut PgConnection,
    table_sql: &'static str,
    entity: &'static str,
    id: Uuid,
    expected: Version,
) -> StoreError {
    let actual: std::result::Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(table_sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;
    match actual {
        Ok(Some(actual)) => StoreError::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            expected,
            actual: Version::new(actual),
        },
        Ok(None) => StoreError::not_found(entity, id),
        Err(e) => map_db_error(e),
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock, sales_count, version FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock, sales_count, version FROM products WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name, price_cents, stock, sales_count, version FROM products ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn save_product(&self, product: &Product) -> Result<Version> {
        let next = product.version.next();

        if product.version.is_initial() {
            sqlx::query(
                r#"
                INSERT INTO products (id, name, price_cents, stock, sales_count, version)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.price.cents())
            .bind(i64::from(product.stock))
            .bind(product.sales_count as i64)
            .bind(next.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &product.name))?;
            return Ok(next);
        }

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, price_cents = $3, stock = $4, sales_count = $5, version = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(product.sales_count as i64)
        .bind(next.as_i64())
        .bind(product.version.as_i64())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, &product.name))?;

        if result.rows_affected() == 0 {
            return Err(version_conflict(
                &mut conn,
                "SELECT version FROM products WHERE id = $1",
                Product::aggregate_type(),
                product.id.as_uuid(),
                product.version,
            )
            .await);
        }
        Ok(next)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            "SELECT id, name, email, total_spent_cents, version FROM customers WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn save_customer(&self, customer: &Customer) -> Result<Version> {
        let next = customer.version.next();

        if customer.version.is_initial() {
            sqlx::query(
                r#"
                INSERT INTO customers (id, name, email, total_spent_cents, version)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(customer.id.as_uuid())
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(customer.total_spent.cents())
            .bind(next.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &customer.email))?;
            return Ok(next);
        }

        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, email = $3, total_spent_cents = $4, version = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.total_spent.cents())
        .bind(next.as_i64())
        .bind(customer.version.as_i64())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, &customer.email))?;

        if result.rows_affected() == 0 {
            return Err(version_conflict(
                &mut conn,
                "SELECT version FROM customers WHERE id = $1",
                Customer::aggregate_type(),
                customer.id.as_uuid(),
                customer.version,
            )
            .await);
        }
        Ok(next)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
        single_order(&mut conn, row).await
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            WHERE order_number = $1
            "#,
        )
        .bind(order_number)
        .fetch_optional(&mut *conn)
        .await?;
        single_order(&mut conn, row).await
    }

    async fn find_orders_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC, order_number
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
        orders_from_rows(&mut conn, rows).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            ORDER BY created_at DESC, order_number
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        orders_from_rows(&mut conn, rows).await
    }

    async fn find_orders_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            WHERE status = $1
            ORDER BY created_at DESC, order_number
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await?;
        orders_from_rows(&mut conn, rows).await
    }

    async fn find_orders_above_amount(&self, amount: Money) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            WHERE total_cents > $1
            ORDER BY created_at DESC, order_number
            "#,
        )
        .bind(amount.cents())
        .fetch_all(&mut *conn)
        .await?;
        orders_from_rows(&mut conn, rows).await
    }
}

/// A database transaction. Dropping it without commit rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn locked_product(&mut self, id: ProductId) -> Result<Product> {
        self.product(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Product::aggregate_type(), id))
    }

    /// Runs a product update that returns the updated row.
    async fn update_product(
        &mut self,
        sql: &'static str,
        id: ProductId,
        quantity: u32,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(sql)
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn update_spend(
        &mut self,
        sql: &'static str,
        id: CustomerId,
        amount: Money,
    ) -> Result<Customer> {
        let row = sqlx::query(sql)
            .bind(id.as_uuid())
            .bind(amount.cents())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        match row {
            Some(row) => row_to_customer(&row),
            None => Err(StoreError::not_found(Customer::aggregate_type(), id)),
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock, sales_count, version
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn product_by_name(&mut self, name: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock, sales_count, version
            FROM products
            WHERE name = $1
            FOR UPDATE
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, total_spent_cents, version
            FROM customers
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, status, total_cents, version, created_at, updated_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        single_order(&mut *self.tx, row).await
    }

    async fn reserve_stock(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        let updated = self
            .update_product(
                r#"
                UPDATE products
                SET stock = stock - $2, version = version + 1
                WHERE id = $1 AND stock >= $2
                RETURNING id, name, price_cents, stock, sales_count, version
                "#,
                id,
                quantity,
            )
            .await?;

        match updated {
            Some(product) => Ok(product),
            None => {
                let current = self.locked_product(id).await?;
                Err(StoreError::InsufficientStock {
                    product_name: current.name,
                    requested: quantity,
                    available: current.stock,
                })
            }
        }
    }

    async fn release_stock(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        self.update_product(
            r#"
            UPDATE products
            SET stock = stock + $2, version = version + 1
            WHERE id = $1
            RETURNING id, name, price_cents, stock, sales_count, version
            "#,
            id,
            quantity,
        )
        .await?
        .ok_or_else(|| StoreError::not_found(Product::aggregate_type(), id))
    }

    async fn record_sale(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        self.update_product(
            r#"
            UPDATE products
            SET sales_count = sales_count + $2, version = version + 1
            WHERE id = $1
            RETURNING id, name, price_cents, stock, sales_count, version
            "#,
            id,
            quantity,
        )
        .await?
        .ok_or_else(|| StoreError::not_found(Product::aggregate_type(), id))
    }

    async fn revert_sale(&mut self, id: ProductId, quantity: u32) -> Result<Product> {
        self.update_product(
            r#"
            UPDATE products
            SET sales_count = GREATEST(sales_count - $2, 0), version = version + 1
            WHERE id = $1
            RETURNING id, name, price_cents, stock, sales_count, version
            "#,
            id,
            quantity,
        )
        .await?
        .ok_or_else(|| StoreError::not_found(Product::aggregate_type(), id))
    }

    async fn credit_spend(&mut self, id: CustomerId, amount: Money) -> Result<Customer> {
        self.update_spend(
            r#"
            UPDATE customers
            SET total_spent_cents = CASE
                    WHEN total_spent_cents > 9223372036854775807 - $2 THEN 9223372036854775807
                    ELSE total_spent_cents + $2
                END,
                version = version + 1
            WHERE id = $1
            RETURNING id, name, email, total_spent_cents, version
            "#,
            id,
            amount,
        )
        .await
    }

    async fn debit_spend(&mut self, id: CustomerId, amount: Money) -> Result<Customer> {
        self.update_spend(
            r#"
            UPDATE customers
            SET total_spent_cents = GREATEST(total_spent_cents - $2, 0), version = version + 1
            WHERE id = $1
            RETURNING id, name, email, total_spent_cents, version
            "#,
            id,
            amount,
        )
        .await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<Version> {
        let version = order.version().next();
        let customer_key = order.customer_id().to_string();
        let number_key = order.order_number().to_string();

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, status, total_cents, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(version.as_i64())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            let key = match &e {
                sqlx::Error::Database(db) if db.constraint() == Some("orders_customer_id_fkey") => {
                    &customer_key
                }
                _ => &number_key,
            };
            map_write_error(e, key)
        })?;

        insert_items(&mut *self.tx, order).await?;
        Ok(version)
    }

    async fn update_order(&mut self, order: &Order) -> Result<Version> {
        let next = order.version().next();
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, total_cents = $3, updated_at = $4, version = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(order.updated_at())
        .bind(next.as_i64())
        .bind(order.version().as_i64())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(version_conflict(
                &mut *self.tx,
                "SELECT version FROM orders WHERE id = $1",
                Order::aggregate_type(),
                order.id().as_uuid(),
                order.version(),
            )
            .await);
        }

        insert_items(&mut *self.tx, order).await?;
        Ok(next)
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Order::aggregate_type(), id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_db_error)?;
        tracing::debug!("transaction committed");
        Ok(())
    }
}
