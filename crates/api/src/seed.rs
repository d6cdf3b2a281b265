//! Demo catalog loaded when `SEED_DEMO_DATA` is set.

use cache::Cache;
use common::Money;
use fulfillment::{FulfillmentError, FulfillmentService, Result};
use store::Store;

const PRODUCTS: &[(&str, i64, u32)] = &[
    ("Mechanical Keyboard", 8999, 25),
    ("Wireless Mouse", 2999, 60),
    ("USB-C Hub", 4599, 8),
    ("27\" Monitor", 24999, 5),
    ("Laptop Stand", 3499, 0),
];

const CUSTOMERS: &[(&str, &str)] = &[
    ("Ada Lovelace", "ada@example.com"),
    ("Alan Turing", "alan@example.com"),
];

/// Registers the demo products and customers.
///
/// Entries that already exist are left alone, so seeding a persistent
/// store twice is harmless.
pub async fn seed_demo_data<S, C>(service: &FulfillmentService<S, C>) -> Result<()>
where
    S: Store + Clone,
    C: Cache + Clone,
{
    let mut created = 0;
    for &(name, cents, stock) in PRODUCTS {
        match service
            .register_product(name, Money::from_cents(cents), stock)
            .await
        {
            Ok(_) => created += 1,
            Err(FulfillmentError::InvalidArgument { reason }) => {
                tracing::debug!(product = name, %reason, "demo product skipped");
            }
            Err(err) => return Err(err),
        }
    }
    for &(name, email) in CUSTOMERS {
        match service.register_customer(name, email).await {
            Ok(customer) => {
                created += 1;
                tracing::info!(customer_id = %customer.id, email, "demo customer created");
            }
            Err(FulfillmentError::InvalidArgument { reason }) => {
                tracing::debug!(email, %reason, "demo customer skipped");
            }
            Err(err) => return Err(err),
        }
    }
    tracing::info!(created, "demo data seeded");
    Ok(())
}
