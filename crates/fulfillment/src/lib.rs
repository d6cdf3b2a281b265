//! Order fulfillment for the storefront.
//!
//! [`FulfillmentService`] turns a cart into a persisted order while keeping
//! product stock and customer spend consistent, and reverses those effects
//! on cancellation. Every operation runs as one storage transaction:
//! 1. Validate the request (no I/O)
//! 2. Lock and check the rows involved
//! 3. Apply the order change together with its inventory and spend effects
//! 4. Commit, then refresh the cache
//!
//! Conflicting concurrent writes are retried according to [`RetryPolicy`].

pub mod error;
pub mod inventory;
mod queries;
pub mod retry;
pub mod service;
pub mod spend;

pub use error::{Entity, FulfillmentError, Result};
pub use inventory::InventoryLedger;
pub use retry::RetryPolicy;
pub use service::{FulfillmentConfig, FulfillmentService, OrderLine, OrderRevision};
pub use spend::SpendTracker;
