//! Storage port for the storefront order core.
//!
//! [`Store`] is the entry point: plain reads plus [`Store::begin`], which
//! opens a [`Transaction`]. Every multi-step order operation runs inside one
//! transaction; dropping a transaction without committing rolls it back.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{Store, Transaction};
