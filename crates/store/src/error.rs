use common::Version;
use domain::InventoryError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row was written by someone else since it was loaded.
    #[error("Concurrency conflict for {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// The database aborted the transaction (serialization failure or deadlock).
    #[error("Transaction aborted by the database: {0}")]
    TransactionAborted(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A guarded stock decrement found fewer units than requested.
    #[error(
        "Insufficient stock for {product_name}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_name: String,
        requested: u32,
        available: u32,
    },

    /// A unique key (product name, customer email, order number) is taken.
    #[error("Duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A stored value could not be mapped back into the domain.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::TransactionAborted(_)
        )
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<InventoryError> for StoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::OutOfStock {
                product_name,
                requested,
                available,
            } => StoreError::InsufficientStock {
                product_name,
                requested,
                available,
            },
            other @ InventoryError::StockOverflow { .. } => {
                StoreError::InvalidData(other.to_string())
            }
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
