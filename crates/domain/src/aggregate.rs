//! Core aggregate trait.

use common::Version;

/// A versioned entity that is persisted as a unit.
///
/// Stores use the aggregate type name for error reporting and the version
/// for compare-and-swap writes: a write only succeeds if the stored version
/// still equals the version the caller loaded.
pub trait Aggregate: Send + Sync {
    /// The identifier type of this aggregate.
    type Id: Copy + std::fmt::Display + Send + Sync;

    /// Returns the aggregate type name (e.g. "Order").
    fn aggregate_type() -> &'static str;

    fn id(&self) -> Self::Id;

    /// Returns the version this value was loaded at.
    fn version(&self) -> Version;

    /// Sets the version after a successful write.
    fn set_version(&mut self, version: Version);
}
