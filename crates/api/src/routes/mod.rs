pub mod customers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ApiError;

/// Parses an id taken from the request path or body.
fn parse_id<T>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id {raw:?}: {e}")))
}
