//! Customer with a running total of committed spend.

use common::{CustomerId, Money, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    /// Sum of committed order totals, never negative.
    pub total_spent: Money,
    #[serde(default)]
    pub version: Version,
}

impl Aggregate for Customer {
    type Id = CustomerId;

    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn id(&self) -> CustomerId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl Customer {
    /// Creates a new, unsaved customer with no spend.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: CustomerId::new(),
            name: name.into(),
            email: email.into(),
            total_spent: Money::zero(),
            version: Version::initial(),
        }
    }

    /// Adds `amount` to the running total, clamping at the largest amount.
    pub fn credit(&mut self, amount: Money) {
        self.total_spent = self.total_spent.saturating_add(amount);
    }

    /// Subtracts `amount` from the running total, flooring at zero.
    ///
    /// Returns true if the floor was hit.
    pub fn debit(&mut self, amount: Money) -> bool {
        let (remaining, clamped) = self.total_spent.saturating_sub(amount);
        self.total_spent = remaining;
        clamped
    }
}
