//! Cache key space.

use common::{CustomerId, Money, OrderId, ProductId};
use domain::OrderStatus;

/// A named group of cache entries sharing one capacity and time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Single orders by id or number.
    Order,
    /// Order lists by status or amount.
    Orders,
    /// Order lists per customer.
    UserOrders,
    /// Single products by id or name.
    Product,
    /// Product lists (stock levels, best sellers).
    Products,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Order,
        Region::Orders,
        Region::UserOrders,
        Region::Product,
        Region::Products,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Order => "order",
            Region::Orders => "orders",
            Region::UserOrders => "userOrders",
            Region::Product => "product",
            Region::Products => "products",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cacheable lookup.
///
/// Each key belongs to exactly one [`Region`] and renders to a string name
/// within it (e.g. `customer:<id>:status:PENDING`). Prefix eviction works on
/// those names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Order(OrderId),
    OrderNumber(String),
    OrdersByStatus(OrderStatus),
    /// Orders whose total is strictly above the amount.
    OrdersAbove(Money),
    CustomerOrders(CustomerId),
    CustomerOrdersByStatus(CustomerId, OrderStatus),
    Product(ProductId),
    ProductByName(String),
    InStock,
    OutOfStock,
    /// Products with stock below the threshold.
    LowStock(u32),
    /// The best selling products, limited to the given count.
    TopSelling(usize),
}

impl CacheKey {
    /// Name prefix shared by every [`CacheKey::OrdersAbove`] key.
    pub const ORDERS_ABOVE_PREFIX: &'static str = "above:";
    /// Name prefix shared by every [`CacheKey::LowStock`] key.
    pub const LOW_STOCK_PREFIX: &'static str = "lowStock:";
    /// Name prefix shared by every [`CacheKey::TopSelling`] key.
    pub const TOP_SELLING_PREFIX: &'static str = "topSelling:";

    pub fn region(&self) -> Region {
        match self {
            CacheKey::Order(_) | CacheKey::OrderNumber(_) => Region::Order,
            CacheKey::OrdersByStatus(_) | CacheKey::OrdersAbove(_) => Region::Orders,
            CacheKey::CustomerOrders(_) | CacheKey::CustomerOrdersByStatus(..) => {
                Region::UserOrders
            }
            CacheKey::Product(_) | CacheKey::ProductByName(_) => Region::Product,
            CacheKey::InStock
            | CacheKey::OutOfStock
            | CacheKey::LowStock(_)
            | CacheKey::TopSelling(_) => Region::Products,
        }
    }

    /// The entry name within the key's region.
    pub fn name(&self) -> String {
        match self {
            CacheKey::Order(id) => id.to_string(),
            CacheKey::OrderNumber(number) => format!("orderNumber:{number}"),
            CacheKey::OrdersByStatus(status) => format!("status:{status}"),
            CacheKey::OrdersAbove(amount) => {
                format!("{}{}", Self::ORDERS_ABOVE_PREFIX, amount.cents())
            }
            CacheKey::CustomerOrders(customer) => format!("customer:{customer}"),
            CacheKey::CustomerOrdersByStatus(customer, status) => {
                format!("customer:{customer}:status:{status}")
            }
            CacheKey::Product(id) => id.to_string(),
            CacheKey::ProductByName(name) => format!("name:{name}"),
            CacheKey::InStock => "inStock".to_string(),
            CacheKey::OutOfStock => "outOfStock".to_string(),
            CacheKey::LowStock(threshold) => format!("{}{threshold}", Self::LOW_STOCK_PREFIX),
            CacheKey::TopSelling(limit) => format!("{}{limit}", Self::TOP_SELLING_PREFIX),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.region(), self.name())
    }
}
