//! Core data model for the commodity order book (charter data models).
//!
//! All identifiers are newtype wrappers over `i64`, matching the
//! autoincrementing primary keys of the relational persistence layer.
//! [`Order`], [`Trade`], [`Customer`], and [`Commodity`] are pure data; the
//! matching engine is the only code that mutates an order's `status` and
//! `filled_quantity`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Customer identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CustomerId(pub i64);

/// Commodity identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CommodityId(pub i64);

/// Order identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub i64);

/// Trade identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TradeId(pub i64);

/// Order side: buy or sell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side a resting order must be on to be a candidate match for this side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order lifecycle status (§4.1.3). `Filled` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Partial,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Resting statuses participate in matching (I6).
    pub fn is_resting(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::Partial)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// A customer account. Opaque to the engine beyond authorization at the
/// API boundary; `password_hash` and `api_key` never leave the persistence
/// layer via the matching engine's own interfaces.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// A tradable commodity. Static reference data; one independent order book
/// per commodity.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Commodity {
    pub id: CommodityId,
    pub name: String,
    pub symbol: String,
    pub description: Option<String>,
}

/// A limit order (charter). Always good-till-cancelled: no market, stop,
/// iceberg, or time-in-force variants are modelled (spec Non-goals).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub commodity_id: CommodityId,
    pub side: Side,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Monotonic tick assigned under the commodity lock at persistence time;
    /// used for time priority (§5). Not a wall-clock value.
    pub created_at: i64,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Quantity not yet filled. Never negative (I1).
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// True once `filled_quantity == quantity` (I4).
    pub fn is_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }
}

/// An executed trade (charter). Immutable once written (insert-only).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub commodity_id: CommodityId,
    /// The aggressor's order id.
    pub order_id: OrderId,
    /// The resting order's id.
    pub counterparty_order_id: OrderId,
    pub price: Decimal,
    pub quantity: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(filled: i64, qty: i64) -> Order {
        Order {
            id: OrderId(1),
            customer_id: CustomerId(1),
            commodity_id: CommodityId(1),
            side: Side::Buy,
            status: OrderStatus::Open,
            price: Decimal::from(100),
            quantity: Decimal::from(qty),
            filled_quantity: Decimal::from(filled),
            created_at: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn remaining_is_quantity_minus_filled() {
        assert_eq!(order(3, 10).remaining(), Decimal::from(7));
    }

    #[test]
    fn is_filled_when_filled_equals_quantity() {
        assert!(order(10, 10).is_filled());
        assert!(!order(9, 10).is_filled());
    }

    #[test]
    fn opposite_side_flips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn resting_statuses() {
        assert!(OrderStatus::Open.is_resting());
        assert!(OrderStatus::Partial.is_resting());
        assert!(!OrderStatus::Filled.is_resting());
        assert!(!OrderStatus::Cancelled.is_resting());
    }
}
