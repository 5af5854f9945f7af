//! Price-time priority matching (§4.1.2).
//!
//! [`match_order`] runs one aggressor order against the opposite side of a
//! commodity's [`OrderBook`]: it takes liquidity at the resting side's price
//! until the aggressor is filled or no more crossing orders remain, updates
//! the aggressor's `filled_quantity`/`status` in place, and returns the
//! [`Fill`]s produced. It does not decide trade ids, timestamps, or persist
//! anything — that is [`crate::engine::Engine`]'s job, inside one
//! transaction (§9 "Atomicity of submit").
//!
//! Self-trade is never prevented: the book holds no customer identity, so a
//! customer's own resting order is just another candidate (spec Non-goals).

use crate::order_book::{Fill, OrderBook};
use crate::types::{Order, OrderStatus, Side};
use rust_decimal::Decimal;

/// Matches `aggressor` against `book`. Mutates `aggressor.filled_quantity`
/// and `aggressor.status`; does not rest the remainder on the book (the
/// caller does that once persistence has assigned `aggressor.id` a
/// `created_at` tick — see [`crate::engine::Engine::submit`]).
pub fn match_order(book: &mut OrderBook, aggressor: &mut Order) -> Vec<Fill> {
    let price_limit = aggressor.price;
    let remaining = aggressor.remaining();
    if remaining <= Decimal::ZERO {
        return Vec::new();
    }

    let fills = match aggressor.side {
        Side::Buy => book.take_from_asks(price_limit, remaining),
        Side::Sell => book.take_from_bids(price_limit, remaining),
    };

    let filled: Decimal = fills.iter().map(|f| f.quantity).sum();
    aggressor.filled_quantity += filled;
    aggressor.status = if aggressor.is_filled() {
        OrderStatus::Filled
    } else if aggressor.filled_quantity > Decimal::ZERO {
        OrderStatus::Partial
    } else {
        OrderStatus::Open
    };

    fills
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommodityId, CustomerId, OrderId};
    use chrono::Utc;

    fn order(id: i64, side: Side, price: i64, qty: i64) -> Order {
        Order {
            id: OrderId(id),
            customer_id: CustomerId(id),
            commodity_id: CommodityId(1),
            side,
            status: OrderStatus::Open,
            price: Decimal::from(price),
            quantity: Decimal::from(qty),
            filled_quantity: Decimal::ZERO,
            created_at: id,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn no_cross_rests_open() {
        let mut book = OrderBook::new(CommodityId(1));
        book.add(&order(1, Side::Sell, 100, 3));
        let mut buy = order(2, Side::Buy, 99, 3);
        let fills = match_order(&mut book, &mut buy);
        assert!(fills.is_empty());
        assert_eq!(buy.status, OrderStatus::Open);
        assert_eq!(buy.filled_quantity, Decimal::ZERO);
    }

    #[test]
    fn full_match_at_resting_price() {
        let mut book = OrderBook::new(CommodityId(1));
        book.add(&order(1, Side::Sell, 1890, 5));
        let mut buy = order(2, Side::Buy, 1900, 10);
        let fills = match_order(&mut book, &mut buy);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, Decimal::from(1890), "trade executes at resting price");
        assert_eq!(fills[0].quantity, Decimal::from(5));
        assert_eq!(buy.status, OrderStatus::Partial);
        assert_eq!(buy.filled_quantity, Decimal::from(5));
    }

    #[test]
    fn exact_fill_transitions_to_filled() {
        let mut book = OrderBook::new(CommodityId(1));
        book.add(&order(1, Side::Sell, 100, 10));
        let mut buy = order(2, Side::Buy, 100, 10);
        let fills = match_order(&mut book, &mut buy);
        assert_eq!(fills.len(), 1);
        assert_eq!(buy.status, OrderStatus::Filled);
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn price_priority_beats_time_across_levels() {
        // Book: SELL 5@101 (earlier), SELL 5@100 (later). Buy 5@101 should
        // match the better-priced 100 order, not the earlier 101 one.
        let mut book = OrderBook::new(CommodityId(1));
        book.add(&order(1, Side::Sell, 101, 5));
        book.add(&order(2, Side::Sell, 100, 5));
        let mut buy = order(3, Side::Buy, 101, 5);
        let fills = match_order(&mut book, &mut buy);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].resting_order_id, OrderId(2));
        assert_eq!(fills[0].price, Decimal::from(100));
    }

    #[test]
    fn time_priority_within_same_price() {
        let mut book = OrderBook::new(CommodityId(1));
        book.add(&order(1, Side::Buy, 100, 5));
        book.add(&order(2, Side::Buy, 100, 5));
        let mut sell = order(3, Side::Sell, 100, 5);
        let fills = match_order(&mut book, &mut sell);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].resting_order_id, OrderId(1), "earlier order at same price fills first");
    }

    #[test]
    fn self_trade_not_prevented_in_matching() {
        let mut book = OrderBook::new(CommodityId(1));
        let mut resting = order(1, Side::Sell, 100, 10);
        resting.customer_id = CustomerId(7);
        book.add(&resting);
        let mut buy = order(2, Side::Buy, 100, 10);
        buy.customer_id = CustomerId(7);
        let fills = match_order(&mut book, &mut buy);
        assert_eq!(fills.len(), 1, "same customer on both sides still matches");
    }
}
