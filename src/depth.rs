//! Depth aggregation (§4.3): a pure function over the resting book.
//!
//! Groups resting orders by exact price and sums remaining quantity. Prices
//! are compared as exact `Decimal` values — never floats — per the spec's
//! "Open question" on depth grouping (§9).

use crate::order_book::OrderBook;
use crate::types::Side;
use rust_decimal::Decimal;

/// One aggregated price level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Aggregated depth snapshot for one commodity. `bids` sorted by price
/// descending, `asks` ascending.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Depth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// Computes the depth snapshot for `book`. `OrderBook::levels` already
/// returns ascending-price order for both sides; bids are reversed here.
pub fn aggregate(book: &OrderBook) -> Depth {
    let mut bids: Vec<DepthLevel> = book
        .levels(Side::Buy)
        .map(|(price, quantity)| DepthLevel { price, quantity })
        .collect();
    bids.reverse();

    let asks: Vec<DepthLevel> = book
        .levels(Side::Sell)
        .map(|(price, quantity)| DepthLevel { price, quantity })
        .collect();

    Depth { bids, asks }
}
