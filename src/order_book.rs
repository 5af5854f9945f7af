//! Single-commodity order book: bids and asks under price-time priority.
//!
//! Each price level is a FIFO queue of resting orders. Best bid is the
//! highest price; best ask is the lowest. No self-trade prevention is
//! applied here — two orders from the same customer cross like any other
//! pair (spec Non-goals, §9).

use crate::types::{CommodityId, Order, OrderId, Side};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One resting order at a price level: id and remaining quantity.
type BookEntry = (OrderId, Decimal);
/// Price level -> FIFO queue of resting orders.
type PriceLevel = BTreeMap<Decimal, VecDeque<BookEntry>>;

/// One fill produced by taking liquidity from the book.
#[derive(Clone, Debug)]
pub struct Fill {
    pub resting_order_id: OrderId,
    pub price: Decimal,
    pub quantity: Decimal,
    /// True if the resting order was fully filled (removed from the book).
    pub resting_fully_filled: bool,
}

/// In-memory resting book for one commodity. A write-through cache: every
/// mutation here must be mirrored into the same persistence transaction
/// that produced it (§9 "In-memory book structure").
#[derive(Debug)]
pub struct OrderBook {
    commodity_id: CommodityId,
    bids: PriceLevel,
    asks: PriceLevel,
    /// order id -> (side, price) for O(1) cancel/lookup.
    index: HashMap<OrderId, (Side, Decimal)>,
}

impl OrderBook {
    pub fn new(commodity_id: CommodityId) -> Self {
        Self {
            commodity_id,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn commodity_id(&self) -> CommodityId {
        self.commodity_id
    }

    fn level_mut(&mut self, side: Side) -> &mut PriceLevel {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rests an order on the book. Caller guarantees `order.commodity_id`
    /// matches this book and `order.remaining() > 0`.
    pub fn add(&mut self, order: &Order) {
        let remaining = order.remaining();
        self.level_mut(order.side)
            .entry(order.price)
            .or_default()
            .push_back((order.id, remaining));
        self.index.insert(order.id, (order.side, order.price));
    }

    /// Removes an order from the book. Returns `true` if it was resting.
    pub fn remove(&mut self, order_id: OrderId) -> bool {
        let Some((side, price)) = self.index.remove(&order_id) else {
            return false;
        };
        let level = self.level_mut(side);
        if let Some(queue) = level.get_mut(&price) {
            queue.retain(|(id, _)| *id != order_id);
            if queue.is_empty() {
                level.remove(&price);
            }
        }
        true
    }

    /// Whether `order_id` is currently resting on this book.
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Takes liquidity from the ask side for an incoming buy at `price_limit`,
    /// ascending price then FIFO within a level (§4.1.2 step 2-3).
    pub fn take_from_asks(&mut self, price_limit: Decimal, quantity: Decimal) -> Vec<Fill> {
        Self::take(&mut self.asks, &mut self.index, price_limit, quantity, true)
    }

    /// Takes liquidity from the bid side for an incoming sell at `price_limit`,
    /// descending price then FIFO within a level.
    pub fn take_from_bids(&mut self, price_limit: Decimal, quantity: Decimal) -> Vec<Fill> {
        Self::take(&mut self.bids, &mut self.index, price_limit, quantity, false)
    }

    fn take(
        level: &mut PriceLevel,
        index: &mut HashMap<OrderId, (Side, Decimal)>,
        price_limit: Decimal,
        mut quantity: Decimal,
        ascending: bool,
    ) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut drained_prices = Vec::new();

        let prices: Vec<Decimal> = if ascending {
            level.keys().copied().collect()
        } else {
            level.keys().copied().rev().collect()
        };

        for price in prices {
            if quantity <= Decimal::ZERO {
                break;
            }
            if ascending && price > price_limit {
                break;
            }
            if !ascending && price < price_limit {
                break;
            }
            let Some(queue) = level.get_mut(&price) else {
                continue;
            };
            while quantity > Decimal::ZERO {
                let Some((order_id, resting_qty)) = queue.front().copied() else {
                    break;
                };
                let take_qty = quantity.min(resting_qty);
                if take_qty <= Decimal::ZERO {
                    break;
                }
                let fully_filled = take_qty >= resting_qty;
                fills.push(Fill {
                    resting_order_id: order_id,
                    price,
                    quantity: take_qty,
                    resting_fully_filled: fully_filled,
                });
                quantity -= take_qty;
                if fully_filled {
                    queue.pop_front();
                    index.remove(&order_id);
                } else {
                    queue[0] = (order_id, resting_qty - take_qty);
                }
            }
            if queue.is_empty() {
                drained_prices.push(price);
            }
        }
        for price in drained_prices {
            level.remove(&price);
        }
        fills
    }

    /// Remaining quantity resting for one order id, if any.
    pub fn remaining_of(&self, order_id: OrderId) -> Option<Decimal> {
        let (side, price) = self.index.get(&order_id).copied()?;
        let level = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        level
            .get(&price)?
            .iter()
            .find(|(id, _)| *id == order_id)
            .map(|(_, qty)| *qty)
    }

    /// Iterates resting `(price, quantity)` pairs for one side, in the book's
    /// natural (ascending) key order. Used by [`crate::depth::aggregate`].
    pub fn levels(&self, side: Side) -> impl Iterator<Item = (Decimal, Decimal)> + '_ {
        let level = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        level
            .iter()
            .map(|(price, queue)| (*price, queue.iter().map(|(_, q)| *q).sum()))
    }
}
