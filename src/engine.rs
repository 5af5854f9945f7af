//! Single-entry matching engine facade (§4.1, §5).
//!
//! [`Engine`] owns one [`OrderBook`] per commodity behind a `DashMap`, each
//! guarded by its own `tokio::sync::Mutex` so unrelated commodities never
//! serialize against each other (§5 "Concurrency model"). Every `submit`
//! acquires that one lock, runs matching, and commits the result to
//! persistence before releasing it — so a resting order is never visible on
//! the in-memory book without already being durable, and vice versa.

use crate::audit::{AuditEvent, AuditSink};
use crate::depth::{self, Depth};
use crate::error::EngineError;
use crate::matching::match_order;
use crate::order_book::OrderBook;
use crate::persistence::PersistencePort;
use crate::types::{CommodityId, CustomerId, Order, OrderId, OrderStatus, Side, Trade};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Result of a successful [`Engine::submit`] call: the submitted order in its
/// final state plus every trade it produced, in execution order.
#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    pub order: Order,
    pub trades: Vec<Trade>,
}

pub struct Engine {
    persistence: Arc<dyn PersistencePort>,
    audit: Arc<dyn AuditSink>,
    books: DashMap<CommodityId, Arc<AsyncMutex<OrderBook>>>,
    /// Monotonic tick assigned under each commodity's lock; used for
    /// `created_at` / time priority (§5). Shared across commodities since it
    /// only needs to be strictly increasing within one commodity's series.
    tick: AtomicI64,
}

impl Engine {
    pub fn new(persistence: Arc<dyn PersistencePort>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            persistence,
            audit,
            books: DashMap::new(),
            tick: AtomicI64::new(0),
        }
    }

    /// Returns the book for `commodity_id`, hydrating it from persistence on
    /// first access. Errors if the commodity does not exist.
    async fn book_for(&self, commodity_id: CommodityId) -> Result<Arc<AsyncMutex<OrderBook>>, EngineError> {
        if let Some(book) = self.books.get(&commodity_id) {
            return Ok(book.clone());
        }
        self.persistence
            .get_commodity(commodity_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("commodity {} not found", commodity_id.0)))?;

        let resting = self.persistence.list_resting_orders(commodity_id).await?;
        let mut book = OrderBook::new(commodity_id);
        for order in &resting {
            book.add(order);
        }
        let arc = Arc::new(AsyncMutex::new(book));
        let entry = self.books.entry(commodity_id).or_insert_with(|| arc);
        Ok(entry.clone())
    }

    /// Submits a new limit order (§4.1.1-§4.1.3). Matches against the
    /// opposite side, commits the aggressor, every touched resting order,
    /// and every trade in one persistence transaction, then rests whatever
    /// remains of the aggressor on the in-memory book.
    pub async fn submit(
        &self,
        customer_id: CustomerId,
        commodity_id: CommodityId,
        side: Side,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<SubmitOutcome, EngineError> {
        if price <= Decimal::ZERO {
            log::warn!("rejected order: customer={} commodity={} non-positive price {}", customer_id.0, commodity_id.0, price);
            return Err(EngineError::invalid("price must be positive"));
        }
        if quantity <= Decimal::ZERO {
            log::warn!("rejected order: customer={} commodity={} non-positive quantity {}", customer_id.0, commodity_id.0, quantity);
            return Err(EngineError::invalid("quantity must be positive"));
        }

        let book_lock = self.book_for(commodity_id).await?;
        let mut book = book_lock.lock().await;

        let created_at = self.tick.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut aggressor = Order {
            id: OrderId(0),
            customer_id,
            commodity_id,
            side,
            status: OrderStatus::Open,
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            created_at,
            updated_at: now,
        };

        let fills = match_order(&mut book, &mut aggressor);

        let mut updated_resting = Vec::with_capacity(fills.len());
        for fill in &fills {
            let mut resting = self
                .persistence
                .get_order(fill.resting_order_id)
                .await?
                .ok_or_else(|| EngineError::internal("matched order missing from persistence"))?;
            resting.filled_quantity += fill.quantity;
            resting.status = if resting.is_filled() { OrderStatus::Filled } else { OrderStatus::Partial };
            resting.updated_at = now;
            log::debug!(
                "fill: commodity={} resting_order={} price={} quantity={}",
                commodity_id.0,
                fill.resting_order_id.0,
                fill.price,
                fill.quantity
            );
            updated_resting.push(resting);
        }

        let trades: Vec<Trade> = fills
            .iter()
            .map(|fill| Trade {
                id: crate::types::TradeId(0),
                commodity_id,
                order_id: OrderId(0),
                counterparty_order_id: fill.resting_order_id,
                price: fill.price,
                quantity: fill.quantity,
                executed_at: now,
            })
            .collect();

        let (committed_order, committed_trades) = self
            .persistence
            .commit_submission(&aggressor, &updated_resting, &trades)
            .await?;

        if committed_order.status.is_resting() {
            book.add(&committed_order);
        }
        drop(book);

        log::info!(
            "order submitted: order={} customer={} commodity={} status={:?} fills={}",
            committed_order.id.0,
            customer_id.0,
            commodity_id.0,
            committed_order.status,
            committed_trades.len()
        );

        self.audit.emit(&AuditEvent::now(
            format!("customer:{}", customer_id.0),
            "order_submit",
            Some(serde_json::json!({
                "order_id": committed_order.id.0,
                "commodity_id": commodity_id.0,
                "fills": committed_trades.len(),
            })),
            "success",
        ));

        Ok(SubmitOutcome { order: committed_order, trades: committed_trades })
    }

    /// Cancels a resting order owned by `customer_id` (§4.1.4, §5). Orders
    /// belonging to another customer are treated as not found, not
    /// forbidden, to avoid leaking order existence across customers. A
    /// terminal order (already `Filled` or `Cancelled`) is returned
    /// unchanged rather than erroring: cancellation is idempotent.
    pub async fn cancel(&self, customer_id: CustomerId, order_id: OrderId) -> Result<Order, EngineError> {
        let order = self
            .persistence
            .get_order(order_id)
            .await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or_else(|| EngineError::not_found(format!("order {} not found", order_id.0)))?;

        if order.status.is_terminal() {
            return Ok(order);
        }

        let book_lock = self.book_for(order.commodity_id).await?;
        let mut book = book_lock.lock().await;

        let cancelled = match self.persistence.cancel_order(order_id).await? {
            Some(cancelled) => cancelled,
            // Raced with a concurrent fill/cancel while acquiring the lock;
            // the order is now terminal by construction — fetch and return it.
            None => self
                .persistence
                .get_order(order_id)
                .await?
                .ok_or_else(|| EngineError::internal("order vanished during cancel"))?,
        };
        book.remove(order_id);
        drop(book);

        log::info!(
            "order cancelled: order={} customer={} filled_quantity={}",
            order_id.0,
            customer_id.0,
            cancelled.filled_quantity
        );

        self.audit.emit(&AuditEvent::now(
            format!("customer:{}", customer_id.0),
            "order_cancel",
            Some(serde_json::json!({ "order_id": order_id.0 })),
            "success",
        ));

        Ok(cancelled)
    }

    /// Order detail, scoped to the owning customer (§6).
    pub async fn get_order(&self, customer_id: CustomerId, order_id: OrderId) -> Result<Order, EngineError> {
        self.persistence
            .get_order(order_id)
            .await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or_else(|| EngineError::not_found(format!("order {} not found", order_id.0)))
    }

    /// All orders a customer has ever submitted.
    pub async fn list_orders(&self, customer_id: CustomerId) -> Result<Vec<Order>, EngineError> {
        self.persistence.list_orders_for_customer(customer_id).await
    }

    /// All trades a customer has participated in, either as aggressor or counterparty.
    pub async fn list_trades(&self, customer_id: CustomerId) -> Result<Vec<Trade>, EngineError> {
        self.persistence.list_trades_for_customer(customer_id).await
    }

    /// Aggregated depth for one commodity's resting book (§4.3).
    pub async fn depth(&self, commodity_id: CommodityId) -> Result<Depth, EngineError> {
        let book_lock = self.book_for(commodity_id).await?;
        let book = book_lock.lock().await;
        Ok(depth::aggregate(&book))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::persistence::InMemoryPersistence;

    async fn test_engine() -> (Engine, CommodityId) {
        let persistence = Arc::new(InMemoryPersistence::new());
        let commodity = persistence.create_commodity("Gold", "XAU", None).await.unwrap();
        let engine = Engine::new(persistence, Arc::new(InMemoryAuditSink::new()));
        (engine, commodity.id)
    }

    #[tokio::test]
    async fn resting_buy_then_crossing_sell_produces_one_trade() {
        let (engine, commodity_id) = test_engine().await;
        let buy = engine
            .submit(CustomerId(1), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(10))
            .await
            .unwrap();
        assert_eq!(buy.order.status, OrderStatus::Open);

        let sell = engine
            .submit(CustomerId(2), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(10))
            .await
            .unwrap();
        assert_eq!(sell.trades.len(), 1);
        assert_eq!(sell.order.status, OrderStatus::Filled);
        assert_eq!(sell.trades[0].counterparty_order_id, buy.order.id);

        let resting_buy = engine.get_order(CustomerId(1), buy.order.id).await.unwrap();
        assert_eq!(resting_buy.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn partial_fill_then_top_up_fills_remainder() {
        let (engine, commodity_id) = test_engine().await;
        let sell = engine
            .submit(CustomerId(1), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(10))
            .await
            .unwrap();
        let buy1 = engine
            .submit(CustomerId(2), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(4))
            .await
            .unwrap();
        assert_eq!(buy1.order.status, OrderStatus::Filled);
        let resting_sell = engine.get_order(CustomerId(1), sell.order.id).await.unwrap();
        assert_eq!(resting_sell.status, OrderStatus::Partial);
        assert_eq!(resting_sell.filled_quantity, Decimal::from(4));

        let buy2 = engine
            .submit(CustomerId(3), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(6))
            .await
            .unwrap();
        assert_eq!(buy2.order.status, OrderStatus::Filled);
        let resting_sell = engine.get_order(CustomerId(1), sell.order.id).await.unwrap();
        assert_eq!(resting_sell.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn no_cross_leaves_both_orders_resting() {
        let (engine, commodity_id) = test_engine().await;
        let buy = engine
            .submit(CustomerId(1), commodity_id, Side::Buy, Decimal::from(99), Decimal::from(5))
            .await
            .unwrap();
        let sell = engine
            .submit(CustomerId(2), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(5))
            .await
            .unwrap();
        assert_eq!(buy.order.status, OrderStatus::Open);
        assert_eq!(sell.order.status, OrderStatus::Open);
        assert!(sell.trades.is_empty());

        let depth = engine.depth(commodity_id).await.unwrap();
        assert_eq!(depth.bids.len(), 1);
        assert_eq!(depth.asks.len(), 1);
    }

    #[tokio::test]
    async fn cancel_while_partial_removes_remainder_from_book() {
        let (engine, commodity_id) = test_engine().await;
        let sell = engine
            .submit(CustomerId(1), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(10))
            .await
            .unwrap();
        engine
            .submit(CustomerId(2), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(4))
            .await
            .unwrap();

        let cancelled = engine.cancel(CustomerId(1), sell.order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let depth = engine.depth(commodity_id).await.unwrap();
        assert!(depth.asks.is_empty());
    }

    #[tokio::test]
    async fn cancel_by_non_owner_is_not_found() {
        let (engine, commodity_id) = test_engine().await;
        let order = engine
            .submit(CustomerId(1), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(10))
            .await
            .unwrap();
        let err = engine.cancel(CustomerId(2), order.order.id).await;
        assert!(matches!(err, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancel_twice_is_idempotent() {
        let (engine, commodity_id) = test_engine().await;
        let order = engine
            .submit(CustomerId(1), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(10))
            .await
            .unwrap();
        let first = engine.cancel(CustomerId(1), order.order.id).await.unwrap();
        assert_eq!(first.status, OrderStatus::Cancelled);
        let second = engine.cancel(CustomerId(1), order.order.id).await.unwrap();
        assert_eq!(second.status, OrderStatus::Cancelled);
        assert_eq!(second.filled_quantity, first.filled_quantity);
    }

    #[tokio::test]
    async fn cancel_of_filled_order_is_idempotent() {
        let (engine, commodity_id) = test_engine().await;
        let sell = engine
            .submit(CustomerId(1), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(5))
            .await
            .unwrap();
        engine
            .submit(CustomerId(2), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(5))
            .await
            .unwrap();
        let unchanged = engine.cancel(CustomerId(1), sell.order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn non_positive_price_is_rejected() {
        let (engine, commodity_id) = test_engine().await;
        let err = engine
            .submit(CustomerId(1), commodity_id, Side::Buy, Decimal::ZERO, Decimal::from(10))
            .await;
        assert!(matches!(err, Err(EngineError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn time_priority_fills_earlier_order_first() {
        let (engine, commodity_id) = test_engine().await;
        let first = engine
            .submit(CustomerId(1), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(5))
            .await
            .unwrap();
        let _second = engine
            .submit(CustomerId(2), commodity_id, Side::Buy, Decimal::from(100), Decimal::from(5))
            .await
            .unwrap();
        let sell = engine
            .submit(CustomerId(3), commodity_id, Side::Sell, Decimal::from(100), Decimal::from(5))
            .await
            .unwrap();
        assert_eq!(sell.trades[0].counterparty_order_id, first.order.id);
    }
}
