//! Persistence adapter (§9 "Ports and adapters").
//!
//! [`PersistencePort`] is the boundary the engine depends on; [`SqlitePersistence`]
//! is the production adapter (sqlx over SQLite), and [`InMemoryPersistence`] is a
//! test double with identical transaction semantics. The engine never touches
//! SQL directly, so the matching core stays storage-agnostic.

use crate::error::EngineError;
use crate::types::{Commodity, CommodityId, Customer, CustomerId, Order, OrderId, OrderStatus, Side, Trade, TradeId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;

/// Everything the engine needs from durable storage. [`PersistencePort::commit_submission`]
/// is the one write that must be atomic (§9 "Atomicity of submit"): the new
/// order, every resting order touched by matching, and every trade either all
/// land or none do.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn create_customer(&self, name: &str, email: &str, api_key: &str, password_hash: &str) -> Result<Customer, EngineError>;
    async fn get_customer_by_api_key(&self, api_key: &str) -> Result<Option<Customer>, EngineError>;
    async fn get_customer_by_email(&self, email: &str) -> Result<Option<Customer>, EngineError>;

    async fn create_commodity(&self, name: &str, symbol: &str, description: Option<&str>) -> Result<Commodity, EngineError>;
    async fn get_commodity(&self, id: CommodityId) -> Result<Option<Commodity>, EngineError>;
    async fn list_commodities(&self) -> Result<Vec<Commodity>, EngineError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, EngineError>;
    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, EngineError>;
    /// All resting (open or partial) orders for one commodity, used to rebuild
    /// the in-memory [`crate::order_book::OrderBook`] on startup.
    async fn list_resting_orders(&self, commodity_id: CommodityId) -> Result<Vec<Order>, EngineError>;

    async fn list_trades_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Trade>, EngineError>;

    /// Inserts `new_order` (its `id` is a placeholder, overwritten with the
    /// assigned id), applies every resting-order update produced by matching,
    /// and inserts every trade — atomically. Returns the new order with its
    /// assigned id and the trades with their assigned ids.
    async fn commit_submission(
        &self,
        new_order: &Order,
        updated_resting: &[Order],
        trades: &[Trade],
    ) -> Result<(Order, Vec<Trade>), EngineError>;

    /// Marks `order_id` cancelled. Returns the updated order, or `None` if it
    /// did not exist or was already terminal.
    async fn cancel_order(&self, order_id: OrderId) -> Result<Option<Order>, EngineError>;
}

/// sqlx/SQLite adapter. One connection pool, schema created on first use.
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                log::error!("failed to connect to {database_url}: {e}");
                EngineError::from(e)
            })?;
        let persistence = Self { pool };
        persistence.migrate().await?;
        Ok(persistence)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                api_key TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS commodities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL UNIQUE,
                description TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                commodity_id INTEGER NOT NULL REFERENCES commodities(id),
                side TEXT NOT NULL,
                status TEXT NOT NULL,
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                filled_quantity TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                commodity_id INTEGER NOT NULL REFERENCES commodities(id),
                order_id INTEGER NOT NULL REFERENCES orders(id),
                counterparty_order_id INTEGER NOT NULL REFERENCES orders(id),
                price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                executed_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, EngineError> {
        let side: String = row.try_get("side")?;
        let status: String = row.try_get("status")?;
        let price: String = row.try_get("price")?;
        let quantity: String = row.try_get("quantity")?;
        let filled_quantity: String = row.try_get("filled_quantity")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(Order {
            id: OrderId(row.try_get("id")?),
            customer_id: CustomerId(row.try_get("customer_id")?),
            commodity_id: CommodityId(row.try_get("commodity_id")?),
            side: parse_side(&side)?,
            status: parse_status(&status)?,
            price: price.parse().map_err(|_| EngineError::internal("corrupt price"))?,
            quantity: quantity.parse().map_err(|_| EngineError::internal("corrupt quantity"))?,
            filled_quantity: filled_quantity.parse().map_err(|_| EngineError::internal("corrupt filled_quantity"))?,
            created_at: row.try_get("created_at")?,
            updated_at: updated_at.parse().map_err(|_| EngineError::internal("corrupt updated_at"))?,
        })
    }

    fn row_to_trade(row: &sqlx::sqlite::SqliteRow) -> Result<Trade, EngineError> {
        let price: String = row.try_get("price")?;
        let quantity: String = row.try_get("quantity")?;
        let executed_at: String = row.try_get("executed_at")?;
        Ok(Trade {
            id: TradeId(row.try_get("id")?),
            commodity_id: CommodityId(row.try_get("commodity_id")?),
            order_id: OrderId(row.try_get("order_id")?),
            counterparty_order_id: OrderId(row.try_get("counterparty_order_id")?),
            price: price.parse().map_err(|_| EngineError::internal("corrupt price"))?,
            quantity: quantity.parse().map_err(|_| EngineError::internal("corrupt quantity"))?,
            executed_at: executed_at.parse().map_err(|_| EngineError::internal("corrupt executed_at"))?,
        })
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn parse_side(s: &str) -> Result<Side, EngineError> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(EngineError::internal(format!("corrupt side: {other}"))),
    }
}

fn status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Open => "open",
        OrderStatus::Partial => "partial",
        OrderStatus::Filled => "filled",
        OrderStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> Result<OrderStatus, EngineError> {
    match s {
        "open" => Ok(OrderStatus::Open),
        "partial" => Ok(OrderStatus::Partial),
        "filled" => Ok(OrderStatus::Filled),
        "cancelled" => Ok(OrderStatus::Cancelled),
        other => Err(EngineError::internal(format!("corrupt status: {other}"))),
    }
}

#[async_trait]
impl PersistencePort for SqlitePersistence {
    async fn create_customer(&self, name: &str, email: &str, api_key: &str, password_hash: &str) -> Result<Customer, EngineError> {
        let id = sqlx::query("INSERT INTO customers (name, email, api_key, password_hash) VALUES (?, ?, ?, ?) RETURNING id")
            .bind(name)
            .bind(email)
            .bind(api_key)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("id")?;
        Ok(Customer {
            id: CustomerId(id),
            name: name.to_string(),
            email: email.to_string(),
            api_key: api_key.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    async fn get_customer_by_api_key(&self, api_key: &str) -> Result<Option<Customer>, EngineError> {
        let row = sqlx::query("SELECT id, name, email, api_key, password_hash FROM customers WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Customer {
                id: CustomerId(row.try_get("id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                api_key: row.try_get("api_key")?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn get_customer_by_email(&self, email: &str) -> Result<Option<Customer>, EngineError> {
        let row = sqlx::query("SELECT id, name, email, api_key, password_hash FROM customers WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Customer {
                id: CustomerId(row.try_get("id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                api_key: row.try_get("api_key")?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn create_commodity(&self, name: &str, symbol: &str, description: Option<&str>) -> Result<Commodity, EngineError> {
        let id = sqlx::query("INSERT INTO commodities (name, symbol, description) VALUES (?, ?, ?) RETURNING id")
            .bind(name)
            .bind(symbol)
            .bind(description)
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("id")?;
        Ok(Commodity {
            id: CommodityId(id),
            name: name.to_string(),
            symbol: symbol.to_string(),
            description: description.map(|s| s.to_string()),
        })
    }

    async fn get_commodity(&self, id: CommodityId) -> Result<Option<Commodity>, EngineError> {
        let row = sqlx::query("SELECT id, name, symbol, description FROM commodities WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Commodity {
                id: CommodityId(row.try_get("id")?),
                name: row.try_get("name")?,
                symbol: row.try_get("symbol")?,
                description: row.try_get("description")?,
            })
        })
        .transpose()
    }

    async fn list_commodities(&self) -> Result<Vec<Commodity>, EngineError> {
        let rows = sqlx::query("SELECT id, name, symbol, description FROM commodities ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(Commodity {
                    id: CommodityId(row.try_get("id")?),
                    name: row.try_get("name")?,
                    symbol: row.try_get("symbol")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, EngineError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE customer_id = ? ORDER BY id")
            .bind(customer_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_order).collect()
    }

    async fn list_resting_orders(&self, commodity_id: CommodityId) -> Result<Vec<Order>, EngineError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE commodity_id = ? AND status IN ('open', 'partial') ORDER BY created_at")
            .bind(commodity_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_order).collect()
    }

    async fn list_trades_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Trade>, EngineError> {
        let rows = sqlx::query(
            r#"
            SELECT t.* FROM trades t
            JOIN orders o ON o.id = t.order_id OR o.id = t.counterparty_order_id
            WHERE o.customer_id = ?
            ORDER BY t.id
            "#,
        )
        .bind(customer_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_trade).collect()
    }

    async fn commit_submission(
        &self,
        new_order: &Order,
        updated_resting: &[Order],
        trades: &[Trade],
    ) -> Result<(Order, Vec<Trade>), EngineError> {
        let mut tx = self.pool.begin().await?;

        let new_id = sqlx::query(
            "INSERT INTO orders (customer_id, commodity_id, side, status, price, quantity, filled_quantity, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new_order.customer_id.0)
        .bind(new_order.commodity_id.0)
        .bind(side_str(new_order.side))
        .bind(status_str(new_order.status))
        .bind(new_order.price.to_string())
        .bind(new_order.quantity.to_string())
        .bind(new_order.filled_quantity.to_string())
        .bind(new_order.created_at)
        .bind(new_order.updated_at.to_rfc3339())
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("id")?;

        for order in updated_resting {
            sqlx::query("UPDATE orders SET status = ?, filled_quantity = ?, updated_at = ? WHERE id = ?")
                .bind(status_str(order.status))
                .bind(order.filled_quantity.to_string())
                .bind(order.updated_at.to_rfc3339())
                .bind(order.id.0)
                .execute(&mut *tx)
                .await?;
        }

        let mut committed_trades = Vec::with_capacity(trades.len());
        for trade in trades {
            let id = sqlx::query(
                "INSERT INTO trades (commodity_id, order_id, counterparty_order_id, price, quantity, executed_at)
                 VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(trade.commodity_id.0)
            .bind(new_id)
            .bind(trade.counterparty_order_id.0)
            .bind(trade.price.to_string())
            .bind(trade.quantity.to_string())
            .bind(trade.executed_at.to_rfc3339())
            .fetch_one(&mut *tx)
            .await?
            .try_get::<i64, _>("id")?;
            committed_trades.push(Trade { id: TradeId(id), order_id: OrderId(new_id), ..trade.clone() });
        }

        tx.commit().await.map_err(|e| {
            log::error!("commit_submission failed to commit transaction for commodity {}: {e}", new_order.commodity_id.0);
            EngineError::from(e)
        })?;
        Ok((Order { id: OrderId(new_id), ..new_order.clone() }, committed_trades))
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<Option<Order>, EngineError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = Self::row_to_order(&row)?;
        if order.status.is_terminal() {
            return Ok(None);
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = chrono::Utc::now();
        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status_str(order.status))
            .bind(order.updated_at.to_rfc3339())
            .bind(order_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await.map_err(|e| {
            log::error!("cancel_order failed to commit transaction for order {}: {e}", order_id.0);
            EngineError::from(e)
        })?;
        Ok(Some(order))
    }
}

/// In-process test double: same contract, no SQL. Grounded on the teacher's
/// `InMemoryAuditSink` shape (an `Arc<Mutex<...>>` behind a small struct).
#[derive(Default)]
pub struct InMemoryPersistence {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    customers: HashMap<CustomerId, Customer>,
    commodities: HashMap<CommodityId, Commodity>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    next_customer_id: i64,
    next_commodity_id: i64,
    next_order_id: i64,
    next_trade_id: i64,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistence {
    async fn create_customer(&self, name: &str, email: &str, api_key: &str, password_hash: &str) -> Result<Customer, EngineError> {
        let mut state = self.inner.lock().expect("lock");
        if state.customers.values().any(|c| c.email == email) {
            return Err(EngineError::conflict("email already registered"));
        }
        state.next_customer_id += 1;
        let customer = Customer {
            id: CustomerId(state.next_customer_id),
            name: name.to_string(),
            email: email.to_string(),
            api_key: api_key.to_string(),
            password_hash: password_hash.to_string(),
        };
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn get_customer_by_api_key(&self, api_key: &str) -> Result<Option<Customer>, EngineError> {
        let state = self.inner.lock().expect("lock");
        Ok(state.customers.values().find(|c| c.api_key == api_key).cloned())
    }

    async fn get_customer_by_email(&self, email: &str) -> Result<Option<Customer>, EngineError> {
        let state = self.inner.lock().expect("lock");
        Ok(state.customers.values().find(|c| c.email == email).cloned())
    }

    async fn create_commodity(&self, name: &str, symbol: &str, description: Option<&str>) -> Result<Commodity, EngineError> {
        let mut state = self.inner.lock().expect("lock");
        if state.commodities.values().any(|c| c.symbol == symbol) {
            return Err(EngineError::conflict("symbol already exists"));
        }
        state.next_commodity_id += 1;
        let commodity = Commodity {
            id: CommodityId(state.next_commodity_id),
            name: name.to_string(),
            symbol: symbol.to_string(),
            description: description.map(|s| s.to_string()),
        };
        state.commodities.insert(commodity.id, commodity.clone());
        Ok(commodity)
    }

    async fn get_commodity(&self, id: CommodityId) -> Result<Option<Commodity>, EngineError> {
        Ok(self.inner.lock().expect("lock").commodities.get(&id).cloned())
    }

    async fn list_commodities(&self) -> Result<Vec<Commodity>, EngineError> {
        let mut list: Vec<Commodity> = self.inner.lock().expect("lock").commodities.values().cloned().collect();
        list.sort_by_key(|c| c.id);
        Ok(list)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        Ok(self.inner.lock().expect("lock").orders.get(&id).cloned())
    }

    async fn list_orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, EngineError> {
        let mut list: Vec<Order> = self
            .inner
            .lock()
            .expect("lock")
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        list.sort_by_key(|o| o.id);
        Ok(list)
    }

    async fn list_resting_orders(&self, commodity_id: CommodityId) -> Result<Vec<Order>, EngineError> {
        let mut list: Vec<Order> = self
            .inner
            .lock()
            .expect("lock")
            .orders
            .values()
            .filter(|o| o.commodity_id == commodity_id && o.status.is_resting())
            .cloned()
            .collect();
        list.sort_by_key(|o| o.created_at);
        Ok(list)
    }

    async fn list_trades_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Trade>, EngineError> {
        let state = self.inner.lock().expect("lock");
        let owned: Vec<OrderId> = state
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .map(|o| o.id)
            .collect();
        Ok(state
            .trades
            .iter()
            .filter(|t| owned.contains(&t.order_id) || owned.contains(&t.counterparty_order_id))
            .cloned()
            .collect())
    }

    async fn commit_submission(
        &self,
        new_order: &Order,
        updated_resting: &[Order],
        trades: &[Trade],
    ) -> Result<(Order, Vec<Trade>), EngineError> {
        let mut state = self.inner.lock().expect("lock");
        state.next_order_id += 1;
        let new_order = Order { id: OrderId(state.next_order_id), ..new_order.clone() };
        state.orders.insert(new_order.id, new_order.clone());
        for order in updated_resting {
            state.orders.insert(order.id, order.clone());
        }
        let mut committed_trades = Vec::with_capacity(trades.len());
        for trade in trades {
            state.next_trade_id += 1;
            let trade = Trade { id: TradeId(state.next_trade_id), order_id: new_order.id, ..trade.clone() };
            state.trades.push(trade.clone());
            committed_trades.push(trade);
        }
        Ok((new_order, committed_trades))
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<Option<Order>, EngineError> {
        let mut state = self.inner.lock().expect("lock");
        let Some(order) = state.orders.get_mut(&order_id) else {
            return Ok(None);
        };
        if order.status.is_terminal() {
            return Ok(None);
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = chrono::Utc::now();
        Ok(Some(order.clone()))
    }
}
