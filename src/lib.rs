//! # Commodity Book
//!
//! A continuous-auction limit order book for spot commodity trading: customers
//! submit buy or sell limit orders, the engine matches the resting book under
//! price-time priority, and every trade executes at the resting side's price.
//!
//! ## Entry point
//!
//! Construct a [`persistence::PersistencePort`] adapter, wrap it in an
//! [`engine::Engine`], and drive it with [`engine::Engine::submit`],
//! [`engine::Engine::cancel`], and [`engine::Engine::depth`]. [`api::create_router`]
//! exposes the same operations over HTTP.
//!
//! ## Example
//!
//! ```rust
//! use commodity_book::engine::Engine;
//! use commodity_book::persistence::{InMemoryPersistence, PersistencePort};
//! use commodity_book::audit::InMemoryAuditSink;
//! use commodity_book::types::Side;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let persistence = Arc::new(InMemoryPersistence::new());
//! let commodity = persistence.create_commodity("Gold", "XAU", None).await.unwrap();
//! let engine = Engine::new(persistence, Arc::new(InMemoryAuditSink::new()));
//!
//! let outcome = engine
//!     .submit(commodity_book::types::CustomerId(1), commodity.id, Side::Buy, Decimal::from(100), Decimal::from(10))
//!     .await
//!     .unwrap();
//! assert!(outcome.trades.is_empty());
//! # });
//! ```

pub mod api;
pub mod audit;
pub mod auth;
pub mod depth;
pub mod engine;
pub mod error;
pub mod matching;
pub mod order_book;
pub mod persistence;
pub mod types;

pub use depth::{Depth, DepthLevel};
pub use engine::{Engine, SubmitOutcome};
pub use error::EngineError;
pub use matching::match_order;
pub use order_book::{Fill, OrderBook};
pub use types::{Commodity, CommodityId, Customer, CustomerId, Order, OrderId, OrderStatus, Side, Trade, TradeId};
