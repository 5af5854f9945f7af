//! REST API router (§6). A thin request-to-engine adapter: validates inputs,
//! authenticates via [`crate::auth`], and serializes engine results. Holds no
//! matching logic of its own.
//!
//! Uses `Extension` for state so the router is `Router<()>` and works
//! directly with `axum::serve`/`into_make_service()`.

use axum::{
    extract::{Extension, Path},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::auth;
use crate::depth::Depth;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::persistence::PersistencePort;
use crate::types::{CommodityId, Customer, Order, OrderId, Side, Trade};

/// Shared app state: one engine and one persistence handle per process.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub persistence: Arc<dyn PersistencePort>,
}

/// Builds the REST router with state and auth middleware applied. Returns
/// `Router<()>` so the caller can pass it straight to `axum::serve`.
pub fn create_router(engine: Arc<Engine>, persistence: Arc<dyn PersistencePort>) -> Router<()> {
    let state = AppState { engine, persistence: persistence.clone() };

    Router::new()
        .route("/api/customers", get(get_me).post(register_customer))
        .route("/api/login", post(login))
        .route("/api/commodities", get(list_commodities).post(create_commodity))
        .route("/api/commodities/:id", get(get_commodity))
        .route("/api/orderbook/:commodity_id", get(get_orderbook))
        .route("/api/orders", get(list_orders).post(submit_order))
        .route("/api/orders/:id", get(get_order).delete(cancel_order))
        .route("/api/trades", get(list_trades))
        .layer(axum::middleware::from_fn(move |req, next| {
            let persistence = persistence.clone();
            async move { auth_gate(req, next, persistence).await }
        }))
        .layer(Extension(state))
}

/// Passes `POST /api/customers` and `POST /api/login` through unauthenticated;
/// every other route requires a valid API key (§6 "Auth" column).
async fn auth_gate(
    req: axum::extract::Request,
    next: axum::middleware::Next,
    persistence: Arc<dyn PersistencePort>,
) -> Response {
    let path = req.uri().path();
    let is_public = (path == "/api/customers" && req.method() == Method::POST) || path == "/api/login";
    if is_public {
        return next.run(req).await;
    }
    auth::require_api_key(req, next, persistence).await
}

fn engine_error_response(err: EngineError) -> Response {
    let status = match err {
        EngineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("request failed: {err}");
    } else {
        log::warn!("rejected request ({status}): {err}");
    }
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// Customer view returned on registration and login — the one time the
/// plaintext `api_key` is handed back to the caller (§6).
#[derive(serde::Serialize)]
struct CustomerWithKey {
    id: i64,
    name: String,
    email: String,
    api_key: String,
}

impl From<Customer> for CustomerWithKey {
    fn from(c: Customer) -> Self {
        Self { id: c.id.0, name: c.name, email: c.email, api_key: c.api_key }
    }
}

#[derive(serde::Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

async fn register_customer(Extension(state): Extension<AppState>, Json(body): Json<RegisterRequest>) -> Response {
    if body.password.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "missing password" }))).into_response();
    }
    let password_hash = match auth::hash_password(&body.password) {
        Ok(h) => h,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "failed to hash password").into_response(),
    };
    let api_key = auth::generate_api_key();
    match state.persistence.create_customer(&body.name, &body.email, &api_key, &password_hash).await {
        Ok(customer) => (StatusCode::CREATED, Json(CustomerWithKey::from(customer))).into_response(),
        Err(e) => engine_error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(Extension(state): Extension<AppState>, Json(body): Json<LoginRequest>) -> Response {
    let customer = match state.persistence.get_customer_by_email(&body.email).await {
        Ok(Some(c)) => c,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid email or password").into_response(),
        Err(e) => return engine_error_response(e),
    };
    if !auth::verify_password(&body.password, &customer.password_hash) {
        return (StatusCode::UNAUTHORIZED, "invalid email or password").into_response();
    }
    (StatusCode::OK, Json(CustomerWithKey::from(customer))).into_response()
}

async fn get_me(Extension(customer): Extension<Customer>) -> Response {
    (StatusCode::OK, Json(customer)).into_response()
}

#[derive(serde::Deserialize)]
struct CreateCommodityRequest {
    name: String,
    symbol: String,
    description: Option<String>,
}

async fn create_commodity(Extension(state): Extension<AppState>, Json(body): Json<CreateCommodityRequest>) -> Response {
    if body.name.is_empty() || body.symbol.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "missing name or symbol" }))).into_response();
    }
    match state.persistence.create_commodity(&body.name, &body.symbol, body.description.as_deref()).await {
        Ok(commodity) => (StatusCode::CREATED, Json(commodity)).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn list_commodities(Extension(state): Extension<AppState>) -> Response {
    match state.persistence.list_commodities().await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn get_commodity(Extension(state): Extension<AppState>, Path(id): Path<i64>) -> Response {
    match state.persistence.get_commodity(CommodityId(id)).await {
        Ok(Some(commodity)) => (StatusCode::OK, Json(commodity)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "commodity not found").into_response(),
        Err(e) => engine_error_response(e),
    }
}

#[derive(serde::Serialize)]
struct OrderBookResponse {
    commodity_id: i64,
    bids: Vec<crate::depth::DepthLevel>,
    asks: Vec<crate::depth::DepthLevel>,
}

async fn get_orderbook(Extension(state): Extension<AppState>, Path(commodity_id): Path<i64>) -> Response {
    match state.engine.depth(CommodityId(commodity_id)).await {
        Ok(Depth { bids, asks }) => {
            (StatusCode::OK, Json(OrderBookResponse { commodity_id, bids, asks })).into_response()
        }
        Err(e) => engine_error_response(e),
    }
}

async fn list_orders(Extension(state): Extension<AppState>, Extension(customer): Extension<Customer>) -> Response {
    match state.engine.list_orders(customer.id).await {
        Ok(orders) => (StatusCode::OK, Json(orders)).into_response(),
        Err(e) => engine_error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct SubmitOrderRequest {
    commodity_id: i64,
    side: Side,
    price: Decimal,
    quantity: Decimal,
}

#[derive(serde::Serialize)]
struct SubmitOrderResponse {
    order: Order,
    trades: Vec<Trade>,
}

async fn submit_order(
    Extension(state): Extension<AppState>,
    Extension(customer): Extension<Customer>,
    Json(body): Json<SubmitOrderRequest>,
) -> Response {
    match state
        .engine
        .submit(customer.id, CommodityId(body.commodity_id), body.side, body.price, body.quantity)
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(SubmitOrderResponse { order: outcome.order, trades: outcome.trades })).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn get_order(
    Extension(state): Extension<AppState>,
    Extension(customer): Extension<Customer>,
    Path(id): Path<i64>,
) -> Response {
    match state.engine.get_order(customer.id, OrderId(id)).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn cancel_order(
    Extension(state): Extension<AppState>,
    Extension(customer): Extension<Customer>,
    Path(id): Path<i64>,
) -> Response {
    match state.engine.cancel(customer.id, OrderId(id)).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => engine_error_response(e),
    }
}

async fn list_trades(Extension(state): Extension<AppState>, Extension(customer): Extension<Customer>) -> Response {
    match state.engine.list_trades(customer.id).await {
        Ok(trades) => (StatusCode::OK, Json(trades)).into_response(),
        Err(e) => engine_error_response(e),
    }
}
