//! Bootstrap: opens the database, wires the engine, and serves the REST API.

use commodity_book::api::create_router;
use commodity_book::audit::StdoutAuditSink;
use commodity_book::engine::Engine;
use commodity_book::persistence::SqlitePersistence;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    env_logger::init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:///order_book.db".to_string());
    let port: u16 = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(5000);

    let persistence = Arc::new(
        SqlitePersistence::connect(&database_url)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {database_url}: {e}")),
    );
    let engine = Arc::new(Engine::new(persistence.clone(), Arc::new(StdoutAuditSink)));

    let app = create_router(engine, persistence);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app).await.expect("serve");
}
