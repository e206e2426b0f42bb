use std::sync::Arc;

use vpsboard_api::app::AppState;
use vpsboard_api::{bootstrap_admin, config, routes, setup, store_pg};
use vpsboard_core::Store;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = config::create_pool(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    // Safe to run on startup; sqlx uses the _sqlx_migrations table + lock.
    setup::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn Store> = Arc::new(store_pg::PgStore::new(pool));

    // Ensure default admin exists (dev/staging/prod)
    bootstrap_admin::ensure_default_admin(&store).await;

    let state = AppState::new(store);
    let app = routes::create_router(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await.expect("server error");
}
