use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

fn parse_pool_size(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}

pub fn pool_max_connections() -> u32 {
    parse_pool_size(std::env::var("DATABASE_MAX_CONNECTIONS").ok().as_deref())
}

/// Connection pool sized by `DATABASE_MAX_CONNECTIONS` (default 5).
pub async fn create_pool(database_url: &str) -> Result<Pool<Postgres>, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(pool_max_connections())
        .connect(database_url)
        .await
}
