use sqlx::Pool;
use sqlx::Postgres;

/// Run database migrations and verify critical tables exist
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::migrate::MigrateError> {
    if let Err(e) = sqlx::migrate!("../sqlx-migrations").run(pool).await {
        // Log error but continue - migrations may have been applied manually
        eprintln!(
            "[warn] Migration error (may be safe to ignore if migrations were applied manually): {}",
            e
        );

        // Check if critical tables exist
        let principals_exist: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'principals')",
        )
        .fetch_one(pool)
        .await
        .unwrap_or(false);

        let instances_exist: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'instances')",
        )
        .fetch_one(pool)
        .await
        .unwrap_or(false);

        if !principals_exist {
            eprintln!("[error] Critical table 'principals' does not exist - migrations must be applied!");
            return Err(e);
        }

        if !instances_exist {
            eprintln!("[error] Critical table 'instances' does not exist - migrations must be applied!");
            return Err(e);
        }

        eprintln!("[info] Critical tables exist - continuing despite migration error");
    }

    Ok(())
}
