use pglocks::{AdvisoryLockService, Database, LockConfig, LockIdentifier};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;
use std::time::{Duration, Instant};

/// Connects to the Postgres named by `PGLOCKS_TEST_DATABASE_URL` (or
/// `DATABASE_URL`). Panics when neither is set: the Postgres tests are
/// `#[ignore]`d, so reaching this without a database is a setup mistake.
pub async fn setup_test_pool() -> PgPool {
    dotenvy::dotenv().ok();

    let url = env::var("PGLOCKS_TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .expect("PGLOCKS_TEST_DATABASE_URL or DATABASE_URL must be set to run Postgres tests");

    PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to test database")
}

pub async fn setup_test_service() -> (AdvisoryLockService, PgPool) {
    setup_test_service_with(LockConfig::default()).await
}

pub async fn setup_test_service_with(config: LockConfig) -> (AdvisoryLockService, PgPool) {
    let pool = setup_test_pool().await;
    let service = AdvisoryLockService::new(Database::from_pool(pool.clone()), config);
    (service, pool)
}

/// A text identifier no other test will pick.
pub fn unique_name(prefix: &str) -> LockIdentifier {
    LockIdentifier::Text(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}

/// All granted advisory locks in the test database, across sessions.
pub async fn advisory_lock_rows(pool: &PgPool) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM pg_locks
         WHERE locktype = 'advisory'
           AND granted
           AND database = (SELECT oid FROM pg_database WHERE datname = current_database())",
    )
    .fetch_one(pool)
    .await
    .expect("Failed to count advisory locks")
}

/// Polls until nobody holds `identifier` or `limit` elapses.
pub async fn wait_until_unlocked(
    service: &AdvisoryLockService,
    identifier: &LockIdentifier,
    limit: Duration,
) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if !service.is_locked(identifier.clone()).await.unwrap() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
