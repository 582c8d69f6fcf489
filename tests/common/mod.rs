//! Shared harness for integration tests: a file-backed SQLite database with
//! a fresh schema per test, removed when the harness drops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use campus_ledger::db::{self, DbConfig, DbPool};
use campus_ledger::ledger::RetryPolicy;
use uuid::Uuid;

pub struct TestDb {
    pub pool: Arc<DbPool>,
    path: PathBuf,
}

impl TestDb {
    /// Opens a unique database file, runs migrations, and returns the pool.
    ///
    /// A single connection keeps SQLite writes serialized so tests see the
    /// same deterministic outcomes on every run.
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!(
            "campus_ledger_test_{}.db",
            Uuid::new_v4().simple()
        ));
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("connect to test database");
        db::run_migrations(&pool).await.expect("run migrations");

        Self {
            pool: Arc::new(pool),
            path,
        }
    }

    /// Retry tuning for tests: same attempt bound as production defaults,
    /// shorter backoff.
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(5))
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
