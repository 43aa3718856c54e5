//! Async facade over the pool and the retry executor.
//!
//! Repository calls are synchronous, so every operation runs on the blocking
//! pool. Writes go through [`RetryExecutor`]; each attempt checks out a fresh
//! connection. Reads run once.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use rym_core::retry::RetryPolicy;
use rym_settings::DatabaseSettings;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{Result, StoreError};
use crate::retry::RetryExecutor;
use crate::sqlite::{ConnectionConfig, ConnectionPool, new_file, run_migrations};

/// Shared handle to the database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
    executor: RetryExecutor,
}

impl Store {
    /// Open (or create) the database described by `settings`, run
    /// migrations and build the executor for its backend.
    pub fn open(settings: &DatabaseSettings, policy: RetryPolicy) -> Result<Self> {
        let pool = new_file(Path::new(&settings.path), &ConnectionConfig::from(settings))?;
        let applied = run_migrations(&*pool.get()?)?;
        info!(path = %settings.path, backend = ?settings.backend, applied, "store opened");
        Ok(Self::new(pool, RetryExecutor::new(settings.backend, policy)))
    }

    /// Wrap an existing, migrated pool.
    pub fn new(pool: ConnectionPool, executor: RetryExecutor) -> Self {
        Self { pool, executor }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// The retry executor used for writes.
    pub fn executor(&self) -> RetryExecutor {
        self.executor
    }

    /// Run a mutation with contention retry.
    pub async fn write<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        self.executor
            .run(cancel, || {
                let op = Arc::clone(&op);
                self.blocking(move |conn| op(conn))
            })
            .await
    }

    /// Run a query once.
    pub async fn read<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        self.blocking(op).await
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            op(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::busy;
    use crate::sqlite::repositories::UserRepo;
    use crate::sqlite::row_types::NewUser;
    use assert_matches::assert_matches;
    use rym_settings::DatabaseBackend;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn open(dir: &tempfile::TempDir) -> Store {
        let settings = DatabaseSettings {
            path: dir.path().join("rym.db").to_string_lossy().into_owned(),
            ..DatabaseSettings::default()
        };
        Store::open(&settings, RetryPolicy::new(5, 1)).unwrap()
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let cancel = CancellationToken::new();

        let (row, created) = store
            .write(&cancel, |conn| {
                UserRepo::upsert(
                    conn,
                    &NewUser {
                        steam_id: "1".into(),
                        username: "alice".into(),
                        ..NewUser::default()
                    },
                    0,
                )
            })
            .await
            .unwrap();
        assert!(created);

        let id = row.id;
        let fetched = store
            .read(move |conn| UserRepo::get(conn, id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[tokio::test]
    async fn write_retries_busy_closure() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let out = store
            .write(&cancel, move |_conn| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(busy())
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_does_not_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<()> = store
            .read(move |_conn| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                Err(busy())
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn real_lock_contention_surfaces_as_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rym.db");
        let settings = DatabaseSettings {
            path: path.to_string_lossy().into_owned(),
            busy_timeout_ms: 0,
            backend: DatabaseBackend::Sqlite,
            ..DatabaseSettings::default()
        };
        let store = Store::open(&settings, RetryPolicy::new(3, 1)).unwrap();

        // Hold the write lock from a connection outside the pool.
        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let cancel = CancellationToken::new();
        let result = store
            .write(&cancel, UserRepo::reset_all_credits)
            .await;
        assert_matches!(result, Err(StoreError::ResourceBusy { attempts: 3 }));

        blocker.execute_batch("ROLLBACK;").unwrap();
        let result = store
            .write(&cancel, UserRepo::reset_all_credits)
            .await;
        assert_eq!(result.unwrap(), 0);
    }
}
