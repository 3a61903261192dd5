use std::future::Future;
use std::panic::Location;

use sqlx::{pool::PoolConnection, Postgres, Transaction};

use crate::config::LockConfig;
use crate::domain::errors::LockResult;
use crate::domain::lock_id::LockIdentifier;
use crate::infrastructure::persistence::Database;
use crate::services::lock_guard::{run_scoped, AdvisoryLock, LockOptions};
use crate::services::probe;

/// Pool-backed entry point for advisory locks.
///
/// Every session-scoped acquisition checks out its own connection and keeps it
/// until release, so the lock is always released on the session that took it.
#[derive(Clone)]
pub struct AdvisoryLockService {
    db: Database,
    config: LockConfig,
}

pub type PooledLock = AdvisoryLock<PoolConnection<Postgres>>;

impl AdvisoryLockService {
    pub fn new(db: Database, config: LockConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquires a session-scoped lock on a dedicated pooled connection.
    #[track_caller]
    pub fn acquire(
        &self,
        identifier: impl Into<LockIdentifier>,
        options: LockOptions,
    ) -> impl Future<Output = LockResult<PooledLock>> {
        let caller = Location::caller();
        let identifier = identifier.into();
        let db = self.db.clone();
        let config = self.config.clone();

        async move {
            let conn = db.pool().acquire().await?;
            AdvisoryLock::acquire_from(conn, identifier, options, &config, caller).await
        }
    }

    /// Acquires a transaction-scoped lock inside `tx`. Postgres releases it when
    /// the transaction commits or rolls back.
    #[track_caller]
    pub fn acquire_in<'t, 'c>(
        &self,
        tx: &'t mut Transaction<'c, Postgres>,
        identifier: impl Into<LockIdentifier>,
        options: LockOptions,
    ) -> impl Future<Output = LockResult<AdvisoryLock<&'t mut Transaction<'c, Postgres>>>> {
        AdvisoryLock::acquire_from(
            tx,
            identifier.into(),
            options,
            &self.config,
            Location::caller(),
        )
    }

    /// Runs `critical_section` while holding the lock.
    ///
    /// Returns `Ok(None)` without running it when a fail-fast acquisition is
    /// denied. The lock is released on every exit path.
    #[track_caller]
    pub fn with_lock<F, T>(
        &self,
        identifier: impl Into<LockIdentifier>,
        options: LockOptions,
        critical_section: F,
    ) -> impl Future<Output = LockResult<Option<T>>>
    where
        F: Future<Output = T>,
    {
        let acquire = self.acquire(identifier, options);
        async move { run_scoped(acquire.await?, critical_section).await }
    }

    /// Whether any session currently holds an advisory lock on `identifier`.
    pub async fn is_locked(&self, identifier: impl Into<LockIdentifier>) -> LockResult<bool> {
        let key = identifier.into().key();
        let mut conn = self.db.pool().acquire().await?;
        probe::is_locked(&mut conn, &key).await
    }
}
