//! Read-only check against the `pg_locks` registry.
//!
//! The answer is a snapshot: another session can take or drop the lock the
//! moment the query returns. Use it for diagnostics and tests, never as a
//! substitute for acquiring.

use crate::domain::errors::{LockError, LockResult};
use crate::domain::lock_id::LockKey;
use crate::domain::ports::AdvisorySession;
use crate::domain::statement::registry_count;

/// Whether any session in the current database holds an advisory lock on `key`.
pub async fn is_locked<S: AdvisorySession>(session: &mut S, key: &LockKey) -> LockResult<bool> {
    Ok(lock_count(session, key).await? > 0)
}

/// Number of granted advisory locks on `key`, shared holders counted separately.
pub async fn lock_count<S: AdvisorySession>(session: &mut S, key: &LockKey) -> LockResult<i64> {
    session
        .fetch_count(&registry_count(key))
        .await
        .map_err(LockError::Probe)
}
