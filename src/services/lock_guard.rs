//! The advisory lock guard.
//!
//! A guard owns one database session from the acquire call until release. The
//! lifecycle is `Acquiring -> Held | Denied -> Released`; only a `Held` guard
//! ever issues a release, and it issues exactly one, on the session that took
//! the lock.
//!
//! Locks do not nest: Postgres counts repeated acquisitions of the same key on
//! one session, but each guard only undoes its own. Two guards on the same
//! session and key need two releases, which is the caller's business.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::config::LockConfig;
use crate::domain::errors::{LockError, LockResult};
use crate::domain::lock_id::{LockIdentifier, LockKey};
use crate::domain::lock_mode::{select_functions, LockFunctions, LockMode};
use crate::domain::ports::AdvisorySession;
use crate::domain::statement::lock_call;

/// Outcome of an acquire call. Blocking acquisitions are always `Held`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Held,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Acquiring,
    Held,
    Denied,
    Failed,
    Released,
}

/// Per-call lock options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockOptions {
    pub mode: LockMode,
    /// Overrides [`LockConfig::debug_comments`] for this call.
    pub comment: Option<bool>,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: LockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.mode.shared = shared;
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.mode.wait = wait;
        self
    }

    pub fn comment(mut self, comment: bool) -> Self {
        self.comment = Some(comment);
        self
    }
}

pub struct AdvisoryLock<S: AdvisorySession> {
    session: Option<S>,
    identifier: LockIdentifier,
    key: LockKey,
    mode: LockMode,
    functions: LockFunctions,
    annotation: Option<String>,
    state: LockState,
}

impl<S: AdvisorySession> AdvisoryLock<S> {
    /// Acquires a lock on `session`.
    ///
    /// Returns a guard in the `Held` or `Denied` state. A database error during
    /// the acquire call is returned as [`LockError::Acquisition`] and no lock is
    /// considered held.
    #[track_caller]
    pub fn acquire(
        session: S,
        identifier: impl Into<LockIdentifier>,
        options: LockOptions,
        config: &LockConfig,
    ) -> impl Future<Output = LockResult<Self>> {
        Self::acquire_from(
            session,
            identifier.into(),
            options,
            config,
            Location::caller(),
        )
    }

    pub(crate) fn acquire_from(
        session: S,
        identifier: LockIdentifier,
        options: LockOptions,
        config: &LockConfig,
        caller: &'static Location<'static>,
    ) -> impl Future<Output = LockResult<Self>> {
        let annotation = options
            .comment
            .unwrap_or(config.debug_comments)
            .then(|| format!("{} at {}:{}", identifier, caller.file(), caller.line()));
        let lock_timeout = config.lock_timeout;

        Self::run_acquire(session, identifier, options.mode, annotation, lock_timeout)
    }

    async fn run_acquire(
        session: S,
        identifier: LockIdentifier,
        mode: LockMode,
        annotation: Option<String>,
        lock_timeout: Option<Duration>,
    ) -> LockResult<Self> {
        let key = identifier.key();
        let functions = select_functions(mode, session.in_transaction());
        let statement = lock_call(functions.acquire, &key, annotation.as_deref());

        // The guard exists before the call so that a cancelled acquire is
        // cleaned up by Drop.
        let mut guard = AdvisoryLock {
            session: Some(session),
            identifier,
            key,
            mode,
            functions,
            annotation,
            state: LockState::Acquiring,
        };

        tracing::debug!("Acquiring advisory lock {}: {}", guard.identifier, statement);

        let started = Instant::now();
        let outcome = issue_acquire(guard.session_mut(), &statement, mode.wait, lock_timeout).await;
        metrics::histogram!(
            "pglocks_acquire_wait_seconds",
            "mode" => mode.shared_label(),
            "wait" => mode.wait_label()
        )
        .record(started.elapsed().as_secs_f64());

        let (state, outcome_label) = match &outcome {
            Ok(true) => (LockState::Held, "held"),
            Ok(false) => (LockState::Denied, "denied"),
            Err(_) => (LockState::Failed, "error"),
        };
        guard.state = state;
        metrics::counter!(
            "pglocks_acquire_total",
            "mode" => mode.shared_label(),
            "wait" => mode.wait_label(),
            "outcome" => outcome_label
        )
        .increment(1);

        match outcome {
            Ok(true) => {
                tracing::info!(
                    "Advisory lock {} held ({} {}, key {})",
                    guard.identifier,
                    mode.shared_label(),
                    guard.functions.acquire,
                    guard.key
                );
                Ok(guard)
            }
            Ok(false) => {
                tracing::info!("Advisory lock {} denied", guard.identifier);
                Ok(guard)
            }
            Err(source) => {
                tracing::warn!(
                    "Failed to acquire advisory lock {}: {}",
                    guard.identifier,
                    source
                );
                Err(LockError::Acquisition {
                    identifier: guard.identifier.to_string(),
                    source,
                })
            }
        }
    }

    /// Acquires a lock, runs `critical_section` only if it was granted, then
    /// releases it.
    ///
    /// Returns `Ok(None)` when a fail-fast acquisition was denied. The release
    /// also runs if the critical section panics; the panic is resumed afterwards.
    #[track_caller]
    pub fn scoped<F, T>(
        session: S,
        identifier: impl Into<LockIdentifier>,
        options: LockOptions,
        config: &LockConfig,
        critical_section: F,
    ) -> impl Future<Output = LockResult<Option<T>>>
    where
        F: Future<Output = T>,
    {
        let acquire = Self::acquire(session, identifier, options, config);
        async move { run_scoped(acquire.await?, critical_section).await }
    }

    /// Releases the lock if this guard holds it and hands the session back.
    ///
    /// Denied guards issue nothing. Transaction-scoped locks stay held until the
    /// transaction ends. If the release statement fails the session is
    /// discarded rather than handed back, and [`LockError::Release`] is returned.
    pub async fn release(mut self) -> LockResult<S> {
        let release_function = match (self.state, self.functions.release) {
            (LockState::Held, Some(function)) => function,
            (LockState::Held, None) => {
                tracing::debug!(
                    "Advisory lock {} is transaction-scoped, held until the transaction ends",
                    self.identifier
                );
                return Ok(self.finish());
            }
            _ => return Ok(self.finish()),
        };

        let statement = lock_call(release_function, &self.key, self.annotation.as_deref());
        tracing::debug!("Releasing advisory lock {}: {}", self.identifier, statement);

        // State stays Held across the await: if this future is dropped, Drop
        // still sees a held lock.
        let result = self.session_mut().fetch_bool(&statement).await;
        let session = self.finish();

        match result {
            Ok(true) => {
                metrics::counter!("pglocks_release_total", "outcome" => "released").increment(1);
                tracing::info!("Advisory lock {} released", self.identifier);
                Ok(session)
            }
            Ok(false) => {
                metrics::counter!("pglocks_release_total", "outcome" => "not_held").increment(1);
                tracing::warn!(
                    "Advisory lock {} was not held by this session at release",
                    self.identifier
                );
                Ok(session)
            }
            Err(source) => {
                metrics::counter!("pglocks_release_total", "outcome" => "error").increment(1);
                tracing::error!(
                    "Failed to release advisory lock {}: {}",
                    self.identifier,
                    source
                );
                session.abandon(None);
                Err(LockError::Release {
                    identifier: self.identifier.to_string(),
                    source,
                })
            }
        }
    }

    pub fn acquisition(&self) -> Acquisition {
        match self.state {
            LockState::Held => Acquisition::Held,
            _ => Acquisition::Denied,
        }
    }

    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn identifier(&self) -> &LockIdentifier {
        &self.identifier
    }

    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn functions(&self) -> LockFunctions {
        self.functions
    }

    /// The session the lock was taken on, for work that must run on the same
    /// connection or inside the same transaction.
    pub fn session(&mut self) -> &mut S {
        self.session_mut()
    }

    fn session_mut(&mut self) -> &mut S {
        self.session
            .as_mut()
            .expect("session is owned by the guard until release")
    }

    fn finish(&mut self) -> S {
        if self.state == LockState::Held {
            self.state = LockState::Released;
        }
        self.session
            .take()
            .expect("session is owned by the guard until release")
    }
}

impl<S: AdvisorySession> fmt::Debug for AdvisoryLock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisoryLock")
            .field("identifier", &self.identifier)
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("functions", &self.functions)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: AdvisorySession> Drop for AdvisoryLock<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match (self.state, self.functions.release) {
            (LockState::Held, Some(function)) => {
                tracing::warn!(
                    "Advisory lock {} dropped without release, releasing in background",
                    self.identifier
                );
                session.abandon(Some(lock_call(
                    function,
                    &self.key,
                    self.annotation.as_deref(),
                )));
            }
            (LockState::Acquiring, _) => {
                tracing::warn!("Acquire of advisory lock {} was interrupted", self.identifier);
                session.abandon(None);
            }
            _ => {}
        }
    }
}

async fn issue_acquire<S: AdvisorySession>(
    session: &mut S,
    statement: &str,
    wait: bool,
    lock_timeout: Option<Duration>,
) -> Result<bool, sqlx::Error> {
    if !wait {
        return session.fetch_bool(statement).await;
    }

    // Blocking functions return void; returning at all means the lock is held.
    let Some(timeout) = lock_timeout else {
        session.execute(statement).await?;
        return Ok(true);
    };

    let millis = timeout.as_millis();
    if session.in_transaction() {
        // A local setting lasts until commit, so the caller's value is put back
        // before the transaction sees any other statement.
        let previous = session
            .fetch_text("SELECT current_setting('lock_timeout')")
            .await?;
        session
            .execute(&format!(
                "SELECT set_config('lock_timeout', '{}ms', true)",
                millis
            ))
            .await?;
        let acquired = session.execute(statement).await;
        let restore = format!(
            "SELECT set_config('lock_timeout', '{}', true)",
            previous.replace('\'', "''")
        );
        if let Err(e) = session.execute(&restore).await {
            // After a failed acquire the transaction is aborted and the
            // rollback discards the setting anyway.
            if acquired.is_ok() {
                tracing::warn!("Failed to restore lock_timeout in transaction: {}", e);
            } else {
                tracing::debug!("lock_timeout not restored in aborted transaction: {}", e);
            }
        }
        acquired?;
        return Ok(true);
    }

    session
        .execute(&format!("SET lock_timeout = '{}ms'", millis))
        .await?;
    let acquired = session.execute(statement).await;
    if let Err(e) = session.execute("RESET lock_timeout").await {
        tracing::warn!("Failed to reset lock_timeout on lock session: {}", e);
    }
    acquired?;
    Ok(true)
}

pub(crate) async fn run_scoped<S, F, T>(
    guard: AdvisoryLock<S>,
    critical_section: F,
) -> LockResult<Option<T>>
where
    S: AdvisorySession,
    F: Future<Output = T>,
{
    if !guard.is_held() {
        guard.release().await?;
        return Ok(None);
    }

    let outcome = AssertUnwindSafe(critical_section).catch_unwind().await;
    let released = guard.release().await;

    match outcome {
        Ok(output) => {
            released?;
            Ok(Some(output))
        }
        Err(panic) => {
            if let Err(e) = released {
                tracing::error!("Release after panic in critical section failed: {}", e);
            }
            std::panic::resume_unwind(panic)
        }
    }
}
