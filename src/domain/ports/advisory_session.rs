use async_trait::async_trait;

/// A live database session that advisory lock statements run on.
///
/// Session-scoped advisory locks belong to the connection that took them, so a
/// guard keeps its session for the whole acquisition and issues the release on
/// the same one.
#[async_trait]
pub trait AdvisorySession: Send {
    /// Whether statements run inside an open transaction. Transaction-scoped
    /// lock functions are used when this is true.
    fn in_transaction(&self) -> bool;

    /// Runs a statement whose result is ignored.
    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error>;

    /// Runs a statement returning a single boolean.
    async fn fetch_bool(&mut self, statement: &str) -> Result<bool, sqlx::Error>;

    /// Runs a statement returning a single bigint.
    async fn fetch_count(&mut self, statement: &str) -> Result<i64, sqlx::Error>;

    /// Runs a statement returning a single text value.
    async fn fetch_text(&mut self, statement: &str) -> Result<String, sqlx::Error>;

    /// Called when a guard is dropped without an orderly release.
    ///
    /// `pending_release` carries the release statement when a lock is held; it is
    /// `None` when the acquire call itself was interrupted. Implementations must
    /// make sure the lock does not outlive the guard, either by running the
    /// statement or by ending the session. There is no default: a session type
    /// that cannot do either cannot back a guard.
    fn abandon(self, pending_release: Option<String>)
    where
        Self: Sized;
}
