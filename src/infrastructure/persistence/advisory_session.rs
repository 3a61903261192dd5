//! `AdvisorySession` for Postgres connections.
//!
//! A pooled connection is a session: locks taken on it are session-scoped and
//! must be released on it. A borrowed transaction takes transaction-scoped
//! locks that Postgres drops at commit or rollback.

use crate::domain::ports::AdvisorySession;
use async_trait::async_trait;
use sqlx::{pool::PoolConnection, Postgres, Transaction};

#[async_trait]
impl AdvisorySession for PoolConnection<Postgres> {
    fn in_transaction(&self) -> bool {
        false
    }

    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(&mut **self).await?;
        Ok(())
    }

    async fn fetch_bool(&mut self, statement: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(statement)
            .fetch_one(&mut **self)
            .await
    }

    async fn fetch_count(&mut self, statement: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(statement)
            .fetch_one(&mut **self)
            .await
    }

    async fn fetch_text(&mut self, statement: &str) -> Result<String, sqlx::Error> {
        sqlx::query_scalar::<_, String>(statement)
            .fetch_one(&mut **self)
            .await
    }

    fn abandon(self, pending_release: Option<String>) {
        let runtime = tokio::runtime::Handle::try_current();
        match (pending_release, runtime) {
            (Some(statement), Ok(runtime)) => {
                runtime.spawn(async move {
                    let mut conn = self;
                    match conn.fetch_bool(&statement).await {
                        Ok(true) => {
                            tracing::info!("Released advisory lock after guard drop: {}", statement)
                        }
                        Ok(false) => tracing::warn!(
                            "Advisory lock was not held at drop-time release: {}",
                            statement
                        ),
                        Err(e) => {
                            tracing::error!(
                                "Drop-time release failed, closing session: {}: {}",
                                statement,
                                e
                            );
                            // Ending the session is the only remaining way to drop the lock.
                            drop(conn.detach());
                        }
                    }
                });
            }
            (pending, _) => {
                if let Some(statement) = pending {
                    tracing::warn!(
                        "No runtime to release advisory lock, closing session instead: {}",
                        statement
                    );
                } else {
                    tracing::warn!("Closing advisory lock session in unknown lock state");
                }
                drop(self.detach());
            }
        }
    }
}

#[async_trait]
impl<'t, 'c> AdvisorySession for &'t mut Transaction<'c, Postgres> {
    fn in_transaction(&self) -> bool {
        true
    }

    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(&mut ***self).await?;
        Ok(())
    }

    async fn fetch_bool(&mut self, statement: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(statement)
            .fetch_one(&mut ***self)
            .await
    }

    async fn fetch_count(&mut self, statement: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(statement)
            .fetch_one(&mut ***self)
            .await
    }

    async fn fetch_text(&mut self, statement: &str) -> Result<String, sqlx::Error> {
        sqlx::query_scalar::<_, String>(statement)
            .fetch_one(&mut ***self)
            .await
    }

    // Transaction-scoped locks end with the transaction; nothing to do here.
    fn abandon(self, _pending_release: Option<String>) {}
}
