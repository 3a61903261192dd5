use thiserror::Error;

/// SQLSTATE raised when `lock_timeout` expires while waiting for a lock.
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Error, Debug)]
pub enum LockError {
    /// Malformed composite key, wrong element type or unsupported value.
    /// Raised before any database interaction.
    #[error("Invalid lock identifier: {0}")]
    InvalidIdentifier(String),

    /// The acquire statement failed. No lock is considered held.
    #[error("Failed to acquire advisory lock {identifier}: {source}")]
    Acquisition {
        identifier: String,
        #[source]
        source: sqlx::Error,
    },

    /// The release statement failed. The session that held the lock has been
    /// discarded, but the caller must treat the lock state as unknown.
    #[error("Failed to release advisory lock {identifier}: {source}")]
    Release {
        identifier: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to query advisory lock registry: {0}")]
    Probe(#[source] sqlx::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx::Error),
}

impl LockError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LockError::InvalidIdentifier(message.into())
    }

    /// True when a blocking acquisition gave up because `lock_timeout` expired.
    pub fn is_lock_timeout(&self) -> bool {
        match self {
            LockError::Acquisition {
                source: sqlx::Error::Database(db_err),
                ..
            } => db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE),
            _ => false,
        }
    }
}

pub type LockResult<T> = Result<T, LockError>;
