//! Scoped PostgreSQL advisory locks.
//!
//! Independent processes coordinate on a named resource through
//! `pg_advisory_lock` and friends, with no lock service beyond the database
//! they already share.
//!
//! ```rust,ignore
//! let service = AdvisoryLockService::new(db, config.lock);
//! let done = service
//!     .with_lock("nightly-report", LockOptions::new(), async { build_report().await })
//!     .await?;
//! ```

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use config::{Config, ConfigError, LockConfig};
pub use domain::{LockError, LockIdentifier, LockKey, LockMode, LockResult};
pub use infrastructure::persistence::Database;
pub use services::{Acquisition, AdvisoryLock, AdvisoryLockService, LockOptions, LockState};
