pub mod lock_guard;
pub mod lock_service;
pub mod probe;

pub use lock_guard::{Acquisition, AdvisoryLock, LockOptions, LockState};
pub use lock_service::{AdvisoryLockService, PooledLock};
