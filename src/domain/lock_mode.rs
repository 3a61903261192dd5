use serde::{Deserialize, Serialize};

/// How a lock is requested: shared or exclusive, blocking or fail-fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockMode {
    pub shared: bool,
    pub wait: bool,
}

impl LockMode {
    pub const EXCLUSIVE: LockMode = LockMode {
        shared: false,
        wait: true,
    };
    pub const SHARED: LockMode = LockMode {
        shared: true,
        wait: true,
    };
    pub const TRY_EXCLUSIVE: LockMode = LockMode {
        shared: false,
        wait: false,
    };
    pub const TRY_SHARED: LockMode = LockMode {
        shared: true,
        wait: false,
    };

    pub fn shared_label(&self) -> &'static str {
        if self.shared {
            "shared"
        } else {
            "exclusive"
        }
    }

    pub fn wait_label(&self) -> &'static str {
        if self.wait {
            "block"
        } else {
            "try"
        }
    }
}

impl Default for LockMode {
    fn default() -> Self {
        LockMode::EXCLUSIVE
    }
}

/// The acquire/release function pair for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockFunctions {
    pub acquire: &'static str,
    /// `None` for transaction-scoped locks, which Postgres releases at commit or rollback.
    pub release: Option<&'static str>,
}

impl LockFunctions {
    pub fn is_transactional(&self) -> bool {
        self.release.is_none()
    }
}

/// Picks the `pg_advisory_*` functions for a mode.
///
/// The release function only tracks `shared`: a lock taken with
/// `pg_try_advisory_lock` is the same session lock as one taken with
/// `pg_advisory_lock` once granted.
pub fn select_functions(mode: LockMode, in_transaction: bool) -> LockFunctions {
    let acquire = match (in_transaction, mode.wait, mode.shared) {
        (false, true, false) => "pg_advisory_lock",
        (false, true, true) => "pg_advisory_lock_shared",
        (false, false, false) => "pg_try_advisory_lock",
        (false, false, true) => "pg_try_advisory_lock_shared",
        (true, true, false) => "pg_advisory_xact_lock",
        (true, true, true) => "pg_advisory_xact_lock_shared",
        (true, false, false) => "pg_try_advisory_xact_lock",
        (true, false, true) => "pg_try_advisory_xact_lock_shared",
    };

    let release = match (in_transaction, mode.shared) {
        (true, _) => None,
        (false, false) => Some("pg_advisory_unlock"),
        (false, true) => Some("pg_advisory_unlock_shared"),
    };

    LockFunctions { acquire, release }
}
