pub mod errors;
pub mod lock_id;
pub mod lock_mode;
pub mod ports;
pub mod statement;

pub use errors::{LockError, LockResult};
pub use lock_id::{LockIdentifier, LockKey};
pub use lock_mode::{select_functions, LockFunctions, LockMode};
