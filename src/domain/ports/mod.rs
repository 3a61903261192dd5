pub mod advisory_session;

pub use advisory_session::AdvisorySession;
