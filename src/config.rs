use std::env;
use std::time::Duration;

/// Settings threaded into every guard.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockConfig {
    /// Append a `-- <identifier> at <file>:<line>` comment to lock statements.
    pub debug_comments: bool,
    /// Upper bound on a blocking acquire. `None` waits as long as Postgres does.
    pub lock_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub lock: LockConfig,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("DATABASE_MAX_CONNECTIONS", value))?,
            Err(_) => 5,
        };

        let debug_comments = match env::var("PGLOCKS_DEBUG_COMMENTS") {
            Ok(value) => parse_flag(&value)
                .ok_or(ConfigError::InvalidFlag("PGLOCKS_DEBUG_COMMENTS", value))?,
            Err(_) => false,
        };

        let lock_timeout = match env::var("PGLOCKS_LOCK_TIMEOUT_MS") {
            Ok(value) => Some(Duration::from_millis(value.parse().map_err(|_| {
                ConfigError::InvalidNumber("PGLOCKS_LOCK_TIMEOUT_MS", value)
            })?)),
            Err(_) => None,
        };

        let metrics_port = match env::var("METRICS_PORT") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber("METRICS_PORT", value))?,
            ),
            Err(_) => None,
        };

        Ok(Config {
            database_url,
            max_connections,
            lock: LockConfig {
                debug_comments,
                lock_timeout,
            },
            metrics_port,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("{0} must be a boolean, got {1:?}")]
    InvalidFlag(&'static str, String),

    #[error("{0} must be a non-negative integer, got {1:?}")]
    InvalidNumber(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "PGLOCKS_DEBUG_COMMENTS",
        "PGLOCKS_LOCK_TIMEOUT_MS",
        "METRICS_PORT",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/pglocks");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://localhost/pglocks");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.lock, LockConfig::default());
        assert_eq!(config.metrics_port, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/pglocks");
        env::set_var("DATABASE_MAX_CONNECTIONS", "12");
        env::set_var("PGLOCKS_DEBUG_COMMENTS", "yes");
        env::set_var("PGLOCKS_LOCK_TIMEOUT_MS", "2500");
        env::set_var("METRICS_PORT", "9100");

        let config = Config::from_env().unwrap();
        assert_eq!(config.max_connections, 12);
        assert!(config.lock.debug_comments);
        assert_eq!(config.lock.lock_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.metrics_port, Some(9100));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/pglocks");
        env::set_var("PGLOCKS_DEBUG_COMMENTS", "sometimes");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidFlag("PGLOCKS_DEBUG_COMMENTS", _))
        ));

        env::remove_var("PGLOCKS_DEBUG_COMMENTS");
        env::set_var("PGLOCKS_LOCK_TIMEOUT_MS", "-5");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidNumber("PGLOCKS_LOCK_TIMEOUT_MS", _))
        ));

        clear_env();
    }
}
