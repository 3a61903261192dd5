//! SQL text for advisory lock calls and the registry query.

use crate::domain::lock_id::LockKey;

/// `SELECT <function>(<key>[, <key2>])`, optionally followed by `-- <annotation>`.
pub fn lock_call(function: &str, key: &LockKey, annotation: Option<&str>) -> String {
    let mut statement = format!("SELECT {}({})", function, key.sql_arguments());
    if let Some(annotation) = annotation {
        statement.push_str(" -- ");
        statement.push_str(&single_line(annotation));
    }
    statement
}

/// Counts granted advisory locks on `key` in the current database.
pub fn registry_count(key: &LockKey) -> String {
    let (classid, objid, objsubid) = key.registry_columns();
    format!(
        "SELECT COUNT(*) FROM pg_locks \
         WHERE locktype = 'advisory' \
         AND granted \
         AND database = (SELECT oid FROM pg_database WHERE datname = current_database()) \
         AND classid = '{}'::oid \
         AND objid = '{}'::oid \
         AND objsubid = {}",
        classid, objid, objsubid
    )
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}
