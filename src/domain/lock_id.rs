//! Lock identifiers and their normalized keys.
//!
//! Postgres advisory locks live in two key spaces: a single `bigint`, or a pair
//! of `int4`s. Every identifier a caller hands us is reduced to exactly one of
//! those. Text names are hashed with CRC-32 so that independent processes that
//! agree on a name also agree on the key, without talking to each other.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Deserialize;
use serde_json::Value;

use crate::domain::errors::LockError;

/// A caller-supplied lock identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "Value")]
pub enum LockIdentifier {
    /// A single 64-bit key, used as is.
    Int(i64),
    /// A composite key of two 32-bit integers.
    Pair(i32, i32),
    /// A resource name, hashed into the 32-bit range with CRC-32.
    Text(String),
    /// A hash computed by [`LockIdentifier::process_local`].
    ProcessLocal(i64),
}

/// The normalized form passed to the `pg_advisory_*` functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Scalar(i64),
    Composite(i32, i32),
}

impl LockIdentifier {
    /// Builds an identifier from the std hash of an arbitrary value.
    ///
    /// The result is only stable within one build of one program. Two processes
    /// must not rely on it to agree on a key; use [`LockIdentifier::Text`] for
    /// anything that coordinates across processes.
    pub fn process_local<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        LockIdentifier::ProcessLocal(hasher.finish() as i64)
    }

    pub fn key(&self) -> LockKey {
        match self {
            LockIdentifier::Int(key) => LockKey::Scalar(*key),
            LockIdentifier::Pair(high, low) => LockKey::Composite(*high, *low),
            LockIdentifier::Text(name) => LockKey::Scalar(text_key(name) as i64),
            LockIdentifier::ProcessLocal(key) => LockKey::Scalar(*key),
        }
    }
}

/// CRC-32 of the UTF-8 bytes, reinterpreted as a two's-complement `i32`.
///
/// This mapping is part of the wire contract: changing it splits every
/// deployed process into a separate key space.
pub fn text_key(name: &str) -> i32 {
    crc32fast::hash(name.as_bytes()) as i32
}

fn pair_element(value: i64, position: &str) -> Result<i32, LockError> {
    i32::try_from(value).map_err(|_| {
        LockError::invalid(format!(
            "{} member of a pair lock ID must fit in a 32-bit integer, got {}",
            position, value
        ))
    })
}

impl LockKey {
    /// `(classid, objid, objsubid)` as Postgres records the key in `pg_locks`.
    pub fn registry_columns(&self) -> (u32, u32, i16) {
        match *self {
            LockKey::Scalar(key) => {
                let bits = key as u64;
                ((bits >> 32) as u32, bits as u32, 1)
            }
            LockKey::Composite(high, low) => (high as u32, low as u32, 2),
        }
    }

    /// Argument list for the SQL call, e.g. `42` or `1, 2`.
    pub fn sql_arguments(&self) -> String {
        match self {
            LockKey::Scalar(key) => key.to_string(),
            LockKey::Composite(high, low) => format!("{}, {}", high, low),
        }
    }
}

impl From<i64> for LockIdentifier {
    fn from(key: i64) -> Self {
        LockIdentifier::Int(key)
    }
}

impl From<i32> for LockIdentifier {
    fn from(key: i32) -> Self {
        LockIdentifier::Int(key as i64)
    }
}

impl From<(i32, i32)> for LockIdentifier {
    fn from((high, low): (i32, i32)) -> Self {
        LockIdentifier::Pair(high, low)
    }
}

impl From<&str> for LockIdentifier {
    fn from(name: &str) -> Self {
        LockIdentifier::Text(name.to_string())
    }
}

impl From<String> for LockIdentifier {
    fn from(name: String) -> Self {
        LockIdentifier::Text(name)
    }
}

impl TryFrom<&[i64]> for LockIdentifier {
    type Error = LockError;

    fn try_from(parts: &[i64]) -> Result<Self, Self::Error> {
        match parts {
            [high, low] => Ok(LockIdentifier::Pair(
                pair_element(*high, "First")?,
                pair_element(*low, "Second")?,
            )),
            _ => Err(LockError::invalid(format!(
                "Pair lock IDs must have exactly two entries, got {}",
                parts.len()
            ))),
        }
    }
}

impl TryFrom<&Value> for LockIdentifier {
    type Error = LockError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(number) => number.as_i64().map(LockIdentifier::Int).ok_or_else(|| {
                LockError::invalid(format!("Numeric lock IDs must be 64-bit integers, got {}", number))
            }),
            Value::String(name) => Ok(LockIdentifier::Text(name.clone())),
            Value::Array(items) => {
                if items.len() != 2 {
                    return Err(LockError::invalid(format!(
                        "Pair lock IDs must have exactly two entries, got {}",
                        items.len()
                    )));
                }
                let parts = items
                    .iter()
                    .map(|item| {
                        item.as_i64().ok_or_else(|| {
                            LockError::invalid(format!(
                                "Both members of a pair lock ID must be integers, got {}",
                                item
                            ))
                        })
                    })
                    .collect::<Result<Vec<i64>, LockError>>()?;
                LockIdentifier::try_from(parts.as_slice())
            }
            other => Err(LockError::invalid(format!(
                "Unsupported lock ID type: {}",
                other
            ))),
        }
    }
}

impl TryFrom<Value> for LockIdentifier {
    type Error = LockError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        LockIdentifier::try_from(&value)
    }
}

impl fmt::Display for LockIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockIdentifier::Int(key) => write!(f, "{}", key),
            LockIdentifier::Pair(high, low) => write!(f, "({}, {})", high, low),
            // Debug escapes control characters, so a name cannot end a SQL comment.
            LockIdentifier::Text(name) => write!(f, "{:?}", name),
            LockIdentifier::ProcessLocal(key) => write!(f, "process-local {}", key),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Scalar(key) => write!(f, "{}", key),
            LockKey::Composite(high, low) => write!(f, "({}, {})", high, low),
        }
    }
}
