//! Typed metadata attached to tasks, workers and decomposition results.
//!
//! Values are restricted to scalars. Keys written by this workspace:
//!
//! | producer | key | value |
//! |---|---|---|
//! | decomposition result | `sub_task_count` | integer |
//! | decomposition result | `max_level` | integer |
//! | decomposition result | `external_dependency_count` | integer |
//! | `SubTask::into_task` | `parent_id` | text |
//! | `SubTask::into_task` | `level` | integer |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key/value bag with scalar values, ordered by key.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<usize> for MetadataValue {
    fn from(v: usize) -> Self {
        Self::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialization_picks_scalar_kind() {
        let meta: Metadata =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 2.5, "d": "x"}"#).unwrap();
        assert_eq!(meta["a"], MetadataValue::Bool(true));
        assert_eq!(meta["b"], MetadataValue::Integer(3));
        assert_eq!(meta["c"], MetadataValue::Float(2.5));
        assert_eq!(meta["d"], MetadataValue::Text("x".into()));
    }

    #[test]
    fn test_nested_values_are_rejected() {
        let parsed: Result<Metadata, _> = serde_json::from_str(r#"{"a": {"nested": 1}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(MetadataValue::from(4usize).as_i64(), Some(4));
        assert_eq!(MetadataValue::from(4usize).as_f64(), Some(4.0));
        assert_eq!(MetadataValue::from("p").as_str(), Some("p"));
        assert_eq!(MetadataValue::from(false).as_bool(), Some(false));
        assert_eq!(MetadataValue::from(1.5).as_i64(), None);
    }
}
