//! Filterable metadata attached to indexed records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::EntityId;

/// Metadata key/value map. Keys are stable lowercase names such as `tick` or `pov`.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Text(String),
}

impl MetadataValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            MetadataValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Int(_) => None,
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<u32> for MetadataValue {
    fn from(v: u32) -> Self {
        MetadataValue::Int(i64::from(v))
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl From<EntityId> for MetadataValue {
    fn from(v: EntityId) -> Self {
        MetadataValue::Text(v.to_string())
    }
}
