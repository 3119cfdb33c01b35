//! Metadata filters for semantic search.

use std::collections::BTreeSet;

use story_bible::{EntityId, EntityKind, Metadata, MetadataValue};

/// A single metadata predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The key must be present and equal to the value.
    Eq(String, MetadataValue),
    /// The key must hold an integer within `min..=max`.
    Range { key: String, min: i64, max: i64 },
}

impl Predicate {
    fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Predicate::Eq(key, value) => metadata.get(key) == Some(value),
            Predicate::Range { key, min, max } => metadata
                .get(key)
                .and_then(MetadataValue::as_int)
                .map(|v| (*min..=*max).contains(&v))
                .unwrap_or(false),
        }
    }
}

/// Conjunction of predicates plus kind and ID restrictions.
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    kinds: BTreeSet<EntityKind>,
    predicates: Vec<Predicate>,
    excluded: BTreeSet<EntityId>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict results to `kind` (may be called for several kinds).
    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn equals(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.predicates.push(Predicate::Eq(key.into(), value.into()));
        self
    }

    pub fn within(mut self, key: impl Into<String>, min: i64, max: i64) -> Self {
        self.predicates.push(Predicate::Range {
            key: key.into(),
            min,
            max,
        });
        self
    }

    pub fn exclude(mut self, id: EntityId) -> Self {
        self.excluded.insert(id);
        self
    }

    pub fn matches(&self, id: EntityId, metadata: &Metadata) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&id.kind()) {
            return false;
        }
        if self.excluded.contains(&id) {
            return false;
        }
        self.predicates.iter().all(|p| p.matches(metadata))
    }
}
