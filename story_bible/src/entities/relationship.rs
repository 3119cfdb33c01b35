//! Relationships between characters.

use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, EntityKind, Metadata};

/// An unordered relationship between two characters.
///
/// The pair is stored with the lower ID first, so `(C3, C1)` and `(C1, C3)`
/// describe the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: EntityId,
    pub character_a: EntityId,
    pub character_b: EntityId,
    /// Lowercase free-form type ("sibling", "rival", "mentor", ...).
    pub relationship_type: String,
    /// Strength from 0.0 (barely connected) to 1.0 (defining bond).
    pub strength: f32,
}

impl Relationship {
    pub fn new(
        character_a: EntityId,
        character_b: EntityId,
        relationship_type: impl Into<String>,
        strength: f32,
    ) -> Self {
        let (character_a, character_b) = ordered_pair(character_a, character_b);
        Self {
            id: EntityId::unassigned(EntityKind::Relationship),
            character_a,
            character_b,
            relationship_type: relationship_type.into().trim().to_lowercase(),
            strength: strength.clamp(0.0, 1.0),
        }
    }

    /// The normalized `(lower, higher)` endpoint pair.
    pub fn pair(&self) -> (EntityId, EntityId) {
        (self.character_a, self.character_b)
    }

    pub fn involves(&self, character: EntityId) -> bool {
        self.character_a == character || self.character_b == character
    }

    /// The endpoint opposite `character`, if `character` is part of this relationship.
    pub fn other(&self, character: EntityId) -> Option<EntityId> {
        if self.character_a == character {
            Some(self.character_b)
        } else if self.character_b == character {
            Some(self.character_a)
        } else {
            None
        }
    }
}

/// Order two endpoints so unordered pairs compare equal.
pub fn ordered_pair(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Entity for Relationship {
    const KIND: EntityKind = EntityKind::Relationship;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn index_text(&self) -> String {
        format!(
            "{} and {} are {} (strength {:.2})",
            self.character_a, self.character_b, self.relationship_type, self.strength
        )
    }

    fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("character_a".to_string(), self.character_a.into());
        meta.insert("character_b".to_string(), self.character_b.into());
        meta
    }
}
