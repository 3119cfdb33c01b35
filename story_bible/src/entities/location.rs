//! Location definitions.

use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, EntityKind};

/// A place scenes can happen in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub atmosphere: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::unassigned(EntityKind::Location),
            name: name.into(),
            description: String::new(),
            atmosphere: String::new(),
            features: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_atmosphere(mut self, atmosphere: impl Into<String>) -> Self {
        self.atmosphere = atmosphere.into();
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }
}

impl Entity for Location {
    const KIND: EntityKind = EntityKind::Location;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn index_text(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if !self.atmosphere.is_empty() {
            parts.push(self.atmosphere.clone());
        }
        parts.extend(self.features.iter().cloned());
        parts.join(". ")
    }
}
