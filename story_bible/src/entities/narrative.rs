//! Narrative threads: open loops, goals promoted from them, and lore.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Entity, EntityId, EntityKind, Metadata};

/// Status of an open loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Open,
    Resolved,
}

/// An unresolved narrative question tracked until a scene resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLoop {
    pub id: EntityId,
    pub description: String,
    /// Stable digest of the normalized description, used for idempotent lookups.
    pub fingerprint: String,
    pub status: LoopStatus,
    /// Importance score (0.0 - 1.0).
    pub importance: f32,
    /// Scenes that opened or re-raised this loop.
    #[serde(default)]
    pub created_in: BTreeSet<EntityId>,
    /// Scenes that resolved this loop.
    #[serde(default)]
    pub resolved_in: BTreeSet<EntityId>,
    /// Tick the loop was first raised.
    pub opened_tick: u32,
    /// Number of distinct scenes that raised the loop.
    #[serde(default)]
    pub mentions: u32,
    /// Goal this loop was promoted into, if any.
    #[serde(default)]
    pub goal: Option<EntityId>,
}

impl OpenLoop {
    pub fn new(
        description: impl Into<String>,
        fingerprint: impl Into<String>,
        importance: f32,
        opened_tick: u32,
    ) -> Self {
        Self {
            id: EntityId::unassigned(EntityKind::OpenLoop),
            description: description.into(),
            fingerprint: fingerprint.into(),
            status: LoopStatus::Open,
            importance: importance.clamp(0.0, 1.0),
            created_in: BTreeSet::new(),
            resolved_in: BTreeSet::new(),
            opened_tick,
            mentions: 0,
            goal: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == LoopStatus::Open
    }

    /// Record that `scene` raised this loop. Returns false if it was already recorded.
    pub fn mention(&mut self, scene: EntityId) -> bool {
        if self.created_in.insert(scene) {
            self.mentions += 1;
            true
        } else {
            false
        }
    }

    /// Mark the loop resolved by `scene`. Returns false if `scene` was already recorded.
    pub fn resolve(&mut self, scene: EntityId) -> bool {
        self.status = LoopStatus::Resolved;
        self.resolved_in.insert(scene)
    }

    /// Ticks elapsed since the loop was opened.
    pub fn age(&self, current_tick: u32) -> u32 {
        current_tick.saturating_sub(self.opened_tick)
    }
}

impl Entity for OpenLoop {
    const KIND: EntityKind = EntityKind::OpenLoop;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn index_text(&self) -> String {
        self.description.clone()
    }

    fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        let status = match self.status {
            LoopStatus::Open => "open",
            LoopStatus::Resolved => "resolved",
        };
        meta.insert("status".to_string(), status.into());
        meta.insert("tick".to_string(), self.opened_tick.into());
        meta
    }
}

/// Status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Achieved,
}

/// A narrative objective promoted from a long-running open loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: EntityId,
    pub description: String,
    /// Enclosing objective, if this goal is a sub-goal.
    #[serde(default)]
    pub parent: Option<EntityId>,
    pub source_loop: EntityId,
    pub status: GoalStatus,
    pub created_tick: u32,
}

impl Goal {
    pub fn new(description: impl Into<String>, source_loop: EntityId, created_tick: u32) -> Self {
        Self {
            id: EntityId::unassigned(EntityKind::Goal),
            description: description.into(),
            parent: None,
            source_loop,
            status: GoalStatus::Active,
            created_tick,
        }
    }

    pub fn with_parent(mut self, parent: Option<EntityId>) -> Self {
        self.parent = parent;
        self
    }
}

impl Entity for Goal {
    const KIND: EntityKind = EntityKind::Goal;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn index_text(&self) -> String {
        self.description.clone()
    }
}

/// A world fact with provenance, used for consistency checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoreItem {
    pub id: EntityId,
    pub statement: String,
    pub fingerprint: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Scene the statement was extracted from.
    pub origin_scene: EntityId,
    /// Existing lore this statement appears to contradict.
    #[serde(default)]
    pub conflicts_with: Option<EntityId>,
}

impl LoreItem {
    pub fn new(
        statement: impl Into<String>,
        fingerprint: impl Into<String>,
        origin_scene: EntityId,
    ) -> Self {
        Self {
            id: EntityId::unassigned(EntityKind::LoreItem),
            statement: statement.into(),
            fingerprint: fingerprint.into(),
            category: None,
            origin_scene,
            conflicts_with: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }
}

impl Entity for LoreItem {
    const KIND: EntityKind = EntityKind::LoreItem;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn index_text(&self) -> String {
        self.statement.clone()
    }

    fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("origin_scene".to_string(), self.origin_scene.into());
        if let Some(category) = &self.category {
            meta.insert("category".to_string(), category.to_lowercase().into());
        }
        meta
    }
}
