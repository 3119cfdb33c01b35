//! Entity definitions for the story world.

mod beat;
mod character;
mod location;
mod metadata;
mod narrative;
mod relationship;
mod scene;

pub use beat::*;
pub use character::*;
pub use location::*;
pub use metadata::*;
pub use narrative::*;
pub use relationship::*;
pub use scene::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing entity identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("unknown entity id prefix in `{0}`")]
    UnknownPrefix(String),

    #[error("malformed entity id `{0}`")]
    Malformed(String),
}

/// Kinds of records tracked by the story.
///
/// The declaration order doubles as the ordering of IDs across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Location,
    Relationship,
    Scene,
    OpenLoop,
    Goal,
    LoreItem,
    PlotBeat,
}

impl EntityKind {
    /// Every kind, in ID order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Character,
        EntityKind::Location,
        EntityKind::Relationship,
        EntityKind::Scene,
        EntityKind::OpenLoop,
        EntityKind::Goal,
        EntityKind::LoreItem,
        EntityKind::PlotBeat,
    ];

    /// The textual prefix of IDs of this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            EntityKind::Character => "C",
            EntityKind::Location => "L",
            EntityKind::Relationship => "R",
            EntityKind::Scene => "S",
            EntityKind::OpenLoop => "OL",
            EntityKind::Goal => "G",
            EntityKind::LoreItem => "LR",
            EntityKind::PlotBeat => "PB",
        }
    }

    /// Zero-padding width of the numeric part.
    pub fn width(&self) -> usize {
        match self {
            EntityKind::Character | EntityKind::Location | EntityKind::Relationship => 0,
            _ => 3,
        }
    }

    /// First sequence number handed out for this kind.
    pub fn first_seq(&self) -> u32 {
        match self {
            EntityKind::PlotBeat => 1,
            _ => 0,
        }
    }

    /// Stable lowercase name, used for storage directories and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Location => "location",
            EntityKind::Relationship => "relationship",
            EntityKind::Scene => "scene",
            EntityKind::OpenLoop => "open_loop",
            EntityKind::Goal => "goal",
            EntityKind::LoreItem => "lore_item",
            EntityKind::PlotBeat => "plot_beat",
        }
    }

    /// Resolve a kind from the prefix of an ID string. Longest prefix wins.
    fn from_id_prefix(s: &str) -> Option<(EntityKind, &str)> {
        let mut kinds = Self::ALL;
        kinds.sort_by_key(|k| std::cmp::Reverse(k.prefix().len()));
        kinds
            .into_iter()
            .find_map(|k| s.strip_prefix(k.prefix()).map(|rest| (k, rest)))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sequence value reserved for records that have not been allocated an ID yet.
const UNASSIGNED: u32 = u32::MAX;

/// Identifier for every stored record: a kind plus a per-kind sequence number.
///
/// Rendered as the kind prefix followed by the sequence (`C0`, `S004`, `PB012`).
/// IDs order by kind first and then numerically, so `C2 < C10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    kind: EntityKind,
    seq: u32,
}

impl EntityId {
    /// Build an ID from its parts.
    pub fn new(kind: EntityKind, seq: u32) -> Self {
        Self { kind, seq }
    }

    /// Placeholder carried by records before the store allocates their ID.
    pub fn unassigned(kind: EntityKind) -> Self {
        Self {
            kind,
            seq: UNASSIGNED,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Whether this ID was allocated by a store.
    pub fn is_assigned(&self) -> bool {
        self.seq != UNASSIGNED
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_assigned() {
            return write!(f, "{}?", self.kind.prefix());
        }
        write!(
            f,
            "{}{:0width$}",
            self.kind.prefix(),
            self.seq,
            width = self.kind.width()
        )
    }
}

impl FromStr for EntityId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (kind, digits) = EntityKind::from_id_prefix(trimmed)
            .ok_or_else(|| IdError::UnknownPrefix(s.to_string()))?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdError::Malformed(s.to_string()));
        }
        let seq: u32 = digits
            .parse()
            .map_err(|_| IdError::Malformed(s.to_string()))?;
        if seq == UNASSIGNED {
            return Err(IdError::Malformed(s.to_string()));
        }
        Ok(Self { kind, seq })
    }
}

impl TryFrom<String> for EntityId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// A record that the entity store can persist and index.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// The kind every record of this type belongs to.
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    fn set_id(&mut self, id: EntityId);

    /// Text pushed to the semantic index whenever the record is written.
    fn index_text(&self) -> String;

    /// Filterable metadata pushed alongside [`Entity::index_text`].
    fn index_metadata(&self) -> Metadata {
        Metadata::new()
    }
}
