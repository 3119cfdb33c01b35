//! Character definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{Entity, EntityId, EntityKind, Metadata};

/// A character in the story.
///
/// The `id` is stable for the character's lifetime; renaming never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub first_name: String,
    pub family_name: String,
    /// Name used in prose. Empty means "first + family".
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub role: Option<String>,

    /// Free-form facts that change as the story moves (`status`, `mood`, ...).
    #[serde(default)]
    pub current_state: BTreeMap<String, String>,
    #[serde(default)]
    pub personality_traits: Vec<String>,
    /// Relationship record IDs this character takes part in.
    #[serde(default)]
    pub relationships: BTreeSet<EntityId>,
}

impl Character {
    /// Create a new character with the given name parts.
    pub fn new(first_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        Self {
            id: EntityId::unassigned(EntityKind::Character),
            first_name: first_name.into(),
            family_name: family_name.into(),
            display_name: String::new(),
            role: None,
            current_state: BTreeMap::new(),
            personality_traits: Vec::new(),
            relationships: BTreeSet::new(),
        }
    }

    /// Create a character from a single full name such as `"Bob Johnson"`.
    pub fn from_full_name(full_name: &str) -> Self {
        let (first, family) = split_full_name(full_name);
        Self::new(first, family)
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_trait(mut self, personality_trait: impl Into<String>) -> Self {
        self.personality_traits.push(personality_trait.into());
        self
    }

    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.current_state.insert(key.into(), value.into());
        self
    }

    /// First and family name joined by a space.
    pub fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.family_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.family_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.family_name.clone(),
            (true, true) => String::new(),
        }
    }

    /// The name prose should use.
    pub fn name(&self) -> String {
        if self.display_name.trim().is_empty() {
            self.full_name()
        } else {
            self.display_name.clone()
        }
    }

    /// Whether `name` refers to this character, ignoring case and spacing.
    ///
    /// Matches against the display name and the full name.
    pub fn answers_to(&self, name: &str) -> bool {
        let wanted = normalize_name(name);
        if wanted.is_empty() {
            return false;
        }
        wanted == normalize_name(&self.full_name())
            || (!self.display_name.trim().is_empty() && wanted == normalize_name(&self.display_name))
    }

    /// Merge field deltas into `current_state`. Returns how many values changed.
    pub fn merge_state<'a>(
        &mut self,
        fields: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> usize {
        let mut changed = 0;
        for (key, value) in fields {
            if self.current_state.get(key) != Some(value) {
                self.current_state.insert(key.clone(), value.clone());
                changed += 1;
            }
        }
        changed
    }
}

impl Entity for Character {
    const KIND: EntityKind = EntityKind::Character;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    fn index_text(&self) -> String {
        let mut text = self.name();
        if let Some(role) = &self.role {
            text.push_str(", ");
            text.push_str(role);
        }
        if !self.personality_traits.is_empty() {
            text.push_str(". ");
            text.push_str(&self.personality_traits.join(", "));
        }
        for (key, value) in &self.current_state {
            text.push_str(&format!(". {}: {}", key, value));
        }
        text
    }

    fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        if let Some(role) = &self.role {
            meta.insert("role".to_string(), role.to_lowercase().into());
        }
        meta
    }
}

/// Lowercase and collapse whitespace so names compare loosely.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a full name into first and family components.
///
/// The first whitespace-separated token is the first name; everything after it
/// is the family name (`"Anna van der Berg"` -> `("Anna", "van der Berg")`).
pub fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let family = parts.collect::<Vec<_>>().join(" ");
    (first, family)
}
