//! Process-wide story state: the active POV pointer, the tick counter and the
//! pacing history.
//!
//! The active POV is read by the context assembler and reassigned only by the
//! fact integration pipeline, so its setter is crate-private.

use serde::{Deserialize, Serialize};

use story_bible::EntityId;

use crate::entity_store::EntityStore;
use crate::error::Result;
use crate::tension::{PacingEntry, PacingHistory};

const STATE_KEY: &str = "story_state";

/// The single mutable record shared by one story's components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryState {
    active_pov: Option<EntityId>,
    /// Tick the next scene will be produced for.
    tick: u32,
    pacing: PacingHistory,
}

impl StoryState {
    /// Create the state of a story that has not produced any scene yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the story with its opening viewpoint character.
    pub fn with_active_pov(mut self, character: EntityId) -> Self {
        self.active_pov = Some(character);
        self
    }

    pub fn active_pov(&self) -> Option<EntityId> {
        self.active_pov
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn pacing(&self) -> &PacingHistory {
        &self.pacing
    }

    pub(crate) fn set_active_pov(&mut self, character: EntityId) {
        self.active_pov = Some(character);
    }

    /// Move past `committed_tick`. Never moves backwards.
    pub(crate) fn advance_past(&mut self, committed_tick: u32) {
        self.tick = self.tick.max(committed_tick + 1);
    }

    pub(crate) fn record_pacing(&mut self, entry: PacingEntry) -> bool {
        self.pacing.record(entry)
    }

    /// Load the persisted state, or a fresh one if none was saved.
    pub fn load(store: &EntityStore) -> Result<Self> {
        Ok(store.get_meta(STATE_KEY)?.unwrap_or_default())
    }

    pub fn save(&self, store: &mut EntityStore) -> Result<()> {
        store.put_meta(STATE_KEY, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::{EntityKind, TensionCategory, TensionLevel};

    #[test]
    fn test_advance_never_goes_backwards() {
        let mut state = StoryState::new();
        state.advance_past(4);
        assert_eq!(state.tick(), 5);
        state.advance_past(2);
        assert_eq!(state.tick(), 5);
    }

    #[test]
    fn test_roundtrip_through_store() {
        let mut store = EntityStore::in_memory();
        assert_eq!(StoryState::load(&store).unwrap(), StoryState::new());

        let mut state = StoryState::new().with_active_pov(EntityId::new(EntityKind::Character, 0));
        state.record_pacing(PacingEntry {
            tick: 0,
            scene: EntityId::new(EntityKind::Scene, 0),
            level: TensionLevel::new(8),
            category: TensionCategory::High,
        });
        state.advance_past(0);
        state.save(&mut store).unwrap();

        let loaded = StoryState::load(&store).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.active_pov().map(|id| id.to_string()).as_deref(), Some("C0"));
        assert_eq!(loaded.pacing().len(), 1);
    }
}
