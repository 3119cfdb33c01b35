//! Plot beats and the outline that orders them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EntityId, EntityKind};
use crate::pacing::TensionLevel;

/// Lifecycle of a plot beat.
///
/// Transitions only move forward: `pending -> in_progress -> completed`, or
/// `pending/in_progress -> skipped`. `completed` and `skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl BeatStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BeatStatus::Completed | BeatStatus::Skipped)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: BeatStatus) -> bool {
        matches!(
            (self, next),
            (BeatStatus::Pending, BeatStatus::InProgress)
                | (BeatStatus::Pending, BeatStatus::Completed)
                | (BeatStatus::InProgress, BeatStatus::Completed)
                | (BeatStatus::Pending, BeatStatus::Skipped)
                | (BeatStatus::InProgress, BeatStatus::Skipped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BeatStatus::Pending => "pending",
            BeatStatus::InProgress => "in_progress",
            BeatStatus::Completed => "completed",
            BeatStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for BeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single factual plot event constraining one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotBeat {
    pub id: EntityId,
    /// One factual sentence, no prose.
    pub description: String,
    #[serde(default)]
    pub characters: Vec<EntityId>,
    #[serde(default)]
    pub location: Option<EntityId>,
    pub target_tension: TensionLevel,
    #[serde(default)]
    pub prerequisites: Vec<EntityId>,
    pub status: BeatStatus,
    /// Scene that executed the beat, once completed.
    #[serde(default)]
    pub scene: Option<EntityId>,
}

impl PlotBeat {
    pub fn new(id: EntityId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            characters: Vec::new(),
            location: None,
            target_tension: TensionLevel::new(5),
            prerequisites: Vec::new(),
            status: BeatStatus::Pending,
            scene: None,
        }
    }

    pub fn with_prerequisite(mut self, beat: EntityId) -> Self {
        self.prerequisites.push(beat);
        self
    }

    pub fn with_character(mut self, character: EntityId) -> Self {
        self.characters.push(character);
        self
    }

    pub fn with_location(mut self, location: Option<EntityId>) -> Self {
        self.location = location;
        self
    }

    pub fn with_target_tension(mut self, tension: TensionLevel) -> Self {
        self.target_tension = tension;
        self
    }
}

/// An ordered queue of beats for the current story arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotOutline {
    pub arc_label: String,
    pub beats: Vec<PlotBeat>,
    /// Completed share of all beats (0.0 - 1.0).
    pub arc_progress: f32,
    /// Next beat sequence number; never decreases.
    next_beat_seq: u32,
}

impl PlotOutline {
    pub fn new(arc_label: impl Into<String>) -> Self {
        Self {
            arc_label: arc_label.into(),
            beats: Vec::new(),
            arc_progress: 0.0,
            next_beat_seq: EntityKind::PlotBeat.first_seq(),
        }
    }

    /// Allocate the next beat ID.
    pub fn allocate_beat_id(&mut self) -> EntityId {
        let id = EntityId::new(EntityKind::PlotBeat, self.next_beat_seq);
        self.next_beat_seq += 1;
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&PlotBeat> {
        self.beats.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut PlotBeat> {
        self.beats.iter_mut().find(|b| b.id == id)
    }

    pub fn count_with_status(&self, status: BeatStatus) -> usize {
        self.beats.iter().filter(|b| b.status == status).count()
    }

    /// Recompute `arc_progress` from beat statuses.
    pub fn recompute_progress(&mut self) {
        self.arc_progress = if self.beats.is_empty() {
            0.0
        } else {
            self.count_with_status(BeatStatus::Completed) as f32 / self.beats.len() as f32
        };
    }
}
