//! Plot Outline Manager - the beat queue and its state machine.
//!
//! Beats only move forward: `pending -> in_progress -> completed`, or
//! `pending/in_progress -> skipped`. Completed and skipped beats are terminal;
//! a skipped beat is never re-queued. Arc progress is recomputed after every
//! change to the outline.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use story_bible::{BeatStatus, EntityId, EntityKind, PlotBeat, PlotOutline, TensionLevel};

use crate::config::PlotConfig;
use crate::entity_store::EntityStore;
use crate::error::{NarrativeError, Result};

const OUTLINE_KEY: &str = "plot_outline";

/// A beat proposed by the beat generator, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatCandidate {
    pub description: String,
    #[serde(default)]
    pub characters: Vec<EntityId>,
    #[serde(default)]
    pub location: Option<EntityId>,
    #[serde(default = "default_target_tension")]
    pub target_tension: TensionLevel,
    #[serde(default)]
    pub prerequisites: Vec<EntityId>,
}

fn default_target_tension() -> TensionLevel {
    TensionLevel::new(5)
}

impl BeatCandidate {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            characters: Vec::new(),
            location: None,
            target_tension: default_target_tension(),
            prerequisites: Vec::new(),
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

    pub fn with_target_tension(mut self, tension: TensionLevel) -> Self {
        self.target_tension = tension;
        self
    }
}

/// Result of appending a batch of candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendOutcome {
    /// IDs of accepted beats, in the order given.
    pub accepted: Vec<EntityId>,
    /// One reason per rejected candidate.
    pub rejected: Vec<String>,
}

/// Owns the plot outline of the current arc.
#[derive(Debug, Clone)]
pub struct PlotOutlineManager {
    outline: PlotOutline,
    config: PlotConfig,
}

impl PlotOutlineManager {
    /// Create a manager with an empty outline.
    pub fn new(arc_label: impl Into<String>, config: PlotConfig) -> Self {
        Self::from_outline(PlotOutline::new(arc_label), config)
    }

    pub fn from_outline(mut outline: PlotOutline, config: PlotConfig) -> Self {
        outline.recompute_progress();
        Self { outline, config }
    }

    /// Load the persisted outline, or start an empty one labelled `arc_label`.
    pub fn load(store: &EntityStore, arc_label: &str, config: PlotConfig) -> Result<Self> {
        let outline = store
            .get_meta::<PlotOutline>(OUTLINE_KEY)?
            .unwrap_or_else(|| PlotOutline::new(arc_label));
        Ok(Self::from_outline(outline, config))
    }

    pub fn save(&self, store: &mut EntityStore) -> Result<()> {
        store.put_meta(OUTLINE_KEY, &self.outline)
    }

    pub fn outline(&self) -> &PlotOutline {
        &self.outline
    }

    pub fn arc_progress(&self) -> f32 {
        self.outline.arc_progress
    }

    pub fn get(&self, id: EntityId) -> Option<&PlotBeat> {
        self.outline.get(id)
    }

    pub fn pending_count(&self) -> usize {
        self.outline.count_with_status(BeatStatus::Pending)
    }

    /// The first pending beat, in outline order, whose prerequisites are all completed.
    pub fn next_ready_beat(&self) -> Option<&PlotBeat> {
        self.outline.beats.iter().find(|beat| {
            beat.status == BeatStatus::Pending
                && beat.prerequisites.iter().all(|prerequisite| {
                    self.outline
                        .get(*prerequisite)
                        .map(|p| p.status == BeatStatus::Completed)
                        .unwrap_or(false)
                })
        })
    }

    /// Whether the pending queue has fallen below the configured minimum.
    pub fn needs_more_beats(&self) -> bool {
        self.pending_count() < self.config.min_pending_beats
    }

    /// Descriptions of the most recent `n` beats, oldest first.
    pub fn recent_descriptions(&self, n: usize) -> Vec<&str> {
        let beats = &self.outline.beats;
        beats[beats.len().saturating_sub(n)..]
            .iter()
            .map(|b| b.description.as_str())
            .collect()
    }

    /// Validate candidates and append the accepted ones, in order, as pending beats.
    pub fn append_generated_beats(
        &mut self,
        candidates: impl IntoIterator<Item = BeatCandidate>,
    ) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();

        for candidate in candidates {
            if let Err(err) = self.check_candidate(&candidate) {
                debug!(description = %candidate.description, %err, "beat candidate rejected");
                outcome.rejected.push(err.to_string());
                continue;
            }

            let id = self.outline.allocate_beat_id();
            let mut beat = PlotBeat::new(id, candidate.description.trim())
                .with_location(candidate.location)
                .with_target_tension(candidate.target_tension);
            beat.characters = candidate.characters;
            beat.prerequisites = candidate.prerequisites;
            self.outline.beats.push(beat);
            outcome.accepted.push(id);
        }

        self.outline.recompute_progress();
        if !outcome.accepted.is_empty() {
            info!(
                accepted = outcome.accepted.len(),
                rejected = outcome.rejected.len(),
                pending = self.pending_count(),
                "plot beats appended"
            );
        }
        outcome
    }

    fn check_candidate(&self, candidate: &BeatCandidate) -> Result<()> {
        let description = candidate.description.trim();
        if description.is_empty() {
            return Err(NarrativeError::Validation(
                "beat description is empty".to_string(),
            ));
        }

        let wanted = description.to_lowercase();
        if self
            .recent_descriptions(self.config.duplicate_window)
            .iter()
            .any(|existing| existing.trim().to_lowercase() == wanted)
        {
            return Err(NarrativeError::Validation(format!(
                "beat `{}` repeats a recent beat",
                description
            )));
        }

        for prerequisite in &candidate.prerequisites {
            if self.outline.get(*prerequisite).is_none() {
                return Err(NarrativeError::Validation(format!(
                    "beat `{}` requires unknown beat `{}`",
                    description, prerequisite
                )));
            }
        }
        for character in &candidate.characters {
            if character.kind() != EntityKind::Character {
                return Err(NarrativeError::Validation(format!(
                    "`{}` is not a character id",
                    character
                )));
            }
        }
        Ok(())
    }

    /// `pending -> in_progress`.
    pub fn start_beat(&mut self, beat: EntityId) -> Result<()> {
        self.transition(beat, BeatStatus::InProgress, None)
    }

    /// `pending|in_progress -> completed`, recording the executing scene.
    pub fn mark_complete(&mut self, beat: EntityId, scene: EntityId) -> Result<()> {
        self.transition(beat, BeatStatus::Completed, Some(scene))
    }

    /// `pending|in_progress -> skipped`.
    pub fn mark_skipped(&mut self, beat: EntityId) -> Result<()> {
        self.transition(beat, BeatStatus::Skipped, None)
    }

    fn transition(&mut self, id: EntityId, to: BeatStatus, scene: Option<EntityId>) -> Result<()> {
        let beat = self
            .outline
            .get_mut(id)
            .ok_or_else(|| NarrativeError::not_found(id))?;
        if !beat.status.can_transition_to(to) {
            return Err(NarrativeError::InvalidTransition {
                beat: id,
                from: beat.status,
                to,
            });
        }

        let from = beat.status;
        beat.status = to;
        if scene.is_some() {
            beat.scene = scene;
        }
        self.outline.recompute_progress();
        debug!(beat = %id, %from, %to, progress = self.outline.arc_progress, "beat transitioned");
        Ok(())
    }
}
