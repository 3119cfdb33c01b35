//! Outcome of integrating one scene's fact deltas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use story_bible::{EntityId, EntityKind};

/// What happened to one delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Created,
    Updated,
    Skipped,
}

/// Per-kind tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl KindCounts {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped
    }
}

/// Viewpoint change detected while integrating a character update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PovSwitch {
    pub from: Option<EntityId>,
    pub to: EntityId,
    /// Whether `to` was created for the switch rather than reused.
    pub created: bool,
}

/// Counts, warnings and POV changes from one integration run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationReport {
    counts: BTreeMap<EntityKind, KindCounts>,
    warnings: Vec<String>,
    pov_switch: Option<PovSwitch>,
}

impl IntegrationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EntityKind, outcome: Outcome) {
        let counts = self.counts.entry(kind).or_default();
        match outcome {
            Outcome::Created => counts.created += 1,
            Outcome::Updated => counts.updated += 1,
            Outcome::Skipped => counts.skipped += 1,
        }
    }

    /// Record a warning and emit it through `tracing`.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(warning = %message, "fact integration");
        self.warnings.push(message);
    }

    pub fn counts(&self, kind: EntityKind) -> KindCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn pov_switch(&self) -> Option<PovSwitch> {
        self.pov_switch
    }

    pub(crate) fn set_pov_switch(&mut self, switch: PovSwitch) {
        self.pov_switch = Some(switch);
    }
}
