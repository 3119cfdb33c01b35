//! The bounded context handed to the planning and prose stages.

use serde::{Deserialize, Serialize};
use std::fmt;

use story_bible::{Character, EntityId, Location, OpenLoop, PlotBeat, Scene};

use crate::orchestrator::{Plan, ToolResult};
use crate::tension::{PacingAdvice, PacingEntry};

/// Which generation stage a bundle is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStage {
    Planning,
    Prose,
}

impl fmt::Display for BundleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleStage::Planning => f.write_str("planning"),
            BundleStage::Prose => f.write_str("prose"),
        }
    }
}

/// A scene selected into a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSlot {
    pub scene: Scene,
    /// Hybrid score; `None` for the reserved most-recent slot.
    pub score: Option<f32>,
    /// Full prose, loaded for full-detail slots only.
    pub text: Option<String>,
}

/// Everything one generation stage sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub stage: BundleStage,
    pub tick: u32,
    /// The intention or goal the relevance search ran against.
    pub query: String,
    /// Scenes with full text. Slot 0 is always the latest scene.
    pub full_detail: Vec<SceneSlot>,
    /// Scenes included by summary only.
    pub summaries: Vec<SceneSlot>,
    pub pov_character: Option<EntityId>,
    pub characters: Vec<Character>,
    pub location: Option<Location>,
    pub open_loops: Vec<OpenLoop>,
    pub tension_history: Vec<PacingEntry>,
    pub pacing_advice: PacingAdvice,
    pub beat: Option<PlotBeat>,
    pub plan: Option<Plan>,
    pub tool_results: Vec<ToolResult>,
}

impl ContextBundle {
    pub fn full_detail_ids(&self) -> Vec<EntityId> {
        self.full_detail.iter().map(|s| s.scene.id).collect()
    }

    pub fn summary_ids(&self) -> Vec<EntityId> {
        self.summaries.iter().map(|s| s.scene.id).collect()
    }

    /// Format the bundle as a sectioned prompt.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();

        if let Some(beat) = &self.beat {
            prompt.push_str("## Plot Beat\n");
            prompt.push_str(&format!(
                "{} (target tension {})\n\n",
                beat.description, beat.target_tension
            ));
        }

        if let Some(plan) = &self.plan {
            prompt.push_str("## Scene Plan\n");
            prompt.push_str(&plan.scene_intention);
            prompt.push_str("\n\n");
        }

        if !self.tool_results.is_empty() {
            prompt.push_str("## New Entities\n");
            for result in &self.tool_results {
                let ids: Vec<String> = result.entities.iter().map(|id| id.to_string()).collect();
                prompt.push_str(&format!("- {}: {} [{}]\n", result.tool, result.note, ids.join(", ")));
            }
            prompt.push('\n');
        }

        if !self.characters.is_empty() {
            prompt.push_str("## Characters\n");
            for character in &self.characters {
                let pov = if Some(character.id) == self.pov_character {
                    " (point of view)"
                } else {
                    ""
                };
                prompt.push_str(&format!(
                    "- {}{}{}",
                    character.name(),
                    character
                        .role
                        .as_ref()
                        .map(|r| format!(", {}", r))
                        .unwrap_or_default(),
                    pov
                ));
                if !character.current_state.is_empty() {
                    let state: Vec<String> = character
                        .current_state
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k, v))
                        .collect();
                    prompt.push_str(&format!(" [{}]", state.join("; ")));
                }
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        if let Some(location) = &self.location {
            prompt.push_str("## Location\n");
            prompt.push_str(&location.name);
            if !location.description.is_empty() {
                prompt.push_str(&format!(": {}", location.description));
            }
            if !location.atmosphere.is_empty() {
                prompt.push_str(&format!(" ({})", location.atmosphere));
            }
            prompt.push_str("\n\n");
        }

        if !self.open_loops.is_empty() {
            prompt.push_str("## Open Loops\n");
            for open_loop in &self.open_loops {
                prompt.push_str(&format!(
                    "- {} (importance {:.1})\n",
                    open_loop.description, open_loop.importance
                ));
            }
            prompt.push('\n');
        }

        if !self.tension_history.is_empty() {
            prompt.push_str("## Tension History\n");
            let levels: Vec<String> = self
                .tension_history
                .iter()
                .map(|e| format!("{} ({})", e.level, e.category))
                .collect();
            prompt.push_str(&levels.join(", "));
            match self.pacing_advice {
                PacingAdvice::Deescalate => prompt.push_str("\nPacing: ease the tension."),
                PacingAdvice::Escalate => prompt.push_str("\nPacing: raise the stakes."),
                PacingAdvice::Steady => {}
            }
            prompt.push_str("\n\n");
        }

        if !self.summaries.is_empty() {
            prompt.push_str("## Earlier Scenes\n");
            for slot in &self.summaries {
                prompt.push_str(&format!("- {}: {}\n", slot.scene.title, slot.scene.summary.join(" ")));
            }
            prompt.push('\n');
        }

        if !self.full_detail.is_empty() {
            prompt.push_str("## Recent Scenes\n");
            for slot in &self.full_detail {
                prompt.push_str(&format!("### {}\n", slot.scene.title));
                match &slot.text {
                    Some(text) => prompt.push_str(text),
                    None => prompt.push_str(&slot.scene.summary.join(" ")),
                }
                prompt.push_str("\n\n");
            }
        }

        prompt
    }
}
