//! Engine configuration.
//!
//! Every heuristic constant the engine relies on is a named field here. The
//! defaults produced plausible stories in practice; they are not derived from
//! anything deeper, so tune them freely.

use serde::{Deserialize, Serialize};
use std::path::Path;

use story_bible::TensionThresholds;

use crate::error::{NarrativeError, Result};

/// Top-level configuration, usually loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub context: ContextConfig,
    pub tension: TensionConfig,
    pub integration: IntegrationConfig,
    pub plot: PlotConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        self.tension.validate()?;
        self.integration.validate()?;
        self.plot.validate()?;
        Ok(())
    }
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(NarrativeError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

fn positive(name: &str, value: usize) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(NarrativeError::Config(format!("{} must be at least 1", name)))
    }
}

/// Slot budget of one context bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBudget {
    /// Scenes included with full text, including the reserved most-recent slot.
    pub full_detail_count: usize,
    /// Scenes included as summaries only.
    pub summary_count: usize,
}

/// Context assembly parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Weight of chronological recency in the hybrid score. Relevance gets the rest.
    pub recency_weight: f32,
    pub planning: SlotBudget,
    pub prose: SlotBudget,
    /// Prefer candidates sharing the POV character or target location on score ties.
    pub boost_pov_and_location: bool,
    pub max_open_loops: usize,
    pub tension_history_len: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recency_weight: 0.3,
            planning: SlotBudget {
                full_detail_count: 2,
                summary_count: 6,
            },
            prose: SlotBudget {
                full_detail_count: 3,
                summary_count: 4,
            },
            boost_pov_and_location: true,
            max_open_loops: 10,
            tension_history_len: 10,
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> Result<()> {
        unit_interval("context.recency_weight", self.recency_weight)?;
        positive(
            "context.planning.full_detail_count",
            self.planning.full_detail_count,
        )?;
        positive("context.prose.full_detail_count", self.prose.full_detail_count)?;
        Ok(())
    }

    pub fn relevance_weight(&self) -> f32 {
        1.0 - self.recency_weight
    }
}

/// Weights of the four tension sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensionWeights {
    pub lexical: f32,
    pub structural: f32,
    pub intensity: f32,
    pub loop_delta: f32,
}

impl Default for TensionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            structural: 0.2,
            intensity: 0.3,
            loop_delta: 0.1,
        }
    }
}

/// Tension scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensionConfig {
    pub weights: TensionWeights,
    pub thresholds: TensionThresholds,
    /// Mean sentence length (words) at or below which the structural score is 1.0.
    pub short_sentence_words: f32,
    /// Mean sentence length (words) at or above which the structural score is 0.0.
    pub long_sentence_words: f32,
    /// Net keyword density that saturates the lexical score.
    pub lexical_saturation: f32,
    /// Punctuation/verb density that saturates the intensity score.
    pub intensity_saturation: f32,
    /// Net loop delta (either direction) that saturates the loop score.
    pub loop_window: u32,
    /// Consecutive ticks in one extreme band before pacing advice changes.
    pub streak_length: usize,
}

impl Default for TensionConfig {
    fn default() -> Self {
        Self {
            weights: TensionWeights::default(),
            thresholds: TensionThresholds::default(),
            short_sentence_words: 5.0,
            long_sentence_words: 25.0,
            lexical_saturation: 0.1,
            intensity_saturation: 0.2,
            loop_window: 4,
            streak_length: 3,
        }
    }
}

impl TensionConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        let w = &self.weights;
        for (name, value) in [
            ("tension.weights.lexical", w.lexical),
            ("tension.weights.structural", w.structural),
            ("tension.weights.intensity", w.intensity),
            ("tension.weights.loop_delta", w.loop_delta),
        ] {
            unit_interval(name, value)?;
        }
        if self.short_sentence_words >= self.long_sentence_words {
            return Err(NarrativeError::Config(
                "tension.short_sentence_words must be below long_sentence_words".to_string(),
            ));
        }
        if self.lexical_saturation <= 0.0 || self.intensity_saturation <= 0.0 {
            return Err(NarrativeError::Config(
                "tension saturation values must be positive".to_string(),
            ));
        }
        if self.loop_window == 0 {
            return Err(NarrativeError::Config(
                "tension.loop_window must be at least 1".to_string(),
            ));
        }
        positive("tension.streak_length", self.streak_length)
    }
}

/// Fact integration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Summary bullets kept per scene.
    pub summary_bullets: usize,
    /// Distinct scenes mentioning a loop before it becomes a goal.
    pub goal_mention_threshold: u32,
    /// Ticks a loop may stay open before it becomes a goal.
    pub goal_age_threshold: u32,
    /// Importance given to loops created without an explicit value.
    pub default_loop_importance: f32,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            summary_bullets: 5,
            goal_mention_threshold: 3,
            goal_age_threshold: 5,
            default_loop_importance: 0.5,
        }
    }
}

impl IntegrationConfig {
    pub fn validate(&self) -> Result<()> {
        positive("integration.summary_bullets", self.summary_bullets)?;
        unit_interval(
            "integration.default_loop_importance",
            self.default_loop_importance,
        )
    }
}

/// Plot outline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Regenerate beats once fewer than this many are pending.
    pub min_pending_beats: usize,
    /// How many recent beat descriptions a candidate must differ from.
    pub duplicate_window: usize,
    /// Beats requested from the generator per refill.
    pub generation_batch: usize,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            min_pending_beats: 2,
            duplicate_window: 10,
            generation_batch: 3,
        }
    }
}

impl PlotConfig {
    pub fn validate(&self) -> Result<()> {
        positive("plot.duplicate_window", self.duplicate_window)?;
        positive("plot.generation_batch", self.generation_batch)
    }
}

/// Tick sequencing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Responses slower than this are discarded as timed out.
    pub collaborator_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 120_000,
        }
    }
}
