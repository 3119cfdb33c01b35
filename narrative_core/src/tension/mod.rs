//! Tension Evaluator - grades finished prose on the 0-10 tension scale.
//!
//! The composite score is a weighted sum of four sub-scores, each in `[0, 1]`:
//! 1. **Lexical**: net density of high- vs low-tension keywords
//! 2. **Structural**: short sentences score high, long sentences low
//! 3. **Intensity**: exclamation/question marks, dashes, adrenaline verbs
//! 4. **Loop delta**: loops opened minus loops resolved, over a fixed window
//!
//! The evaluator is stateless; the pacing history lives with the story state.

mod lexicon;
mod pacing;

pub use lexicon::*;
pub use pacing::*;

use serde::{Deserialize, Serialize};
use tracing::debug;

use story_bible::{TensionCategory, TensionLevel};

use crate::config::TensionConfig;

/// Open-loop activity observed in a piece of prose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopActivity {
    pub created: u32,
    pub resolved: u32,
}

impl LoopActivity {
    pub fn net(&self) -> i64 {
        i64::from(self.created) - i64::from(self.resolved)
    }
}

/// Result of grading one scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensionScore {
    pub level: TensionLevel,
    pub category: TensionCategory,
    pub lexical: f32,
    pub structural: f32,
    pub intensity: f32,
    pub loop_delta: f32,
    /// Weighted sum before scaling to 0-10.
    pub composite: f32,
}

/// Scores prose tension.
#[derive(Debug, Clone)]
pub struct TensionEvaluator {
    config: TensionConfig,
    lexicon: TensionLexicon,
}

impl TensionEvaluator {
    pub fn new(config: TensionConfig) -> Self {
        Self {
            config,
            lexicon: TensionLexicon::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TensionConfig::default())
    }

    pub fn with_lexicon(mut self, lexicon: TensionLexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn config(&self) -> &TensionConfig {
        &self.config
    }

    /// Grade `text`, taking the loops it opened and resolved into account.
    pub fn evaluate(&self, text: &str, loops: LoopActivity) -> TensionScore {
        let words = words(text);
        let lexical = self.lexical_score(&words);
        let structural = self.structural_score(text, words.len());
        let intensity = self.intensity_score(text, &words);
        let loop_delta = self.loop_score(loops);

        let w = &self.config.weights;
        let composite = w.lexical * lexical
            + w.structural * structural
            + w.intensity * intensity
            + w.loop_delta * loop_delta;

        let level = TensionLevel::from_score(composite * 10.0);
        let category = self.config.thresholds.categorize(level);

        debug!(
            %level,
            %category,
            lexical,
            structural,
            intensity,
            loop_delta,
            "evaluated scene tension"
        );

        TensionScore {
            level,
            category,
            lexical,
            structural,
            intensity,
            loop_delta,
            composite,
        }
    }

    fn lexical_score(&self, words: &[String]) -> f32 {
        if words.is_empty() {
            return 0.0;
        }
        let high = words
            .iter()
            .filter(|w| self.lexicon.high_tension.contains(*w))
            .count() as f32;
        let low = words
            .iter()
            .filter(|w| self.lexicon.low_tension.contains(*w))
            .count() as f32;
        let density = (high - low) / words.len() as f32;
        (density / self.config.lexical_saturation).clamp(0.0, 1.0)
    }

    fn structural_score(&self, text: &str, word_count: usize) -> f32 {
        let sentences = sentence_count(text);
        if sentences == 0 || word_count == 0 {
            return 0.0;
        }
        let mean = word_count as f32 / sentences as f32;
        let short = self.config.short_sentence_words;
        let long = self.config.long_sentence_words;
        ((long - mean) / (long - short)).clamp(0.0, 1.0)
    }

    fn intensity_score(&self, text: &str, words: &[String]) -> f32 {
        if words.is_empty() {
            return 0.0;
        }
        let marks = text.chars().filter(|c| matches!(c, '!' | '?')).count();
        let dashes = text.matches(['\u{2014}', '\u{2013}']).count() + text.matches("--").count();
        let verbs = words
            .iter()
            .filter(|w| self.lexicon.adrenaline_verbs.contains(*w))
            .count();
        let density = (marks + dashes + verbs) as f32 / words.len() as f32;
        (density / self.config.intensity_saturation).clamp(0.0, 1.0)
    }

    fn loop_score(&self, loops: LoopActivity) -> f32 {
        let window = i64::from(self.config.loop_window);
        let net = loops.net().clamp(-window, window);
        (net + window) as f32 / (2 * window) as f32
    }
}

/// Lowercased words with surrounding punctuation stripped.
fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .trim_matches('\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Sentences containing at least one alphanumeric character.
fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .count()
}
