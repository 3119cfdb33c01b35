//! Word lists driving the lexical and intensity sub-scores.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const HIGH_TENSION: &[&str] = &[
    "alarm", "ambush", "attack", "blade", "bleeding", "blood", "bloody", "burning", "chase",
    "danger", "dead", "death", "desperate", "dying", "explosion", "fear", "fire", "gun",
    "hunt", "hunted", "kill", "killed", "knife", "panic", "run", "scream", "screamed", "shot",
    "terror", "threat", "trapped", "wound", "wounded",
];

const LOW_TENSION: &[&str] = &[
    "calm", "comfortable", "content", "drowsy", "gentle", "gently", "idle", "leisurely",
    "lazy", "mild", "peaceful", "quiet", "quietly", "relaxed", "rest", "restful", "serene",
    "slowly", "soft", "softly", "still", "tranquil", "warm",
];

const ADRENALINE_VERBS: &[&str] = &[
    "burst", "charge", "crash", "dodge", "duck", "flee", "fled", "grab", "grabbed", "leap",
    "lunge", "lunged", "ran", "run", "scramble", "scream", "shoot", "shove", "slam", "slammed",
    "smash", "sprint", "sprinted", "stab", "strike", "struck", "tear", "yank",
];

/// Keyword sets used by the tension evaluator. Override to suit a genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensionLexicon {
    pub high_tension: HashSet<String>,
    pub low_tension: HashSet<String>,
    pub adrenaline_verbs: HashSet<String>,
}

fn owned(words: &[&str]) -> HashSet<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for TensionLexicon {
    fn default() -> Self {
        Self {
            high_tension: owned(HIGH_TENSION),
            low_tension: owned(LOW_TENSION),
            adrenaline_verbs: owned(ADRENALINE_VERBS),
        }
    }
}

impl TensionLexicon {
    pub fn with_high_tension(mut self, word: impl Into<String>) -> Self {
        self.high_tension.insert(word.into().to_lowercase());
        self
    }

    pub fn with_low_tension(mut self, word: impl Into<String>) -> Self {
        self.low_tension.insert(word.into().to_lowercase());
        self
    }

    pub fn with_adrenaline_verb(mut self, word: impl Into<String>) -> Self {
        self.adrenaline_verbs.insert(word.into().to_lowercase());
        self
    }
}
