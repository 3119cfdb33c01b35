//! Typed fact deltas reported by the fact extractor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use story_bible::{EntityId, EntityKind};

use crate::error::{NarrativeError, Result};
use crate::tension::LoopActivity;

/// What a loop delta does to its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopAction {
    Create,
    Resolve,
}

/// One change extracted from a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FactDelta {
    /// Field changes for one character's `current_state`.
    CharacterUpdate {
        character_id: EntityId,
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },
    RelationshipUpdate {
        character_a: EntityId,
        character_b: EntityId,
        relationship_type: String,
        #[serde(default = "default_strength")]
        strength: f32,
    },
    LoopDelta {
        action: LoopAction,
        description: String,
        #[serde(default)]
        importance: Option<f32>,
        /// Explicit loop to resolve. Falls back to the description fingerprint.
        #[serde(default)]
        loop_id: Option<EntityId>,
    },
    LoreAddition {
        statement: String,
        #[serde(default)]
        category: Option<String>,
    },
}

fn default_strength() -> f32 {
    0.5
}

fn invalid(message: impl Into<String>) -> NarrativeError {
    NarrativeError::Validation(message.into())
}

fn expect_kind(id: EntityId, kind: EntityKind, field: &str) -> Result<()> {
    if id.kind() == kind {
        Ok(())
    } else {
        Err(invalid(format!("{} `{}` is not a {} id", field, id, kind)))
    }
}

impl FactDelta {
    /// Short name of the variant, for logs and warnings.
    pub fn label(&self) -> &'static str {
        match self {
            FactDelta::CharacterUpdate { .. } => "character_update",
            FactDelta::RelationshipUpdate { .. } => "relationship_update",
            FactDelta::LoopDelta { .. } => "loop_delta",
            FactDelta::LoreAddition { .. } => "lore_addition",
        }
    }

    /// Check the payload against its schema before it is dispatched.
    pub fn validate(&self) -> Result<()> {
        match self {
            FactDelta::CharacterUpdate {
                character_id,
                fields,
            } => {
                expect_kind(*character_id, EntityKind::Character, "character_id")?;
                if fields.keys().any(|k| k.trim().is_empty()) {
                    return Err(invalid("character update has a blank field name"));
                }
                Ok(())
            }
            FactDelta::RelationshipUpdate {
                character_a,
                character_b,
                relationship_type,
                strength,
            } => {
                expect_kind(*character_a, EntityKind::Character, "character_a")?;
                expect_kind(*character_b, EntityKind::Character, "character_b")?;
                if character_a == character_b {
                    return Err(invalid(format!(
                        "relationship of `{}` with itself",
                        character_a
                    )));
                }
                if relationship_type.trim().is_empty() {
                    return Err(invalid("relationship type is empty"));
                }
                if !strength.is_finite() || !(0.0..=1.0).contains(strength) {
                    return Err(invalid(format!(
                        "relationship strength {} outside [0, 1]",
                        strength
                    )));
                }
                Ok(())
            }
            FactDelta::LoopDelta {
                action,
                description,
                importance,
                loop_id,
            } => {
                if let Some(id) = loop_id {
                    expect_kind(*id, EntityKind::OpenLoop, "loop_id")?;
                }
                let addressable = *action == LoopAction::Resolve && loop_id.is_some();
                if description.trim().is_empty() && !addressable {
                    return Err(invalid("loop description is empty"));
                }
                if let Some(importance) = importance {
                    if !importance.is_finite() || !(0.0..=1.0).contains(importance) {
                        return Err(invalid(format!(
                            "loop importance {} outside [0, 1]",
                            importance
                        )));
                    }
                }
                Ok(())
            }
            FactDelta::LoreAddition { statement, .. } => {
                if statement.trim().is_empty() {
                    return Err(invalid("lore statement is empty"));
                }
                Ok(())
            }
        }
    }

    /// Parse a JSON array of deltas item by item.
    ///
    /// Items that fail to parse or validate are dropped and reported as
    /// warnings; only a payload that is not an array at all is an error.
    pub fn parse_batch(json: &str) -> Result<ParsedDeltas> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(items) = value else {
            return Err(invalid("fact deltas must be a JSON array"));
        };

        let mut parsed = ParsedDeltas::default();
        for (position, item) in items.into_iter().enumerate() {
            let delta = match serde_json::from_value::<FactDelta>(item) {
                Ok(delta) => delta,
                Err(err) => {
                    parsed.warnings.push(format!("delta #{}: {}", position, err));
                    continue;
                }
            };
            match delta.validate() {
                Ok(()) => parsed.deltas.push(delta),
                Err(err) => parsed
                    .warnings
                    .push(format!("delta #{} ({}): {}", position, delta.label(), err)),
            }
        }
        Ok(parsed)
    }

    /// Loops opened and resolved by a set of deltas.
    pub fn loop_activity(deltas: &[FactDelta]) -> LoopActivity {
        let mut activity = LoopActivity::default();
        for delta in deltas {
            if let FactDelta::LoopDelta { action, .. } = delta {
                match action {
                    LoopAction::Create => activity.created += 1,
                    LoopAction::Resolve => activity.resolved += 1,
                }
            }
        }
        activity
    }
}

/// Result of [`FactDelta::parse_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDeltas {
    pub deltas: Vec<FactDelta>,
    pub warnings: Vec<String>,
}

/// Lowercase, drop punctuation and collapse whitespace.
pub fn normalize_statement(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable key for a loop or lore statement: SHA-256 of its normalized text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_statement(text).as_bytes());
    format!("{:x}", hasher.finalize())
}
