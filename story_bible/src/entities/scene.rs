//! Scene records - one per committed tick.

use serde::{Deserialize, Serialize};

use super::{Entity, EntityId, EntityKind, Metadata};
use crate::pacing::{TensionCategory, TensionLevel};

/// A committed scene.
///
/// The prose itself lives outside the record and is addressed by `text_ref`.
/// After commit the only field that may change is `plot_beat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: EntityId,
    /// Sequence number of the tick that produced this scene.
    pub tick: u32,
    pub title: String,
    /// Short ordered summary bullets.
    #[serde(default)]
    pub summary: Vec<String>,
    /// Key of the externally stored full text.
    pub text_ref: String,
    pub pov_character: Option<EntityId>,
    pub location: Option<EntityId>,
    pub word_count: u32,
    pub tension_level: TensionLevel,
    pub tension_category: TensionCategory,
    /// Plot beat this scene executed, set when the beat completes.
    #[serde(default)]
    pub plot_beat: Option<EntityId>,
}

impl Scene {
    pub fn new(tick: u32, title: impl Into<String>) -> Self {
        Self {
            id: EntityId::unassigned(EntityKind::Scene),
            tick,
            title: title.into(),
            summary: Vec::new(),
            text_ref: String::new(),
            pov_character: None,
            location: None,
            word_count: 0,
            tension_level: TensionLevel::MIN,
            tension_category: TensionCategory::Calm,
            plot_beat: None,
        }
    }

    /// Set the summary, keeping at most `bullets` non-empty entries.
    pub fn with_summary(mut self, summary: impl IntoIterator<Item = String>, bullets: usize) -> Self {
        self.summary = summary
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(bullets)
            .collect();
        self
    }

    pub fn with_pov(mut self, pov: Option<EntityId>) -> Self {
        self.pov_character = pov;
        self
    }

    pub fn with_location(mut self, location: Option<EntityId>) -> Self {
        self.location = location;
        self
    }

    pub fn with_tension(mut self, level: TensionLevel, category: TensionCategory) -> Self {
        self.tension_level = level;
        self.tension_category = category;
        self
    }

    pub fn with_word_count(mut self, word_count: u32) -> Self {
        self.word_count = word_count;
        self
    }

    pub fn with_plot_beat(mut self, beat: Option<EntityId>) -> Self {
        self.plot_beat = beat;
        self
    }
}

impl Entity for Scene {
    const KIND: EntityKind = EntityKind::Scene;

    fn id(&self) -> EntityId {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
        if self.text_ref.is_empty() {
            self.text_ref = id.to_string();
        }
    }

    fn index_text(&self) -> String {
        if self.summary.is_empty() {
            self.title.clone()
        } else {
            format!("{}. {}", self.title, self.summary.join(" "))
        }
    }

    fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("tick".to_string(), self.tick.into());
        if let Some(pov) = self.pov_character {
            meta.insert("pov".to_string(), pov.into());
        }
        if let Some(location) = self.location {
            meta.insert("location".to_string(), location.into());
        }
        meta.insert(
            "tension".to_string(),
            self.tension_category.as_str().into(),
        );
        meta
    }
}
