//! Context Assembler - builds bounded context bundles for the generation stages.
//!
//! Scene selection works as follows:
//! 1. **Reserve**: the chronologically last scene always takes full-detail slot 0
//! 2. **Search**: rank every other scene by similarity to the request query
//! 3. **Blend**: combine similarity with chronological recency into a hybrid score
//! 4. **Boost**: on equal scores, prefer scenes sharing the POV or target location
//! 5. **Assign**: fill the remaining full-detail slots, then the summary slots
//!
//! Scenes that do not fit are left out of the bundle but stay searchable, so the
//! bundle size never grows with the length of the story.

mod bundle;
mod ranking;

pub use bundle::*;
pub use ranking::*;

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use story_bible::{Character, EntityId, EntityKind, Location, OpenLoop, PlotBeat, Scene};

use crate::config::{ContextConfig, SlotBudget, TensionConfig};
use crate::entity_store::EntityStore;
use crate::error::Result;
use crate::orchestrator::{Plan, ToolResult};
use crate::semantic_index::MetadataFilter;
use crate::story_state::StoryState;

/// What to assemble a bundle for.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRequest {
    pub stage: BundleStage,
    /// Scene intention or planning goal used as the search query.
    pub query: String,
    /// POV character; defaults to the story's active POV.
    pub pov: Option<EntityId>,
    pub location: Option<EntityId>,
    pub beat: Option<PlotBeat>,
    pub plan: Option<Plan>,
    pub tool_results: Vec<ToolResult>,
}

impl ContextRequest {
    /// Create a request for the planning stage.
    pub fn planning(query: impl Into<String>) -> Self {
        Self::new(BundleStage::Planning, query)
    }

    /// Create a request for the prose stage.
    pub fn prose(query: impl Into<String>) -> Self {
        Self::new(BundleStage::Prose, query)
    }

    fn new(stage: BundleStage, query: impl Into<String>) -> Self {
        Self {
            stage,
            query: query.into(),
            pov: None,
            location: None,
            beat: None,
            plan: None,
            tool_results: Vec::new(),
        }
    }

    pub fn with_pov(mut self, pov: Option<EntityId>) -> Self {
        self.pov = pov;
        self
    }

    pub fn with_location(mut self, location: Option<EntityId>) -> Self {
        self.location = location;
        self
    }

    pub fn with_beat(mut self, beat: Option<PlotBeat>) -> Self {
        self.beat = beat;
        self
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_tool_results(mut self, results: Vec<ToolResult>) -> Self {
        self.tool_results = results;
        self
    }
}

/// Builds context bundles from the entity store and semantic index.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    config: ContextConfig,
    /// Streak length behind the pacing advice included in bundles.
    streak_length: usize,
}

impl ContextAssembler {
    /// Create a new context assembler with the given configuration.
    ///
    /// Rejects a configuration without room for the latest scene.
    pub fn new(config: ContextConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            streak_length: TensionConfig::default().streak_length,
        })
    }

    /// Create a context assembler with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: ContextConfig::default(),
            streak_length: TensionConfig::default().streak_length,
        }
    }

    pub fn with_streak_length(mut self, streak_length: usize) -> Self {
        self.streak_length = streak_length;
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    fn budget(&self, stage: BundleStage) -> SlotBudget {
        match stage {
            BundleStage::Planning => self.config.planning,
            BundleStage::Prose => self.config.prose,
        }
    }

    /// Assemble the bundle for `request`.
    pub fn assemble(
        &self,
        store: &EntityStore,
        state: &StoryState,
        request: ContextRequest,
    ) -> Result<ContextBundle> {
        let pov = request.pov.or(state.active_pov());
        let location_id = request
            .location
            .or_else(|| request.beat.as_ref().and_then(|b| b.location));
        let budget = self.budget(request.stage);

        let scenes = store.scenes_chronological()?;
        let (full_detail, summaries) =
            self.select_scenes(store, &scenes, &request.query, pov, location_id, budget)?;

        let characters = self.active_characters(store, pov, request.beat.as_ref())?;
        let location = match location_id {
            Some(id) if store.contains(id) => Some(store.load::<Location>(id)?),
            _ => None,
        };

        let bundle = ContextBundle {
            stage: request.stage,
            tick: state.tick(),
            query: request.query,
            full_detail,
            summaries,
            pov_character: pov,
            characters,
            location,
            open_loops: self.open_loops(store)?,
            tension_history: state
                .pacing()
                .recent(self.config.tension_history_len)
                .to_vec(),
            pacing_advice: state.pacing().advice(self.streak_length),
            beat: request.beat,
            plan: request.plan,
            tool_results: request.tool_results,
        };

        debug!(
            stage = %bundle.stage,
            tick = bundle.tick,
            full_detail = bundle.full_detail.len(),
            summaries = bundle.summaries.len(),
            scenes = scenes.len(),
            "context bundle assembled"
        );
        Ok(bundle)
    }

    /// Pick the full-detail and summary scenes.
    fn select_scenes(
        &self,
        store: &EntityStore,
        scenes: &[Scene],
        query: &str,
        pov: Option<EntityId>,
        location: Option<EntityId>,
        budget: SlotBudget,
    ) -> Result<(Vec<SceneSlot>, Vec<SceneSlot>)> {
        let Some(latest) = scenes.last() else {
            return Ok((Vec::new(), Vec::new()));
        };

        let positions: BTreeMap<EntityId, usize> = scenes
            .iter()
            .enumerate()
            .map(|(position, scene)| (scene.id, position))
            .collect();

        let filter = MetadataFilter::new()
            .kind(EntityKind::Scene)
            .exclude(latest.id);
        let hits = store.index().search(query, scenes.len(), &filter);

        let candidates = hits
            .into_iter()
            .filter_map(|hit| {
                let position = *positions.get(&hit.id)?;
                let scene = &scenes[position];
                let boosted = self.config.boost_pov_and_location
                    && ((pov.is_some() && scene.pov_character == pov)
                        || (location.is_some() && scene.location == location));
                Some(ScoredScene::new(
                    hit.id,
                    hit.score,
                    recency_score(position, scenes.len()),
                    self.config.recency_weight,
                    boosted,
                ))
            })
            .collect();
        let ranked = rank(candidates);

        let mut full_detail = vec![SceneSlot {
            scene: latest.clone(),
            score: None,
            text: store.scene_text(latest)?,
        }];
        let mut summaries = Vec::new();

        let full_remaining = budget.full_detail_count.saturating_sub(1);
        for (slot, candidate) in ranked.iter().enumerate() {
            let scene = &scenes[positions[&candidate.scene]];
            if slot < full_remaining {
                full_detail.push(SceneSlot {
                    scene: scene.clone(),
                    score: Some(candidate.score),
                    text: store.scene_text(scene)?,
                });
            } else if slot < full_remaining + budget.summary_count {
                summaries.push(SceneSlot {
                    scene: scene.clone(),
                    score: Some(candidate.score),
                    text: None,
                });
            } else {
                break;
            }
        }

        Ok((full_detail, summaries))
    }

    /// The POV character plus the beat's characters, skipping unknown IDs.
    fn active_characters(
        &self,
        store: &EntityStore,
        pov: Option<EntityId>,
        beat: Option<&PlotBeat>,
    ) -> Result<Vec<Character>> {
        let mut seen = BTreeSet::new();
        let mut characters = Vec::new();
        let wanted = pov
            .into_iter()
            .chain(beat.into_iter().flat_map(|b| b.characters.iter().copied()));
        for id in wanted {
            if !seen.insert(id) {
                continue;
            }
            if store.contains(id) {
                characters.push(store.load::<Character>(id)?);
            } else {
                debug!(%id, "skipping unknown character in context request");
            }
        }
        Ok(characters)
    }

    /// Open loops, most important first.
    fn open_loops(&self, store: &EntityStore) -> Result<Vec<OpenLoop>> {
        let mut loops: Vec<OpenLoop> = store
            .load_all::<OpenLoop>()?
            .into_iter()
            .filter(OpenLoop::is_open)
            .collect();
        loops.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| a.id.cmp(&b.id))
        });
        loops.truncate(self.config.max_open_loops);
        Ok(loops)
    }
}
