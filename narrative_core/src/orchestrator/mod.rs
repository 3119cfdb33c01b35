//! Tick Orchestrator - sequences one production step.
//!
//! A tick runs: beat selection, planning bundle, plan, tool calls, prose
//! bundle, prose, fact extraction, tension scoring, fact integration, and
//! finally the commit. Any failure before the commit aborts the tick with a
//! [`DiagnosticBundle`]; fact writes already applied stay, since each one was
//! valid on its own. Committing is idempotent per tick, so a failed or
//! repeated tick can simply be run again.

mod collaborators;
mod diagnostic;

pub use collaborators::*;
pub use diagnostic::*;

use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

use story_bible::{BeatStatus, Character, EntityId, EntityKind, Location, Scene};

use crate::config::EngineConfig;
use crate::context_assembler::{ContextAssembler, ContextRequest};
use crate::entity_store::EntityStore;
use crate::error::{GenerationError, NarrativeError, Result};
use crate::fact_integration::{FactDelta, FactIntegrationPipeline, IntegrationReport, SceneContext};
use crate::plot_outline::PlotOutlineManager;
use crate::story_state::StoryState;
use crate::tension::{PacingAdvice, PacingEntry, TensionEvaluator, TensionScore};

const DEFAULT_ARC_LABEL: &str = "main";

/// A fully generated scene waiting to be committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedScene {
    pub tick: u32,
    /// ID the scene record will carry; loops and lore already cite it.
    pub scene_id: EntityId,
    pub beat: Option<EntityId>,
    pub title: String,
    pub summary: Vec<String>,
    pub text: String,
    pub pov_character: Option<EntityId>,
    pub location: Option<EntityId>,
    pub word_count: u32,
    pub tension: TensionScore,
    pub integration: IntegrationReport,
    /// Beat candidates the generator proposed that failed validation.
    pub rejected_beats: Vec<String>,
}

/// Outcome of a committed tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u32,
    pub scene_id: EntityId,
    pub beat: Option<EntityId>,
    pub tension: TensionScore,
    pub integration: IntegrationReport,
    pub pacing_advice: PacingAdvice,
    /// The tick had already been committed; nothing new was written.
    pub already_committed: bool,
}

/// Drives ticks against one story.
pub struct TickOrchestrator {
    config: EngineConfig,
    store: EntityStore,
    state: StoryState,
    plot: PlotOutlineManager,
    assembler: ContextAssembler,
    evaluator: TensionEvaluator,
    pipeline: FactIntegrationPipeline,
    collaborators: Collaborators,
}

impl TickOrchestrator {
    /// Create an orchestrator over `store`, resuming any persisted story state and outline.
    pub fn new(config: EngineConfig, store: EntityStore, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let state = StoryState::load(&store)?;
        let plot = PlotOutlineManager::load(&store, DEFAULT_ARC_LABEL, config.plot.clone())?;
        Ok(Self {
            assembler: ContextAssembler::new(config.context.clone())?
                .with_streak_length(config.tension.streak_length),
            evaluator: TensionEvaluator::new(config.tension.clone()),
            pipeline: FactIntegrationPipeline::new(config.integration.clone()),
            config,
            store,
            state,
            plot,
            collaborators,
        })
    }

    /// Set the opening POV of a story that does not have one yet.
    pub fn begin_story(&mut self, pov: EntityId) -> Result<()> {
        if self.state.active_pov().is_some() {
            return Ok(());
        }
        if !self.store.contains(pov) || pov.kind() != EntityKind::Character {
            return Err(NarrativeError::ReferentialIntegrity { missing: pov });
        }
        self.state.set_active_pov(pov);
        self.state.save(&mut self.store)
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Mutable store access for seeding a story before its first tick.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn state(&self) -> &StoryState {
        &self.state
    }

    pub fn plot(&self) -> &PlotOutlineManager {
        &self.plot
    }

    pub fn plot_mut(&mut self) -> &mut PlotOutlineManager {
        &mut self.plot
    }

    /// Run one full tick: prepare, then commit.
    pub fn run_tick(&mut self) -> std::result::Result<TickReport, TickAborted> {
        let prepared = self.prepare_tick()?;
        self.finish_tick(&prepared)
    }

    /// Commit a prepared scene, turning a failure into a commit-stage abort.
    pub fn finish_tick(
        &mut self,
        prepared: &PreparedScene,
    ) -> std::result::Result<TickReport, TickAborted> {
        self.commit(prepared).map_err(|error| {
            let mut trace = TickTrace::default();
            trace.input("beat", &prepared.beat);
            let status = prepared.beat.and_then(|id| self.plot.get(id)).map(|b| b.status);
            trace.input("beat_status", &status);
            trace.input("scene_id", &prepared.scene_id);
            trace.output("prepared", prepared);
            self.abort(prepared.tick, TickStage::Commit, error, trace)
        })
    }

    /// Run every step before the commit for the current tick.
    pub fn prepare_tick(&mut self) -> std::result::Result<PreparedScene, TickAborted> {
        let tick = self.state.tick();
        let mut stage = TickStage::BeatSelection;
        let mut trace = TickTrace::default();
        match self.prepare(tick, &mut stage, &mut trace) {
            Ok(prepared) => Ok(prepared),
            Err(error) => Err(self.abort(tick, stage, error, trace)),
        }
    }

    fn abort(&self, tick: u32, stage: TickStage, error: NarrativeError, trace: TickTrace) -> TickAborted {
        let diagnostic = trace.into_bundle(tick, stage, error.to_string());
        warn!(
            tick,
            %stage,
            diagnostic = %diagnostic.id,
            error = %error,
            "tick aborted"
        );
        TickAborted {
            tick,
            stage,
            error,
            diagnostic,
        }
    }

    fn prepare(
        &mut self,
        tick: u32,
        stage: &mut TickStage,
        trace: &mut TickTrace,
    ) -> Result<PreparedScene> {
        let limit_ms = self.config.orchestrator.collaborator_timeout_ms;

        *stage = TickStage::BeatSelection;
        let rejected_beats = self.ensure_ready_beat(limit_ms, trace)?;
        let beat = self.plot.next_ready_beat().cloned();
        trace.input("beat", &beat);

        *stage = TickStage::PlanningContext;
        let goal = beat
            .as_ref()
            .map(|b| b.description.clone())
            .unwrap_or_default();
        let planning = self.assembler.assemble(
            &self.store,
            &self.state,
            ContextRequest::planning(goal).with_beat(beat.clone()),
        )?;
        trace.input("planning_bundle", &planning);

        *stage = TickStage::Planning;
        let planner = &mut self.collaborators.planner;
        let mut plan = timed("planner", limit_ms, || planner.generate_plan(&planning))?;
        trace.output("plan", &plan);

        *stage = TickStage::ToolExecution;
        let tool_results = if plan.tool_calls.is_empty() {
            Vec::new()
        } else {
            let tools = &mut self.collaborators.tools;
            let store = &mut self.store;
            timed("tool_executor", limit_ms, || tools.execute(&plan.tool_calls, store))?
        };
        trace.output("tool_results", &tool_results);

        // The plan may cite entities its own tool calls just created.
        *stage = TickStage::Planning;
        plan.adopt_tool_results(&tool_results);
        self.check_references("planner", plan.pov_character, plan.location)?;

        *stage = TickStage::ProseContext;
        let pov = plan.pov_character.or(self.state.active_pov());
        let location = plan
            .location
            .or_else(|| beat.as_ref().and_then(|b| b.location));
        let prose_bundle = self.assembler.assemble(
            &self.store,
            &self.state,
            ContextRequest::prose(plan.scene_intention.clone())
                .with_pov(pov)
                .with_location(location)
                .with_beat(beat.clone())
                .with_plan(plan.clone())
                .with_tool_results(tool_results),
        )?;
        trace.input("prose_bundle", &prose_bundle);

        *stage = TickStage::Prose;
        let writer = &mut self.collaborators.writer;
        let draft = timed("writer", limit_ms, || writer.write_scene(&prose_bundle))?;
        trace.output("draft", &draft);
        if draft.text.trim().is_empty() {
            return Err(GenerationError::malformed("writer", "scene text is empty").into());
        }
        let pov = draft.pov_character.or(pov);
        let location = draft.location.or(location);
        self.check_references("writer", pov, location)?;

        *stage = TickStage::FactExtraction;
        let extractor = &mut self.collaborators.extractor;
        let deltas = timed("fact_extractor", limit_ms, || extractor.extract(&draft.text))?;
        trace.output("deltas", &deltas);

        *stage = TickStage::TensionEvaluation;
        let tension = self
            .evaluator
            .evaluate(&draft.text, FactDelta::loop_activity(&deltas));
        trace.output("tension", &tension);

        *stage = TickStage::FactIntegration;
        let scene_id = match self.store.scene_for_tick(tick)? {
            Some(existing) => existing.id,
            None => self.store.peek_next_id(EntityKind::Scene),
        };
        let context = SceneContext::new(tick, scene_id)
            .with_pov(pov, draft.pov_name.clone())
            .with_location(location);
        let integration = self
            .pipeline
            .integrate(&mut self.store, &mut self.state, &context, &deltas)?;
        self.state.save(&mut self.store)?;
        trace.output("integration", &integration);

        let bullets = self.config.integration.summary_bullets;
        let summary = if draft.summary.is_empty() {
            summarize(&draft.text, bullets)
        } else {
            draft.summary.clone()
        };
        let title = draft
            .title
            .clone()
            .or_else(|| plan.title.clone())
            .unwrap_or_else(|| format!("Scene {}", tick));
        let word_count = draft
            .word_count
            .unwrap_or_else(|| draft.text.split_whitespace().count() as u32);

        Ok(PreparedScene {
            tick,
            scene_id,
            beat: beat.map(|b| b.id),
            title,
            summary,
            text: draft.text,
            // A POV switch during integration moves the scene to the new viewpoint.
            pov_character: integration
                .pov_switch()
                .map(|switch| switch.to)
                .or(pov),
            location,
            word_count,
            tension,
            integration,
            rejected_beats,
        })
    }

    /// Refill the outline when no beat is ready and the queue is short.
    fn ensure_ready_beat(&mut self, limit_ms: u64, trace: &mut TickTrace) -> Result<Vec<String>> {
        if self.plot.next_ready_beat().is_some() || !self.plot.needs_more_beats() {
            return Ok(Vec::new());
        }

        let analysis = self.story_analysis()?;
        trace.input("story_analysis", &analysis);
        let count = self.config.plot.generation_batch;
        let generator = &mut self.collaborators.beats;
        let candidates = timed("beat_generator", limit_ms, || {
            generator.generate_beats(&analysis, count)
        })?;
        trace.output("beat_candidates", &candidates);

        let outcome = self.plot.append_generated_beats(candidates);
        for reason in &outcome.rejected {
            warn!(reason = %reason, "beat candidate rejected");
        }
        if !outcome.accepted.is_empty() {
            self.plot.save(&mut self.store)?;
        }
        Ok(outcome.rejected)
    }

    /// Digest of the story so far, for the beat generator.
    pub fn story_analysis(&self) -> Result<StoryAnalysis> {
        let history_len = self.config.context.tension_history_len;
        let scenes = self.store.scenes_chronological()?;
        let recent_scenes = scenes[scenes.len().saturating_sub(history_len)..].to_vec();
        let mut open_loops: Vec<_> = self
            .store
            .load_all::<story_bible::OpenLoop>()?
            .into_iter()
            .filter(|l| l.is_open())
            .collect();
        open_loops.truncate(self.config.context.max_open_loops);

        Ok(StoryAnalysis {
            arc_label: self.plot.outline().arc_label.clone(),
            arc_progress: self.plot.arc_progress(),
            open_loops,
            recent_scenes,
            recent_beats: self
                .plot
                .recent_descriptions(self.config.plot.duplicate_window)
                .into_iter()
                .map(str::to_string)
                .collect(),
            tension_history: self.state.pacing().recent(history_len).to_vec(),
            pacing_advice: self.state.pacing().advice(self.config.tension.streak_length),
        })
    }

    /// Collaborator output may only point at characters and locations that exist.
    fn check_references(
        &self,
        stage: &str,
        pov: Option<EntityId>,
        location: Option<EntityId>,
    ) -> Result<()> {
        if let Some(pov) = pov {
            if pov.kind() != EntityKind::Character || !self.store.contains(pov) {
                return Err(GenerationError::rejected(
                    stage,
                    format!("unknown POV character `{}`", pov),
                )
                .into());
            }
        }
        if let Some(location) = location {
            if location.kind() != EntityKind::Location || !self.store.contains(location) {
                return Err(GenerationError::rejected(
                    stage,
                    format!("unknown location `{}`", location),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Persist the prepared scene, complete its beat and record pacing.
    ///
    /// Committing a tick that already has a scene writes nothing new. A beat
    /// that can no longer be completed fails the commit before anything is
    /// written, so the tick can be prepared again against the current outline.
    pub fn commit(&mut self, prepared: &PreparedScene) -> Result<TickReport> {
        if let Some(existing) = self.store.scene_for_tick(prepared.tick)? {
            info!(tick = prepared.tick, scene = %existing.id, "tick already committed");
            self.finish_commit(prepared, &existing)?;
            return Ok(self.report(prepared, existing.id, true));
        }
        self.check_beat_completable(prepared)?;

        let mut scene = Scene::new(prepared.tick, prepared.title.clone())
            .with_summary(
                prepared.summary.iter().cloned(),
                self.config.integration.summary_bullets,
            )
            .with_pov(prepared.pov_character)
            .with_location(prepared.location)
            .with_word_count(prepared.word_count)
            .with_tension(prepared.tension.level, prepared.tension.category)
            .with_plot_beat(prepared.beat);
        scene.text_ref = prepared.scene_id.to_string();

        // Prose first: a scene record never points at text that was not written.
        self.store.put_scene_text(&scene, &prepared.text)?;
        let scene_id = self.store.create(scene.clone())?;
        if scene_id != prepared.scene_id {
            warn!(expected = %prepared.scene_id, actual = %scene_id, "scene id drifted since preparation");
        }
        scene.id = scene_id;

        self.finish_commit(prepared, &scene)?;
        info!(
            tick = prepared.tick,
            scene = %scene_id,
            tension = %prepared.tension.level,
            category = %prepared.tension.category,
            "tick committed"
        );
        Ok(self.report(prepared, scene_id, false))
    }

    /// The prepared beat must still accept completion by this tick's scene.
    fn check_beat_completable(&self, prepared: &PreparedScene) -> Result<()> {
        let Some(beat_id) = prepared.beat else {
            return Ok(());
        };
        let beat = self
            .plot
            .get(beat_id)
            .ok_or_else(|| NarrativeError::not_found(beat_id))?;
        let done_here = beat.status == BeatStatus::Completed && beat.scene == Some(prepared.scene_id);
        if done_here || beat.status.can_transition_to(BeatStatus::Completed) {
            return Ok(());
        }
        Err(NarrativeError::InvalidTransition {
            beat: beat_id,
            from: beat.status,
            to: BeatStatus::Completed,
        })
    }

    /// The idempotent tail of a commit: outline, pacing and tick counter.
    fn finish_commit(&mut self, prepared: &PreparedScene, scene: &Scene) -> Result<()> {
        if let Some(beat_id) = scene.plot_beat {
            match self.plot.get(beat_id).map(|b| (b.status, b.scene)) {
                Some((BeatStatus::Completed, Some(done))) if done == scene.id => {}
                // The scene is already stored; its tick still has to advance.
                Some((status, _)) if status.is_terminal() => {
                    warn!(
                        beat = %beat_id,
                        scene = %scene.id,
                        %status,
                        "beat closed before its scene was committed"
                    );
                }
                _ => self.plot.mark_complete(beat_id, scene.id)?,
            }
        }
        self.plot.save(&mut self.store)?;

        self.state.record_pacing(PacingEntry {
            tick: scene.tick,
            scene: scene.id,
            level: scene.tension_level,
            category: scene.tension_category,
        });
        self.state.advance_past(prepared.tick);
        self.state.save(&mut self.store)
    }

    fn report(&self, prepared: &PreparedScene, scene_id: EntityId, already_committed: bool) -> TickReport {
        TickReport {
            tick: prepared.tick,
            scene_id,
            beat: prepared.beat,
            tension: prepared.tension,
            integration: prepared.integration.clone(),
            pacing_advice: self.state.pacing().advice(self.config.tension.streak_length),
            already_committed,
        }
    }

    /// Character sheet for `id`, for callers inspecting the story between ticks.
    pub fn character(&self, id: EntityId) -> Result<Character> {
        self.store.load(id)
    }

    pub fn location(&self, id: EntityId) -> Result<Location> {
        self.store.load(id)
    }
}

/// Run a collaborator call and discard its response if it took too long.
fn timed<T>(
    stage: &str,
    limit_ms: u64,
    call: impl FnOnce() -> std::result::Result<T, GenerationError>,
) -> Result<T> {
    let started = Instant::now();
    let response = call();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if elapsed_ms > limit_ms {
        return Err(GenerationError::TimedOut {
            stage: stage.to_string(),
            elapsed_ms,
            limit_ms,
        }
        .into());
    }
    Ok(response?)
}

/// Fallback summary: the first `bullets` sentences of the text.
fn summarize(text: &str, bullets: usize) -> Vec<String> {
    text.split_inclusive(&['.', '!', '?'][..])
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .take(bullets)
        .map(str::to_string)
        .collect()
}
