//! End-to-end tick tests with scripted collaborators.
//!
//! Run with: `RUST_LOG=narrative_core=debug cargo test -p narrative_core --test tick_test -- --nocapture`

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use narrative_core::config::EngineConfig;
use narrative_core::context_assembler::ContextBundle;
use narrative_core::entity_store::EntityStore;
use narrative_core::error::{GenerationError, NarrativeError};
use narrative_core::fact_integration::{FactDelta, LoopAction};
use narrative_core::orchestrator::{
    BeatGenerator, Collaborators, FactExtractor, Plan, PlanGenerator, ProseGenerator, SceneDraft,
    StoreToolExecutor, StoryAnalysis, TickOrchestrator, TickStage, ToolCall,
};
use narrative_core::plot_outline::BeatCandidate;
use story_bible::{BeatStatus, Character, EntityId, EntityKind, Location, OpenLoop, Scene};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn id(s: &str) -> EntityId {
    s.parse().unwrap()
}

/// What the scripted collaborators answer, plus what they were asked.
#[derive(Default)]
struct Script {
    plan: Plan,
    draft: SceneDraft,
    deltas: Vec<FactDelta>,
    beats: Vec<BeatCandidate>,
    writer_failures: usize,
    writer_delay: Option<Duration>,
    prose_bundles: Vec<ContextBundle>,
    beat_requests: Vec<usize>,
}

#[derive(Clone, Default)]
struct Scripted(Rc<RefCell<Script>>);

impl PlanGenerator for Scripted {
    fn generate_plan(&mut self, _bundle: &ContextBundle) -> Result<Plan, GenerationError> {
        Ok(self.0.borrow().plan.clone())
    }
}

impl ProseGenerator for Scripted {
    fn write_scene(&mut self, bundle: &ContextBundle) -> Result<SceneDraft, GenerationError> {
        let mut script = self.0.borrow_mut();
        script.prose_bundles.push(bundle.clone());
        if let Some(delay) = script.writer_delay {
            std::thread::sleep(delay);
        }
        if script.writer_failures > 0 {
            script.writer_failures -= 1;
            return Err(GenerationError::unavailable("writer", "model overloaded"));
        }
        Ok(script.draft.clone())
    }
}

impl FactExtractor for Scripted {
    fn extract(&mut self, _text: &str) -> Result<Vec<FactDelta>, GenerationError> {
        Ok(self.0.borrow().deltas.clone())
    }
}

impl BeatGenerator for Scripted {
    fn generate_beats(
        &mut self,
        _analysis: &StoryAnalysis,
        count: usize,
    ) -> Result<Vec<BeatCandidate>, GenerationError> {
        let mut script = self.0.borrow_mut();
        script.beat_requests.push(count);
        Ok(std::mem::take(&mut script.beats))
    }
}

struct Story {
    orchestrator: TickOrchestrator,
    script: Scripted,
    alice: EntityId,
    cellar: EntityId,
}

fn story_with(config: EngineConfig) -> Story {
    init_tracing();
    let mut store = EntityStore::in_memory();
    let alice = store
        .create(Character::new("Alice", "Smith").with_role("archivist"))
        .unwrap();
    let cellar = store
        .create(Location::new("The Cellar").with_description("Damp stone and old crates"))
        .unwrap();

    let script = Scripted::default();
    {
        let mut s = script.0.borrow_mut();
        s.plan = Plan {
            scene_intention: "Alice searches the cellar".into(),
            pov_character: Some(alice),
            location: Some(cellar),
            ..Plan::default()
        };
        s.draft = SceneDraft {
            text: "Alice pried the loose stone free. Beneath it lay a map. Who had hidden it here?"
                .into(),
            title: Some("The Loose Stone".into()),
            pov_name: Some("Alice Smith".into()),
            ..SceneDraft::default()
        };
        s.deltas = vec![FactDelta::LoopDelta {
            action: LoopAction::Create,
            description: "Who hid the map in the cellar?".into(),
            importance: Some(0.6),
            loop_id: None,
        }];
    }

    let collaborators = Collaborators {
        planner: Box::new(script.clone()),
        tools: Box::new(StoreToolExecutor),
        writer: Box::new(script.clone()),
        extractor: Box::new(script.clone()),
        beats: Box::new(script.clone()),
    };
    let mut orchestrator = TickOrchestrator::new(config, store, collaborators).unwrap();
    orchestrator.begin_story(alice).unwrap();
    orchestrator
        .plot_mut()
        .append_generated_beats(vec![
            BeatCandidate::new("Alice finds a map in the cellar").with_character(alice)
        ]);

    Story {
        orchestrator,
        script,
        alice,
        cellar,
    }
}

fn story() -> Story {
    story_with(EngineConfig::default())
}

#[test]
fn test_ticks_commit_scenes_and_advance_beats() {
    let Story {
        mut orchestrator,
        script,
        alice,
        cellar,
    } = story();

    let first = orchestrator.run_tick().unwrap();
    assert_eq!(first.tick, 0);
    assert_eq!(first.scene_id, id("S000"));
    assert_eq!(first.beat, Some(id("PB001")));
    assert!(!first.already_committed);

    let scene: Scene = orchestrator.store().load(id("S000")).unwrap();
    assert_eq!(scene.title, "The Loose Stone");
    assert_eq!(scene.pov_character, Some(alice));
    assert_eq!(scene.location, Some(cellar));
    assert_eq!(scene.plot_beat, Some(id("PB001")));
    assert_eq!(scene.summary.len(), 3);
    assert_eq!(scene.tension_level, first.tension.level);
    let text = orchestrator.store().scene_text(&scene).unwrap().unwrap();
    assert!(text.starts_with("Alice pried"));

    let beat = orchestrator.plot().get(id("PB001")).unwrap();
    assert_eq!(beat.status, BeatStatus::Completed);
    assert_eq!(beat.scene, Some(id("S000")));
    assert_eq!(orchestrator.state().tick(), 1);
    assert_eq!(orchestrator.state().pacing().len(), 1);
    assert_eq!(orchestrator.store().count(EntityKind::OpenLoop), 1);

    // The queue is empty now, so the next tick asks for more beats first.
    script.0.borrow_mut().beats = vec![
        BeatCandidate::new("Alice shows the map to the harbor master").with_character(alice),
        BeatCandidate::new("alice finds a map in the cellar"),
    ];
    let second = orchestrator.run_tick().unwrap();
    assert_eq!(second.tick, 1);
    assert_eq!(second.scene_id, id("S001"));
    assert_eq!(second.beat, Some(id("PB002")));
    assert_eq!(script.0.borrow().beat_requests, vec![3]);
    assert_eq!(orchestrator.plot().outline().beats.len(), 2);

    // The same loop raised again is a mention, not a second loop.
    let loops: Vec<OpenLoop> = orchestrator.store().load_all().unwrap();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].mentions, 2);

    let recorded = script.0.borrow();
    let bundles = &recorded.prose_bundles;
    assert!(bundles[0].full_detail.is_empty());
    assert_eq!(bundles[1].full_detail_ids()[0], id("S000"));
    assert_eq!(orchestrator.state().pacing().len(), 2);
}

#[test]
fn test_commit_twice_writes_once() {
    let Story {
        mut orchestrator, ..
    } = story();

    let prepared = orchestrator.prepare_tick().unwrap();
    let first = orchestrator.commit(&prepared).unwrap();
    let again = orchestrator.commit(&prepared).unwrap();

    assert!(!first.already_committed);
    assert!(again.already_committed);
    assert_eq!(again.scene_id, first.scene_id);
    assert_eq!(orchestrator.store().count(EntityKind::Scene), 1);
    assert_eq!(orchestrator.state().tick(), 1);
    assert_eq!(orchestrator.state().pacing().len(), 1);
    assert_eq!(
        orchestrator.plot().get(id("PB001")).unwrap().status,
        BeatStatus::Completed
    );
}

#[test]
fn test_failed_writer_aborts_then_retry_succeeds() {
    let Story {
        mut orchestrator,
        script,
        ..
    } = story();
    script.0.borrow_mut().writer_failures = 1;

    let aborted = orchestrator.run_tick().unwrap_err();
    assert_eq!(aborted.tick, 0);
    assert_eq!(aborted.stage, TickStage::Prose);
    assert!(matches!(
        aborted.error,
        NarrativeError::Generation(GenerationError::Unavailable { .. })
    ));

    let diagnostic = &aborted.diagnostic;
    assert_eq!(diagnostic.stage, TickStage::Prose);
    assert!(diagnostic.reason.contains("model overloaded"));
    assert!(diagnostic.inputs.contains_key("planning_bundle"));
    assert!(diagnostic.inputs.contains_key("prose_bundle"));
    assert_eq!(
        diagnostic.partial_outputs["plan"]["scene_intention"],
        "Alice searches the cellar"
    );
    assert!(!diagnostic.partial_outputs.contains_key("draft"));

    assert_eq!(orchestrator.store().count(EntityKind::Scene), 0);
    assert_eq!(orchestrator.store().count(EntityKind::OpenLoop), 0);
    assert_eq!(orchestrator.state().tick(), 0);
    assert_eq!(
        orchestrator.plot().get(id("PB001")).unwrap().status,
        BeatStatus::Pending
    );

    let report = orchestrator.run_tick().unwrap();
    assert_eq!(report.tick, 0);
    assert_eq!(report.scene_id, id("S000"));
}

#[test]
fn test_slow_writer_times_out() {
    let mut config = EngineConfig::default();
    config.orchestrator.collaborator_timeout_ms = 20;
    let Story {
        mut orchestrator,
        script,
        ..
    } = story_with(config);
    script.0.borrow_mut().writer_delay = Some(Duration::from_millis(120));

    let aborted = orchestrator.run_tick().unwrap_err();
    assert_eq!(aborted.stage, TickStage::Prose);
    match aborted.error {
        NarrativeError::Generation(GenerationError::TimedOut {
            ref stage,
            limit_ms,
            elapsed_ms,
        }) => {
            assert_eq!(stage, "writer");
            assert_eq!(limit_ms, 20);
            assert!(elapsed_ms >= 120);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(orchestrator.store().count(EntityKind::Scene), 0);
}

#[test]
fn test_pov_switch_moves_scene_to_new_viewpoint() {
    let Story {
        mut orchestrator,
        script,
        alice,
        ..
    } = story();
    {
        let mut s = script.0.borrow_mut();
        s.draft.pov_name = Some("Bob Johnson".into());
        s.deltas = vec![FactDelta::CharacterUpdate {
            character_id: alice,
            fields: BTreeMap::from([("status".to_string(), "injured".to_string())]),
        }];
    }

    let report = orchestrator.run_tick().unwrap();

    let switch = report.integration.pov_switch().unwrap();
    assert_eq!(switch.from, Some(alice));
    assert!(switch.created);
    let bob = switch.to;
    assert_eq!(bob, id("C1"));

    let bob_sheet = orchestrator.character(bob).unwrap();
    assert_eq!(bob_sheet.full_name(), "Bob Johnson");
    assert_eq!(bob_sheet.current_state["status"], "injured");
    assert!(orchestrator.character(alice).unwrap().current_state.is_empty());

    assert_eq!(orchestrator.state().active_pov(), Some(bob));
    let scene: Scene = orchestrator.store().load(report.scene_id).unwrap();
    assert_eq!(scene.pov_character, Some(bob));
}

#[test]
fn test_plan_with_unknown_location_is_rejected() {
    let Story {
        mut orchestrator,
        script,
        ..
    } = story();
    script.0.borrow_mut().plan.location = Some(id("L9"));

    let aborted = orchestrator.run_tick().unwrap_err();
    assert_eq!(aborted.stage, TickStage::Planning);
    assert!(matches!(
        aborted.error,
        NarrativeError::Generation(GenerationError::Rejected { .. })
    ));
    assert!(script.0.borrow().prose_bundles.is_empty());
    assert_eq!(orchestrator.store().count(EntityKind::Scene), 0);
}

#[test]
fn test_empty_prose_is_malformed() {
    let Story {
        mut orchestrator,
        script,
        ..
    } = story();
    script.0.borrow_mut().draft.text = "   ".into();

    let aborted = orchestrator.run_tick().unwrap_err();
    assert_eq!(aborted.stage, TickStage::Prose);
    assert!(matches!(
        aborted.error,
        NarrativeError::Generation(GenerationError::Malformed { .. })
    ));
}

#[test]
fn test_tool_calls_create_entities_before_prose() {
    let Story {
        mut orchestrator,
        script,
        ..
    } = story();
    script.0.borrow_mut().plan.tool_calls = vec![ToolCall::new(
        "create_character",
        json!({"name": "Mara Quill", "role": "smuggler"}),
    )];

    orchestrator.run_tick().unwrap();

    let mara = orchestrator
        .store()
        .find_character_by_name("Mara Quill")
        .unwrap()
        .unwrap();
    assert_eq!(mara.role.as_deref(), Some("smuggler"));

    let recorded = script.0.borrow();
    let bundles = &recorded.prose_bundles;
    assert_eq!(bundles[0].tool_results.len(), 1);
    assert_eq!(bundles[0].tool_results[0].entities, vec![mara.id]);
    assert!(bundles[0].to_prompt_string().contains("## New Entities"));
}

#[test]
fn test_beats_guide_planning_context() {
    let Story {
        mut orchestrator,
        script,
        alice,
        ..
    } = story();

    orchestrator.run_tick().unwrap();

    let recorded = script.0.borrow();
    let bundles = &recorded.prose_bundles;
    let bundle = &bundles[0];
    assert_eq!(
        bundle.beat.as_ref().map(|b| b.description.as_str()),
        Some("Alice finds a map in the cellar")
    );
    assert_eq!(bundle.pov_character, Some(alice));
    assert_eq!(bundle.location.as_ref().map(|l| l.name.as_str()), Some("The Cellar"));
    assert!(bundle.to_prompt_string().contains("## Plot Beat"));
}

#[test]
fn test_plan_can_cite_characters_its_tools_create() {
    let Story {
        mut orchestrator,
        script,
        ..
    } = story();
    {
        let mut s = script.0.borrow_mut();
        s.plan.pov_character = Some(id("C1"));
        s.plan.tool_calls = vec![ToolCall::new(
            "create_character",
            json!({"name": "Mara Quill"}),
        )];
        s.draft.pov_name = None;
    }

    let report = orchestrator.run_tick().unwrap();

    let scene: Scene = orchestrator.store().load(report.scene_id).unwrap();
    assert_eq!(scene.pov_character, Some(id("C1")));
    assert_eq!(orchestrator.character(id("C1")).unwrap().full_name(), "Mara Quill");
}

#[test]
fn test_tool_result_tagged_as_pov_becomes_plan_pov() {
    let Story {
        mut orchestrator,
        script,
        ..
    } = story();
    {
        let mut s = script.0.borrow_mut();
        s.plan.pov_character = None;
        s.plan.tool_calls = vec![ToolCall::new(
            "create_character",
            json!({"name": "Mara Quill", "as": "pov"}),
        )];
        s.draft.pov_name = None;
    }

    let report = orchestrator.run_tick().unwrap();

    let mara = orchestrator
        .store()
        .find_character_by_name("Mara Quill")
        .unwrap()
        .unwrap();
    let scene: Scene = orchestrator.store().load(report.scene_id).unwrap();
    assert_eq!(scene.pov_character, Some(mara.id));
    assert_eq!(script.0.borrow().prose_bundles[0].pov_character, Some(mara.id));
}

#[test]
fn test_beat_skipped_before_commit_leaves_tick_retryable() {
    let Story {
        mut orchestrator, ..
    } = story();

    let prepared = orchestrator.prepare_tick().unwrap();
    assert_eq!(prepared.beat, Some(id("PB001")));
    orchestrator.plot_mut().mark_skipped(id("PB001")).unwrap();

    let err = orchestrator.commit(&prepared).unwrap_err();
    assert!(matches!(
        err,
        NarrativeError::InvalidTransition {
            from: BeatStatus::Skipped,
            to: BeatStatus::Completed,
            ..
        }
    ));
    assert_eq!(orchestrator.store().count(EntityKind::Scene), 0);
    assert_eq!(orchestrator.state().tick(), 0);

    // The skipped beat is no longer ready, so the retry writes a beatless scene.
    let report = orchestrator.run_tick().unwrap();
    assert_eq!(report.tick, 0);
    assert_eq!(report.scene_id, id("S000"));
    assert_eq!(report.beat, None);
    assert_eq!(orchestrator.state().tick(), 1);
    assert_eq!(
        orchestrator.plot().get(id("PB001")).unwrap().status,
        BeatStatus::Skipped
    );
}

#[test]
fn test_stored_scene_with_skipped_beat_still_advances_tick() {
    let Story {
        mut orchestrator, ..
    } = story();

    let prepared = orchestrator.prepare_tick().unwrap();
    // A scene for this tick was already stored when its beat got skipped.
    let stored = orchestrator
        .store_mut()
        .create(Scene::new(0, "The Loose Stone").with_plot_beat(Some(id("PB001"))))
        .unwrap();
    orchestrator.plot_mut().mark_skipped(id("PB001")).unwrap();

    let report = orchestrator.commit(&prepared).unwrap();
    assert!(report.already_committed);
    assert_eq!(report.scene_id, stored);
    assert_eq!(orchestrator.state().tick(), 1);
    assert_eq!(orchestrator.state().pacing().len(), 1);
    assert_eq!(
        orchestrator.plot().get(id("PB001")).unwrap().status,
        BeatStatus::Skipped
    );
}

#[test]
fn test_commit_abort_records_beat_and_scene() {
    let Story {
        mut orchestrator, ..
    } = story();

    let prepared = orchestrator.prepare_tick().unwrap();
    orchestrator.plot_mut().mark_skipped(id("PB001")).unwrap();

    let aborted = orchestrator.finish_tick(&prepared).unwrap_err();
    assert_eq!(aborted.stage, TickStage::Commit);
    let inputs = &aborted.diagnostic.inputs;
    assert_eq!(inputs["beat"], "PB001");
    assert_eq!(inputs["beat_status"], "skipped");
    assert_eq!(inputs["scene_id"], "S000");
    assert_eq!(aborted.diagnostic.partial_outputs["prepared"]["tick"], 0);
}
