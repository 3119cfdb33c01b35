//! External collaborators driven by the orchestrator, and the payloads they exchange.
//!
//! Every collaborator is a synchronous request/response call. Implementations
//! report unusable output as a [`GenerationError`]; the orchestrator turns any
//! such error into an aborted tick.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use story_bible::{Character, EntityId, Location, OpenLoop, Scene};

use crate::context_assembler::ContextBundle;
use crate::entity_store::EntityStore;
use crate::error::GenerationError;
use crate::fact_integration::FactDelta;
use crate::plot_outline::BeatCandidate;
use crate::tension::{PacingAdvice, PacingEntry};

/// An entity-generation request carried by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name, e.g. `create_character`.
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Outcome of one tool call, fed back into the plan and the prose bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    /// Entities the call created or resolved to.
    #[serde(default)]
    pub entities: Vec<EntityId>,
    #[serde(default)]
    pub note: String,
}

/// Structured output of the plan generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// What the scene should accomplish; used as the prose-stage search query.
    pub scene_intention: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pov_character: Option<EntityId>,
    #[serde(default)]
    pub location: Option<EntityId>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Plan {
    /// Point the plan's POV or location at entities its own tool calls produced.
    ///
    /// A call tagged `"as": "pov"` or `"as": "location"` selects the first
    /// entity of its result. `results` pair with `tool_calls` by position.
    pub fn adopt_tool_results(&mut self, results: &[ToolResult]) {
        for (call, result) in self.tool_calls.iter().zip(results) {
            let Some(&entity) = result.entities.first() else {
                continue;
            };
            match call.arguments.get("as").and_then(Value::as_str) {
                Some("pov") => self.pov_character = Some(entity),
                Some("location") => self.location = Some(entity),
                _ => {}
            }
        }
    }
}

/// Output of the prose generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDraft {
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Name of the character the prose is actually written from.
    #[serde(default)]
    pub pov_name: Option<String>,
    #[serde(default)]
    pub pov_character: Option<EntityId>,
    #[serde(default)]
    pub location: Option<EntityId>,
    #[serde(default)]
    pub word_count: Option<u32>,
    /// Summary bullets, if the generator produced them.
    #[serde(default)]
    pub summary: Vec<String>,
}

/// Story-state digest handed to the beat generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryAnalysis {
    pub arc_label: String,
    pub arc_progress: f32,
    pub open_loops: Vec<OpenLoop>,
    pub recent_scenes: Vec<Scene>,
    pub recent_beats: Vec<String>,
    pub tension_history: Vec<PacingEntry>,
    pub pacing_advice: PacingAdvice,
}

/// Produces the scene plan from the planning bundle.
pub trait PlanGenerator {
    fn generate_plan(&mut self, bundle: &ContextBundle) -> Result<Plan, GenerationError>;
}

/// Carries out a plan's tool calls.
pub trait ToolExecutor {
    fn execute(
        &mut self,
        calls: &[ToolCall],
        store: &mut EntityStore,
    ) -> Result<Vec<ToolResult>, GenerationError>;
}

/// Writes the scene from the prose bundle.
pub trait ProseGenerator {
    fn write_scene(&mut self, bundle: &ContextBundle) -> Result<SceneDraft, GenerationError>;
}

/// Turns prose into typed fact deltas.
pub trait FactExtractor {
    fn extract(&mut self, text: &str) -> Result<Vec<FactDelta>, GenerationError>;
}

/// Proposes new plot beats.
pub trait BeatGenerator {
    fn generate_beats(
        &mut self,
        analysis: &StoryAnalysis,
        count: usize,
    ) -> Result<Vec<BeatCandidate>, GenerationError>;
}

/// The full set of collaborators one orchestrator drives.
pub struct Collaborators {
    pub planner: Box<dyn PlanGenerator>,
    pub tools: Box<dyn ToolExecutor>,
    pub writer: Box<dyn ProseGenerator>,
    pub extractor: Box<dyn FactExtractor>,
    pub beats: Box<dyn BeatGenerator>,
}

/// Tool executor that creates characters and locations directly in the store.
///
/// Supports `create_character` (`name`, optional `role`, `traits`) and
/// `create_location` (`name`, optional `description`, `atmosphere`). A
/// character or location whose name already exists is reused. Either tool
/// accepts `"as": "pov"` or `"as": "location"`, see [`Plan::adopt_tool_results`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreToolExecutor;

const STAGE: &str = "tool_executor";

fn text_argument<'a>(call: &'a ToolCall, key: &str) -> Option<&'a str> {
    call.arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_name(call: &ToolCall) -> Result<&str, GenerationError> {
    text_argument(call, "name")
        .ok_or_else(|| GenerationError::malformed(STAGE, format!("{} needs a name", call.tool)))
}

fn storage_failure(err: crate::error::NarrativeError) -> GenerationError {
    GenerationError::unavailable(STAGE, err.to_string())
}

impl StoreToolExecutor {
    fn create_character(
        &self,
        call: &ToolCall,
        store: &mut EntityStore,
    ) -> Result<ToolResult, GenerationError> {
        let name = required_name(call)?;
        if let Some(existing) = store.find_character_by_name(name).map_err(storage_failure)? {
            return Ok(ToolResult {
                tool: call.tool.clone(),
                entities: vec![existing.id],
                note: format!("{} already exists", existing.name()),
            });
        }

        let mut character = Character::from_full_name(name);
        if let Some(role) = text_argument(call, "role") {
            character = character.with_role(role);
        }
        if let Some(traits) = call.arguments.get("traits").and_then(Value::as_array) {
            for value in traits.iter().filter_map(Value::as_str) {
                character = character.with_trait(value);
            }
        }
        let id = store.create(character).map_err(storage_failure)?;
        Ok(ToolResult {
            tool: call.tool.clone(),
            entities: vec![id],
            note: format!("created {}", name),
        })
    }

    fn create_location(
        &self,
        call: &ToolCall,
        store: &mut EntityStore,
    ) -> Result<ToolResult, GenerationError> {
        let name = required_name(call)?;
        let existing = store
            .load_all::<Location>()
            .map_err(storage_failure)?
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name));
        if let Some(existing) = existing {
            return Ok(ToolResult {
                tool: call.tool.clone(),
                entities: vec![existing.id],
                note: format!("{} already exists", existing.name),
            });
        }

        let mut location = Location::new(name);
        if let Some(description) = text_argument(call, "description") {
            location = location.with_description(description);
        }
        if let Some(atmosphere) = text_argument(call, "atmosphere") {
            location = location.with_atmosphere(atmosphere);
        }
        let id = store.create(location).map_err(storage_failure)?;
        Ok(ToolResult {
            tool: call.tool.clone(),
            entities: vec![id],
            note: format!("created {}", name),
        })
    }
}

impl ToolExecutor for StoreToolExecutor {
    fn execute(
        &mut self,
        calls: &[ToolCall],
        store: &mut EntityStore,
    ) -> Result<Vec<ToolResult>, GenerationError> {
        calls
            .iter()
            .map(|call| {
                debug!(tool = %call.tool, "executing tool call");
                match call.tool.as_str() {
                    "create_character" => self.create_character(call, store),
                    "create_location" => self.create_location(call, store),
                    other => Err(GenerationError::rejected(
                        STAGE,
                        format!("unknown tool `{}`", other),
                    )),
                }
            })
            .collect()
    }
}

/// Beat generator that never proposes anything. Useful when the outline is fixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBeatGenerator;

impl BeatGenerator for NoBeatGenerator {
    fn generate_beats(
        &mut self,
        _analysis: &StoryAnalysis,
        _count: usize,
    ) -> Result<Vec<BeatCandidate>, GenerationError> {
        Ok(Vec::new())
    }
}
