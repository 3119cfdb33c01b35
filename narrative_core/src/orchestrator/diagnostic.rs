//! Diagnostic bundles surfaced when a tick aborts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::error::NarrativeError;

/// Steps of one tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStage {
    BeatSelection,
    PlanningContext,
    Planning,
    ToolExecution,
    ProseContext,
    Prose,
    FactExtraction,
    TensionEvaluation,
    FactIntegration,
    Commit,
}

impl TickStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickStage::BeatSelection => "beat_selection",
            TickStage::PlanningContext => "planning_context",
            TickStage::Planning => "planning",
            TickStage::ToolExecution => "tool_execution",
            TickStage::ProseContext => "prose_context",
            TickStage::Prose => "prose",
            TickStage::FactExtraction => "fact_extraction",
            TickStage::TensionEvaluation => "tension_evaluation",
            TickStage::FactIntegration => "fact_integration",
            TickStage::Commit => "commit",
        }
    }
}

impl fmt::Display for TickStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about a failed tick, for external inspection and retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticBundle {
    pub id: Uuid,
    pub tick: u32,
    pub stage: TickStage,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Inputs handed to collaborators before the failure, keyed by name.
    pub inputs: Map<String, Value>,
    /// Outputs produced before the failure, keyed by name.
    pub partial_outputs: Map<String, Value>,
}

impl DiagnosticBundle {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Inputs and outputs collected while a tick runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct TickTrace {
    inputs: Map<String, Value>,
    outputs: Map<String, Value>,
}

impl TickTrace {
    pub(crate) fn input<T: Serialize>(&mut self, name: &str, value: &T) {
        self.inputs.insert(name.to_string(), to_value(value));
    }

    pub(crate) fn output<T: Serialize>(&mut self, name: &str, value: &T) {
        self.outputs.insert(name.to_string(), to_value(value));
    }

    pub(crate) fn into_bundle(self, tick: u32, stage: TickStage, reason: String) -> DiagnosticBundle {
        DiagnosticBundle {
            id: Uuid::new_v4(),
            tick,
            stage,
            reason,
            timestamp: Utc::now(),
            inputs: self.inputs,
            partial_outputs: self.outputs,
        }
    }
}

/// A value that fails to serialize is recorded as its error message.
fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| Value::String(format!("<unserializable: {}>", err)))
}

/// A tick that stopped before committing.
#[derive(Debug, Error)]
#[error("tick {tick} aborted during {stage}: {error}")]
pub struct TickAborted {
    pub tick: u32,
    pub stage: TickStage,
    #[source]
    pub error: NarrativeError,
    pub diagnostic: DiagnosticBundle,
}
