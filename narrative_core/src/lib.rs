//! # Narrative Core (The Cortex)
//!
//! The engine that keeps a long-running generated story coherent. It owns
//! the story bible, assembles bounded context for each generation stage,
//! folds extracted facts back into the bible, grades the tension of finished
//! prose, and sequences all of it one tick (one scene) at a time.
//!
//! ## Core Components
//!
//! - **entity_store**: Typed, ID-allocating persistence for every narrative record
//! - **semantic_index**: Similarity search over stored entities, kept in sync on write
//! - **context_assembler**: Builds fixed-size planning and prose bundles
//! - **fact_integration**: Applies fact deltas, with POV-switch detection
//! - **tension**: Scores prose on the 0-10 tension scale and tracks pacing
//! - **plot_outline**: The beat queue and its forward-only state machine
//! - **orchestrator**: Runs ticks against pluggable generation collaborators
//!
//! ## Design Philosophy
//!
//! - **Single Source of Truth**: Every fact lives in the entity store; the index is derived
//! - **Bounded Context**: Bundle size depends on configuration, never on story length
//! - **Retryable Ticks**: A failed tick leaves a diagnostic and can simply be run again

pub mod config;
pub mod context_assembler;
pub mod entity_store;
pub mod error;
pub mod fact_integration;
pub mod orchestrator;
pub mod plot_outline;
pub mod semantic_index;
pub mod story_state;
pub mod tension;

pub use config::*;
pub use context_assembler::*;
pub use entity_store::*;
pub use error::*;
pub use fact_integration::*;
pub use orchestrator::*;
pub use plot_outline::*;
pub use semantic_index::*;
pub use story_state::*;
pub use tension::*;
