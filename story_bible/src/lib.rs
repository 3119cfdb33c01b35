//! # Story Bible
//!
//! The "Story Bible" crate - every narrative record the engine tracks, the
//! identifiers that address them, and the pacing primitives used to grade
//! scenes. This crate is pure data: it performs no I/O and contains no
//! generation or integration logic.

pub mod entities;
pub mod pacing;

pub use entities::*;
pub use pacing::*;
