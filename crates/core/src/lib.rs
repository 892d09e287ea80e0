//! Recolor core data models.
//!
//! This crate defines the grids, color maps, rules and persisted documents
//! shared by every stage of the rule-evolution pipeline.

#![warn(missing_docs)]

// Identities and signatures
mod id;
mod signature;

// Grids and geometry
mod grid;
mod transform;

// Rules
mod color_map;
mod rule;

// Tasks and persisted documents
mod task;
mod document;

// Re-exports
pub use id::RunId;
pub use signature::{RuleSignature, TaskSignature};

pub use grid::{Grid, GridError};
pub use transform::Transform;

pub use color_map::{clamp_symbol, ColorMap, Symbol, MAX_SYMBOL};
pub use rule::{Confidence, MetaOrigin, Rule, RuleError, RuleKind};

pub use task::{color_map_accuracy, Task, TestInput, TrainPair};
pub use document::{
    MetaPopulation, MetaWeights, OrderedMap, PromotionSummary, ReplayBuffer, ReplayEntry,
    RuleBank, RuleCache, TypeMemory, TypeRecord, REHEARSAL_PREFIX, REPLAY_CAPACITY,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Round a score to three decimals, the precision every persisted confidence uses.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
