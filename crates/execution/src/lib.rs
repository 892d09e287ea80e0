//! Execution layer - the per-task solve flow and the evolution and
//! consolidation passes over a storage backend.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod solver;

pub use config::{EngineConfig, SolverConfig};
pub use engine::{ConsolidationReport, ExecutionEngine, StatusReport};
pub use solver::{Solution, Solver};
