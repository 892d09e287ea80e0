//! Ensemble prediction - ranks (rule × transform) pipelines on the training
//! pairs and emits multi-attempt predictions for the test inputs.

#![warn(missing_docs)]

pub mod candidates;
pub mod predictor;

pub use candidates::{
    dedupe, Candidate, CandidatePool, CandidateSource, IdentityFallback, MetaSource,
    RehearsalSource, ReplaySource, StoredRuleSource,
};
pub use predictor::{EnsembleConfig, EnsemblePredictor, Pipeline, Prediction};
