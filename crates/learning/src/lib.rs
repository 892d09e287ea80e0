//! Learning layer - rule inference, storage and cross-task reuse.

#![warn(missing_docs)]

mod blender;
mod correction;
mod generalizer;
mod learner;
mod store;

pub use blender::blend;
pub use correction::correct;
pub use generalizer::{Generalizer, GeneralizerConfig};
pub use learner::{blend_meta_rules, ConfidencePolicy, LearnerConfig, RuleLearner};
pub use store::RuleStore;
