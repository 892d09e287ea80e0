//! Evolution layer - stochastic exploration and meta-weight tuning.

#![warn(missing_docs)]

mod amplifier;
mod metrics;
mod mutation;
mod weights;

pub use amplifier::{Amplifier, AmplifierConfig};
pub use metrics::{CacheStatistics, EvolutionReport};
pub use mutation::{mutate_color_map, mutate_keys, nudge, MutationConfig, Mutator};
pub use weights::{WeightAdjustment, WeightTuner};
