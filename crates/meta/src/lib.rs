//! Recolor meta-learning.
//!
//! Rule-type memory, the replay buffer, and the consolidation stages that
//! grow the meta population: clustering, adaptive promotion,
//! diversification and rehearsal back into the rule cache.

#![warn(missing_docs)]

mod cluster;
mod diversify;
mod memory;
mod promoter;
mod rehearse;
mod replay;

pub use cluster::{ClusterConfig, ClusterMember, MetaClusterer};
pub use diversify::{pair_support, prune_weakest, Diversifier, DiversifyConfig, Variant};
pub use memory::TypeMemoryTracker;
pub use promoter::{Promoter, PromoterConfig};
pub use rehearse::{auto_cap, RehearsalConfig, Rehearser};
pub use replay::ReplayMemory;
