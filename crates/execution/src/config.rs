//! Engine configuration.

use recolor_ensemble::EnsembleConfig;
use recolor_evolution::{AmplifierConfig, MutationConfig};
use recolor_learning::{GeneralizerConfig, LearnerConfig};
use recolor_meta::{ClusterConfig, DiversifyConfig, PromoterConfig, RehearsalConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Solve-flow switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Merge each rule with its closest banked rule
    pub generalize: bool,
    /// Try a self-corrected blend and keep it when it scores higher
    pub self_correct: bool,
    /// Rule type recorded in type memory and replay after each solve
    pub memory_type: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            generalize: true,
            self_correct: true,
            memory_type: "meta_ensemble".to_string(),
        }
    }
}

/// Configuration for every stage the engine drives.
///
/// Any field missing from a config file takes its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule inference
    pub learner: LearnerConfig,
    /// Cross-task generalization
    pub generalizer: GeneralizerConfig,
    /// Solve flow
    pub solver: SolverConfig,
    /// Ensemble prediction
    pub ensemble: EnsembleConfig,
    /// Meta-mutation
    pub mutation: MutationConfig,
    /// Stagnation amplifier
    pub amplifier: AmplifierConfig,
    /// Meta-rule clustering
    pub cluster: ClusterConfig,
    /// Replay promotion
    pub promoter: PromoterConfig,
    /// Variant synthesis
    pub diversify: DiversifyConfig,
    /// Rehearsal selection
    pub rehearsal: RehearsalConfig,
    /// Seed for the engine's random source; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Load a JSON config file.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{
            "rehearsal": {"cap": 24, "diversity": 0.5},
            "ensemble": {"top_k": 3},
            "seed": 7
        }"#;
        let config: EngineConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.rehearsal.cap, Some(24));
        assert_eq!(config.rehearsal.diversity, 0.5);
        assert_eq!(config.rehearsal.min_sig_dist, 0.35);
        assert_eq!(config.ensemble.top_k, 3);
        assert_eq!(config.diversify.target, 24);
        assert_eq!(config.solver.memory_type, "meta_ensemble");
        assert_eq!(config.seed, Some(7));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        tokio::fs::write(&path, r#"{"promoter": {"base_threshold": 0.8}}"#)
            .await
            .unwrap();
        let config = EngineConfig::load(&path).await.unwrap();
        assert_eq!(config.promoter.base_threshold, 0.8);
        assert!(EngineConfig::load(&dir.path().join("missing.json")).await.is_err());
    }
}
