//! Adaptive promoter - lifts strong replay entries into the meta population.

use recolor_core::{round3, MetaOrigin, PromotionSummary, Rule, RunId};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration for the promoter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoterConfig {
    /// Base threshold; the dynamic threshold never drops below 80% of it
    pub base_threshold: f64,
    /// Standard deviations above the mean the threshold sits at
    pub stddev_weight: f64,
}

impl Default for PromoterConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.9,
            stddev_weight: 0.25,
        }
    }
}

/// Promotes replay entries whose confidence clears a dynamic threshold.
#[derive(Debug, Clone, Default)]
pub struct Promoter {
    config: PromoterConfig,
}

impl Promoter {
    /// Create a promoter with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: PromoterConfig) -> Self {
        self.config = config;
        self
    }

    /// `round3(max(base * 0.8, mean + w * pstdev))` over the given confidences.
    pub fn threshold(&self, confidences: &[f64]) -> f64 {
        let floor = self.config.base_threshold * 0.8;
        if confidences.is_empty() {
            return round3(floor);
        }
        let n = confidences.len() as f64;
        let mean = confidences.iter().sum::<f64>() / n;
        let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        round3(floor.max(mean + self.config.stddev_weight * variance.sqrt()))
    }

    /// Append every replay entry at or above the threshold as a `<type>_meta`
    /// rule, then append a summary to the promotion history.
    pub async fn promote(&self, storage: &mut dyn Storage) -> Result<PromotionSummary> {
        let replay = recover(Document::Replay, storage.load_replay().await);
        let confidences: Vec<f64> = replay
            .entries()
            .iter()
            .map(|e| e.confidence.value())
            .collect();
        let threshold = self.threshold(&confidences);

        let mut promoted = 0;
        if !replay.is_empty() {
            let mut population = recover(Document::MetaRules, storage.load_meta_rules().await);
            for entry in replay.entries() {
                if entry.confidence.value() < threshold {
                    continue;
                }
                let id = population.next_id("meta_promote_");
                population.insert(
                    id,
                    Rule::meta(
                        entry.rule_type.clone(),
                        MetaOrigin::Promoted,
                        entry.color_map.clone(),
                        entry.confidence,
                    ),
                );
                promoted += 1;
            }
            if promoted > 0 {
                storage.save_meta_rules(&population).await?;
            }
        }

        if promoted > 0 {
            info!("Promoted {} replay rules (threshold {})", promoted, threshold);
        } else {
            info!("No replay rules passed threshold {}", threshold);
        }

        let summary = PromotionSummary {
            run_id: RunId::new(),
            timestamp: chrono::Utc::now(),
            threshold,
            promoted,
            replay_size: replay.len(),
        };
        let mut history = recover(
            Document::PromotionHistory,
            storage.load_promotion_history().await,
        );
        history.push(summary.clone());
        storage.save_promotion_history(&history).await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recolor_core::{ColorMap, Confidence, ReplayBuffer, ReplayEntry};
    use recolor_storage::MemoryStorage;

    async fn with_replay(confidences: &[f64]) -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        let mut buffer = ReplayBuffer::new();
        for (i, c) in confidences.iter().enumerate() {
            buffer.push(ReplayEntry {
                rule_type: "meta_ensemble".into(),
                color_map: [(i as u8, 1)].into_iter().collect(),
                confidence: Confidence::new(*c),
            });
        }
        storage.save_replay(&buffer).await.unwrap();
        storage
    }

    #[test]
    fn test_threshold_arithmetic() {
        // mean 0.94667, pstdev 0.03682 -> 0.95587
        assert_eq!(Promoter::new().threshold(&[0.9, 0.95, 0.99]), 0.956);
        assert_eq!(Promoter::new().threshold(&[0.1, 0.1]), 0.72);
        assert_eq!(Promoter::new().threshold(&[]), 0.72);
    }

    #[tokio::test]
    async fn test_only_top_entry_promoted() {
        let mut storage = with_replay(&[0.9, 0.95, 0.99]).await;
        let summary = Promoter::new().promote(&mut storage).await.unwrap();
        assert_eq!(summary.threshold, 0.956);
        assert_eq!(summary.promoted, 1);
        assert_eq!(summary.replay_size, 3);

        let population = storage.load_meta_rules().await.unwrap().unwrap();
        assert_eq!(population.len(), 1);
        let (id, rule) = population.iter().next().unwrap();
        assert_eq!(id, "meta_promote_1");
        assert_eq!(rule.type_tag(), "meta_ensemble_meta");
        assert_eq!(rule.confidence.value(), 0.99);
        assert_eq!(rule.color_map, [(2, 1)].into_iter().collect::<ColorMap>());
    }

    #[tokio::test]
    async fn test_promotion_appends_and_records_history() {
        let mut storage = with_replay(&[0.99]).await;
        let promoter = Promoter::new();
        promoter.promote(&mut storage).await.unwrap();
        promoter.promote(&mut storage).await.unwrap();

        let population = storage.load_meta_rules().await.unwrap().unwrap();
        assert_eq!(
            population.keys().collect::<Vec<_>>(),
            vec!["meta_promote_1", "meta_promote_2"]
        );
        let history = storage.load_promotion_history().await.unwrap().unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_replay_promotes_nothing() {
        let mut storage = MemoryStorage::new();
        let summary = Promoter::new().promote(&mut storage).await.unwrap();
        assert_eq!(summary.promoted, 0);
        assert!(storage.load_meta_rules().await.unwrap().is_none());
    }
}
