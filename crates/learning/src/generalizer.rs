//! Cross-task generalization through the rule bank.

use recolor_core::{Rule, TaskSignature};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for the generalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralizerConfig {
    /// Signature similarity a prior task must exceed to be merged
    pub min_similarity: f64,
}

impl Default for GeneralizerConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.75,
        }
    }
}

/// Reuses rules from tasks with similar signatures.
#[derive(Debug, Clone, Default)]
pub struct Generalizer {
    config: GeneralizerConfig,
}

impl Generalizer {
    /// Create a generalizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: GeneralizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Merge `rule` with the most similar banked rule and bank the result.
    ///
    /// The merged map takes the prior rule's mappings with the new rule's
    /// written on top. The result is always banked under `signature`.
    pub async fn generalize(
        &self,
        storage: &mut dyn Storage,
        signature: &TaskSignature,
        mut rule: Rule,
    ) -> Result<Rule> {
        let mut bank = recover(Document::RuleBank, storage.load_rule_bank().await);

        let mut best: Option<(&str, f64)> = None;
        for (key, _) in bank.iter() {
            let similarity = signature.similarity(&TaskSignature::from(key.to_string()));
            if similarity > best.map_or(0.0, |(_, s)| s) {
                best = Some((key, similarity));
            }
        }

        if let Some((key, similarity)) = best {
            if similarity > self.config.min_similarity {
                if let Some(prior) = bank.get(key) {
                    rule.color_map = prior.color_map.overlaid(&rule.color_map);
                    info!("Merged rule from {} (similarity {:.2})", key, similarity);
                }
            } else {
                debug!("Closest banked task {} too far ({:.2})", key, similarity);
            }
        }

        bank.insert(signature.as_str(), rule.clone());
        storage.save_rule_bank(&bank).await?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recolor_core::RuleBank;
    use recolor_storage::MemoryStorage;

    async fn seed(storage: &mut MemoryStorage, key: &str, rule: Rule) {
        let mut bank = RuleBank::new();
        bank.insert(key, rule);
        storage.save_rule_bank(&bank).await.unwrap();
    }

    #[tokio::test]
    async fn test_merges_similar_task() {
        let mut storage = MemoryStorage::new();
        seed(
            &mut storage,
            "abcdefabcdef",
            Rule::base([(1, 1), (2, 3)].into_iter().collect(), 0.7),
        )
        .await;

        // 11 of 12 characters match
        let sig = TaskSignature::from("abcdefabcdeX".to_string());
        let merged = Generalizer::new()
            .generalize(&mut storage, &sig, Rule::base([(1, 5)].into_iter().collect(), 0.8))
            .await
            .unwrap();
        assert_eq!(merged.color_map, [(1, 5), (2, 3)].into_iter().collect());

        let bank = storage.load_rule_bank().await.unwrap().unwrap();
        assert_eq!(bank.len(), 2);
        assert_eq!(bank.get(sig.as_str()), Some(&merged));
    }

    #[tokio::test]
    async fn test_dissimilar_task_is_stored_unmerged() {
        let mut storage = MemoryStorage::new();
        seed(
            &mut storage,
            "000000000000",
            Rule::base([(2, 3)].into_iter().collect(), 0.7),
        )
        .await;

        let sig = TaskSignature::from("000000111111".to_string());
        let rule = Rule::base([(1, 5)].into_iter().collect(), 0.8);
        let out = Generalizer::new()
            .generalize(&mut storage, &sig, rule.clone())
            .await
            .unwrap();
        assert_eq!(out, rule);
    }
}
