//! Meta-weight tuner - adjusts per-type weights based on progress.

use recolor_core::{round3, MetaWeights, TypeMemory};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Adjustment to one rule type's weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAdjustment {
    /// Rule type
    pub rule_type: String,
    /// New value
    pub value: f64,
    /// Reason for adjustment
    pub reason: String,
}

/// Tunes the meta-weight table.
#[derive(Debug, Clone, Default)]
pub struct WeightTuner;

impl WeightTuner {
    /// Create a new tuner.
    pub fn new() -> Self {
        Self
    }

    /// Recovery when confidence improved, decay otherwise, for every weight.
    pub fn suggest_decay(
        &self,
        weights: &MetaWeights,
        last: f64,
        current: f64,
    ) -> Vec<WeightAdjustment> {
        let improved = current > last;
        weights
            .0
            .iter()
            .map(|(rule_type, w)| {
                let (value, reason) = if improved {
                    (w * 1.02_f64, "confidence improved, recovering")
                } else {
                    (w * 0.97_f64, "confidence stalled, decaying")
                };
                let value = if improved { value.min(1.6) } else { value.max(0.8) };
                WeightAdjustment {
                    rule_type: rule_type.to_string(),
                    value: round3(value),
                    reason: format!("{} ({:.3} -> {:.3})", reason, last, current),
                }
            })
            .collect()
    }

    /// Reward types whose mean confidence is high, penalize low ones.
    pub fn suggest_reinforcement(
        &self,
        weights: &MetaWeights,
        memory: &TypeMemory,
    ) -> Vec<WeightAdjustment> {
        let mut adjustments = Vec::new();
        for (rule_type, record) in memory.iter() {
            let w = weights.weight(rule_type);
            if record.mean > 0.85 {
                adjustments.push(WeightAdjustment {
                    rule_type: rule_type.to_string(),
                    value: round3((w * 1.1).min(2.0)),
                    reason: format!("Mean confidence {:.3} high, reinforcing", record.mean),
                });
            } else if record.mean < 0.6 {
                adjustments.push(WeightAdjustment {
                    rule_type: rule_type.to_string(),
                    value: round3((w * 0.9).max(0.5)),
                    reason: format!("Mean confidence {:.3} low, weakening", record.mean),
                });
            }
        }
        adjustments
    }

    /// Apply an adjustment to the weight table.
    pub fn apply_adjustment(&self, weights: &mut MetaWeights, adjustment: &WeightAdjustment) {
        weights.0.insert(adjustment.rule_type.clone(), adjustment.value);
    }

    /// Load, decay or recover, and save the weight table.
    pub async fn decay(
        &self,
        storage: &mut dyn Storage,
        last: f64,
        current: f64,
    ) -> Result<MetaWeights> {
        let mut weights = recover(Document::MetaWeights, storage.load_meta_weights().await);
        for adjustment in self.suggest_decay(&weights, last, current) {
            self.apply_adjustment(&mut weights, &adjustment);
        }
        storage.save_meta_weights(&weights).await?;
        let tag = if current > last { "recover" } else { "decay" };
        info!("Meta weights {}: {:?}", tag, weights.0);
        Ok(weights)
    }

    /// Load, reinforce from rule-type memory, and save the weight table.
    pub async fn reinforce(&self, storage: &mut dyn Storage) -> Result<Vec<WeightAdjustment>> {
        let mut weights = recover(Document::MetaWeights, storage.load_meta_weights().await);
        let memory = recover(Document::TypeMemory, storage.load_type_memory().await);
        let adjustments = self.suggest_reinforcement(&weights, &memory);
        for adjustment in &adjustments {
            self.apply_adjustment(&mut weights, adjustment);
        }
        storage.save_meta_weights(&weights).await?;
        info!("Reinforced {} meta weights", adjustments.len());
        Ok(adjustments)
    }
}
