//! Rule-type memory - running confidence per rule type.

use recolor_core::{round3, ColorMap, Confidence, TypeMemory};
use recolor_storage::{recover, Document, Result, Storage};
use tracing::debug;

/// Tracks how well each rule type has performed.
#[derive(Debug, Clone, Default)]
pub struct TypeMemoryTracker;

impl TypeMemoryTracker {
    /// Create a tracker.
    pub fn new() -> Self {
        Self
    }

    /// Fold one observation into a rule type's record.
    pub async fn update(
        &self,
        storage: &mut dyn Storage,
        rule_type: &str,
        confidence: Confidence,
        color_map: Option<&ColorMap>,
    ) -> Result<()> {
        let mut memory = recover(Document::TypeMemory, storage.load_type_memory().await);
        if memory.get(rule_type).is_none() {
            memory.insert(rule_type, Default::default());
        }
        if let Some(record) = memory.get_mut(rule_type) {
            record.observe(confidence, color_map);
            debug!("Memory {}: mean {:.3} over {}", rule_type, record.mean, record.count);
        }
        storage.save_type_memory(&memory).await
    }

    /// Mean of the per-type means, 0 when empty.
    pub async fn summary(&self, storage: &dyn Storage) -> f64 {
        let memory: TypeMemory = recover(Document::TypeMemory, storage.load_type_memory().await);
        if memory.is_empty() {
            return 0.0;
        }
        let total: f64 = memory.values().map(|r| r.mean).sum();
        round3(total / memory.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recolor_storage::MemoryStorage;

    #[tokio::test]
    async fn test_update_and_summary() {
        let mut storage = MemoryStorage::new();
        let tracker = TypeMemoryTracker::new();
        assert_eq!(tracker.summary(&storage).await, 0.0);

        let map: ColorMap = [(1, 2)].into_iter().collect();
        tracker
            .update(&mut storage, "meta_ensemble", Confidence::new(0.8), Some(&map))
            .await
            .unwrap();
        tracker
            .update(&mut storage, "meta_ensemble", Confidence::new(1.0), None)
            .await
            .unwrap();
        tracker
            .update(&mut storage, "color_map", Confidence::new(0.5), None)
            .await
            .unwrap();

        let memory = storage.load_type_memory().await.unwrap().unwrap();
        let record = memory.get("meta_ensemble").unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.mean, 0.9);
        assert_eq!(record.color_map, map);
        assert_eq!(tracker.summary(&storage).await, 0.7);
    }
}
