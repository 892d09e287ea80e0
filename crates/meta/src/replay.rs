//! Replay memory - bounded recency buffer of solved-task rules.

use recolor_core::{ColorMap, Confidence, ReplayBuffer, ReplayEntry};
use recolor_storage::{recover, Document, Result, Storage};
use tracing::debug;

/// Records and retrieves replay entries.
#[derive(Debug, Clone, Default)]
pub struct ReplayMemory;

impl ReplayMemory {
    /// Create a replay memory.
    pub fn new() -> Self {
        Self
    }

    /// Load the buffer, empty when missing or unreadable.
    pub async fn load(&self, storage: &dyn Storage) -> ReplayBuffer {
        recover(Document::Replay, storage.load_replay().await)
    }

    /// Append a snapshot; the oldest entries beyond capacity are dropped.
    pub async fn record(
        &self,
        storage: &mut dyn Storage,
        rule_type: impl Into<String>,
        color_map: ColorMap,
        confidence: Confidence,
    ) -> Result<()> {
        let mut buffer = self.load(storage).await;
        let entry = ReplayEntry {
            rule_type: rule_type.into(),
            color_map,
            confidence: confidence.rounded(),
        };
        debug!("Replay stored {} at {}", entry.rule_type, entry.confidence);
        buffer.push(entry);
        storage.save_replay(&buffer).await
    }

    /// The highest-confidence entry, if it reaches `threshold`.
    pub async fn fetch_top(&self, storage: &dyn Storage, threshold: f64) -> Option<ReplayEntry> {
        let buffer = self.load(storage).await;
        buffer
            .best()
            .filter(|e| e.confidence.value() >= threshold)
            .cloned()
    }
}
