//! Storage trait abstraction.

use async_trait::async_trait;
use recolor_core::{
    MetaPopulation, MetaWeights, PromotionSummary, ReplayBuffer, RuleBank, RuleCache, TypeMemory,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// The persisted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Document {
    /// Task signature -> active rule
    RuleCache,
    /// Meta-rule population
    MetaRules,
    /// Replay buffer
    Replay,
    /// Cross-task rule bank
    RuleBank,
    /// Per-rule-type memory
    TypeMemory,
    /// Meta-weight table
    MetaWeights,
    /// Promotion summaries
    PromotionHistory,
}

impl Document {
    /// Every document.
    pub const ALL: [Document; 7] = [
        Document::RuleCache,
        Document::MetaRules,
        Document::Replay,
        Document::RuleBank,
        Document::TypeMemory,
        Document::MetaWeights,
        Document::PromotionHistory,
    ];

    /// Stem used for the document file and its version marker.
    pub fn name(self) -> &'static str {
        match self {
            Document::RuleCache => "rule_cache",
            Document::MetaRules => "meta_rules",
            Document::Replay => "replay",
            Document::RuleBank => "rule_bank",
            Document::TypeMemory => "type_memory",
            Document::MetaWeights => "meta_weights",
            Document::PromotionHistory => "promotion_history",
        }
    }

    /// File name under the storage root.
    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage abstraction for the pipeline's documents.
///
/// Every document is read and written whole. Loads return `Ok(None)` when the
/// document has never been written.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Rule cache ===

    /// Save the rule cache.
    async fn save_rule_cache(&mut self, cache: &RuleCache) -> Result<()>;

    /// Load the rule cache.
    async fn load_rule_cache(&self) -> Result<Option<RuleCache>>;

    // === Meta-rule population ===

    /// Save the meta-rule population.
    async fn save_meta_rules(&mut self, population: &MetaPopulation) -> Result<()>;

    /// Load the meta-rule population.
    async fn load_meta_rules(&self) -> Result<Option<MetaPopulation>>;

    // === Replay ===

    /// Save the replay buffer.
    async fn save_replay(&mut self, replay: &ReplayBuffer) -> Result<()>;

    /// Load the replay buffer.
    async fn load_replay(&self) -> Result<Option<ReplayBuffer>>;

    // === Rule bank ===

    /// Save the cross-task rule bank.
    async fn save_rule_bank(&mut self, bank: &RuleBank) -> Result<()>;

    /// Load the cross-task rule bank.
    async fn load_rule_bank(&self) -> Result<Option<RuleBank>>;

    // === Type memory ===

    /// Save the per-rule-type memory.
    async fn save_type_memory(&mut self, memory: &TypeMemory) -> Result<()>;

    /// Load the per-rule-type memory.
    async fn load_type_memory(&self) -> Result<Option<TypeMemory>>;

    // === Meta weights ===

    /// Save the meta-weight table.
    async fn save_meta_weights(&mut self, weights: &MetaWeights) -> Result<()>;

    /// Load the meta-weight table.
    async fn load_meta_weights(&self) -> Result<Option<MetaWeights>>;

    // === Promotion history ===

    /// Save the promotion history.
    async fn save_promotion_history(&mut self, history: &[PromotionSummary]) -> Result<()>;

    /// Load the promotion history.
    async fn load_promotion_history(&self) -> Result<Option<Vec<PromotionSummary>>>;
}

/// Resolve a load result to a usable document.
///
/// A missing document becomes the default silently; an unreadable one becomes
/// the default with a warning.
pub fn recover<T: Default>(document: Document, loaded: Result<Option<T>>) -> T {
    match loaded {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!("Failed to load {}, starting empty: {}", document, e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_file_names() {
        assert_eq!(Document::RuleCache.file_name(), "rule_cache.json");
        assert_eq!(Document::PromotionHistory.file_name(), "promotion_history.json");
    }

    #[test]
    fn test_recover_falls_back_to_default() {
        let failed: Result<Option<RuleCache>> = Err(StorageError::Other("boom".into()));
        assert!(recover(Document::RuleCache, failed).is_empty());

        let missing: Result<Option<Vec<PromotionSummary>>> = Ok(None);
        assert!(recover(Document::PromotionHistory, missing).is_empty());

        let weights = recover::<MetaWeights>(Document::MetaWeights, Ok(None));
        assert_eq!(weights, MetaWeights::default());
    }
}
