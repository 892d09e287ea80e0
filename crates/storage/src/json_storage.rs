//! JSON file storage implementation.
//!
//! Stores one pretty-printed JSON file per document under the root and keeps a
//! small per-document meta marker (version + updated_at) under `meta/`.

use super::{Document, Result, Storage};
use recolor_core::{
    MetaPopulation, MetaWeights, PromotionSummary, ReplayBuffer, RuleBank, RuleCache, TypeMemory,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    /// Create storage, creating the root and its `meta/` directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("meta")).await?;
        Ok(Self { root })
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a document file.
    pub fn path(&self, document: Document) -> PathBuf {
        self.root.join(document.file_name())
    }

    fn meta_path(&self, document: Document) -> PathBuf {
        self.root
            .join("meta")
            .join(format!("{}.meta.json", document.name()))
    }

    /// Read and increment the per-document version, return new version.
    async fn bump_version(&self, document: Document) -> Result<u64> {
        let path = self.meta_path(document);
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    /// Current version of a document, 0 when never written.
    pub async fn version(&self, document: Document) -> u64 {
        match fs::read_to_string(self.meta_path(document)).await {
            Ok(s) => serde_json::from_str::<serde_json::Value>(&s)
                .ok()
                .and_then(|json| json.get("version").and_then(|v| v.as_u64()))
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    async fn write_document<T: Serialize + ?Sized>(
        &self,
        document: Document,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(self.path(document), json.as_bytes()).await?;
        let version = self.bump_version(document).await?;
        debug!("Saved {} (version {})", document, version);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_rule_cache(&mut self, cache: &RuleCache) -> Result<()> {
        self.write_document(Document::RuleCache, cache).await
    }

    async fn load_rule_cache(&self) -> Result<Option<RuleCache>> {
        read_json(&self.path(Document::RuleCache)).await
    }

    async fn save_meta_rules(&mut self, population: &MetaPopulation) -> Result<()> {
        self.write_document(Document::MetaRules, population).await
    }

    async fn load_meta_rules(&self) -> Result<Option<MetaPopulation>> {
        read_json(&self.path(Document::MetaRules)).await
    }

    async fn save_replay(&mut self, replay: &ReplayBuffer) -> Result<()> {
        self.write_document(Document::Replay, replay).await
    }

    async fn load_replay(&self) -> Result<Option<ReplayBuffer>> {
        read_json(&self.path(Document::Replay)).await
    }

    async fn save_rule_bank(&mut self, bank: &RuleBank) -> Result<()> {
        self.write_document(Document::RuleBank, bank).await
    }

    async fn load_rule_bank(&self) -> Result<Option<RuleBank>> {
        read_json(&self.path(Document::RuleBank)).await
    }

    async fn save_type_memory(&mut self, memory: &TypeMemory) -> Result<()> {
        self.write_document(Document::TypeMemory, memory).await
    }

    async fn load_type_memory(&self) -> Result<Option<TypeMemory>> {
        read_json(&self.path(Document::TypeMemory)).await
    }

    async fn save_meta_weights(&mut self, weights: &MetaWeights) -> Result<()> {
        self.write_document(Document::MetaWeights, weights).await
    }

    async fn load_meta_weights(&self) -> Result<Option<MetaWeights>> {
        read_json(&self.path(Document::MetaWeights)).await
    }

    async fn save_promotion_history(&mut self, history: &[PromotionSummary]) -> Result<()> {
        self.write_document(Document::PromotionHistory, history).await
    }

    async fn load_promotion_history(&self) -> Result<Option<Vec<PromotionSummary>>> {
        read_json(&self.path(Document::PromotionHistory)).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recover;
    use recolor_core::{Confidence, ReplayEntry, Rule};

    #[tokio::test]
    async fn test_rule_cache_roundtrip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();

        let mut cache = RuleCache::new();
        cache.insert("zzz", Rule::base([(1, 2)].into_iter().collect(), 0.8));
        cache.insert("aaa", Rule::identity(0.5));
        storage.save_rule_cache(&cache).await.unwrap();

        let loaded = storage.load_rule_cache().await.unwrap().unwrap();
        assert_eq!(loaded, cache);
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["zzz", "aaa"]);
    }

    #[tokio::test]
    async fn test_missing_document_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.load_replay().await.unwrap().is_none());
        assert_eq!(storage.version(Document::Replay).await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_document_recovers_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        fs::write(storage.path(Document::MetaRules), b"{not json")
            .await
            .unwrap();

        let loaded = storage.load_meta_rules().await;
        assert!(loaded.is_err());
        assert!(recover(Document::MetaRules, loaded).is_empty());
    }

    #[tokio::test]
    async fn test_save_bumps_version_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();

        let mut replay = ReplayBuffer::new();
        replay.push(ReplayEntry {
            rule_type: "color_map".into(),
            color_map: [(0, 1)].into_iter().collect(),
            confidence: Confidence::new(0.9),
        });
        storage.save_replay(&replay).await.unwrap();
        storage.save_replay(&replay).await.unwrap();

        assert_eq!(storage.version(Document::Replay).await, 2);
        assert_eq!(storage.load_replay().await.unwrap(), Some(replay));
    }
}
