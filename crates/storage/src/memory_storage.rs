//! In-memory storage backend.
//!
//! Documents are kept as serialized JSON so loads go through the same
//! decoding path as the file backend.

use super::{Document, Result, Storage};
use recolor_core::{
    MetaPopulation, MetaWeights, PromotionSummary, ReplayBuffer, RuleBank, RuleCache, TypeMemory,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Storage that lives for the duration of the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    documents: HashMap<Document, String>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a document with raw text, bypassing serialization.
    pub fn put_raw(&mut self, document: Document, raw: impl Into<String>) {
        self.documents.insert(document, raw.into());
    }

    /// Raw text of a document, if written.
    pub fn raw(&self, document: Document) -> Option<&str> {
        self.documents.get(&document).map(String::as_str)
    }

    fn write<T: Serialize + ?Sized>(&mut self, document: Document, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.documents.insert(document, json);
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, document: Document) -> Result<Option<T>> {
        match self.documents.get(&document) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn save_rule_cache(&mut self, cache: &RuleCache) -> Result<()> {
        self.write(Document::RuleCache, cache)
    }

    async fn load_rule_cache(&self) -> Result<Option<RuleCache>> {
        self.read(Document::RuleCache)
    }

    async fn save_meta_rules(&mut self, population: &MetaPopulation) -> Result<()> {
        self.write(Document::MetaRules, population)
    }

    async fn load_meta_rules(&self) -> Result<Option<MetaPopulation>> {
        self.read(Document::MetaRules)
    }

    async fn save_replay(&mut self, replay: &ReplayBuffer) -> Result<()> {
        self.write(Document::Replay, replay)
    }

    async fn load_replay(&self) -> Result<Option<ReplayBuffer>> {
        self.read(Document::Replay)
    }

    async fn save_rule_bank(&mut self, bank: &RuleBank) -> Result<()> {
        self.write(Document::RuleBank, bank)
    }

    async fn load_rule_bank(&self) -> Result<Option<RuleBank>> {
        self.read(Document::RuleBank)
    }

    async fn save_type_memory(&mut self, memory: &TypeMemory) -> Result<()> {
        self.write(Document::TypeMemory, memory)
    }

    async fn load_type_memory(&self) -> Result<Option<TypeMemory>> {
        self.read(Document::TypeMemory)
    }

    async fn save_meta_weights(&mut self, weights: &MetaWeights) -> Result<()> {
        self.write(Document::MetaWeights, weights)
    }

    async fn load_meta_weights(&self) -> Result<Option<MetaWeights>> {
        self.read(Document::MetaWeights)
    }

    async fn save_promotion_history(&mut self, history: &[PromotionSummary]) -> Result<()> {
        self.write(Document::PromotionHistory, history)
    }

    async fn load_promotion_history(&self) -> Result<Option<Vec<PromotionSummary>>> {
        self.read(Document::PromotionHistory)
    }
}
