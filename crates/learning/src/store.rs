//! Rule store - one active rule per task signature.

use crate::RuleLearner;
use rand::Rng;
use recolor_core::{Rule, RuleCache, Task, TaskSignature, REHEARSAL_PREFIX};
use recolor_storage::{recover, Document, Result, Storage};
use tracing::{debug, info};

/// Keyed access to the rule cache document.
#[derive(Debug, Clone, Default)]
pub struct RuleStore;

impl RuleStore {
    /// Create a store.
    pub fn new() -> Self {
        Self
    }

    /// Load the whole cache, empty when missing or unreadable.
    pub async fn load(&self, storage: &dyn Storage) -> RuleCache {
        recover(Document::RuleCache, storage.load_rule_cache().await)
    }

    /// Look up the rule stored for a task signature.
    pub async fn get(&self, storage: &dyn Storage, signature: &TaskSignature) -> Option<Rule> {
        self.load(storage).await.get(signature.as_str()).cloned()
    }

    /// Store a rule, overwriting any previous one for the signature.
    pub async fn put(
        &self,
        storage: &mut dyn Storage,
        signature: &TaskSignature,
        rule: Rule,
    ) -> Result<()> {
        let mut cache = self.load(storage).await;
        debug!("Storing {} rule for {}", rule.type_tag(), signature);
        cache.insert(signature.as_str(), rule);
        storage.save_rule_cache(&cache).await
    }

    /// Return the stored rule for the task, learning and storing one if absent.
    ///
    /// A stored rule is returned as is; nothing is relearned or rewritten.
    pub async fn get_or_learn<R: Rng + ?Sized>(
        &self,
        storage: &mut dyn Storage,
        learner: &RuleLearner,
        task: &Task,
        rng: &mut R,
    ) -> Result<Rule> {
        let signature = task.signature();
        if let Some(rule) = self.get(storage, &signature).await {
            debug!("Reusing stored rule for {}", signature);
            return Ok(rule);
        }
        let meta = recover(Document::MetaRules, storage.load_meta_rules().await);
        let rule = learner.learn(&task.train, &meta, rng);
        self.put(storage, &signature, rule.clone()).await?;
        Ok(rule)
    }

    /// Rehearsal entries currently in the cache.
    pub async fn rehearsal_rules(&self, storage: &dyn Storage) -> Vec<(String, Rule)> {
        self.load(storage)
            .await
            .iter()
            .filter(|(k, _)| k.starts_with(REHEARSAL_PREFIX))
            .map(|(k, r)| (k.to_string(), r.clone()))
            .collect()
    }

    /// Purge every rehearsal entry and write the given ones in a single save.
    pub async fn replace_rehearsal(
        &self,
        storage: &mut dyn Storage,
        entries: Vec<(String, Rule)>,
    ) -> Result<usize> {
        let mut cache = self.load(storage).await;
        let before = cache.len();
        cache.retain(|k, _| !k.starts_with(REHEARSAL_PREFIX));
        let purged = before - cache.len();

        let written = entries.len();
        for (key, rule) in entries {
            cache.insert(key, rule);
        }
        storage.save_rule_cache(&cache).await?;
        info!("Rehearsal namespace rewritten: purged {}, wrote {}", purged, written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use recolor_core::{Grid, TestInput, TrainPair};
    use recolor_storage::MemoryStorage;

    fn task() -> Task {
        Task::new(
            "t1",
            vec![TrainPair {
                input: Grid::new(vec![vec![1]]).unwrap(),
                output: Grid::new(vec![vec![2]]).unwrap(),
            }],
            vec![TestInput {
                input: Grid::new(vec![vec![1]]).unwrap(),
            }],
        )
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let mut storage = MemoryStorage::new();
        let store = RuleStore::new();
        let sig = task().signature();
        store.put(&mut storage, &sig, Rule::identity(0.5)).await.unwrap();
        store
            .put(&mut storage, &sig, Rule::base([(1, 2)].into_iter().collect(), 0.8))
            .await
            .unwrap();
        let cache = store.load(&storage).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(store.get(&storage, &sig).await.unwrap().type_tag(), "color_map");
    }

    #[tokio::test]
    async fn test_get_or_learn_is_idempotent() {
        let mut storage = MemoryStorage::new();
        let store = RuleStore::new();
        let learner = RuleLearner::new();
        let mut rng = StdRng::seed_from_u64(3);

        let first = store
            .get_or_learn(&mut storage, &learner, &task(), &mut rng)
            .await
            .unwrap();
        let snapshot = storage.raw(Document::RuleCache).map(str::to_string);
        let second = store
            .get_or_learn(&mut storage, &learner, &task(), &mut rng)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.color_map, [(1, 2)].into_iter().collect());
        assert_eq!(storage.raw(Document::RuleCache).map(str::to_string), snapshot);
    }

    #[tokio::test]
    async fn test_replace_rehearsal_purges_stale_entries() {
        let mut storage = MemoryStorage::new();
        let store = RuleStore::new();
        let sig = task().signature();
        store.put(&mut storage, &sig, Rule::identity(0.5)).await.unwrap();
        store
            .replace_rehearsal(
                &mut storage,
                vec![
                    ("rehearse_a_0".into(), Rule::identity(0.6)),
                    ("rehearse_a_1".into(), Rule::identity(0.7)),
                ],
            )
            .await
            .unwrap();
        store
            .replace_rehearsal(&mut storage, vec![("rehearse_b_0".into(), Rule::identity(0.9))])
            .await
            .unwrap();

        let keys: Vec<String> = store
            .rehearsal_rules(&storage)
            .await
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["rehearse_b_0".to_string()]);
        assert!(store.get(&storage, &sig).await.is_some());
    }
}
