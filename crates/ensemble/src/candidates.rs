//! Candidate rule gathering.

use async_trait::async_trait;
use recolor_core::{Rule, RuleSignature, Task};
use recolor_learning::RuleStore;
use recolor_storage::{recover, Document, Storage};
use std::collections::HashMap;

/// A rule offered to the ensemble, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The rule
    pub rule: Rule,
    /// Provenance, e.g. `meta:meta_rule_1` or `replay:3`
    pub origin: String,
}

impl Candidate {
    /// Create a candidate.
    pub fn new(rule: Rule, origin: impl Into<String>) -> Self {
        Self {
            rule,
            origin: origin.into(),
        }
    }
}

/// A source of candidate rules for one task.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Collect candidates from storage. Missing documents yield nothing.
    async fn collect(&self, storage: &dyn Storage, task: &Task) -> Vec<Candidate>;
}

/// The task's own stored rule.
pub struct StoredRuleSource;

#[async_trait]
impl CandidateSource for StoredRuleSource {
    async fn collect(&self, storage: &dyn Storage, task: &Task) -> Vec<Candidate> {
        let signature = task.signature();
        RuleStore::new()
            .get(storage, &signature)
            .await
            .map(|rule| Candidate::new(rule, format!("cache:{}", signature)))
            .into_iter()
            .collect()
    }
}

/// Rules injected under the rehearsal namespace.
pub struct RehearsalSource;

#[async_trait]
impl CandidateSource for RehearsalSource {
    async fn collect(&self, storage: &dyn Storage, _task: &Task) -> Vec<Candidate> {
        RuleStore::new()
            .rehearsal_rules(storage)
            .await
            .into_iter()
            .filter(|(_, rule)| !rule.color_map.is_empty())
            .map(|(key, rule)| Candidate::new(rule, format!("cache:{}", key)))
            .collect()
    }
}

/// Meta-rules from the population.
pub struct MetaSource;

#[async_trait]
impl CandidateSource for MetaSource {
    async fn collect(&self, storage: &dyn Storage, _task: &Task) -> Vec<Candidate> {
        let population = recover(Document::MetaRules, storage.load_meta_rules().await);
        population
            .iter()
            .filter(|(_, rule)| rule.is_meta() && !rule.color_map.is_empty())
            .map(|(id, rule)| Candidate::new(rule.clone(), format!("meta:{}", id)))
            .collect()
    }
}

/// Replay buffer entries, as base rules.
pub struct ReplaySource;

#[async_trait]
impl CandidateSource for ReplaySource {
    async fn collect(&self, storage: &dyn Storage, _task: &Task) -> Vec<Candidate> {
        let replay = recover(Document::Replay, storage.load_replay().await);
        replay
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.color_map.is_empty())
            .map(|(i, entry)| {
                Candidate::new(
                    Rule::base(entry.color_map.clone(), entry.confidence),
                    format!("replay:{}", i),
                )
            })
            .collect()
    }
}

/// The identity map, always offered.
pub struct IdentityFallback {
    /// Confidence of the fallback
    pub confidence: f64,
}

impl Default for IdentityFallback {
    fn default() -> Self {
        Self { confidence: 0.5 }
    }
}

#[async_trait]
impl CandidateSource for IdentityFallback {
    async fn collect(&self, _storage: &dyn Storage, _task: &Task) -> Vec<Candidate> {
        vec![Candidate::new(
            Rule::identity(self.confidence),
            "fallback:identity",
        )]
    }
}

/// Ordered list of candidate sources.
pub struct CandidatePool {
    sources: Vec<Box<dyn CandidateSource>>,
}

impl CandidatePool {
    /// The standard pool: stored rule, rehearsal, meta, replay, identity.
    pub fn standard(identity_confidence: f64) -> Self {
        Self {
            sources: vec![
                Box::new(StoredRuleSource),
                Box::new(RehearsalSource),
                Box::new(MetaSource),
                Box::new(ReplaySource),
                Box::new(IdentityFallback {
                    confidence: identity_confidence,
                }),
            ],
        }
    }

    /// An empty pool.
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Append a source.
    pub fn with_source(mut self, source: Box<dyn CandidateSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Gather from every source in order, then dedupe.
    pub async fn gather(&self, storage: &dyn Storage, task: &Task) -> Vec<Candidate> {
        let mut all = Vec::new();
        for source in &self.sources {
            all.extend(source.collect(storage, task).await);
        }
        dedupe(all)
    }
}

impl Default for CandidatePool {
    fn default() -> Self {
        Self::standard(0.5)
    }
}

/// One candidate per map signature: the slot of the first occurrence,
/// holding the highest-confidence occurrence.
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut slots: HashMap<RuleSignature, usize> = HashMap::new();
    let mut out: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let signature = candidate.rule.signature();
        match slots.get(&signature) {
            Some(&i) => {
                if candidate.rule.confidence.value() > out[i].rule.confidence.value() {
                    out[i] = candidate;
                }
            }
            None => {
                slots.insert(signature, out.len());
                out.push(candidate);
            }
        }
    }
    out
}
