//! Meta-rule clustering - groups similar rules into generalized meta-rules.

use recolor_core::{round3, ColorMap, MetaOrigin, Rule, RuleKind, Symbol};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// A rule joins a cluster when its distance to the cluster's first member is below this
    pub max_distance: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { max_distance: 0.3 }
    }
}

/// A clustering input: a rule type, map and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMember {
    /// Type tag of the source
    pub rule_type: String,
    /// Source map
    pub color_map: ColorMap,
    /// Source confidence
    pub confidence: f64,
}

/// Builds meta-rules from the rule cache and rule-type memory.
#[derive(Debug, Clone, Default)]
pub struct MetaClusterer {
    config: ClusterConfig,
}

impl MetaClusterer {
    /// Create a clusterer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ClusterConfig) -> Self {
        self.config = config;
        self
    }

    /// Greedy clustering: each member joins the first cluster whose first
    /// member is close enough, otherwise it starts a new cluster.
    pub fn cluster(&self, members: Vec<ClusterMember>) -> Vec<Vec<ClusterMember>> {
        let mut clusters: Vec<Vec<ClusterMember>> = Vec::new();
        for member in members {
            let home = clusters
                .iter_mut()
                .find(|c| c[0].color_map.distance(&member.color_map) < self.config.max_distance);
            match home {
                Some(cluster) => cluster.push(member),
                None => clusters.push(vec![member]),
            }
        }
        clusters
    }

    /// Merge one cluster into a `color_map_meta` rule.
    pub fn merge(&self, cluster: &[ClusterMember]) -> Rule {
        let maps: Vec<&ColorMap> = cluster.iter().map(|m| &m.color_map).collect();
        let confidence = if cluster.is_empty() {
            0.0
        } else {
            cluster.iter().map(|m| m.confidence).sum::<f64>() / cluster.len() as f64
        };
        Rule::meta(
            "color_map",
            MetaOrigin::Cluster {
                sources: cluster.iter().map(|m| m.rule_type.clone()).collect(),
                size: cluster.len(),
            },
            majority_merge(&maps),
            round3(confidence),
        )
    }

    /// Cluster every cached rule and every type-memory map, then upsert the
    /// merged rules as `meta_rule_<i>` (1-based). Other meta-rules are kept.
    pub async fn build(&self, storage: &mut dyn Storage) -> Result<Vec<(String, Rule)>> {
        let cache = recover(Document::RuleCache, storage.load_rule_cache().await);
        let memory = recover(Document::TypeMemory, storage.load_type_memory().await);

        let mut members: Vec<ClusterMember> = cache
            .values()
            .map(|r| ClusterMember {
                rule_type: r.type_tag(),
                color_map: r.color_map.clone(),
                confidence: r.confidence.value(),
            })
            .collect();
        members.extend(
            memory
                .iter()
                .filter(|(_, rec)| !rec.color_map.is_empty())
                .map(|(rule_type, rec)| ClusterMember {
                    rule_type: rule_type.to_string(),
                    color_map: rec.color_map.clone(),
                    confidence: rec.mean,
                }),
        );

        let clusters = self.cluster(members);
        let built: Vec<(String, Rule)> = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (format!("meta_rule_{}", i + 1), self.merge(c)))
            .collect();

        let mut population = recover(Document::MetaRules, storage.load_meta_rules().await);
        for (id, rule) in &built {
            debug!("{}: {} members, confidence {}", id, rule_size(rule), rule.confidence);
            population.insert(id.clone(), rule.clone());
        }
        storage.save_meta_rules(&population).await?;
        info!("Built {} meta-rules (population {})", built.len(), population.len());
        Ok(built)
    }
}

fn rule_size(rule: &Rule) -> usize {
    match &rule.kind {
        RuleKind::Meta {
            origin: MetaOrigin::Cluster { size, .. },
            ..
        } => *size,
        _ => 1,
    }
}

/// Per-key majority vote; the value seen first wins ties.
fn majority_merge(maps: &[&ColorMap]) -> ColorMap {
    let mut tally: Vec<(Symbol, Vec<(Symbol, usize)>)> = Vec::new();
    for map in maps {
        for (k, v) in map.iter() {
            let idx = match tally.iter().position(|(key, _)| *key == k) {
                Some(i) => i,
                None => {
                    tally.push((k, Vec::new()));
                    tally.len() - 1
                }
            };
            let counts = &mut tally[idx].1;
            match counts.iter_mut().find(|(value, _)| *value == v) {
                Some((_, n)) => *n += 1,
                None => counts.push((v, 1)),
            }
        }
    }
    tally
        .into_iter()
        .filter_map(|(k, counts)| {
            let mut best: Option<(Symbol, usize)> = None;
            for (v, n) in counts {
                if best.map_or(true, |(_, b)| n > b) {
                    best = Some((v, n));
                }
            }
            best.map(|(v, _)| (k, v))
        })
        .collect()
}
