//! Population metrics for evolution.

use recolor_core::{round3, RuleCache, REHEARSAL_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics about the rule cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Number of cached rules
    pub rules: usize,
    /// Rules by type tag
    pub by_type: BTreeMap<String, usize>,
    /// Mean confidence, 3 decimals
    pub mean_confidence: f64,
    /// Entries in the rehearsal namespace
    pub rehearsal_entries: usize,
}

impl CacheStatistics {
    /// Compute statistics over a cache.
    pub fn of(cache: &RuleCache) -> Self {
        let mut stats = CacheStatistics {
            rules: cache.len(),
            ..Default::default()
        };
        let mut total = 0.0;
        for (key, rule) in cache.iter() {
            *stats.by_type.entry(rule.type_tag()).or_default() += 1;
            total += rule.confidence.value();
            if key.starts_with(REHEARSAL_PREFIX) {
                stats.rehearsal_entries += 1;
            }
        }
        if !cache.is_empty() {
            stats.mean_confidence = round3(total / cache.len() as f64);
        }
        stats
    }
}

/// Outcome of one evolution pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionReport {
    /// Rules changed by meta-mutation
    pub mutated: usize,
    /// Rules rewritten by the amplifier
    pub amplified: usize,
    /// Cache statistics after the pass
    pub cache: CacheStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use recolor_core::Rule;

    #[test]
    fn test_cache_statistics() {
        let mut cache = RuleCache::new();
        cache.insert("a", Rule::base([(1, 2)].into_iter().collect(), 0.8));
        cache.insert(format!("{}x_1", REHEARSAL_PREFIX), Rule::identity(0.5));
        cache.insert("rehearsed", Rule::identity(0.5));
        let stats = CacheStatistics::of(&cache);
        assert_eq!(stats.rules, 3);
        assert_eq!(stats.mean_confidence, 0.6);
        assert_eq!(stats.rehearsal_entries, 1);
        assert_eq!(stats.by_type.get("identity"), Some(&2));
    }
}
