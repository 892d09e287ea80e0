//! Rehearsal - reinjects a bounded, diverse slice of the meta population
//! into the rule cache.

use recolor_core::{round3, Rule, REHEARSAL_PREFIX};
use recolor_learning::RuleStore;
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Lower bound for the relaxed distance threshold.
const MIN_RELAX: f64 = 0.05;

/// Configuration for rehearsal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RehearsalConfig {
    /// Fixed capacity; `None` sizes it from the candidate count and
    /// `Some(0)` rehearses every candidate
    pub cap: Option<usize>,
    /// Fraction of the capacity that should be mutually distant
    pub diversity: f64,
    /// Initial minimum Jaccard distance between selected maps
    pub min_sig_dist: f64,
}

impl Default for RehearsalConfig {
    fn default() -> Self {
        Self {
            cap: None,
            diversity: 0.33,
            min_sig_dist: 0.35,
        }
    }
}

/// Automatic capacity for `n` unique candidates.
pub fn auto_cap(n: usize) -> usize {
    if n <= 8 {
        return n;
    }
    let k = (4.0 * (n as f64).sqrt()).ceil() as usize;
    k.clamp(8, 64)
}

/// Selects meta-rules for rehearsal and writes them under `rehearse_*`.
#[derive(Debug, Clone, Default)]
pub struct Rehearser {
    config: RehearsalConfig,
}

impl Rehearser {
    /// Create a rehearser with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RehearsalConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity for `n` unique candidates, never above `n`.
    pub fn capacity(&self, n: usize) -> usize {
        match self.config.cap {
            Some(0) => n,
            Some(cap) => cap.min(n),
            None => auto_cap(n).min(n).max(1),
        }
    }

    /// Greedy diverse selection over candidates already sorted by confidence.
    ///
    /// Returns indices into `items`. A pass admits a candidate when its
    /// Jaccard distance to every selected map is at least the current
    /// threshold. While underfilled and short of the distinct target the
    /// threshold shrinks by 15% and the pass restarts; whatever is still
    /// missing afterwards is topped up in order, ignoring distance.
    pub fn select(&self, items: &[(String, Rule)]) -> Vec<usize> {
        let n = items.len();
        if n == 0 {
            return Vec::new();
        }
        let k = self.capacity(n);
        let target_distinct = ((self.config.diversity * k as f64).ceil() as usize).clamp(1, k);

        let mut selected: Vec<usize> = Vec::new();
        let mut relax = self.config.min_sig_dist;
        loop {
            for (i, (_, rule)) in items.iter().enumerate() {
                if selected.len() >= k {
                    break;
                }
                let far_enough = selected
                    .iter()
                    .all(|&j| rule.color_map.jaccard_distance(&items[j].1.color_map) >= relax);
                if far_enough {
                    selected.push(i);
                }
            }
            if selected.len() >= k || selected.len() >= target_distinct || relax <= MIN_RELAX {
                break;
            }
            relax = round3(relax * 0.85).max(MIN_RELAX);
            debug!("Relaxing rehearsal distance to {}", relax);
        }

        // Candidates are unique by signature, so the top-up never admits a duplicate.
        for i in 0..n {
            if selected.len() >= k {
                break;
            }
            if !selected.contains(&i) {
                selected.push(i);
            }
        }
        selected
    }

    /// Purge the rehearsal namespace and write the selected meta-rules.
    /// Returns the number written.
    pub async fn rehearse(&self, storage: &mut dyn Storage) -> Result<usize> {
        let population = recover(Document::MetaRules, storage.load_meta_rules().await);

        let mut items: Vec<(String, Rule)> = population
            .iter()
            .filter(|(_, r)| r.is_meta())
            .map(|(id, r)| (id.to_string(), r.clone()))
            .collect();
        items.sort_by(|a, b| b.1.confidence.value().total_cmp(&a.1.confidence.value()));
        let mut seen = HashSet::new();
        items.retain(|(_, r)| seen.insert(r.signature()));

        let chosen = self.select(&items);
        let entries: Vec<(String, Rule)> = chosen
            .iter()
            .enumerate()
            .map(|(pos, &i)| {
                let (id, rule) = &items[i];
                (format!("{}{}_{}", REHEARSAL_PREFIX, id, pos + 1), rule.clone())
            })
            .collect();

        if let Some((id, rule)) = entries.first() {
            debug!("Top rehearsal pick {} at {}", id, rule.confidence);
        }
        let written = RuleStore::new().replace_rehearsal(storage, entries).await?;
        info!("Rehearsed {}/{} meta-rules", written, items.len());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recolor_core::{ColorMap, MetaOrigin, MetaPopulation, RuleCache, Symbol};
    use recolor_storage::MemoryStorage;

    fn meta(pairs: &[(Symbol, Symbol)], conf: f64) -> Rule {
        Rule::meta(
            "color_map",
            MetaOrigin::Unspecified,
            pairs.iter().copied().collect::<ColorMap>(),
            conf,
        )
    }

    #[test]
    fn test_auto_cap() {
        assert_eq!(auto_cap(1), 1);
        assert_eq!(auto_cap(8), 8);
        // ceil(4 * 3) = 12
        assert_eq!(auto_cap(9), 12);
        assert_eq!(auto_cap(16), 16);
        assert_eq!(auto_cap(1000), 64);
    }

    #[test]
    fn test_explicit_cap_is_bounded_by_candidates() {
        let r = Rehearser::new().with_config(RehearsalConfig {
            cap: Some(5),
            ..Default::default()
        });
        assert_eq!(r.capacity(3), 3);
        assert_eq!(r.capacity(10), 5);
        let zero = Rehearser::new().with_config(RehearsalConfig {
            cap: Some(0),
            ..Default::default()
        });
        assert_eq!(zero.capacity(10), 10);

        let items: Vec<(String, Rule)> = (0..5u8)
            .map(|i| (format!("m{}", i), meta(&[(i, i + 1)], 0.9)))
            .collect();
        assert_eq!(zero.select(&items).len(), 5);
        assert_eq!(r.select(&items[..3]).len(), 3);
    }

    #[test]
    fn test_select_prefers_distant_maps_then_tops_up() {
        let items = vec![
            ("a".to_string(), meta(&[(0, 1), (1, 2), (2, 3)], 0.9)),
            // shares 2 of 4 union pairs with a: distance 0.5
            ("b".to_string(), meta(&[(0, 1), (1, 2), (2, 4)], 0.85)),
            ("c".to_string(), meta(&[(5, 6)], 0.8)),
        ];
        let r = Rehearser::new().with_config(RehearsalConfig {
            cap: Some(2),
            diversity: 1.0,
            min_sig_dist: 0.6,
        });
        // b is too close to a at 0.6; c is admitted
        assert_eq!(r.select(&items), vec![0, 2]);

        let full = Rehearser::new().with_config(RehearsalConfig {
            cap: Some(3),
            diversity: 1.0,
            min_sig_dist: 0.9,
        });
        let picked = full.select(&items);
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0], 0);
    }

    #[tokio::test]
    async fn test_rehearse_bounds_and_purge() {
        let mut storage = MemoryStorage::new();
        let mut population = MetaPopulation::new();
        for i in 0..12u8 {
            population.insert(
                format!("meta_div_{}", i + 1),
                meta(&[(0, i % 10), (1, i / 10)], 0.5 + f64::from(i) / 100.0),
            );
        }
        // duplicate signature and a non-meta rule are both ignored
        population.insert("dup", meta(&[(0, 0), (1, 0)], 0.1));
        population.insert("plain", Rule::base([(3, 3)].into_iter().collect(), 0.99));
        storage.save_meta_rules(&population).await.unwrap();

        let mut cache = RuleCache::new();
        cache.insert("rehearse_old_1", meta(&[(4, 4)], 0.5));
        cache.insert("abc123", Rule::base([(1, 2)].into_iter().collect(), 0.8));
        storage.save_rule_cache(&cache).await.unwrap();

        let written = Rehearser::new().rehearse(&mut storage).await.unwrap();
        // 12 unique candidates: K = clamp(ceil(4 * sqrt 12), 8, 64) = 14, bounded by N
        assert_eq!(written, 12);

        let cache = storage.load_rule_cache().await.unwrap().unwrap();
        assert!(!cache.contains_key("rehearse_old_1"));
        assert!(cache.contains_key("abc123"));
        assert_eq!(cache.len(), 13);
        // highest confidence first
        assert!(cache.contains_key("rehearse_meta_div_12_1"));
    }

    #[tokio::test]
    async fn test_empty_population_still_purges() {
        let mut storage = MemoryStorage::new();
        let mut cache = RuleCache::new();
        cache.insert("rehearse_x_1", meta(&[(4, 4)], 0.5));
        storage.save_rule_cache(&cache).await.unwrap();

        assert_eq!(Rehearser::new().rehearse(&mut storage).await.unwrap(), 0);
        let cache = storage.load_rule_cache().await.unwrap().unwrap();
        assert!(cache.is_empty());
    }
}
