//! Stochastic local search over cached color maps.

use rand::seq::SliceRandom;
use rand::Rng;
use recolor_core::{round3, ColorMap, Confidence, Symbol};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Shift a symbol by ±1 modulo 10, direction chosen uniformly.
pub fn nudge<R: Rng + ?Sized>(symbol: Symbol, rng: &mut R) -> Symbol {
    if rng.random_bool(0.5) {
        (symbol + 1) % 10
    } else {
        (symbol + 9) % 10
    }
}

/// Copy of `map` where each key independently, with probability `rate`, is nudged.
pub fn mutate_color_map<R: Rng + ?Sized>(map: &ColorMap, rate: f64, rng: &mut R) -> ColorMap {
    map.iter()
        .map(|(k, v)| {
            if rng.random::<f64>() < rate {
                (k, nudge(v, rng))
            } else {
                (k, v)
            }
        })
        .collect()
}

/// Copy of `map` with exactly `max(1, floor(len * intensity))` shuffled keys nudged.
pub fn mutate_keys<R: Rng + ?Sized>(map: &ColorMap, intensity: f64, rng: &mut R) -> ColorMap {
    if map.is_empty() {
        return ColorMap::new();
    }
    let mut keys: Vec<Symbol> = map.keys().collect();
    let n = ((keys.len() as f64 * intensity).floor() as usize).max(1);
    keys.shuffle(rng);

    let mut mutated = map.clone();
    for k in keys.into_iter().take(n) {
        if let Some(v) = mutated.get(k) {
            mutated.insert(k, nudge(v, rng));
        }
    }
    mutated
}

/// Configuration for meta-mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Probability that a cached rule is mutated
    pub rule_probability: f64,
    /// Per-key mutation rate within a mutated rule
    pub rate: f64,
    /// Lower bound of the multiplicative confidence jitter
    pub jitter_min: f64,
    /// Upper bound of the multiplicative confidence jitter
    pub jitter_max: f64,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            rule_probability: 0.5,
            rate: 0.3,
            jitter_min: 0.9,
            jitter_max: 1.1,
        }
    }
}

/// Explores around cached rules by random perturbation.
#[derive(Debug, Clone, Default)]
pub struct Mutator {
    config: MutationConfig,
}

impl Mutator {
    /// Create a mutator with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: MutationConfig) -> Self {
        self.config = config;
        self
    }

    /// Mutate a random subset of the cached rules in place. Returns how many changed.
    pub async fn meta_mutate<R: Rng + ?Sized>(
        &self,
        storage: &mut dyn Storage,
        rng: &mut R,
    ) -> Result<usize> {
        let mut cache = recover(Document::RuleCache, storage.load_rule_cache().await);
        if cache.is_empty() {
            info!("No cached rules to mutate");
            return Ok(0);
        }

        let mut mutated = 0;
        for rule in cache.values_mut() {
            if rng.random::<f64>() >= self.config.rule_probability {
                continue;
            }
            rule.color_map = mutate_color_map(&rule.color_map, self.config.rate, rng);
            let factor = jitter(self.config.jitter_min, self.config.jitter_max, rng);
            rule.confidence = Confidence::new(round3(rule.confidence.value() * factor));
            debug!("Mutated {} rule, confidence now {}", rule.type_tag(), rule.confidence);
            mutated += 1;
        }

        storage.save_rule_cache(&cache).await?;
        info!("Mutated {}/{} cached rules", mutated, cache.len());
        Ok(mutated)
    }
}

fn jitter<R: Rng + ?Sized>(lo: f64, hi: f64, rng: &mut R) -> f64 {
    if hi > lo {
        rng.random_range(lo..=hi)
    } else {
        lo
    }
}
