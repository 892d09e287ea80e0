//! Mutation amplifier - extra exploration pressure while confidence stalls.

use crate::mutation::mutate_keys;
use rand::Rng;
use recolor_core::{round3, Confidence};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration for the amplifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmplifierConfig {
    /// Lower edge of the stagnation band
    pub band_min: f64,
    /// Upper edge of the stagnation band
    pub band_max: f64,
    /// Rules at or above this confidence are left alone
    pub confidence_ceiling: f64,
    /// Average below which the strong intensity applies
    pub strong_below: f64,
    /// Fraction of keys mutated when deeply stuck
    pub strong_intensity: f64,
    /// Fraction of keys mutated otherwise
    pub intensity: f64,
    /// Lower bound of the reassigned confidence
    pub reset_min: f64,
    /// Upper bound of the reassigned confidence
    pub reset_max: f64,
}

impl Default for AmplifierConfig {
    fn default() -> Self {
        Self {
            band_min: 0.6,
            band_max: 0.8,
            confidence_ceiling: 0.9,
            strong_below: 0.7,
            strong_intensity: 0.35,
            intensity: 0.25,
            reset_min: 0.6,
            reset_max: 0.9,
        }
    }
}

/// Pushes cached rules toward nearby maps when the average confidence stalls.
#[derive(Debug, Clone, Default)]
pub struct Amplifier {
    config: AmplifierConfig,
}

impl Amplifier {
    /// Create an amplifier with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: AmplifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether an average confidence lies in the stagnation band.
    pub fn in_band(&self, avg_confidence: f64) -> bool {
        (self.config.band_min..=self.config.band_max).contains(&avg_confidence)
    }

    /// Amplify mutations. Returns the number of rules rewritten.
    ///
    /// Rewritten rules get a fresh confidence drawn from the reset range,
    /// discarding the previous value.
    pub async fn amplify<R: Rng + ?Sized>(
        &self,
        storage: &mut dyn Storage,
        avg_confidence: f64,
        rng: &mut R,
    ) -> Result<usize> {
        if !self.in_band(avg_confidence) {
            debug!("Average {:.3} outside stagnation band", avg_confidence);
            return Ok(0);
        }

        let mut cache = recover(Document::RuleCache, storage.load_rule_cache().await);
        let intensity = if avg_confidence < self.config.strong_below {
            self.config.strong_intensity
        } else {
            self.config.intensity
        };

        let mut amplified = 0;
        for rule in cache.values_mut() {
            if rule.confidence.value() >= self.config.confidence_ceiling
                || rule.color_map.is_empty()
            {
                continue;
            }
            rule.color_map = mutate_keys(&rule.color_map, intensity, rng);
            let (lo, hi) = (self.config.reset_min, self.config.reset_max);
            let draw = if hi > lo { rng.random_range(lo..=hi) } else { lo };
            rule.confidence = Confidence::new(round3(draw));
            amplified += 1;
        }

        if amplified > 0 {
            storage.save_rule_cache(&cache).await?;
            info!("Amplified {} rules at confidence {:.3}", amplified, avg_confidence);
        } else {
            info!("No rules amplified at confidence {:.3}", avg_confidence);
        }
        Ok(amplified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use recolor_core::{ColorMap, Rule, RuleCache};
    use recolor_storage::MemoryStorage;

    async fn seeded() -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        let mut cache = RuleCache::new();
        cache.insert("low", Rule::base([(1, 2), (3, 4)].into_iter().collect(), 0.5));
        cache.insert("high", Rule::base([(1, 2)].into_iter().collect(), 0.95));
        cache.insert("empty", Rule::base(ColorMap::new(), 0.1));
        storage.save_rule_cache(&cache).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_outside_band_is_noop() {
        let mut storage = seeded().await;
        let before = storage.raw(Document::RuleCache).map(str::to_string);
        let mut rng = StdRng::seed_from_u64(1);
        let amp = Amplifier::new();
        assert_eq!(amp.amplify(&mut storage, 0.85, &mut rng).await.unwrap(), 0);
        assert_eq!(amp.amplify(&mut storage, 0.59, &mut rng).await.unwrap(), 0);
        assert_eq!(storage.raw(Document::RuleCache).map(str::to_string), before);
    }

    #[tokio::test]
    async fn test_only_low_confidence_nonempty_rules_change() {
        let mut storage = seeded().await;
        let mut rng = StdRng::seed_from_u64(2);
        let n = Amplifier::new()
            .amplify(&mut storage, 0.65, &mut rng)
            .await
            .unwrap();
        assert_eq!(n, 1);

        let cache = storage.load_rule_cache().await.unwrap().unwrap();
        let low = cache.get("low").unwrap();
        assert!((0.6..=0.9).contains(&low.confidence.value()));
        let original: ColorMap = [(1, 2), (3, 4)].into_iter().collect();
        let changed = original
            .iter()
            .filter(|(k, v)| low.color_map.get(*k) != Some(*v))
            .count();
        assert_eq!(changed, 1);
        assert_eq!(cache.get("high").unwrap().confidence.value(), 0.95);
    }
}
