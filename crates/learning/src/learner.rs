//! Rule learner - derives a base color map from training pairs.

use rand::Rng;
use recolor_core::{
    color_map_accuracy, round3, ColorMap, Grid, MetaPopulation, Rule, RuleKind, Symbol, TrainPair,
    MAX_SYMBOL,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a freshly learned rule gets its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
    /// Uniform draw from `[min_confidence, max_confidence]`
    Random,
    /// Measured accuracy of the learned map on the training pairs
    Measured,
}

/// Configuration for the learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Confidence assignment
    pub confidence: ConfidencePolicy,
    /// Lower bound of the random confidence range
    pub min_confidence: f64,
    /// Upper bound of the random confidence range
    pub max_confidence: f64,
    /// Shift inputs one step along both axes when a pair changes
    pub structural_shift: bool,
    /// Fold `color_map_meta` rules into the learned map
    pub blend_meta: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            confidence: ConfidencePolicy::Random,
            min_confidence: 0.6,
            max_confidence: 0.95,
            structural_shift: true,
            blend_meta: true,
        }
    }
}

/// Learns base `color_map` rules.
#[derive(Debug, Clone, Default)]
pub struct RuleLearner {
    config: LearnerConfig,
}

impl RuleLearner {
    /// Create a learner with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: LearnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Learn a rule from training pairs, reinforced by the meta population.
    pub fn learn<R: Rng + ?Sized>(
        &self,
        pairs: &[TrainPair],
        meta: &MetaPopulation,
        rng: &mut R,
    ) -> Rule {
        let mut map = self.infer_map(pairs);
        if self.config.blend_meta {
            map = blend_meta_rules(map, meta);
        }

        let confidence = match self.config.confidence {
            ConfidencePolicy::Random => {
                let (lo, hi) = (self.config.min_confidence, self.config.max_confidence);
                let draw = if hi > lo { rng.random_range(lo..=hi) } else { lo };
                round3(draw)
            }
            ConfidencePolicy::Measured => round3(color_map_accuracy(pairs, &map)),
        };

        debug!("Learned map of {} keys, confidence {:.3}", map.len(), confidence);
        Rule::base(map, confidence)
    }

    /// Majority output per input symbol over the (possibly shifted) inputs.
    fn infer_map(&self, pairs: &[TrainPair]) -> ColorMap {
        let mut votes = [[0usize; MAX_SYMBOL as usize + 1]; MAX_SYMBOL as usize + 1];
        let mut seen = [false; MAX_SYMBOL as usize + 1];

        for pair in pairs {
            let input = self.probe(pair);
            // Cells outside the output's extent carry no vote.
            for (r, c, s) in input.cells() {
                seen[s as usize] = true;
                if let Some(out) = pair.output.get(r, c) {
                    votes[s as usize][out as usize] += 1;
                }
            }
        }

        let mut map = ColorMap::new();
        for symbol in 0..=MAX_SYMBOL {
            let tally = &votes[symbol as usize];
            if !seen[symbol as usize] || tally.iter().all(|n| *n == 0) {
                continue;
            }
            map.insert(symbol, majority(tally));
        }
        map
    }

    fn probe(&self, pair: &TrainPair) -> Grid {
        if self.config.structural_shift && pair.input.differs_from(&pair.output) {
            pair.input.roll(1, 1)
        } else {
            pair.input.clone()
        }
    }
}

/// Most voted symbol; the lowest symbol wins ties.
fn majority(tally: &[usize]) -> Symbol {
    let mut best = 0;
    for (symbol, count) in tally.iter().enumerate() {
        if *count > tally[best] {
            best = symbol;
        }
    }
    best as Symbol
}

/// Fold every `color_map_meta` rule into `map`, in population order.
///
/// Keys present on both sides average with half-to-even rounding; keys only
/// in the meta map are copied.
pub fn blend_meta_rules(mut map: ColorMap, meta: &MetaPopulation) -> ColorMap {
    for (id, rule) in meta.iter() {
        let is_color_map_meta =
            matches!(&rule.kind, RuleKind::Meta { base, .. } if base == "color_map");
        if !is_color_map_meta || rule.color_map.is_empty() {
            continue;
        }
        for (k, v) in rule.color_map.iter() {
            let blended = match map.get(k) {
                Some(existing) => half_even_mean(existing, v),
                None => v,
            };
            map.insert(k, blended);
        }
        debug!("Reinforced with meta rule {}", id);
    }
    map
}

fn half_even_mean(a: Symbol, b: Symbol) -> Symbol {
    let sum = a + b;
    let half = sum / 2;
    if sum % 2 == 0 || half % 2 == 0 {
        half
    } else {
        half + 1
    }
}
