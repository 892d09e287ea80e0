//! Diversifier - synthesizes meta-rule variants to widen signature coverage.

use recolor_core::{
    round3, ColorMap, MetaOrigin, ReplayBuffer, Rule, RuleSignature, Symbol,
};
use recolor_storage::{recover, Document, Result, Storage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Configuration for diversification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversifyConfig {
    /// Population size to grow toward
    pub target: usize,
    /// Minimum number of new variants to admit, when available
    pub min_new: usize,
    /// Output shifts tried per base map
    pub max_shifts: u8,
}

impl Default for DiversifyConfig {
    fn default() -> Self {
        Self {
            target: 24,
            min_new: 8,
            max_shifts: 2,
        }
    }
}

/// A synthesized variant awaiting admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// The variant map
    pub color_map: ColorMap,
    /// Confidence derived from the base
    pub confidence: f64,
    /// `<base id>:<kind>`, e.g. `meta_rule_1:shift2`
    pub source: String,
}

/// Support of each `(key, value)` pair: Σ over replay entries holding it of `1 + max(0, conf)`.
pub fn pair_support(replay: &ReplayBuffer) -> BTreeMap<(Symbol, Symbol), f64> {
    let mut support = BTreeMap::new();
    for entry in replay.entries() {
        let weight = 1.0 + entry.confidence.value().max(0.0);
        for pair in entry.color_map.iter() {
            *support.entry(pair).or_insert(0.0) += weight;
        }
    }
    support
}

/// Drop the least-supported pair; the lowest key wins ties. `None` for maps of ≤ 1 key.
pub fn prune_weakest(
    map: &ColorMap,
    support: &BTreeMap<(Symbol, Symbol), f64>,
) -> Option<ColorMap> {
    if map.len() <= 1 {
        return None;
    }
    let mut weakest: Option<(Symbol, f64)> = None;
    for (k, v) in map.iter() {
        let s = support.get(&(k, v)).copied().unwrap_or(0.0);
        if weakest.map_or(true, |(_, w)| s < w) {
            weakest = Some((k, s));
        }
    }
    let (drop, _) = weakest?;
    let mut pruned = map.clone();
    pruned.remove(drop);
    Some(pruned)
}

/// Grows the meta population with inverse, shifted and pruned variants.
#[derive(Debug, Clone, Default)]
pub struct Diversifier {
    config: DiversifyConfig,
}

impl Diversifier {
    /// Create a diversifier with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: DiversifyConfig) -> Self {
        self.config = config;
        self
    }

    /// Variants of one base map whose signatures are not in `existing`.
    pub fn variants(
        &self,
        base_id: &str,
        map: &ColorMap,
        confidence: f64,
        support: &BTreeMap<(Symbol, Symbol), f64>,
        existing: &HashSet<RuleSignature>,
    ) -> Vec<Variant> {
        let mut out = Vec::new();
        let mut push = |color_map: ColorMap, confidence: f64, kind: String| {
            if !existing.contains(&color_map.signature()) {
                out.push(Variant {
                    color_map,
                    confidence,
                    source: format!("{}:{}", base_id, kind),
                });
            }
        };

        if let Some(inverse) = map.inverse() {
            push(inverse, confidence * 0.98, "invert".to_string());
        }
        for s in 1..=self.config.max_shifts {
            let factor = 0.97 - 0.01 * f64::from(s - 1);
            push(map.shifted(s), confidence * factor, format!("shift{}", s));
        }
        if let Some(pruned) = prune_weakest(map, support) {
            push(pruned, (confidence * 0.95).max(0.6), "prune1".to_string());
        }
        out
    }

    /// Synthesize and admit variants. Returns the number admitted.
    ///
    /// Admission runs in descending confidence order, skipping signatures
    /// already present, while fewer than `min_new` were added or the
    /// population is still below `target`.
    pub async fn diversify(&self, storage: &mut dyn Storage) -> Result<usize> {
        let mut population = recover(Document::MetaRules, storage.load_meta_rules().await);
        let replay = recover(Document::Replay, storage.load_replay().await);

        let mut bases: Vec<(String, ColorMap, f64)> = population
            .iter()
            .filter(|(_, r)| r.is_meta() && !r.color_map.is_empty())
            .map(|(id, r)| (id.to_string(), r.color_map.clone(), r.confidence.value()))
            .collect();
        bases.extend(
            replay
                .entries()
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.color_map.is_empty())
                .map(|(i, e)| (format!("replay_{}", i), e.color_map.clone(), e.confidence.value())),
        );
        if bases.is_empty() {
            info!("No base maps available to diversify");
            return Ok(0);
        }

        let support = pair_support(&replay);
        let mut existing: HashSet<RuleSignature> =
            population.values().map(|r| r.signature()).collect();

        let mut generated: Vec<Variant> = bases
            .iter()
            .flat_map(|(id, map, conf)| self.variants(id, map, *conf, &support, &existing))
            .collect();
        if generated.is_empty() {
            info!("No new variants synthesized");
            return Ok(0);
        }
        generated.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut added = 0;
        for variant in generated {
            if added >= self.config.min_new && population.len() >= self.config.target {
                break;
            }
            let signature = variant.color_map.signature();
            if !existing.insert(signature) {
                continue;
            }
            let id = population.next_id("meta_div_");
            debug!("{} <- {} ({:.3})", id, variant.source, variant.confidence);
            population.insert(
                id,
                Rule::meta(
                    "color_map",
                    MetaOrigin::Diversified {
                        source: variant.source,
                    },
                    variant.color_map,
                    round3(variant.confidence),
                ),
            );
            added += 1;
        }

        storage.save_meta_rules(&population).await?;
        info!("Added {} meta variants (population {})", added, population.len());
        Ok(added)
    }
}
