//! Color maps - partial recoloring functions over symbols.

use crate::signature::RuleSignature;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A grid cell value. Always in `0..=MAX_SYMBOL`.
pub type Symbol = u8;

/// Largest valid symbol.
pub const MAX_SYMBOL: Symbol = 9;

/// Clamp an arbitrary integer into the symbol range.
pub fn clamp_symbol(value: i64) -> Symbol {
    value.clamp(0, MAX_SYMBOL as i64) as Symbol
}

/// Partial function `Symbol -> Symbol`.
///
/// Keys and values are clamped into `0..=9` on every insertion, so a map can
/// never hold an out-of-range symbol. Iteration is in ascending key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BTreeMap<i64, i64>", into = "BTreeMap<Symbol, Symbol>")]
pub struct ColorMap(BTreeMap<Symbol, Symbol>);

impl ColorMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The full identity map over every symbol.
    pub fn identity() -> Self {
        (0..=MAX_SYMBOL).map(|s| (s, s)).collect()
    }

    /// Insert a mapping, clamping both sides. Returns the previous value.
    pub fn insert(&mut self, key: Symbol, value: Symbol) -> Option<Symbol> {
        self.0.insert(key.min(MAX_SYMBOL), value.min(MAX_SYMBOL))
    }

    /// Look up the mapped value of a symbol.
    pub fn get(&self, key: Symbol) -> Option<Symbol> {
        self.0.get(&key).copied()
    }

    /// Remove a key.
    pub fn remove(&mut self, key: Symbol) -> Option<Symbol> {
        self.0.remove(&key)
    }

    /// Whether the key is mapped.
    pub fn contains_key(&self, key: Symbol) -> bool {
        self.0.contains_key(&key)
    }

    /// Number of mapped keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no key is mapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, Symbol)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Mapped keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.0.keys().copied()
    }

    /// Apply the map to one symbol; unmapped symbols pass through unchanged.
    pub fn apply(&self, symbol: Symbol) -> Symbol {
        self.get(symbol).unwrap_or(symbol)
    }

    /// The set of `(key, value)` pairs.
    pub fn pairs(&self) -> BTreeSet<(Symbol, Symbol)> {
        self.iter().collect()
    }

    /// Order-independent signature of the pair set.
    pub fn signature(&self) -> RuleSignature {
        RuleSignature::of(self)
    }

    /// Whether no two keys share an output.
    pub fn is_injective(&self) -> bool {
        let values: BTreeSet<Symbol> = self.0.values().copied().collect();
        values.len() == self.0.len()
    }

    /// The inverse map, or `None` when the map is not injective.
    pub fn inverse(&self) -> Option<ColorMap> {
        if !self.is_injective() {
            return None;
        }
        Some(self.iter().map(|(k, v)| (v, k)).collect())
    }

    /// Shift every output by `offset` modulo 10.
    pub fn shifted(&self, offset: u8) -> ColorMap {
        self.iter()
            .map(|(k, v)| (k, (v + offset % 10) % 10))
            .collect()
    }

    /// A copy of `self` with every mapping of `overrides` written on top.
    pub fn overlaid(&self, overrides: &ColorMap) -> ColorMap {
        let mut merged = self.clone();
        for (k, v) in overrides.iter() {
            merged.insert(k, v);
        }
        merged
    }

    /// Fraction of keys in the union of both maps that are missing on one
    /// side or map to different values. Two empty maps are at distance 0.
    pub fn distance(&self, other: &ColorMap) -> f64 {
        let keys: BTreeSet<Symbol> = self.keys().chain(other.keys()).collect();
        if keys.is_empty() {
            return 0.0;
        }
        let differing = keys
            .iter()
            .filter(|k| self.get(**k) != other.get(**k))
            .count();
        differing as f64 / keys.len() as f64
    }

    /// Jaccard distance over `(key, value)` pairs: `1 - |A∩B| / |A∪B|`.
    pub fn jaccard_distance(&self, other: &ColorMap) -> f64 {
        let a = self.pairs();
        let b = other.pairs();
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        let shared = a.intersection(&b).count();
        1.0 - shared as f64 / union as f64
    }
}

impl FromIterator<(Symbol, Symbol)> for ColorMap {
    fn from_iter<I: IntoIterator<Item = (Symbol, Symbol)>>(iter: I) -> Self {
        let mut map = ColorMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl From<BTreeMap<i64, i64>> for ColorMap {
    fn from(raw: BTreeMap<i64, i64>) -> Self {
        raw.into_iter()
            .map(|(k, v)| (clamp_symbol(k), clamp_symbol(v)))
            .collect()
    }
}

impl From<ColorMap> for BTreeMap<Symbol, Symbol> {
    fn from(map: ColorMap) -> Self {
        map.0
    }
}
