//! Persisted documents shared by the pipeline stages.
//!
//! Every document is loaded and saved whole. Keyed documents keep insertion
//! order, and a malformed entry is skipped at load time instead of failing
//! the whole document.

use crate::color_map::ColorMap;
use crate::rule::{Confidence, Rule};
use crate::{round3, RunId, Time};
use serde::de::{DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Maximum number of replay entries kept.
pub const REPLAY_CAPACITY: usize = 10;

/// Rule cache key prefix reserved for rehearsal injections.
pub const REHEARSAL_PREFIX: &str = "rehearse_";

/// Insertion-ordered string-keyed map, serialized as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a value mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite. An overwritten entry keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Keep only the entries the predicate accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &V) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate values mutably in insertion order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    /// Iterate values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// First free key of the form `<prefix><n>`, starting at `n = len() + 1`.
    pub fn next_id(&self, prefix: &str) -> String {
        let mut n = self.len() + 1;
        loop {
            let candidate = format!("{}{}", prefix, n);
            if !self.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: DeserializeOwned> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((key, raw)) = access.next_entry::<String, serde_json::Value>()? {
            match serde_json::from_value::<V>(raw) {
                Ok(value) => {
                    map.insert(key, value);
                }
                Err(e) => tracing::warn!("Skipping malformed entry {}: {}", key, e),
            }
        }
        Ok(map)
    }
}

impl<'de, V: DeserializeOwned> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Task signature -> active rule. Keys `rehearse_*` hold rehearsal injections.
pub type RuleCache = OrderedMap<Rule>;

/// Meta-rule id -> meta-rule. Append-only from the engine's point of view.
pub type MetaPopulation = OrderedMap<Rule>;

/// Task signature -> generalized rule, for cross-task reuse.
pub type RuleBank = OrderedMap<Rule>;

/// Rule type -> running confidence statistics.
pub type TypeMemory = OrderedMap<TypeRecord>;

/// Running statistics for one rule type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRecord {
    /// Number of observations
    pub count: u64,
    /// Sum of observed confidences
    pub total: f64,
    /// Mean confidence, 3 decimals
    pub mean: f64,
    /// Merged color map of every observation; later keys overwrite
    #[serde(default)]
    pub color_map: ColorMap,
}

impl TypeRecord {
    /// Fold in one observation.
    pub fn observe(&mut self, confidence: Confidence, color_map: Option<&ColorMap>) {
        self.count += 1;
        self.total += confidence.value();
        self.mean = round3(self.total / self.count as f64);
        if let Some(map) = color_map {
            self.color_map = self.color_map.overlaid(map);
        }
    }
}

/// A snapshot of a solved task's rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Type tag of the recorded rule
    pub rule_type: String,
    /// The recorded map
    pub color_map: ColorMap,
    /// Confidence at record time
    pub confidence: Confidence,
}

/// Bounded recency buffer, oldest entry first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayBuffer {
    entries: Vec<ReplayEntry>,
}

impl ReplayBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, dropping the oldest beyond capacity.
    pub fn push(&mut self, entry: ReplayEntry) {
        self.entries.push(entry);
        if self.entries.len() > REPLAY_CAPACITY {
            let excess = self.entries.len() - REPLAY_CAPACITY;
            self.entries.drain(..excess);
        }
    }

    /// Highest-confidence entry; the earliest one wins ties.
    pub fn best(&self) -> Option<&ReplayEntry> {
        self.entries.iter().fold(None, |best, e| match best {
            Some(b) if b.confidence >= e.confidence => Some(b),
            _ => Some(e),
        })
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> &[ReplayEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ReplayBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for e in &self.entries {
            seq.serialize_element(e)?;
        }
        seq.end()
    }
}

struct ReplayVisitor;

impl<'de> Visitor<'de> for ReplayVisitor {
    type Value = ReplayBuffer;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array of replay entries")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut buffer = ReplayBuffer::new();
        while let Some(raw) = access.next_element::<serde_json::Value>()? {
            match serde_json::from_value::<ReplayEntry>(raw) {
                Ok(entry) => buffer.push(entry),
                Err(e) => tracing::warn!("Skipping malformed replay entry: {}", e),
            }
        }
        Ok(buffer)
    }
}

impl<'de> Deserialize<'de> for ReplayBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(ReplayVisitor)
    }
}

/// Per-rule-type weights consumed by external schedulers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaWeights(pub OrderedMap<f64>);

impl MetaWeights {
    /// Rule types seeded with weight 1.0.
    pub const DEFAULT_TYPES: [&'static str; 4] = ["color_map", "geom", "none", "unknown"];

    /// Weight of a type, 1.0 when absent.
    pub fn weight(&self, rule_type: &str) -> f64 {
        self.0.get(rule_type).copied().unwrap_or(1.0)
    }
}

impl Default for MetaWeights {
    fn default() -> Self {
        Self(Self::DEFAULT_TYPES.iter().map(|t| (*t, 1.0)).collect())
    }
}

/// One adaptive-promotion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionSummary {
    /// Run identifier
    pub run_id: RunId,
    /// When the run finished
    pub timestamp: Time,
    /// Dynamic threshold used
    pub threshold: f64,
    /// Number of promoted entries
    pub promoted: usize,
    /// Replay size at promotion time
    pub replay_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(conf: f64) -> ReplayEntry {
        ReplayEntry {
            rule_type: "color_map".into(),
            color_map: [(0, 1)].into_iter().collect(),
            confidence: Confidence::new(conf),
        }
    }

    #[test]
    fn test_ordered_map_keeps_insertion_order() {
        let mut map: OrderedMap<u32> = OrderedMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        map.insert("b", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&3));
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"b":3,"a":2}"#);

        let back: OrderedMap<u32> = serde_json::from_str(r#"{"z":1,"y":2}"#).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["z", "y"]);
    }

    #[test]
    fn test_ordered_map_skips_malformed_entries() {
        let raw = r#"{
            "ok": {"type": "color_map", "color_map": {"1": 2}, "confidence": 0.7},
            "bad_tag": {"type": "mystery", "color_map": {}, "confidence": 0.7},
            "not_a_rule": 5
        }"#;
        let cache: RuleCache = serde_json::from_str(raw).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("ok"));
    }

    #[test]
    fn test_next_id_avoids_collisions() {
        let mut map: OrderedMap<u32> = OrderedMap::new();
        assert_eq!(map.next_id("meta_promote_"), "meta_promote_1");
        map.insert("meta_promote_2", 0);
        assert_eq!(map.next_id("meta_promote_"), "meta_promote_3");
        map.insert("x", 0);
        // len is 2, but meta_promote_3 is still free
        assert_eq!(map.next_id("meta_promote_"), "meta_promote_3");
        map.insert("meta_promote_3", 0);
        assert_eq!(map.next_id("meta_promote_"), "meta_promote_4");
    }

    #[test]
    fn test_replay_buffer_keeps_last_ten() {
        let mut buffer = ReplayBuffer::new();
        for i in 0..15 {
            buffer.push(entry(i as f64 / 100.0));
        }
        assert_eq!(buffer.len(), REPLAY_CAPACITY);
        assert_eq!(buffer.entries()[0].confidence.value(), 0.05);
        assert_eq!(buffer.best().map(|e| e.confidence.value()), Some(0.14));
    }

    #[test]
    fn test_replay_buffer_load_is_lenient_and_bounded() {
        let mut items: Vec<serde_json::Value> = (0..12)
            .map(|_| {
                serde_json::json!({"rule_type": "color_map", "color_map": {}, "confidence": 0.5})
            })
            .collect();
        items.push(serde_json::json!({"rule_type": "color_map"}));
        let buffer: ReplayBuffer = serde_json::from_value(serde_json::Value::Array(items)).unwrap();
        assert_eq!(buffer.len(), REPLAY_CAPACITY);
    }

    #[test]
    fn test_type_record_running_mean() {
        let mut record = TypeRecord::default();
        record.observe(Confidence::new(0.9), Some(&[(1, 2)].into_iter().collect()));
        record.observe(Confidence::new(0.6), Some(&[(1, 3), (4, 4)].into_iter().collect()));
        assert_eq!(record.count, 2);
        assert_eq!(record.mean, 0.75);
        assert_eq!(record.color_map.get(1), Some(3));
        assert_eq!(record.color_map.len(), 2);
    }

    #[test]
    fn test_meta_weights_defaults() {
        let weights = MetaWeights::default();
        assert_eq!(weights.0.len(), 4);
        assert_eq!(weights.weight("geom"), 1.0);
        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"color_map":1.0,"geom":1.0,"none":1.0,"unknown":1.0}"#);
    }
}
