//! Content signatures for color maps and tasks.

use crate::color_map::ColorMap;
use crate::task::TrainPair;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Order-independent identity of a color map's pair set.
///
/// The canonical form is the pair count followed by the sorted pairs
/// (`n=2|0->1;1->0`), so two signatures are equal exactly when the pair
/// sets are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleSignature(String);

impl RuleSignature {
    /// Compute the signature of a map.
    pub fn of(map: &ColorMap) -> Self {
        let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{}->{}", k, v)).collect();
        Self(format!("n={}|{}", pairs.len(), pairs.join(";")))
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hex digest, for logs.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        hex::encode(&hash[..6])
    }
}

impl std::fmt::Display for RuleSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable hash of a task's serialized training pairs.
///
/// Depends on the order of the pairs as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskSignature(String);

impl TaskSignature {
    /// Number of hex characters in a signature.
    pub const LEN: usize = 12;

    /// Compute the signature of a list of training pairs.
    pub fn of(pairs: &[TrainPair]) -> Self {
        let serialized = serde_json::to_string(pairs).unwrap_or_default();
        let hash = Sha256::digest(serialized.as_bytes());
        let mut hex = hex::encode(hash);
        hex.truncate(Self::LEN);
        Self(hex)
    }

    /// Per-character match ratio against another signature.
    pub fn similarity(&self, other: &TaskSignature) -> f64 {
        let matching = self
            .0
            .chars()
            .zip(other.0.chars())
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / Self::LEN as f64
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskSignature {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for TaskSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
