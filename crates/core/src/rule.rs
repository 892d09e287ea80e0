//! Rule model - a color map with a tag, a confidence and provenance.

use crate::color_map::ColorMap;
use crate::round3;
use crate::signature::RuleSignature;
use serde::{Deserialize, Serialize};

/// Tag suffix shared by every meta-rule type.
const META_SUFFIX: &str = "_meta";

/// Source tag written on promoted meta-rules.
const PROMOTED_SOURCE: &str = "adaptive_replay";

/// Errors raised when decoding a persisted rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// The `type` field is not a known tag
    #[error("unknown rule type: {0}")]
    UnknownTag(String),
}

/// A confidence in `[0, 1]`.
///
/// Construction clamps (NaN becomes 0) and serialization rounds to three decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Zero confidence.
    pub const ZERO: Confidence = Confidence(0.0);

    /// Clamp a raw value into `[0, 1]`.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// The raw value.
    pub fn value(self) -> f64 {
        self.0
    }

    /// The value rounded to three decimals.
    pub fn rounded(self) -> Self {
        Self(round3(self.0))
    }

    /// Scale by a factor, clamping the result.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.0 * factor)
    }
}

impl From<f64> for Confidence {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        round3(c.0)
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// How a meta-rule came to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaOrigin {
    /// Merged from a cluster of similar rules
    Cluster {
        /// Type tags of the cluster members
        sources: Vec<String>,
        /// Number of members
        size: usize,
    },
    /// Lifted out of replay memory by the adaptive promoter
    Promoted,
    /// Synthesized as a variant of an existing map
    Diversified {
        /// Base map id and variant kind, e.g. `meta_rule_1:shift2`
        source: String,
    },
    /// No provenance recorded
    Unspecified,
}

/// The tagged variant of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    /// Learned directly from training pairs (`color_map`)
    Base,
    /// Synthesized by self-correction (`color_map_fix`)
    Fix,
    /// Confidence-weighted vote of several rules (`color_map_blend`)
    Blend {
        /// Type tags of the blended rules
        sources: Vec<String>,
    },
    /// Generalized rule (`<base>_meta`)
    Meta {
        /// Tag the meta type derives from, e.g. `color_map`
        base: String,
        /// Provenance
        origin: MetaOrigin,
    },
    /// Fallback identity map (`identity`)
    Identity,
}

impl RuleKind {
    /// The persisted `type` tag.
    pub fn tag(&self) -> String {
        match self {
            RuleKind::Base => "color_map".to_string(),
            RuleKind::Fix => "color_map_fix".to_string(),
            RuleKind::Blend { .. } => "color_map_blend".to_string(),
            RuleKind::Meta { base, .. } => format!("{}{}", base, META_SUFFIX),
            RuleKind::Identity => "identity".to_string(),
        }
    }
}

/// A color-remapping rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub struct Rule {
    /// Tag and provenance
    pub kind: RuleKind,
    /// The recoloring
    pub color_map: ColorMap,
    /// Heuristic confidence
    pub confidence: Confidence,
}

impl Rule {
    /// A base rule.
    pub fn base(color_map: ColorMap, confidence: impl Into<Confidence>) -> Self {
        Self::new(RuleKind::Base, color_map, confidence)
    }

    /// A self-correction rule.
    pub fn fix(color_map: ColorMap, confidence: impl Into<Confidence>) -> Self {
        Self::new(RuleKind::Fix, color_map, confidence)
    }

    /// The identity fallback.
    pub fn identity(confidence: impl Into<Confidence>) -> Self {
        Self::new(RuleKind::Identity, ColorMap::identity(), confidence)
    }

    /// A meta-rule deriving from `base`.
    pub fn meta(
        base: impl Into<String>,
        origin: MetaOrigin,
        color_map: ColorMap,
        confidence: impl Into<Confidence>,
    ) -> Self {
        Self::new(
            RuleKind::Meta {
                base: base.into(),
                origin,
            },
            color_map,
            confidence,
        )
    }

    /// Build a rule from parts.
    pub fn new(kind: RuleKind, color_map: ColorMap, confidence: impl Into<Confidence>) -> Self {
        Self {
            kind,
            color_map,
            confidence: confidence.into(),
        }
    }

    /// The persisted `type` tag.
    pub fn type_tag(&self) -> String {
        self.kind.tag()
    }

    /// Whether this is a meta-rule.
    pub fn is_meta(&self) -> bool {
        matches!(self.kind, RuleKind::Meta { .. })
    }

    /// Signature of the color map.
    pub fn signature(&self) -> RuleSignature {
        self.color_map.signature()
    }
}

/// On-disk shape of a rule.
#[derive(Serialize, Deserialize)]
struct RuleRecord {
    #[serde(rename = "type")]
    rule_type: String,
    color_map: ColorMap,
    confidence: Confidence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl TryFrom<RuleRecord> for Rule {
    type Error = RuleError;

    fn try_from(record: RuleRecord) -> Result<Self, Self::Error> {
        let tag = record.rule_type;
        let kind = match tag.as_str() {
            "color_map" => RuleKind::Base,
            "color_map_fix" => RuleKind::Fix,
            "color_map_blend" => RuleKind::Blend {
                sources: record.sources,
            },
            "identity" => RuleKind::Identity,
            t if t.len() > META_SUFFIX.len() && t.ends_with(META_SUFFIX) => {
                let base = t[..t.len() - META_SUFFIX.len()].to_string();
                let origin = match (record.size, record.source) {
                    (Some(size), _) => MetaOrigin::Cluster {
                        sources: record.sources,
                        size,
                    },
                    (None, Some(source)) if source == PROMOTED_SOURCE => MetaOrigin::Promoted,
                    (None, Some(source)) => MetaOrigin::Diversified {
                        source: source
                            .strip_prefix("diversify(")
                            .and_then(|s| s.strip_suffix(')'))
                            .unwrap_or(&source)
                            .to_string(),
                    },
                    (None, None) => MetaOrigin::Unspecified,
                };
                RuleKind::Meta { base, origin }
            }
            _ => return Err(RuleError::UnknownTag(tag)),
        };
        Ok(Rule {
            kind,
            color_map: record.color_map,
            confidence: record.confidence,
        })
    }
}

impl From<Rule> for RuleRecord {
    fn from(rule: Rule) -> Self {
        let rule_type = rule.type_tag();
        let mut record = RuleRecord {
            rule_type,
            color_map: rule.color_map,
            confidence: rule.confidence,
            sources: Vec::new(),
            size: None,
            source: None,
        };
        match rule.kind {
            RuleKind::Blend { sources } => record.sources = sources,
            RuleKind::Meta { origin, .. } => match origin {
                MetaOrigin::Cluster { sources, size } => {
                    record.sources = sources;
                    record.size = Some(size);
                }
                MetaOrigin::Promoted => record.source = Some(PROMOTED_SOURCE.to_string()),
                MetaOrigin::Diversified { source } => {
                    record.source = Some(format!("diversify({})", source))
                }
                MetaOrigin::Unspecified => {}
            },
            RuleKind::Base | RuleKind::Fix | RuleKind::Identity => {}
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamps_and_rounds() {
        assert_eq!(Confidence::new(1.7).value(), 1.0);
        assert_eq!(Confidence::new(-0.2).value(), 0.0);
        assert_eq!(Confidence::new(f64::NAN).value(), 0.0);
        assert_eq!(serde_json::to_string(&Confidence::new(0.12345)).unwrap(), "0.123");
    }

    #[test]
    fn test_rule_serializes_canonical_shape() {
        let rule = Rule::base([(1, 2)].into_iter().collect(), 0.8);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "color_map", "color_map": {"1": 2}, "confidence": 0.8})
        );
    }

    #[test]
    fn test_meta_provenance_survives_roundtrip() {
        let cluster = Rule::meta(
            "color_map",
            MetaOrigin::Cluster {
                sources: vec!["color_map".into(), "color_map_fix".into()],
                size: 2,
            },
            [(0, 1)].into_iter().collect(),
            0.7,
        );
        let promoted = Rule::meta("meta_ensemble", MetaOrigin::Promoted, ColorMap::new(), 0.99);
        let diversified = Rule::meta(
            "color_map",
            MetaOrigin::Diversified {
                source: "meta_rule_1:shift1".into(),
            },
            ColorMap::new(),
            0.6,
        );
        for rule in [cluster, promoted, diversified] {
            let json = serde_json::to_string(&rule).unwrap();
            let back: Rule = serde_json::from_str(&json).unwrap();
            assert_eq!(back, rule);
        }
    }

    #[test]
    fn test_promoted_type_tag() {
        let rule = Rule::meta("meta_ensemble", MetaOrigin::Promoted, ColorMap::new(), 0.9);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "meta_ensemble_meta");
        assert_eq!(json["source"], "adaptive_replay");
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let raw = r#"{"type": "mystery", "color_map": {}, "confidence": 0.5}"#;
        assert!(serde_json::from_str::<Rule>(raw).is_err());
        let bare_suffix = r#"{"type": "_meta", "color_map": {}, "confidence": 0.5}"#;
        assert!(serde_json::from_str::<Rule>(bare_suffix).is_err());
    }

    #[test]
    fn test_missing_confidence_is_rejected() {
        let raw = r#"{"type": "color_map", "color_map": {"0": 1}}"#;
        assert!(serde_json::from_str::<Rule>(raw).is_err());
    }
}
