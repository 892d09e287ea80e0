//! Confidence-weighted voting across rules.

use recolor_core::{round3, ColorMap, Rule, RuleKind, Symbol};

/// Blend rules into a single `color_map_blend` rule.
///
/// Every rule votes for its mapped output per input symbol, weighted by its
/// confidence. The heaviest output wins; on equal weight the output seen
/// first wins. The blend's confidence is the mean of the inputs'.
pub fn blend(rules: &[Rule]) -> Rule {
    if rules.is_empty() {
        return Rule::new(
            RuleKind::Blend { sources: vec![] },
            ColorMap::new(),
            0.0,
        );
    }

    // input symbol -> [(output, weight)] in first-seen order
    let mut votes: Vec<(Symbol, Vec<(Symbol, f64)>)> = Vec::new();
    let mut total = 0.0;
    for rule in rules {
        let weight = rule.confidence.value();
        total += weight;
        for (input, output) in rule.color_map.iter() {
            let idx = match votes.iter().position(|(k, _)| *k == input) {
                Some(i) => i,
                None => {
                    votes.push((input, Vec::new()));
                    votes.len() - 1
                }
            };
            let slot = &mut votes[idx].1;
            match slot.iter_mut().find(|(o, _)| *o == output) {
                Some((_, w)) => *w += weight,
                None => slot.push((output, weight)),
            }
        }
    }

    let map: ColorMap = votes
        .into_iter()
        .filter_map(|(input, outputs)| {
            let mut best: Option<(Symbol, f64)> = None;
            for (output, weight) in outputs {
                if best.map_or(true, |(_, w)| weight > w) {
                    best = Some((output, weight));
                }
            }
            best.map(|(output, _)| (input, output))
        })
        .collect();

    Rule::new(
        RuleKind::Blend {
            sources: rules.iter().map(Rule::type_tag).collect(),
        },
        map,
        round3(total / rules.len() as f64),
    )
}
