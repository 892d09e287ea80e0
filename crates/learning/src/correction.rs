//! Self-correction - fix rules synthesized from mismatched training cells.

use recolor_core::{color_map_accuracy, round3, ColorMap, Rule, TrainPair, MAX_SYMBOL};
use tracing::debug;

/// Synthesize one `color_map_fix` rule per training pair that changes.
///
/// Each fix starts from `map`. Every input symbol found at a cell where the
/// pair's input and output differ is remapped to the most frequent output
/// symbol over all of that symbol's positions in the pair. A fix's
/// confidence is its accuracy over every training pair. Pairs whose shapes
/// differ are skipped.
pub fn correct(pairs: &[TrainPair], map: &ColorMap) -> Vec<Rule> {
    let mut fixes = Vec::new();
    for pair in pairs {
        if pair.input.shape() != pair.output.shape() || !pair.input.differs_from(&pair.output) {
            continue;
        }

        let mut mismatched = [false; MAX_SYMBOL as usize + 1];
        let mut votes = [[0usize; MAX_SYMBOL as usize + 1]; MAX_SYMBOL as usize + 1];
        for (r, c, s) in pair.input.cells() {
            let Some(out) = pair.output.get(r, c) else {
                continue;
            };
            votes[s as usize][out as usize] += 1;
            if out != s {
                mismatched[s as usize] = true;
            }
        }

        let mut fixed = map.clone();
        for symbol in 0..=MAX_SYMBOL {
            if !mismatched[symbol as usize] {
                continue;
            }
            let tally = &votes[symbol as usize];
            let mut best = 0;
            for (out, count) in tally.iter().enumerate() {
                if *count > tally[best] {
                    best = out;
                }
            }
            fixed.insert(symbol, best as u8);
        }

        let confidence = round3(color_map_accuracy(pairs, &fixed));
        debug!("Fix of {} keys, training accuracy {:.3}", fixed.len(), confidence);
        fixes.push(Rule::fix(fixed, confidence));
    }
    fixes
}
