//! Puzzle tasks: paired training examples plus test inputs.

use crate::color_map::ColorMap;
use crate::grid::Grid;
use crate::signature::TaskSignature;
use serde::{Deserialize, Serialize};

/// One training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainPair {
    /// Input grid
    pub input: Grid,
    /// Expected output grid
    pub output: Grid,
}

/// One test input awaiting a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInput {
    /// Input grid
    pub input: Grid,
}

/// A grid-transformation puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-assigned identifier
    #[serde(default)]
    pub id: String,
    /// Training examples
    pub train: Vec<TrainPair>,
    /// Test inputs
    #[serde(default)]
    pub test: Vec<TestInput>,
}

impl Task {
    /// Create a task.
    pub fn new(id: impl Into<String>, train: Vec<TrainPair>, test: Vec<TestInput>) -> Self {
        Self {
            id: id.into(),
            train,
            test,
        }
    }

    /// Rule-store key of this task.
    pub fn signature(&self) -> TaskSignature {
        TaskSignature::of(&self.train)
    }
}

/// Mean accuracy of a color map over training pairs.
///
/// Returns 0 for an empty slice.
pub fn color_map_accuracy(pairs: &[TrainPair], map: &ColorMap) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let total: f64 = pairs
        .iter()
        .map(|p| p.input.recolor(map).accuracy(&p.output))
        .sum();
    total / pairs.len() as f64
}
