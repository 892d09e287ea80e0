//! Geometric grid transforms paired with their exact inverses.

use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// One of the six rigid transforms an ensemble pipeline may wrap a color map in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// No-op
    Identity,
    /// 90° clockwise
    Rotate90,
    /// 180°
    Rotate180,
    /// 270° clockwise
    Rotate270,
    /// Mirror left-right
    FlipHorizontal,
    /// Mirror top-bottom
    FlipVertical,
}

impl Transform {
    /// Every transform, in ranking order.
    pub const ALL: [Transform; 6] = [
        Transform::Identity,
        Transform::Rotate90,
        Transform::Rotate180,
        Transform::Rotate270,
        Transform::FlipHorizontal,
        Transform::FlipVertical,
    ];

    /// Apply the transform.
    pub fn apply(self, grid: &Grid) -> Grid {
        match self {
            Transform::Identity => grid.clone(),
            Transform::Rotate90 => grid.rotate_cw(1),
            Transform::Rotate180 => grid.rotate_cw(2),
            Transform::Rotate270 => grid.rotate_cw(3),
            Transform::FlipHorizontal => grid.flip_horizontal(),
            Transform::FlipVertical => grid.flip_vertical(),
        }
    }

    /// The transform undoing this one.
    pub fn inverse(self) -> Transform {
        match self {
            Transform::Rotate90 => Transform::Rotate270,
            Transform::Rotate270 => Transform::Rotate90,
            other => other,
        }
    }

    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Transform::Identity => "id",
            Transform::Rotate90 => "rot90",
            Transform::Rotate180 => "rot180",
            Transform::Rotate270 => "rot270",
            Transform::FlipHorizontal => "flip_x",
            Transform::FlipVertical => "flip_y",
        }
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_undoes_every_transform() {
        let g = Grid::new(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        for t in Transform::ALL {
            assert_eq!(t.inverse().apply(&t.apply(&g)), g, "{}", t);
        }
    }
}
