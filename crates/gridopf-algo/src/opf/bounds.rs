//! Closed interval with a containment margin.

use tracing::warn;

/// Tolerance added on both sides when testing containment.
pub const BOUNDS_MARGIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `min - margin <= value <= max + margin`
    pub fn contains(&self, value: f64) -> bool {
        self.min - BOUNDS_MARGIN <= value && value <= self.max + BOUNDS_MARGIN
    }

    /// Flip between generator and load sign conventions.
    pub fn mirror(&self) -> Bounds {
        Bounds::new(-self.max, -self.min)
    }

    /// Shrink both bounds toward zero by `fraction` of their magnitude.
    pub fn reduce(&self, fraction: f64) -> Bounds {
        Bounds::new(self.min * (1.0 - fraction), self.max * (1.0 - fraction))
    }

    /// Bounds as a `(lb, ub)` pair ready for the solver. Inverted bounds are
    /// swapped and reported, never rejected.
    pub fn fix(id: &str, lb: f64, ub: f64) -> (f64, f64) {
        if lb > ub {
            warn!(id, lb, ub, "lower bound above upper bound, swapping");
            (ub, lb)
        } else {
            (lb, ub)
        }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
