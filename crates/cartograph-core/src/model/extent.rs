use serde::{Deserialize, Serialize};

/// A `[lon, lat]` coordinate pair.
pub type Loc = [f64; 2];

/// Axis-aligned bounding box. Bounds are inclusive.
///
/// The empty extent has inverted infinite bounds so that extending it with
/// any point yields that point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: Loc,
    pub max: Loc,
}

impl Default for Extent {
    fn default() -> Self {
        Self::empty()
    }
}

impl Extent {
    #[must_use]
    pub const fn new(min: Loc, max: Loc) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY, f64::INFINITY],
            max: [f64::NEG_INFINITY, f64::NEG_INFINITY],
        }
    }

    #[must_use]
    pub const fn from_point(loc: Loc) -> Self {
        Self { min: loc, max: loc }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    /// Smallest extent covering both.
    #[must_use]
    pub fn extend(&self, other: &Self) -> Self {
        Self {
            min: [self.min[0].min(other.min[0]), self.min[1].min(other.min[1])],
            max: [self.max[0].max(other.max[0]), self.max[1].max(other.max[1])],
        }
    }

    #[must_use]
    pub fn extend_point(&self, loc: Loc) -> Self {
        self.extend(&Self::from_point(loc))
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min[0] <= other.max[0]
            && self.min[1] <= other.max[1]
            && self.max[0] >= other.min[0]
            && self.max[1] >= other.min[1]
    }

    /// `true` when `other` lies entirely within `self`.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        !other.is_empty()
            && self.min[0] <= other.min[0]
            && self.min[1] <= other.min[1]
            && self.max[0] >= other.max[0]
            && self.max[1] >= other.max[1]
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (self.max[0] - self.min[0]) * (self.max[1] - self.min[1])
    }

    #[must_use]
    pub fn center(&self) -> Option<Loc> {
        if self.is_empty() {
            return None;
        }
        Some([
            f64::midpoint(self.min[0], self.max[0]),
            f64::midpoint(self.min[1], self.max[1]),
        ])
    }
}
