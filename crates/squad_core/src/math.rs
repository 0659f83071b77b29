//! Fixed-point math utilities for deterministic simulation.
//!
//! Positions, speeds and ranges are all fixed-point so two runs with the
//! same inputs produce bit-identical states. Floats only appear when an
//! angle is handed to a renderer.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// 32 integer bits and 32 fractional bits.
pub type Fixed = I32F32;

/// Fixed-point 2D vector in world (pixel) space.
///
/// `x` grows to the right, `y` grows downwards, matching screen space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Create a vector from whole pixel coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates at `Fixed::MAX` for points too far apart to square.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Move towards `target` by at most `max_step`, landing exactly on it
    /// when it is closer than that.
    #[must_use]
    pub fn step_towards(self, target: Self, max_step: Fixed) -> Self {
        let delta = target - self;
        let dist = delta.length();
        if dist <= max_step || dist == Fixed::ZERO {
            return target;
        }

        self + delta.scale(max_step / dist)
    }

    /// Whether `other` lies within `radius` of this point (inclusive).
    #[must_use]
    pub fn within(self, other: Self, radius: Fixed) -> bool {
        self.distance_squared(other) <= radius.saturating_mul(radius)
    }

    /// Angle in radians from this point to `other`, measured from +x
    /// towards +y.
    ///
    /// Presentation only: the result is a float and must not feed back
    /// into simulation state.
    #[must_use]
    pub fn angle_to(self, other: Self) -> f64 {
        let dx = (other.x - self.x).to_num::<f64>();
        let dy = (other.y - self.y).to_num::<f64>();
        dy.atan2(dx)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    #[test]
    fn test_distance() {
        // 3-4-5 triangle
        let dist = v(0, 0).distance(v(3, 4));
        let eps = Fixed::ONE / Fixed::from_num(10_000);
        assert!((dist - Fixed::from_num(5)).abs() < eps, "got {dist}");
    }

    #[test]
    fn test_step_towards_clamps_to_target() {
        let start = v(0, 0);
        let target = v(3, 0);
        assert_eq!(start.step_towards(target, Fixed::from_num(5)), target);

        let partial = start.step_towards(v(10, 0), Fixed::from_num(4));
        let eps = Fixed::ONE / Fixed::from_num(10_000);
        assert!((partial.x - Fixed::from_num(4)).abs() < eps);
        assert_eq!(partial.y, Fixed::ZERO);
    }

    #[test]
    fn test_within_is_inclusive() {
        assert!(v(0, 0).within(v(2, 0), Fixed::from_num(2)));
        assert!(!v(0, 0).within(v(3, 0), Fixed::from_num(2)));
    }

    #[test]
    fn test_far_points_saturate() {
        let far = v(-1_000_000, -1_000_000);
        let near = v(1_000_000, 1_000_000);
        assert_eq!(far.distance_squared(near), Fixed::MAX);
        assert!(far.within(near, Fixed::from_num(1_000_000_000)));
        assert!(!far.within(near, Fixed::from_num(100)));

        let dist = far.distance(near);
        assert!(dist > Fixed::from_num(46_000), "got {dist}");
    }

    #[test]
    fn test_angle_to_cardinals() {
        let origin = v(0, 0);
        assert!((origin.angle_to(v(1, 0)) - 0.0).abs() < 1e-9);
        assert!((origin.angle_to(v(0, 1)) - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((origin.angle_to(v(-1, 0)) - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }
}
