//! Target selection and lead prediction.
//!
//! Selection is first-found-in-range over enemies in the order given. It
//! is not a nearest-enemy search. Callers that want a different priority
//! must order the candidates themselves.
//!
//! Lead prediction estimates projectile travel time from the current
//! distance and asks the target where it will be after that many ticks.
//! This assumes projectiles are much faster than enemies; there is no
//! iterative convergence.

use serde::{Deserialize, Serialize};

use crate::enemy::EnemyId;
use crate::math::{Fixed, Vec2Fixed};

/// Anything that can be targeted and asked about its future position.
pub trait PredictPosition {
    /// Target id.
    fn id(&self) -> EnemyId;

    /// Whether the target is alive and on the board.
    fn is_active(&self) -> bool;

    /// Current position.
    fn position(&self) -> Vec2Fixed;

    /// Position after `ticks` more ticks, fractional ticks allowed.
    fn predicted_position(&self, ticks: Fixed) -> Vec2Fixed;
}

/// Where to shoot and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AimSolution {
    /// Target being shot at.
    pub target: EnemyId,
    /// Predicted impact point.
    pub aim_point: Vec2Fixed,
    /// Unit vector from shooter to `aim_point`.
    pub direction: Vec2Fixed,
    /// Estimated projectile flight time in ticks.
    #[serde(with = "crate::math::fixed_serde")]
    pub travel_ticks: Fixed,
}

impl AimSolution {
    /// Firing angle in radians for a renderer.
    #[must_use]
    pub fn angle_from(&self, shooter: Vec2Fixed) -> f64 {
        shooter.angle_to(self.aim_point)
    }
}

/// First active candidate within `range` of `shooter`.
pub fn select_target<T, I>(shooter: Vec2Fixed, range: Fixed, candidates: I) -> Option<T>
where
    T: PredictPosition,
    I: IntoIterator<Item = T>,
{
    candidates
        .into_iter()
        .find(|c| c.is_active() && shooter.within(c.position(), range))
}

/// Compute a lead-compensated shot at `target`.
///
/// A non-positive projectile speed degenerates to aiming at the current
/// position.
#[must_use]
pub fn lead_target<T: PredictPosition>(
    shooter: Vec2Fixed,
    target: &T,
    projectile_speed: Fixed,
) -> AimSolution {
    let current = target.position();
    let travel_ticks = if projectile_speed > Fixed::ZERO {
        shooter.distance(current).saturating_div(projectile_speed)
    } else {
        Fixed::ZERO
    };

    let aim_point = target.predicted_position(travel_ticks);
    AimSolution {
        target: target.id(),
        aim_point,
        direction: (aim_point - shooter).normalize(),
        travel_ticks,
    }
}

/// Select a target and aim at it in one step.
pub fn acquire<T, I>(
    shooter: Vec2Fixed,
    range: Fixed,
    projectile_speed: Fixed,
    candidates: I,
) -> Option<AimSolution>
where
    T: PredictPosition,
    I: IntoIterator<Item = T>,
{
    select_target(shooter, range, candidates).map(|t| lead_target(shooter, &t, projectile_speed))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Target moving in a straight line at constant velocity.
    #[derive(Debug, Clone, Copy)]
    struct Linear {
        id: u32,
        at: Vec2Fixed,
        velocity: Vec2Fixed,
        active: bool,
    }

    impl PredictPosition for &Linear {
        fn id(&self) -> EnemyId {
            EnemyId(self.id)
        }
        fn is_active(&self) -> bool {
            self.active
        }
        fn position(&self) -> Vec2Fixed {
            self.at
        }
        fn predicted_position(&self, ticks: Fixed) -> Vec2Fixed {
            self.at + self.velocity.scale(ticks)
        }
    }

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn still(id: u32, x: i32, y: i32) -> Linear {
        Linear {
            id,
            at: v(x, y),
            velocity: Vec2Fixed::ZERO,
            active: true,
        }
    }

    #[test]
    fn test_first_in_range_not_nearest() {
        let far = still(1, 90, 0);
        let near = still(2, 10, 0);
        let picked = select_target(v(0, 0), Fixed::from_num(100), [&far, &near]).unwrap();
        assert_eq!(picked.id(), EnemyId(1));
    }

    #[test]
    fn test_out_of_range_and_inactive_skipped() {
        let outside = still(1, 101, 0);
        let mut dead = still(2, 5, 0);
        dead.active = false;
        let inside = still(3, 0, 100);
        let picked = select_target(v(0, 0), Fixed::from_num(100), [&outside, &dead, &inside]).unwrap();
        assert_eq!(picked.id(), EnemyId(3));

        assert!(select_target(v(0, 0), Fixed::from_num(100), [&outside, &dead]).is_none());
    }

    #[test]
    fn test_stationary_target_uses_plain_angle() {
        let shooter = v(10, 10);
        let target = still(1, 40, 50);
        let aim = lead_target(shooter, &&target, Fixed::from_num(15));
        assert_eq!(aim.aim_point, target.at);
        assert!((aim.angle_from(shooter) - shooter.angle_to(target.at)).abs() < 1e-12);
    }

    #[test]
    fn test_moving_target_is_led() {
        let shooter = v(0, 0);
        let target = Linear {
            id: 1,
            at: v(0, 60),
            velocity: v(3, 0),
            active: true,
        };
        let aim = lead_target(shooter, &&target, Fixed::from_num(15));
        // 60 units at 15 per tick is 4 ticks; the target moves 12 to the right.
        assert_eq!(aim.travel_ticks, Fixed::from_num(4));
        assert_eq!(aim.aim_point, v(12, 60));
        assert!(aim.direction.x > Fixed::ZERO);
    }

    #[test]
    fn test_acquire_none_when_empty() {
        let none: [&Linear; 0] = [];
        assert!(acquire(v(0, 0), Fixed::from_num(100), Fixed::from_num(15), none).is_none());
    }
}
