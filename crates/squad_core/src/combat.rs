//! Projectiles and hit resolution.
//!
//! Flight is a straight line at constant velocity. Overlaps come either
//! from the built-in radius check or from a host physics layer; either
//! way a hit only counts when both the projectile and the enemy are still
//! active.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::enemy::{DamageOutcome, EnemyId, EnemyPool};
use crate::math::{Fixed, Vec2Fixed};
use crate::unit::UnitId;

/// Projectile identifier. Slots are reused once a projectile expires.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ProjectileId(pub u32);

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Slot id.
    pub id: ProjectileId,
    /// Unit that fired it.
    pub owner: UnitId,
    /// Current position.
    pub position: Vec2Fixed,
    /// Displacement per tick.
    pub velocity: Vec2Fixed,
    /// Damage dealt on hit.
    pub damage: u32,
    /// Ticks left before it expires.
    pub lifespan: u32,
    /// Whether it is still flying.
    pub active: bool,
}

/// Parameters for a new shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shot {
    /// Shooter.
    pub owner: UnitId,
    /// Muzzle position.
    pub origin: Vec2Fixed,
    /// Unit direction of travel.
    pub direction: Vec2Fixed,
    /// Distance per tick.
    pub speed: Fixed,
    /// Damage on hit.
    pub damage: u32,
    /// Ticks before expiry.
    pub lifespan: u32,
}

/// A projectile connected with an enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// Projectile that hit.
    pub projectile: ProjectileId,
    /// Unit credited with the hit.
    pub owner: UnitId,
    /// Enemy that was hit.
    pub enemy: EnemyId,
    /// Damage applied.
    pub damage: u32,
    /// Whether the enemy died.
    pub killed: bool,
}

/// Every projectile slot, active or expired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectilePool {
    projectiles: Vec<Projectile>,
}

impl ProjectilePool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Active projectiles.
    pub fn active(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter().filter(|p| p.active)
    }

    /// Look up a projectile slot.
    #[must_use]
    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(id.0 as usize)
    }

    /// Launch a projectile, reusing an expired slot when possible.
    pub fn fire(&mut self, shot: Shot) -> ProjectileId {
        let fresh = |id| Projectile {
            id,
            owner: shot.owner,
            position: shot.origin,
            velocity: shot.direction.scale(shot.speed),
            damage: shot.damage,
            lifespan: shot.lifespan,
            active: shot.lifespan > 0,
        };

        if let Some(slot) = self.projectiles.iter_mut().find(|p| !p.active) {
            *slot = fresh(slot.id);
            return slot.id;
        }

        let id = ProjectileId(self.projectiles.len() as u32);
        self.projectiles.push(fresh(id));
        id
    }

    /// Move every active projectile one tick and expire old ones.
    pub fn advance(&mut self) {
        for p in self.projectiles.iter_mut().filter(|p| p.active) {
            p.position += p.velocity;
            p.lifespan -= 1;
            if p.lifespan == 0 {
                p.active = false;
            }
        }
    }

    /// Pairs of (projectile, enemy) within `radius` of each other.
    ///
    /// Each projectile reports at most one enemy, the first active one in
    /// id order.
    #[must_use]
    pub fn overlaps(&self, enemies: &EnemyPool, radius: Fixed) -> Vec<(ProjectileId, EnemyId)> {
        self.active()
            .filter_map(|p| {
                enemies
                    .enemies()
                    .iter()
                    .find(|e| e.is_active() && p.position.within(e.position(), radius))
                    .map(|e| (p.id, e.id()))
            })
            .collect()
    }

    /// Apply one overlap event.
    ///
    /// Returns `None` if either side is already inactive, so a bullet
    /// cannot hit twice and a dead enemy cannot absorb bullets.
    pub fn resolve(&mut self, projectile: ProjectileId, enemy: EnemyId, enemies: &mut EnemyPool) -> Option<Hit> {
        let p = self
            .projectiles
            .get_mut(projectile.0 as usize)
            .filter(|p| p.active)?;
        let outcome = enemies.apply_damage(enemy, p.damage)?;
        p.active = false;

        Some(Hit {
            projectile,
            owner: p.owner,
            enemy,
            damage: p.damage,
            killed: outcome == DamageOutcome::Killed,
        })
    }

    /// Feed active projectile state into a determinism hash.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        for p in self.active() {
            p.id.hash(hasher);
            p.position.hash(hasher);
            p.lifespan.hash(hasher);
        }
    }
}
