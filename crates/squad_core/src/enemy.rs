//! Path-following enemies, the spawn pool and the home base.
//!
//! Enemies do not pathfind at runtime. They walk a fixed polyline built
//! from the level's lane, parameterised by distance travelled, which is
//! what makes lead prediction a cheap lookup.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SquadError};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::targeting::PredictPosition;

/// Stable enemy identifier. Recycled enemies keep their id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct EnemyId(pub u32);

impl std::fmt::Display for EnemyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Polyline walked by every enemy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyPath {
    points: Vec<Vec2Fixed>,
    /// Arc length at each point; `cumulative[0] == 0`.
    cumulative: Vec<Fixed>,
}

impl EnemyPath {
    /// Build a path through `points`.
    pub fn new(points: Vec<Vec2Fixed>) -> Result<Self> {
        if points.len() < 2 {
            return Err(SquadError::InvalidLevel(
                "enemy path needs at least two points".into(),
            ));
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = Fixed::ZERO;
        cumulative.push(total);
        for pair in points.windows(2) {
            total += pair[0].distance(pair[1]);
            cumulative.push(total);
        }

        if total == Fixed::ZERO {
            return Err(SquadError::InvalidLevel("enemy path has zero length".into()));
        }

        Ok(Self { points, cumulative })
    }

    /// Path vertices.
    #[must_use]
    pub fn points(&self) -> &[Vec2Fixed] {
        &self.points
    }

    /// Total arc length.
    #[must_use]
    pub fn length(&self) -> Fixed {
        self.cumulative.last().copied().unwrap_or(Fixed::ZERO)
    }

    /// Point at `distance` along the path, clamped to the ends.
    #[must_use]
    pub fn point_at(&self, distance: Fixed) -> Vec2Fixed {
        if distance <= Fixed::ZERO {
            return self.points[0];
        }
        if distance >= self.length() {
            return self.points[self.points.len() - 1];
        }

        // First vertex strictly past `distance`; the segment ends there.
        let end = self.cumulative.partition_point(|&d| d <= distance);
        let start = end - 1;
        let span = self.cumulative[end] - self.cumulative[start];
        if span == Fixed::ZERO {
            return self.points[start];
        }
        let along = distance - self.cumulative[start];
        let (a, b) = (self.points[start], self.points[end]);
        a + Vec2Fixed::new((b.x - a.x) * along / span, (b.y - a.y) * along / span)
    }
}

/// A single enemy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enemy {
    id: EnemyId,
    hp: u32,
    #[serde(with = "fixed_serde")]
    traveled: Fixed,
    #[serde(with = "fixed_serde")]
    speed: Fixed,
    position: Vec2Fixed,
    active: bool,
    recycled: u32,
}

impl Enemy {
    /// Enemy id.
    #[must_use]
    pub const fn id(&self) -> EnemyId {
        self.id
    }

    /// Remaining hit points.
    #[must_use]
    pub const fn hp(&self) -> u32 {
        self.hp
    }

    /// Whether the enemy is on the board.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Current position.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// Distance travelled along the path.
    #[must_use]
    pub const fn traveled(&self) -> Fixed {
        self.traveled
    }

    /// How many times this slot has been reused.
    #[must_use]
    pub const fn recycled(&self) -> u32 {
        self.recycled
    }
}

/// An active enemy together with the path it walks.
#[derive(Debug, Clone, Copy)]
pub struct TrackedEnemy<'a> {
    enemy: &'a Enemy,
    path: &'a EnemyPath,
}

impl<'a> TrackedEnemy<'a> {
    /// Underlying enemy.
    #[must_use]
    pub const fn enemy(&self) -> &'a Enemy {
        self.enemy
    }
}

impl PredictPosition for TrackedEnemy<'_> {
    fn id(&self) -> EnemyId {
        self.enemy.id
    }

    fn is_active(&self) -> bool {
        self.enemy.active
    }

    fn position(&self) -> Vec2Fixed {
        self.enemy.position
    }

    fn predicted_position(&self, ticks: Fixed) -> Vec2Fixed {
        self.path
            .point_at(self.enemy.traveled.saturating_add(self.enemy.speed.saturating_mul(ticks)))
    }
}

/// Settings for [`EnemyPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveSettings {
    /// Starting hit points.
    pub hp: u32,
    /// Path distance per tick.
    pub speed: Fixed,
    /// Ticks between spawns.
    pub spawn_interval_ticks: u32,
    /// Cap on pool size (active plus inactive slots).
    pub max_enemies: usize,
}

/// Result of applying damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageOutcome {
    /// Enemy survived with this much hp.
    Wounded(u32),
    /// Enemy reached zero and was deactivated.
    Killed,
}

/// Spawns, moves and recycles enemies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyPool {
    path: EnemyPath,
    enemies: Vec<Enemy>,
    settings: WaveSettings,
    spawn_countdown: u32,
}

impl EnemyPool {
    /// Create an empty pool. The first spawn happens after one interval.
    #[must_use]
    pub fn new(path: EnemyPath, settings: WaveSettings) -> Self {
        let spawn_countdown = settings.spawn_interval_ticks;
        Self {
            path,
            enemies: Vec::new(),
            settings,
            spawn_countdown,
        }
    }

    /// Path enemies follow.
    #[must_use]
    pub const fn path(&self) -> &EnemyPath {
        &self.path
    }

    /// All slots, active or not, in id order.
    #[must_use]
    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    /// Look up an enemy slot.
    #[must_use]
    pub fn get(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.get(id.0 as usize)
    }

    /// Active enemies paired with the path, in id order.
    pub fn tracked(&self) -> impl Iterator<Item = TrackedEnemy<'_>> {
        self.enemies.iter().filter(|e| e.active).map(move |enemy| TrackedEnemy {
            enemy,
            path: &self.path,
        })
    }

    /// Number of active enemies.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.enemies.iter().filter(|e| e.active).count()
    }

    /// Count down to the next spawn; spawn when it elapses.
    ///
    /// Reuses the lowest inactive slot before growing the pool. Returns
    /// `None` when nothing spawned, including when the pool is full.
    pub fn tick_spawn(&mut self) -> Option<EnemyId> {
        if self.settings.spawn_interval_ticks == 0 {
            return None;
        }
        self.spawn_countdown = self.spawn_countdown.saturating_sub(1);
        if self.spawn_countdown > 0 {
            return None;
        }
        self.spawn_countdown = self.settings.spawn_interval_ticks;
        self.spawn()
    }

    /// Put an enemy at the start of the path immediately.
    pub fn spawn(&mut self) -> Option<EnemyId> {
        let start = self.path.point_at(Fixed::ZERO);
        if let Some(slot) = self.enemies.iter_mut().find(|e| !e.active) {
            slot.hp = self.settings.hp;
            slot.traveled = Fixed::ZERO;
            slot.position = start;
            slot.active = true;
            slot.recycled += 1;
            tracing::trace!(id = %slot.id, recycled = slot.recycled, "enemy recycled");
            return Some(slot.id);
        }

        if self.enemies.len() >= self.settings.max_enemies {
            return None;
        }

        let id = EnemyId(self.enemies.len() as u32);
        self.enemies.push(Enemy {
            id,
            hp: self.settings.hp,
            traveled: Fixed::ZERO,
            speed: self.settings.speed,
            position: start,
            active: true,
            recycled: 0,
        });
        tracing::trace!(%id, "enemy spawned");
        Some(id)
    }

    /// Move every active enemy along the path.
    ///
    /// Returns the ids of enemies that reached the end; they are
    /// deactivated.
    pub fn advance(&mut self) -> Vec<EnemyId> {
        let length = self.path.length();
        let mut escaped = Vec::new();
        for enemy in self.enemies.iter_mut().filter(|e| e.active) {
            enemy.traveled += enemy.speed;
            enemy.position = self.path.point_at(enemy.traveled);
            if enemy.traveled >= length {
                enemy.active = false;
                escaped.push(enemy.id);
            }
        }
        escaped
    }

    /// Subtract hp from an active enemy.
    ///
    /// Returns `None` for unknown or inactive enemies.
    pub fn apply_damage(&mut self, id: EnemyId, damage: u32) -> Option<DamageOutcome> {
        let enemy = self.enemies.get_mut(id.0 as usize).filter(|e| e.active)?;
        enemy.hp = enemy.hp.saturating_sub(damage);
        if enemy.hp == 0 {
            enemy.active = false;
            Some(DamageOutcome::Killed)
        } else {
            Some(DamageOutcome::Wounded(enemy.hp))
        }
    }

    /// Feed pool state into a determinism hash.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        self.spawn_countdown.hash(hasher);
        for enemy in &self.enemies {
            enemy.id.hash(hasher);
            enemy.hp.hash(hasher);
            enemy.traveled.to_bits().hash(hasher);
            enemy.active.hash(hasher);
            enemy.recycled.hash(hasher);
        }
    }
}

/// The structure enemies are trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HomeBase {
    hp: u32,
    max_hp: u32,
}

impl HomeBase {
    /// Base with full health.
    #[must_use]
    pub const fn new(max_hp: u32) -> Self {
        Self { hp: max_hp, max_hp }
    }

    /// Remaining hit points.
    #[must_use]
    pub const fn hp(&self) -> u32 {
        self.hp
    }

    /// Starting hit points.
    #[must_use]
    pub const fn max_hp(&self) -> u32 {
        self.max_hp
    }

    /// True once hp reaches zero.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.hp == 0
    }

    /// Subtract hp; returns whether the base is now destroyed.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        self.hp = self.hp.saturating_sub(amount);
        self.is_destroyed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn l_path() -> EnemyPath {
        EnemyPath::new(vec![v(0, 0), v(0, 100), v(50, 100)]).unwrap()
    }

    fn pool(max: usize) -> EnemyPool {
        EnemyPool::new(
            l_path(),
            WaveSettings {
                hp: 100,
                speed: Fixed::from_num(10),
                spawn_interval_ticks: 3,
                max_enemies: max,
            },
        )
    }

    #[test]
    fn test_point_at_walks_segments() {
        let path = l_path();
        assert_eq!(path.length(), Fixed::from_num(150));
        assert_eq!(path.point_at(Fixed::from_num(40)), v(0, 40));
        assert_eq!(path.point_at(Fixed::from_num(100)), v(0, 100));
        assert_eq!(path.point_at(Fixed::from_num(125)), v(25, 100));
        assert_eq!(path.point_at(Fixed::from_num(-5)), v(0, 0));
        assert_eq!(path.point_at(Fixed::from_num(999)), v(50, 100));
    }

    #[test]
    fn test_degenerate_paths_rejected() {
        assert!(EnemyPath::new(vec![v(1, 1)]).is_err());
        assert!(EnemyPath::new(vec![v(1, 1), v(1, 1)]).is_err());
    }

    #[test]
    fn test_spawn_interval() {
        let mut pool = pool(4);
        assert_eq!(pool.tick_spawn(), None);
        assert_eq!(pool.tick_spawn(), None);
        assert_eq!(pool.tick_spawn(), Some(EnemyId(0)));
        assert_eq!(pool.tick_spawn(), None);
    }

    #[test]
    fn test_escape_and_recycle() {
        let mut pool = pool(1);
        let id = pool.spawn().unwrap();
        assert_eq!(pool.spawn(), None, "pool is capped");

        let mut escaped = Vec::new();
        for _ in 0..15 {
            escaped.extend(pool.advance());
        }
        assert_eq!(escaped, vec![id]);
        assert_eq!(pool.active_count(), 0);

        assert_eq!(pool.spawn(), Some(id));
        let enemy = pool.get(id).unwrap();
        assert_eq!(enemy.recycled(), 1);
        assert_eq!(enemy.hp(), 100);
        assert_eq!(enemy.traveled(), Fixed::ZERO);
    }

    #[test]
    fn test_damage_requires_active_target() {
        let mut pool = pool(2);
        let id = pool.spawn().unwrap();
        assert_eq!(pool.apply_damage(id, 40), Some(DamageOutcome::Wounded(60)));
        assert_eq!(pool.apply_damage(id, 80), Some(DamageOutcome::Killed));
        assert_eq!(pool.apply_damage(id, 10), None);
        assert_eq!(pool.apply_damage(EnemyId(9), 10), None);
    }

    #[test]
    fn test_prediction_follows_path() {
        let mut pool = pool(1);
        pool.spawn();
        for _ in 0..9 {
            pool.advance();
        }
        let tracked = pool.tracked().next().unwrap();
        assert_eq!(tracked.position(), v(0, 90));
        // Two ticks at 10/tick turns the corner.
        assert_eq!(tracked.predicted_position(Fixed::from_num(2)), v(10, 100));
    }

    #[test]
    fn test_home_base() {
        let mut base = HomeBase::new(3);
        assert!(!base.take_damage(2));
        assert!(base.take_damage(5));
        assert_eq!(base.hp(), 0);
    }
}
