//! Controllable squad units.
//!
//! A unit owns its position, anchor tile, queued and active paths, and its
//! [`MovementMachine`]. The grid is passed in for the two operations that
//! write to it: placement/removal and the move commit.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SquadError};
use crate::grid::{OccupancyGrid, TileCoord};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::pathfinding::TilePath;
use crate::state_machine::{DelayKind, MovementAction, MovementEvent, MovementMachine, MovementState};

/// Stable unit identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct UnitId(pub u32);

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unit subtype. Each kind adjusts the configured base stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitKind {
    /// Baseline unit; uses the base stats unchanged.
    #[default]
    Tank,
    /// Slow, long-ranged, hard-hitting.
    Artillery,
    /// Fast and light.
    Scout,
}

impl UnitKind {
    /// Apply this kind's overrides to `base`.
    #[must_use]
    pub fn stats(self, base: &UnitStats) -> UnitStats {
        match self {
            Self::Tank => base.clone(),
            Self::Artillery => UnitStats {
                damage: base.damage * 4,
                fire_range: base.fire_range * Fixed::from_num(8) / Fixed::from_num(5),
                fire_interval_ticks: base.fire_interval_ticks * 5,
                speed: base.speed * Fixed::from_num(3) / Fixed::from_num(5),
                ..base.clone()
            },
            Self::Scout => UnitStats {
                damage: base.damage / 2,
                fire_range: base.fire_range * Fixed::from_num(4) / Fixed::from_num(5),
                speed: base.speed * Fixed::from_num(8) / Fixed::from_num(5),
                ..base.clone()
            },
        }
    }
}

/// Combat and movement numbers for a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitStats {
    /// Damage per projectile.
    pub damage: u32,
    /// Targeting radius in world units.
    #[serde(with = "fixed_serde")]
    pub fire_range: Fixed,
    /// Ticks between shots.
    pub fire_interval_ticks: u32,
    /// World units travelled per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// World units a projectile travels per tick.
    #[serde(with = "fixed_serde")]
    pub projectile_speed: Fixed,
    /// Ticks before a projectile expires.
    pub projectile_lifespan_ticks: u32,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            damage: 50,
            fire_range: Fixed::from_num(100),
            fire_interval_ticks: 2,
            speed: Fixed::from_num(5),
            projectile_speed: Fixed::from_num(15),
            projectile_lifespan_ticks: 20,
        }
    }
}

/// Delays and tolerances shared by every unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MovementTiming {
    /// Ticks spent in `PreparingToMove`.
    pub move_delay_ticks: u32,
    /// Ticks spent in `PreparingToEngage`.
    pub engage_delay_ticks: u32,
    /// Distance at which a waypoint counts as reached.
    pub snap_distance: Fixed,
}

/// Something observable that happened to a unit during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitEvent {
    /// The machine moved between states.
    StateChanged {
        /// Previous state.
        from: MovementState,
        /// New state.
        to: MovementState,
    },
    /// A commit found its destination taken; the unit stayed put.
    CommitRejected {
        /// Tile the unit wanted.
        destination: TileCoord,
    },
}

/// A squad unit on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    id: UnitId,
    kind: UnitKind,
    stats: UnitStats,
    position: Vec2Fixed,
    anchor: TileCoord,
    queued_path: Option<TilePath>,
    active_path: TilePath,
    machine: MovementMachine,
    fire_cooldown: u32,
    heading: Vec2Fixed,
    #[serde(with = "fixed_serde")]
    snap_distance: Fixed,
}

impl Unit {
    /// Reserve `anchor` and create a running unit standing on it.
    pub fn place(
        id: UnitId,
        kind: UnitKind,
        stats: UnitStats,
        anchor: TileCoord,
        timing: MovementTiming,
        grid: &mut OccupancyGrid,
    ) -> Result<Self> {
        grid.reserve(anchor)?;

        let mut machine = MovementMachine::new(timing.move_delay_ticks, timing.engage_delay_ticks);
        machine.start();

        tracing::debug!(%id, ?kind, %anchor, "unit placed");

        Ok(Self {
            id,
            kind,
            stats,
            position: grid.tile_center(anchor),
            anchor,
            queued_path: None,
            active_path: TilePath::default(),
            machine,
            fire_cooldown: 0,
            heading: Vec2Fixed::new(Fixed::ZERO, Fixed::from_num(-1)),
            snap_distance: timing.snap_distance,
        })
    }

    /// Take the unit off the board.
    ///
    /// The machine is stopped before the anchor is released so nothing
    /// armed earlier can act on the unit afterwards.
    pub fn remove(&mut self, grid: &mut OccupancyGrid) {
        self.machine.stop();
        self.queued_path = None;
        self.active_path = TilePath::default();
        grid.release(self.anchor);
        tracing::debug!(id = %self.id, anchor = %self.anchor, "unit removed");
    }

    /// Unit id.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Unit kind.
    #[must_use]
    pub const fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Effective stats.
    #[must_use]
    pub const fn stats(&self) -> &UnitStats {
        &self.stats
    }

    /// Current world position.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// Reserved anchor tile.
    #[must_use]
    pub const fn anchor(&self) -> TileCoord {
        self.anchor
    }

    /// Path waiting for the move delay to elapse.
    #[must_use]
    pub const fn queued_path(&self) -> Option<&TilePath> {
        self.queued_path.as_ref()
    }

    /// Path being followed.
    #[must_use]
    pub const fn active_path(&self) -> &TilePath {
        &self.active_path
    }

    /// Current machine state.
    #[must_use]
    pub const fn state(&self) -> MovementState {
        self.machine.state()
    }

    /// Whether the machine still accepts events.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    /// Unit facing direction (unit length, or zero).
    #[must_use]
    pub const fn heading(&self) -> Vec2Fixed {
        self.heading
    }

    /// Tile under the unit's current position, possibly off the board.
    #[must_use]
    pub fn current_tile(&self, grid: &OccupancyGrid) -> TileCoord {
        grid.world_to_tile_unchecked(self.position)
    }

    /// True when the unit already stands on `tile` with nothing pending.
    #[must_use]
    pub fn is_settled_on(&self, tile: TileCoord) -> bool {
        self.anchor == tile
            && self.queued_path.is_none()
            && self.active_path.is_empty()
            && matches!(self.state(), MovementState::Engaged | MovementState::PreparingToEngage)
    }

    /// Issue a move along `path`.
    ///
    /// What happens depends on the state: the path is queued while the
    /// unit is stationary or spinning down, replaces the queue while
    /// spinning up, and redirects the unit at once while moving. A
    /// redirect re-anchors immediately and needs its destination free.
    pub fn command_move(&mut self, path: TilePath, grid: &mut OccupancyGrid) -> Result<()> {
        let Some(destination) = path.destination() else {
            tracing::error!(id = %self.id, state = ?self.state(), "move issued with an empty path");
            return Err(SquadError::InvalidPath(self.id));
        };

        if self.state() == MovementState::Moving && destination != self.anchor && !grid.is_free(destination) {
            return Err(SquadError::not_free(destination));
        }

        match self.machine.dispatch(MovementEvent::MoveTo) {
            Some(MovementAction::QueuePath | MovementAction::ReplaceQueuedPath) => {
                self.queued_path = Some(path);
            }
            Some(MovementAction::RedirectActivePath) => {
                if destination != self.anchor {
                    self.swap_anchor(destination, grid)?;
                }
                self.active_path = path;
            }
            Some(action) => {
                tracing::error!(id = %self.id, ?action, "unexpected action for a move command");
                return Err(SquadError::InvalidState(format!("unit {} cannot take moves", self.id)));
            }
            None => {
                return Err(SquadError::InvalidState(format!("unit {} is not running", self.id)));
            }
        }
        Ok(())
    }

    /// Advance the unit by one tick: timers first, then movement.
    pub fn tick(&mut self, grid: &mut OccupancyGrid) -> Vec<UnitEvent> {
        let mut events = Vec::new();
        if !self.machine.is_running() {
            return events;
        }

        self.fire_cooldown = self.fire_cooldown.saturating_sub(1);

        match self.machine.tick() {
            Some(DelayKind::Move) => self.commit(grid, &mut events),
            Some(DelayKind::Engage) => {
                let event = if self.queued_path.is_some() {
                    MovementEvent::ResumeQueued
                } else {
                    MovementEvent::CommitEngage
                };
                self.fire(event, &mut events);
            }
            None => {}
        }

        if self.state() == MovementState::Moving {
            self.advance(grid);
            if self.has_arrived(grid) {
                self.position = grid.tile_center(self.anchor);
                self.fire(MovementEvent::Arrived, &mut events);
            }
        }

        events
    }

    /// Whether the weapon may fire this tick.
    #[must_use]
    pub fn can_fire(&self) -> bool {
        self.machine.is_running() && self.state() == MovementState::Engaged && self.fire_cooldown == 0
    }

    /// Record a shot along `direction` and restart the cooldown.
    pub fn mark_fired(&mut self, direction: Vec2Fixed) {
        self.fire_cooldown = self.stats.fire_interval_ticks;
        if direction != Vec2Fixed::ZERO {
            self.heading = direction;
        }
    }

    /// Feed the unit's state into a determinism hash.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        self.id.hash(hasher);
        self.position.x.to_bits().hash(hasher);
        self.position.y.to_bits().hash(hasher);
        self.anchor.hash(hasher);
        self.queued_path.hash(hasher);
        self.active_path.hash(hasher);
        self.machine.hash(hasher);
        self.fire_cooldown.hash(hasher);
    }

    fn fire(&mut self, event: MovementEvent, events: &mut Vec<UnitEvent>) -> Option<MovementAction> {
        let from = self.state();
        let action = self.machine.dispatch(event);
        let to = self.state();
        if from != to {
            tracing::debug!(id = %self.id, ?from, ?to, "unit state changed");
            events.push(UnitEvent::StateChanged { from, to });
        }
        action
    }

    fn commit(&mut self, grid: &mut OccupancyGrid, events: &mut Vec<UnitEvent>) {
        let Some(path) = self.queued_path.take() else {
            tracing::error!(id = %self.id, "move delay elapsed with no queued path");
            self.fire(MovementEvent::CommitInPlace, events);
            return;
        };
        // Queued paths are never empty; command_move refuses those.
        let destination = path.destination().unwrap_or(self.anchor);

        if destination == self.anchor {
            self.fire(MovementEvent::CommitInPlace, events);
            return;
        }

        if let Err(err) = self.swap_anchor(destination, grid) {
            tracing::error!(id = %self.id, %destination, %err, "commit destination unavailable");
            events.push(UnitEvent::CommitRejected { destination });
            self.fire(MovementEvent::CommitInPlace, events);
            return;
        }

        self.active_path = path;
        self.fire(MovementEvent::CommitMove, events);
    }

    /// Release the old anchor and reserve `destination`, or change nothing.
    fn swap_anchor(&mut self, destination: TileCoord, grid: &mut OccupancyGrid) -> Result<()> {
        if !grid.is_free(destination) {
            return Err(if grid.in_bounds(destination) {
                SquadError::not_free(destination)
            } else {
                SquadError::out_of_bounds(destination)
            });
        }
        grid.release(self.anchor);
        grid.reserve(destination)?;
        self.anchor = destination;
        Ok(())
    }

    fn advance(&mut self, grid: &OccupancyGrid) {
        let Some(next) = self.active_path.front() else {
            self.step_to(grid.tile_center(self.anchor));
            return;
        };

        let target = grid.tile_center(next);
        self.step_to(target);
        if self.position.within(target, self.snap_distance) {
            self.active_path.pop_front();
        }
    }

    fn step_to(&mut self, target: Vec2Fixed) {
        let direction = (target - self.position).normalize();
        if direction != Vec2Fixed::ZERO {
            self.heading = direction;
        }
        self.position = self.position.step_towards(target, self.stats.speed);
    }

    fn has_arrived(&self, grid: &OccupancyGrid) -> bool {
        self.active_path.is_empty()
            && self
                .position
                .within(grid.tile_center(self.anchor), self.snap_distance)
    }
}
