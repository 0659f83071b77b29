//! The simulation loop.
//!
//! [`Simulation`] owns the grid, the squad, the enemy and projectile pools
//! and the path planner, and advances them in a fixed order:
//!
//! 1. **Paths** - resolve queued path requests and hand current ones to units
//! 2. **Spawning** - count down to the next enemy
//! 3. **Units** - preparation timers, move commits and movement
//! 4. **Enemies** - walk the lane; escapees damage the base
//! 5. **Targeting** - engaged units with a ready weapon fire a led shot
//! 6. **Projectiles** - fly, expire and resolve overlaps
//!
//! Path outcomes are only ever applied in step 1 or directly after a move
//! command, never while units are moving.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::combat::{Hit, ProjectileId, ProjectilePool, Shot};
use crate::config::SimConfig;
use crate::enemy::{EnemyId, EnemyPath, EnemyPool, HomeBase};
use crate::error::{CommandRejection, Result, SquadError};
use crate::formation::FormationCatalog;
use crate::grid::{OccupancyGrid, TileCode, TileCoord};
use crate::input::{self, InputAction, InputEvent};
use crate::level::LevelLayout;
use crate::pathfinding::PathPlanner;
use crate::squad::{self, FormationPreview, MoveOrder, SquadCoordinator};
use crate::targeting::{acquire, AimSolution};
use crate::unit::{Unit, UnitEvent, UnitId, UnitKind};

/// A unit fired this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotFired {
    /// Shooter.
    pub unit: UnitId,
    /// Projectile launched.
    pub projectile: ProjectileId,
    /// Aim used.
    pub aim: AimSolution,
}

/// Everything observable that happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick number after this step.
    pub tick: u64,
    /// Rejected commands, including asynchronous path failures.
    pub alerts: Vec<CommandRejection>,
    /// Unit state changes and commit rejections.
    pub transitions: Vec<(UnitId, UnitEvent)>,
    /// Enemies spawned or recycled.
    pub spawned: Vec<EnemyId>,
    /// Shots fired.
    pub shots: Vec<ShotFired>,
    /// Projectile hits.
    pub hits: Vec<Hit>,
    /// Enemies that reached the end of the lane.
    pub escaped: Vec<EnemyId>,
    /// Whether the base has fallen.
    pub base_destroyed: bool,
}

/// The squad simulation.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    tick: u64,
    grid: OccupancyGrid,
    units: BTreeMap<UnitId, Unit>,
    next_unit: u32,
    coordinator: SquadCoordinator,
    planner: PathPlanner,
    enemies: EnemyPool,
    projectiles: ProjectilePool,
    base: HomeBase,
    alerts: Vec<CommandRejection>,
    preview_anchor: Option<TileCoord>,
}

impl Simulation {
    /// Build a simulation for a level with the stock formations.
    pub fn new(config: SimConfig, layout: &LevelLayout) -> Result<Self> {
        Self::with_catalog(config, layout, FormationCatalog::default())
    }

    /// Build a simulation for a level with a custom formation catalog.
    ///
    /// The level's lane is checked for connectivity and its starting
    /// units are placed in order.
    pub fn with_catalog(config: SimConfig, layout: &LevelLayout, catalog: FormationCatalog) -> Result<Self> {
        config.validate()?;
        let grid = layout.build_grid(config.tile_size)?;
        layout.validate_lane(&grid)?;
        let path = layout.enemy_path(&grid)?;

        let mut sim = Self::from_parts(config, grid, path, catalog)?;
        for start in &layout.starting_units {
            sim.place_unit(start.tile, start.kind)?;
        }
        Ok(sim)
    }

    /// Build a simulation from an already-built grid and enemy path.
    pub fn from_parts(
        config: SimConfig,
        grid: OccupancyGrid,
        enemy_path: EnemyPath,
        catalog: FormationCatalog,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = SquadCoordinator::new(catalog, &config.default_formation)?;
        let enemies = EnemyPool::new(enemy_path, config.waves());
        let base = HomeBase::new(config.base_hp);

        tracing::info!(
            rows = grid.rows(),
            cols = grid.cols(),
            formation = coordinator.formation(),
            "simulation created"
        );

        Ok(Self {
            config,
            tick: 0,
            grid,
            units: BTreeMap::new(),
            next_unit: 0,
            coordinator,
            planner: PathPlanner::for_units(),
            enemies,
            projectiles: ProjectilePool::new(),
            base,
            alerts: Vec::new(),
            preview_anchor: None,
        })
    }

    /// Current tick.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Occupancy grid.
    #[must_use]
    pub const fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    /// Units on the board, by id.
    #[must_use]
    pub const fn units(&self) -> &BTreeMap<UnitId, Unit> {
        &self.units
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Unit anchored on `tile`, if any.
    #[must_use]
    pub fn unit_at(&self, tile: TileCoord) -> Option<UnitId> {
        squad::unit_at(&self.units, tile)
    }

    /// Squad coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &SquadCoordinator {
        &self.coordinator
    }

    /// Selected units in selection order.
    #[must_use]
    pub fn selection(&self) -> &[UnitId] {
        self.coordinator.selection()
    }

    /// Enemy pool.
    #[must_use]
    pub const fn enemies(&self) -> &EnemyPool {
        &self.enemies
    }

    /// Projectile pool.
    #[must_use]
    pub const fn projectiles(&self) -> &ProjectilePool {
        &self.projectiles
    }

    /// Home base.
    #[must_use]
    pub const fn base(&self) -> &HomeBase {
        &self.base
    }

    /// True once the base has fallen.
    #[must_use]
    pub const fn is_game_over(&self) -> bool {
        self.base.is_destroyed()
    }

    /// Place a squad unit on a free tile.
    pub fn place_unit(&mut self, tile: TileCoord, kind: UnitKind) -> Result<UnitId> {
        if self.units.len() >= self.config.squad_size {
            return Err(SquadError::SquadFull {
                capacity: self.config.squad_size,
            });
        }
        if self.coordinator.is_claimed(tile) {
            return Err(SquadError::not_free(tile));
        }

        let id = UnitId(self.next_unit);
        let stats = kind.stats(&self.config.unit);
        let unit = Unit::place(id, kind, stats, tile, self.config.timing(), &mut self.grid)?;
        self.next_unit += 1;
        self.units.insert(id, unit);
        Ok(id)
    }

    /// Take a unit off the board and out of the selection.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<()> {
        let mut unit = self.units.remove(&id).ok_or(SquadError::UnknownUnit(id))?;
        unit.remove(&mut self.grid);
        self.coordinator.forget(id);
        Ok(())
    }

    /// Select a single unit.
    pub fn select(&mut self, id: UnitId) -> Result<()> {
        squad::require_unit(&self.units, id)?;
        self.coordinator.select_only(id);
        Ok(())
    }

    /// Add a unit to the selection.
    pub fn add_to_selection(&mut self, id: UnitId) -> Result<()> {
        squad::require_unit(&self.units, id)?;
        self.coordinator.add_to_selection(id);
        Ok(())
    }

    /// Drop the selection.
    pub fn clear_selection(&mut self) {
        self.coordinator.clear_selection();
    }

    /// Name of the active formation.
    #[must_use]
    pub fn formation(&self) -> &str {
        self.coordinator.formation()
    }

    /// Switch to a named formation.
    pub fn set_formation(&mut self, name: &str) -> Result<()> {
        self.coordinator.set_formation(name)
    }

    /// Cycle to the next formation.
    pub fn rotate_formation(&mut self) -> &str {
        self.coordinator.rotate_formation()
    }

    /// Move the selection in formation around `anchor`.
    ///
    /// A rejected command changes nothing. An accepted one has requested
    /// its paths, and whatever the search resolved at once has already
    /// reached the units; path failures show up in the next tick's alerts.
    pub fn command_move(&mut self, anchor: TileCoord) -> std::result::Result<MoveOrder, CommandRejection> {
        match self
            .coordinator
            .command_move(anchor, &self.units, &self.grid, &mut self.planner)
        {
            Ok(order) => {
                self.flush_paths();
                Ok(order)
            }
            Err(rejection) => {
                tracing::warn!(%anchor, %rejection, "move rejected");
                Err(rejection)
            }
        }
    }

    /// Tiles the selection would take at `anchor`.
    #[must_use]
    pub fn preview_at(&self, anchor: TileCoord) -> FormationPreview {
        self.coordinator.preview(anchor, &self.units, &self.grid)
    }

    /// Preview at the last pointer position on the board.
    #[must_use]
    pub fn formation_preview(&self) -> Option<FormationPreview> {
        self.preview_anchor.map(|anchor| self.preview_at(anchor))
    }

    /// Decode and apply one input event.
    ///
    /// Returns the decoded action. Refused actions are reported as alerts.
    pub fn handle_input(&mut self, event: InputEvent) -> Option<InputAction> {
        let units = &self.units;
        let action = input::decode(event, &self.grid, |tile| squad::unit_at(units, tile))?;

        match action {
            InputAction::SelectOnly(id) => self.coordinator.select_only(id),
            InputAction::AddToSelection(id) => self.coordinator.add_to_selection(id),
            InputAction::RemoveUnit(id) => {
                if let Err(err) = self.remove_unit(id) {
                    tracing::warn!(%id, %err, "remove ignored");
                }
            }
            InputAction::PlaceUnit(tile) => {
                if let Err(err) = self.place_unit(tile, UnitKind::default()) {
                    tracing::warn!(%tile, %err, "placement refused");
                    self.alerts.push(CommandRejection::PlacementRefused {
                        reason: err.to_string(),
                    });
                }
            }
            InputAction::MoveSelection(tile) => {
                if let Err(rejection) = self.command_move(tile) {
                    self.alerts.push(rejection);
                }
            }
            InputAction::Preview(tile) => self.preview_anchor = tile,
            InputAction::RotateFormation => {
                self.coordinator.rotate_formation();
            }
            InputAction::ClearSelection => self.coordinator.clear_selection(),
        }
        Some(action)
    }

    /// Alerts raised since the last tick, leaving none behind.
    pub fn take_alerts(&mut self) -> Vec<CommandRejection> {
        std::mem::take(&mut self.alerts)
    }

    /// Apply an overlap reported by an external physics layer.
    pub fn apply_overlap(&mut self, projectile: ProjectileId, enemy: EnemyId) -> Option<Hit> {
        self.projectiles.resolve(projectile, enemy, &mut self.enemies)
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();

        // 1. Paths
        self.flush_paths();

        // 2. Spawning
        if !self.base.is_destroyed() {
            events.spawned.extend(self.enemies.tick_spawn());
        }

        // 3. Units
        for (&id, unit) in &mut self.units {
            for event in unit.tick(&mut self.grid) {
                if let UnitEvent::CommitRejected { destination } = event {
                    self.alerts.push(CommandRejection::DestinationTaken {
                        unit: id,
                        row: destination.row,
                        col: destination.col,
                    });
                }
                events.transitions.push((id, event));
            }
        }
        self.coordinator.settle_claims(&self.units);

        // 4. Enemies
        events.escaped = self.enemies.advance();
        if !events.escaped.is_empty() {
            let was_destroyed = self.base.is_destroyed();
            let damage = self.config.enemy_escape_damage * events.escaped.len() as u32;
            if self.base.take_damage(damage) && !was_destroyed {
                tracing::info!(tick = self.tick, "base destroyed");
            }
        }
        events.base_destroyed = self.base.is_destroyed();

        // 5. Targeting
        self.fire_weapons(&mut events);

        // 6. Projectiles
        self.projectiles.advance();
        for (projectile, enemy) in self.projectiles.overlaps(&self.enemies, self.config.hit_radius) {
            events.hits.extend(self.projectiles.resolve(projectile, enemy, &mut self.enemies));
        }

        self.tick += 1;
        events.tick = self.tick;
        events.alerts = self.take_alerts();

        #[cfg(feature = "debug-validation")]
        if !self.occupancy_consistent() {
            tracing::error!(tick = self.tick, "occupied tiles disagree with unit anchors");
        }

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Hand resolved paths to their units.
    ///
    /// Outcomes for superseded requests or removed units are dropped.
    /// A unit with no route, or whose redirect target was taken, stays
    /// where it is and an alert is raised.
    fn flush_paths(&mut self) {
        if self.planner.in_flight() > 0 {
            self.planner.calculate(&self.grid);
        }

        for outcome in self.planner.drain() {
            if !self.coordinator.accept(&outcome) {
                continue;
            }
            let Some(unit) = self.units.get_mut(&outcome.unit) else {
                continue;
            };

            let Some(path) = outcome.path else {
                tracing::warn!(
                    unit = %outcome.unit,
                    origin = %outcome.origin,
                    destination = %outcome.destination,
                    "no path"
                );
                self.coordinator.release_claim(outcome.unit);
                self.alerts.push(CommandRejection::NoPath { unit: outcome.unit });
                continue;
            };

            match unit.command_move(path, &mut self.grid) {
                Ok(()) => {}
                Err(SquadError::TileNotFree { row, col } | SquadError::OutOfBounds { row, col }) => {
                    self.coordinator.release_claim(outcome.unit);
                    self.alerts.push(CommandRejection::DestinationTaken {
                        unit: outcome.unit,
                        row,
                        col,
                    });
                }
                Err(err) => {
                    tracing::error!(unit = %outcome.unit, %err, "path could not be applied");
                    self.coordinator.release_claim(outcome.unit);
                }
            }
        }

        self.coordinator.settle_claims(&self.units);
    }

    fn fire_weapons(&mut self, events: &mut TickEvents) {
        for (&id, unit) in &mut self.units {
            if !unit.can_fire() {
                continue;
            }
            let stats = unit.stats();
            let Some(aim) = acquire(
                unit.position(),
                stats.fire_range,
                stats.projectile_speed,
                self.enemies.tracked(),
            ) else {
                continue;
            };

            let projectile = self.projectiles.fire(Shot {
                owner: id,
                origin: unit.position(),
                direction: aim.direction,
                speed: stats.projectile_speed,
                damage: stats.damage,
                lifespan: stats.projectile_lifespan_ticks,
            });
            unit.mark_fired(aim.direction);
            tracing::trace!(unit = %id, target = %aim.target, "shot fired");
            events.shots.push(ShotFired {
                unit: id,
                projectile,
                aim,
            });
        }
    }

    /// Whether the set of occupied tiles is exactly the set of unit anchors.
    #[must_use]
    pub fn occupancy_consistent(&self) -> bool {
        let occupied = self
            .grid
            .coords()
            .filter(|&t| self.grid.code(t) == Some(TileCode::Occupied))
            .count();
        occupied == self.units.len() && self.units.values().all(|u| self.grid.is_occupied(u.anchor()))
    }

    /// Deterministic hash of the simulation state.
    ///
    /// Two simulations fed the same inputs produce the same hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.grid.cells().hash(&mut hasher);

        self.units.len().hash(&mut hasher);
        for unit in self.units.values() {
            unit.hash_into(&mut hasher);
        }

        self.coordinator.hash_into(&mut hasher);
        self.enemies.hash_into(&mut hasher);
        self.projectiles.hash_into(&mut hasher);
        self.base.hash(&mut hasher);

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Fixed, Vec2Fixed};
    use crate::state_machine::MovementState;

    fn quiet_config() -> SimConfig {
        SimConfig {
            move_delay_ticks: 3,
            engage_delay_ticks: 2,
            enemy_spawn_interval_ticks: 0,
            ..SimConfig::default()
        }
    }

    fn open_sim(rows: u32, cols: u32) -> Simulation {
        let grid = OccupancyGrid::new(rows, cols, Fixed::from_num(32));
        let path = EnemyPath::new(vec![Vec2Fixed::from_ints(-100, -100), Vec2Fixed::from_ints(-100, 0)]).unwrap();
        Simulation::from_parts(quiet_config(), grid, path, FormationCatalog::default()).unwrap()
    }

    #[test]
    fn test_default_level_starts_with_two_tanks() {
        let sim = Simulation::new(SimConfig::default(), &LevelLayout::default()).unwrap();
        assert_eq!(sim.units().len(), 2);
        assert!(sim.grid().is_occupied(TileCoord::new(7, 2)));
        assert!(sim.grid().is_occupied(TileCoord::new(7, 3)));
        assert!(sim.occupancy_consistent());
    }

    #[test]
    fn test_board_wide_fire_range_keeps_running() {
        let mut config = SimConfig::default();
        config.unit.fire_range = Fixed::from_num(50_000);
        config.hit_radius = Fixed::from_num(40_000);
        config.validate().unwrap();

        let mut sim = Simulation::new(config, &LevelLayout::default()).unwrap();
        let mut shots = 0;
        for _ in 0..100 {
            shots += sim.tick().shots.len();
        }
        assert_eq!(sim.get_tick(), 100);
        assert!(shots > 0);
        assert!(sim.occupancy_consistent());
    }

    #[test]
    fn test_squad_size_cap() {
        let mut sim = open_sim(2, 5);
        for col in 0..5 {
            sim.place_unit(TileCoord::new(0, col), UnitKind::Tank).unwrap();
        }
        assert_eq!(
            sim.place_unit(TileCoord::new(1, 0), UnitKind::Tank),
            Err(SquadError::SquadFull { capacity: 5 })
        );
    }

    #[test]
    fn test_move_through_full_cycle() {
        let mut sim = open_sim(3, 4);
        let id = sim.place_unit(TileCoord::new(0, 0), UnitKind::Tank).unwrap();
        sim.select(id).unwrap();

        let order = sim.command_move(TileCoord::new(0, 3)).unwrap();
        assert_eq!(order.requested, vec![id]);
        assert_eq!(sim.unit(id).unwrap().state(), MovementState::PreparingToMove);
        assert!(sim.grid().is_occupied(TileCoord::new(0, 0)));

        for _ in 0..60 {
            sim.tick();
        }
        let unit = sim.unit(id).unwrap();
        assert_eq!(unit.state(), MovementState::Engaged);
        assert_eq!(unit.anchor(), TileCoord::new(0, 3));
        assert!(sim.grid().is_free(TileCoord::new(0, 0)));
        assert!(sim.occupancy_consistent());
        assert_eq!(sim.coordinator().claim(id), None);
    }

    #[test]
    fn test_unreachable_destination_alerts_no_path() {
        let mut sim = open_sim(3, 3);
        let id = sim.place_unit(TileCoord::new(0, 0), UnitKind::Tank).unwrap();
        for tile in [TileCoord::new(1, 2), TileCoord::new(2, 1)] {
            sim.grid.set_code(tile, TileCode::Blocked);
        }
        sim.select(id).unwrap();
        sim.set_formation("horizontal").unwrap();

        sim.command_move(TileCoord::new(2, 2)).unwrap();
        let events = sim.tick();
        assert_eq!(events.alerts, vec![CommandRejection::NoPath { unit: id }]);
        assert_eq!(sim.unit(id).unwrap().state(), MovementState::Engaged);
        assert_eq!(sim.coordinator().claim(id), None);
    }

    #[test]
    fn test_input_place_select_and_move() {
        let mut sim = open_sim(4, 4);
        let place = InputEvent::PointerDown {
            x: 10,
            y: 10,
            button: input::PointerButton::Primary,
            modifiers: input::Modifiers {
                shift: true,
                ctrl: false,
            },
        };
        assert_eq!(sim.handle_input(place), Some(InputAction::PlaceUnit(TileCoord::new(0, 0))));
        let id = sim.unit_at(TileCoord::new(0, 0)).unwrap();

        let click = InputEvent::PointerDown {
            x: 10,
            y: 10,
            button: input::PointerButton::Primary,
            modifiers: input::Modifiers::default(),
        };
        assert_eq!(sim.handle_input(click), Some(InputAction::SelectOnly(id)));

        sim.handle_input(InputEvent::PointerMove { x: 100, y: 100 });
        let preview = sim.formation_preview().unwrap();
        assert_eq!(preview.tiles, vec![TileCoord::new(3, 3)]);
        assert!(preview.valid);

        let order = InputEvent::PointerDown {
            x: 100,
            y: 100,
            button: input::PointerButton::Secondary,
            modifiers: input::Modifiers::default(),
        };
        sim.handle_input(order);
        assert_eq!(sim.unit(id).unwrap().state(), MovementState::PreparingToMove);

        // The destination is promised to the unit, so nothing else may be placed there.
        let place_on_claim = InputEvent::PointerDown {
            x: 100,
            y: 100,
            button: input::PointerButton::Primary,
            modifiers: input::Modifiers {
                shift: true,
                ctrl: false,
            },
        };
        assert_eq!(
            sim.handle_input(place_on_claim),
            Some(InputAction::PlaceUnit(TileCoord::new(3, 3)))
        );
        assert!(matches!(
            sim.take_alerts().as_slice(),
            [CommandRejection::PlacementRefused { .. }]
        ));
    }

    #[test]
    fn test_removed_unit_frees_tile_and_selection() {
        let mut sim = open_sim(2, 2);
        let id = sim.place_unit(TileCoord::new(1, 1), UnitKind::Scout).unwrap();
        sim.select(id).unwrap();
        sim.command_move(TileCoord::new(0, 0)).unwrap();

        sim.remove_unit(id).unwrap();
        assert!(sim.grid().is_free(TileCoord::new(1, 1)));
        assert!(sim.selection().is_empty());
        assert_eq!(sim.remove_unit(id), Err(SquadError::UnknownUnit(id)));

        for _ in 0..10 {
            sim.tick();
        }
        assert!(sim.grid().is_free(TileCoord::new(0, 0)));
    }

    #[test]
    fn test_engaged_unit_shoots_passing_enemy() {
        let config = SimConfig {
            enemy_spawn_interval_ticks: 1,
            max_enemies: 1,
            ..quiet_config()
        };
        let layout = LevelLayout::default();
        let mut sim = Simulation::new(config, &layout).unwrap();

        let mut shots = 0;
        let mut hits = 0;
        for _ in 0..200 {
            let events = sim.tick();
            shots += events.shots.len();
            hits += events.hits.len();
        }
        assert!(shots > 0);
        assert!(hits > 0);
    }

    #[test]
    fn test_hash_tracks_state() {
        let mut a = open_sim(3, 3);
        let mut b = open_sim(3, 3);
        assert_eq!(a.state_hash(), b.state_hash());

        a.place_unit(TileCoord::new(0, 0), UnitKind::Tank).unwrap();
        assert_ne!(a.state_hash(), b.state_hash());
        b.place_unit(TileCoord::new(0, 0), UnitKind::Tank).unwrap();
        a.tick();
        b.tick();
        assert_eq!(a.state_hash(), b.state_hash());
    }
}
