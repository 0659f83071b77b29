//! Squad coordination: selection, formation choice and move planning.
//!
//! The coordinator turns "move the selection to this tile" into one path
//! request per unit. It never writes the grid. Instead it keeps a claim
//! for every destination that has been handed out but not committed yet,
//! and later commands treat those claims as taken. Every unit also carries
//! a generation counter; a path outcome whose generation is older than
//! the unit's current one belongs to a superseded command and is dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{CommandRejection, Result, SquadError};
use crate::formation::{assign_formation_excluding, FormationCatalog, FormationShape};
use crate::grid::{OccupancyGrid, TileCode, TileCoord};
use crate::pathfinding::{GridSearch, PathOutcome, PathPlanner, RequestId};
use crate::unit::{Unit, UnitId};

/// Tiles a move would take, for drawing under the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationPreview {
    /// Anchor tile under the pointer.
    pub anchor: TileCoord,
    /// Assigned tiles in selection order; may be shorter than the selection.
    pub tiles: Vec<TileCoord>,
    /// Whether issuing the move now would be accepted.
    pub valid: bool,
}

/// An accepted move command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOrder {
    /// Anchor tile of the formation.
    pub anchor: TileCoord,
    /// Destination per selected unit, in selection order.
    pub assignments: Vec<(UnitId, TileCoord)>,
    /// Units a path was requested for. Units already settled on their
    /// assigned tile are left out.
    pub requested: Vec<UnitId>,
}

/// Selection, active formation and in-flight move bookkeeping.
#[derive(Debug, Clone)]
pub struct SquadCoordinator {
    catalog: FormationCatalog,
    formation: usize,
    selection: Vec<UnitId>,
    claims: BTreeMap<UnitId, TileCoord>,
    generations: BTreeMap<UnitId, u64>,
    awaiting: BTreeMap<UnitId, RequestId>,
}

impl SquadCoordinator {
    /// Create a coordinator with `formation` active.
    pub fn new(catalog: FormationCatalog, formation: &str) -> Result<Self> {
        let formation = catalog.position(formation)?;
        Ok(Self {
            catalog,
            formation,
            selection: Vec::new(),
            claims: BTreeMap::new(),
            generations: BTreeMap::new(),
            awaiting: BTreeMap::new(),
        })
    }

    /// Formation catalog.
    #[must_use]
    pub const fn catalog(&self) -> &FormationCatalog {
        &self.catalog
    }

    /// Name of the active formation.
    #[must_use]
    pub fn formation(&self) -> &str {
        self.shape().name()
    }

    /// Active formation shape.
    #[must_use]
    pub fn shape(&self) -> &FormationShape {
        self.catalog.shape_at(self.formation)
    }

    /// Switch to a named formation.
    pub fn set_formation(&mut self, name: &str) -> Result<()> {
        self.formation = self.catalog.position(name)?;
        Ok(())
    }

    /// Advance to the next formation in catalog order.
    pub fn rotate_formation(&mut self) -> &str {
        let from = self.formation;
        self.formation = (self.formation + 1) % self.catalog.len();
        tracing::debug!(
            from = self.catalog.shape_at(from).name(),
            to = self.formation(),
            "formation rotated"
        );
        self.formation()
    }

    /// Selected units in selection order.
    #[must_use]
    pub fn selection(&self) -> &[UnitId] {
        &self.selection
    }

    /// Whether `unit` is selected.
    #[must_use]
    pub fn is_selected(&self, unit: UnitId) -> bool {
        self.selection.contains(&unit)
    }

    /// Replace the selection with a single unit.
    pub fn select_only(&mut self, unit: UnitId) {
        self.selection.clear();
        self.selection.push(unit);
    }

    /// Append a unit to the selection; already selected units keep their place.
    pub fn add_to_selection(&mut self, unit: UnitId) {
        if !self.is_selected(unit) {
            self.selection.push(unit);
        }
    }

    /// Empty the selection.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Drop every trace of a unit that left the board.
    pub fn forget(&mut self, unit: UnitId) {
        self.selection.retain(|&u| u != unit);
        self.claims.remove(&unit);
        self.awaiting.remove(&unit);
        self.generations.remove(&unit);
    }

    /// Destination promised to `unit` and not yet committed.
    #[must_use]
    pub fn claim(&self, unit: UnitId) -> Option<TileCoord> {
        self.claims.get(&unit).copied()
    }

    /// Whether any unit holds a claim on `tile`.
    #[must_use]
    pub fn is_claimed(&self, tile: TileCoord) -> bool {
        self.claims.values().any(|&t| t == tile)
    }

    /// Whether a path request for `unit` has not come back yet.
    #[must_use]
    pub fn is_awaiting(&self, unit: UnitId) -> bool {
        self.awaiting.contains_key(&unit)
    }

    /// Assign formation tiles around `anchor` without touching any state.
    ///
    /// Returns the selected unit ids that still exist and their tiles; the
    /// tile list may be shorter than the unit list.
    fn assignment(
        &self,
        anchor: TileCoord,
        units: &BTreeMap<UnitId, Unit>,
        grid: &OccupancyGrid,
    ) -> std::result::Result<(Vec<UnitId>, Vec<TileCoord>), CommandRejection> {
        let selected: Vec<&Unit> = self
            .selection
            .iter()
            .filter_map(|id| units.get(id))
            .collect();
        if selected.is_empty() {
            return Err(CommandRejection::NoSelection);
        }

        match grid.code(anchor) {
            None | Some(TileCode::Blocked | TileCode::EnemyLane) => {
                return Err(CommandRejection::invalid_target(anchor));
            }
            Some(TileCode::Occupied) if !selected.iter().any(|u| u.anchor() == anchor) => {
                return Err(CommandRejection::invalid_target(anchor));
            }
            Some(_) => {}
        }

        let shape = self.shape();
        let ids: Vec<UnitId> = selected.iter().map(|u| u.id()).collect();
        let excluded: BTreeSet<TileCoord> = self
            .claims
            .iter()
            .filter(|(unit, _)| !ids.contains(unit))
            .map(|(_, &tile)| tile)
            .collect();
        let anchors: Vec<TileCoord> = selected.iter().map(|u| u.anchor()).collect();

        let tiles = assign_formation_excluding(anchor, &anchors, grid, shape, &excluded);
        Ok((ids, tiles))
    }

    /// What a move to `anchor` would assign, without issuing it.
    #[must_use]
    pub fn preview(
        &self,
        anchor: TileCoord,
        units: &BTreeMap<UnitId, Unit>,
        grid: &OccupancyGrid,
    ) -> FormationPreview {
        match self.assignment(anchor, units, grid) {
            Ok((ids, tiles)) => FormationPreview {
                anchor,
                valid: tiles.len() == ids.len(),
                tiles,
            },
            Err(_) => FormationPreview {
                anchor,
                tiles: Vec::new(),
                valid: false,
            },
        }
    }

    /// Plan a formation move to `anchor` and request one path per unit.
    ///
    /// Nothing is requested unless every selected unit gets a tile. The
    /// whole command is processed, claims included, before this returns,
    /// so a second command in the same tick sees the first one's claims.
    pub fn command_move<S: GridSearch>(
        &mut self,
        anchor: TileCoord,
        units: &BTreeMap<UnitId, Unit>,
        grid: &OccupancyGrid,
        planner: &mut PathPlanner<S>,
    ) -> std::result::Result<MoveOrder, CommandRejection> {
        let (ids, tiles) = self.assignment(anchor, units, grid)?;
        if tiles.len() < ids.len() {
            return Err(CommandRejection::InsufficientSpace {
                required: ids.len(),
                available: tiles.len(),
            });
        }

        let assignments: Vec<(UnitId, TileCoord)> = ids.into_iter().zip(tiles).collect();
        let mut requested = Vec::with_capacity(assignments.len());

        for &(id, destination) in &assignments {
            let Some(unit) = units.get(&id) else {
                continue;
            };
            if unit.is_settled_on(destination) && !self.is_awaiting(id) {
                self.claims.remove(&id);
                continue;
            }

            let generation = self.generations.entry(id).or_insert(0);
            *generation += 1;
            let generation = *generation;

            self.claims.insert(id, destination);
            let request = planner.request(id, generation, unit.anchor(), unit.current_tile(grid), destination);
            self.awaiting.insert(id, request);
            requested.push(id);
        }

        tracing::debug!(%anchor, formation = self.formation(), units = requested.len(), "move ordered");

        Ok(MoveOrder {
            anchor,
            assignments,
            requested,
        })
    }

    /// Whether a path outcome belongs to the unit's latest request.
    ///
    /// Accepting an outcome marks the unit as no longer awaiting a path.
    pub fn accept(&mut self, outcome: &PathOutcome) -> bool {
        let current = self.generations.get(&outcome.unit).copied();
        if current != Some(outcome.generation) || self.awaiting.get(&outcome.unit) != Some(&outcome.request) {
            tracing::debug!(
                unit = %outcome.unit,
                generation = outcome.generation,
                ?current,
                "stale path outcome dropped"
            );
            return false;
        }
        self.awaiting.remove(&outcome.unit);
        true
    }

    /// Drop a unit's claim.
    pub fn release_claim(&mut self, unit: UnitId) {
        self.claims.remove(&unit);
    }

    /// Drop claims that no longer guard anything: the unit either
    /// committed its move or has nothing queued or requested.
    pub fn settle_claims(&mut self, units: &BTreeMap<UnitId, Unit>) {
        let awaiting = &self.awaiting;
        self.claims.retain(|id, _| {
            awaiting.contains_key(id) || units.get(id).is_some_and(|u| u.queued_path().is_some())
        });
    }

    /// Feed coordinator state into a determinism hash.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        self.formation.hash(hasher);
        self.selection.hash(hasher);
        self.claims.hash(hasher);
        self.generations.hash(hasher);
    }
}

impl Default for SquadCoordinator {
    fn default() -> Self {
        Self {
            catalog: FormationCatalog::default(),
            formation: 0,
            selection: Vec::new(),
            claims: BTreeMap::new(),
            generations: BTreeMap::new(),
            awaiting: BTreeMap::new(),
        }
    }
}

/// Look up the unit anchored on `tile`.
#[must_use]
pub fn unit_at(units: &BTreeMap<UnitId, Unit>, tile: TileCoord) -> Option<UnitId> {
    units.values().find(|u| u.anchor() == tile).map(Unit::id)
}

/// Error for a selection that names an unknown unit.
pub(crate) fn require_unit(units: &BTreeMap<UnitId, Unit>, unit: UnitId) -> Result<()> {
    if units.contains_key(&unit) {
        Ok(())
    } else {
        Err(SquadError::UnknownUnit(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use crate::unit::{MovementTiming, UnitKind, UnitStats};

    const TIMING: MovementTiming = MovementTiming {
        move_delay_ticks: 2,
        engage_delay_ticks: 2,
        snap_distance: Fixed::const_from_int(2),
    };

    fn board(rows: u32, cols: u32) -> OccupancyGrid {
        OccupancyGrid::new(rows, cols, Fixed::from_num(32))
    }

    fn place(units: &mut BTreeMap<UnitId, Unit>, grid: &mut OccupancyGrid, id: u32, tile: TileCoord) {
        let unit = Unit::place(UnitId(id), UnitKind::Tank, UnitStats::default(), tile, TIMING, grid).unwrap();
        units.insert(UnitId(id), unit);
    }

    fn coordinator(formation: &str) -> SquadCoordinator {
        SquadCoordinator::new(FormationCatalog::default(), formation).unwrap()
    }

    #[test]
    fn test_move_without_selection() {
        let grid = board(3, 3);
        let mut planner = PathPlanner::for_units();
        let mut squad = coordinator("auto");
        let result = squad.command_move(TileCoord::new(1, 1), &BTreeMap::new(), &grid, &mut planner);
        assert_eq!(result, Err(CommandRejection::NoSelection));
        assert_eq!(planner.in_flight(), 0);
    }

    #[test]
    fn test_invalid_anchor_tiles() {
        let mut grid = board(3, 3);
        let mut units = BTreeMap::new();
        place(&mut units, &mut grid, 1, TileCoord::new(0, 0));
        place(&mut units, &mut grid, 2, TileCoord::new(2, 2));
        grid.set_code(TileCoord::new(1, 1), TileCode::Blocked);

        let mut squad = coordinator("auto");
        squad.select_only(UnitId(1));
        let mut planner = PathPlanner::for_units();

        for anchor in [TileCoord::new(1, 1), TileCoord::new(5, 0), TileCoord::new(2, 2)] {
            assert_eq!(
                squad.command_move(anchor, &units, &grid, &mut planner),
                Err(CommandRejection::invalid_target(anchor))
            );
        }
        assert_eq!(planner.in_flight(), 0);
    }

    #[test]
    fn test_insufficient_space_requests_nothing() {
        // Three units, and only two free tiles in the target row.
        let mut grid = board(3, 5);
        let mut units = BTreeMap::new();
        for (id, col) in [(1, 0), (2, 1), (3, 2)] {
            place(&mut units, &mut grid, id, TileCoord::new(2, col));
        }
        for col in 0..3 {
            grid.set_code(TileCoord::new(0, col), TileCode::Blocked);
        }

        let mut squad = coordinator("horizontal");
        for id in 1..=3 {
            squad.add_to_selection(UnitId(id));
        }
        let mut planner = PathPlanner::for_units();
        let result = squad.command_move(TileCoord::new(0, 3), &units, &grid, &mut planner);
        assert_eq!(
            result,
            Err(CommandRejection::InsufficientSpace {
                required: 3,
                available: 2
            })
        );
        assert_eq!(planner.in_flight(), 0);
        assert!(!squad.is_claimed(TileCoord::new(0, 3)));
    }

    #[test]
    fn test_claims_keep_commands_apart() {
        let mut grid = board(1, 6);
        let mut units = BTreeMap::new();
        place(&mut units, &mut grid, 1, TileCoord::new(0, 0));
        place(&mut units, &mut grid, 2, TileCoord::new(0, 1));
        let mut planner = PathPlanner::for_units();
        let mut squad = coordinator("horizontal");

        squad.select_only(UnitId(1));
        let first = squad.command_move(TileCoord::new(0, 4), &units, &grid, &mut planner).unwrap();
        assert_eq!(first.assignments, vec![(UnitId(1), TileCoord::new(0, 4))]);

        // Same anchor for the other unit in the same tick: the claimed tile
        // is skipped even though the grid still shows it free.
        squad.select_only(UnitId(2));
        let second = squad.command_move(TileCoord::new(0, 4), &units, &grid, &mut planner).unwrap();
        assert_eq!(second.assignments, vec![(UnitId(2), TileCoord::new(0, 5))]);
        assert_eq!(planner.in_flight(), 2);
    }

    #[test]
    fn test_settled_unit_is_not_requested() {
        let mut grid = board(1, 3);
        let mut units = BTreeMap::new();
        place(&mut units, &mut grid, 1, TileCoord::new(0, 0));
        place(&mut units, &mut grid, 2, TileCoord::new(0, 1));

        let mut squad = coordinator("horizontal");
        squad.select_only(UnitId(2));
        let mut planner = PathPlanner::for_units();
        let order = squad.command_move(TileCoord::new(0, 1), &units, &grid, &mut planner).unwrap();
        assert_eq!(order.assignments, vec![(UnitId(2), TileCoord::new(0, 1))]);
        assert!(order.requested.is_empty());
        assert_eq!(planner.in_flight(), 0);
    }

    #[test]
    fn test_superseded_outcome_is_stale() {
        let mut grid = board(3, 3);
        let mut units = BTreeMap::new();
        place(&mut units, &mut grid, 1, TileCoord::new(0, 0));
        let mut planner = PathPlanner::for_units();
        let mut squad = coordinator("auto");
        squad.select_only(UnitId(1));

        squad.command_move(TileCoord::new(2, 2), &units, &grid, &mut planner).unwrap();
        squad.command_move(TileCoord::new(0, 2), &units, &grid, &mut planner).unwrap();
        planner.calculate(&grid);

        let outcomes = planner.drain();
        assert_eq!(outcomes.len(), 2);
        assert!(!squad.accept(&outcomes[0]));
        assert!(squad.accept(&outcomes[1]));
        assert!(!squad.is_awaiting(UnitId(1)));
        assert_eq!(squad.claim(UnitId(1)), Some(TileCoord::new(0, 2)));

        squad.settle_claims(&units);
        assert_eq!(squad.claim(UnitId(1)), None);
    }

    #[test]
    fn test_preview_reports_shortfall() {
        let mut grid = board(1, 3);
        let mut units = BTreeMap::new();
        place(&mut units, &mut grid, 1, TileCoord::new(0, 0));
        place(&mut units, &mut grid, 2, TileCoord::new(0, 1));
        let mut squad = coordinator("vertical");
        squad.select_only(UnitId(1));
        squad.add_to_selection(UnitId(2));

        let preview = squad.preview(TileCoord::new(0, 2), &units, &grid);
        assert_eq!(preview.tiles, vec![TileCoord::new(0, 2)]);
        assert!(!preview.valid);

        squad.set_formation("horizontal").unwrap();
        let preview = squad.preview(TileCoord::new(0, 0), &units, &grid);
        assert_eq!(preview.tiles, vec![TileCoord::new(0, 0), TileCoord::new(0, 1)]);
        assert!(preview.valid);
    }

    #[test]
    fn test_selection_and_rotation() {
        let mut squad = SquadCoordinator::default();
        assert_eq!(squad.formation(), "auto");
        squad.select_only(UnitId(4));
        squad.add_to_selection(UnitId(2));
        squad.add_to_selection(UnitId(4));
        assert_eq!(squad.selection(), &[UnitId(4), UnitId(2)]);

        squad.forget(UnitId(4));
        assert_eq!(squad.selection(), &[UnitId(2)]);

        assert_eq!(squad.rotate_formation(), "horizontal");
        assert_eq!(squad.rotate_formation(), "vertical");
        assert_eq!(squad.rotate_formation(), "auto");
        assert!(squad.set_formation("wedge").is_err());
    }
}
