//! Level layouts and grid construction.
//!
//! A [`LevelLayout`] is plain data, usually loaded from RON by an outer
//! crate. It is turned into an [`OccupancyGrid`] through per-tile
//! [`TileProperties`] and into the [`EnemyPath`] enemies walk.

use serde::{Deserialize, Serialize};

use crate::enemy::EnemyPath;
use crate::error::{Result, SquadError};
use crate::grid::{OccupancyGrid, TileCode, TileCoord};
use crate::math::Fixed;
use crate::pathfinding::PathPlanner;
use crate::unit::UnitKind;

/// Raw properties a level editor attaches to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileProperties {
    /// Solid terrain.
    pub collision: bool,
    /// Part of the enemy lane.
    pub enemy_path: bool,
    /// Lane tile that units may also cross.
    pub crossing: bool,
}

impl TileProperties {
    /// Map properties to an occupancy code.
    ///
    /// Collision wins over everything, then crossing, then lane.
    #[must_use]
    pub const fn to_code(self) -> TileCode {
        if self.collision {
            TileCode::Blocked
        } else if self.crossing {
            TileCode::Crossing
        } else if self.enemy_path {
            TileCode::EnemyLane
        } else {
            TileCode::Free
        }
    }
}

/// Axis of a lane segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Runs along a row, towards higher columns.
    Horizontal,
    /// Runs along a column, towards higher rows.
    Vertical,
}

impl Orientation {
    const fn step(self) -> (i32, i32) {
        match self {
            Self::Horizontal => (0, 1),
            Self::Vertical => (1, 0),
        }
    }
}

/// A straight run of lane tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneSegment {
    /// Direction of travel.
    pub orientation: Orientation,
    /// First tile.
    pub start: TileCoord,
    /// Number of tiles, at least one.
    pub size: u32,
}

impl LaneSegment {
    /// Tiles covered, in travel order.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> {
        let (dr, dc) = self.orientation.step();
        let start = self.start;
        (0..self.size as i32).map(move |i| start.offset(dr * i, dc * i))
    }

    /// Last tile.
    #[must_use]
    pub fn end(&self) -> TileCoord {
        let (dr, dc) = self.orientation.step();
        let n = self.size.saturating_sub(1) as i32;
        self.start.offset(dr * n, dc * n)
    }
}

/// A unit placed when the level starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingUnit {
    /// Anchor tile.
    pub tile: TileCoord,
    /// Unit kind.
    #[serde(default)]
    pub kind: UnitKind,
}

/// Board description.
///
/// # Example RON
///
/// ```ron
/// LevelLayout(
///     rows: 4,
///     cols: 6,
///     lane: [(orientation: Horizontal, start: (row: 1, col: 0), size: 6)],
///     crossings: [(row: 1, col: 3)],
///     starting_units: [(tile: (row: 3, col: 0))],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelLayout {
    /// Board height in tiles.
    pub rows: u32,
    /// Board width in tiles.
    pub cols: u32,
    /// Enemy lane, in travel order.
    #[serde(default)]
    pub lane: Vec<LaneSegment>,
    /// Solid tiles.
    #[serde(default)]
    pub blocked: Vec<TileCoord>,
    /// Lane tiles units may cross.
    #[serde(default)]
    pub crossings: Vec<TileCoord>,
    /// Units placed at start.
    #[serde(default)]
    pub starting_units: Vec<StartingUnit>,
}

impl Default for LevelLayout {
    /// 20 x 16 board with a three-segment lane and two starting tanks.
    fn default() -> Self {
        Self {
            rows: 16,
            cols: 20,
            lane: vec![
                LaneSegment {
                    orientation: Orientation::Vertical,
                    start: TileCoord::new(0, 2),
                    size: 6,
                },
                LaneSegment {
                    orientation: Orientation::Horizontal,
                    start: TileCoord::new(5, 2),
                    size: 13,
                },
                LaneSegment {
                    orientation: Orientation::Vertical,
                    start: TileCoord::new(5, 14),
                    size: 11,
                },
            ],
            blocked: Vec::new(),
            crossings: vec![TileCoord::new(5, 8), TileCoord::new(10, 14)],
            starting_units: vec![
                StartingUnit {
                    tile: TileCoord::new(7, 2),
                    kind: UnitKind::Tank,
                },
                StartingUnit {
                    tile: TileCoord::new(7, 3),
                    kind: UnitKind::Tank,
                },
            ],
        }
    }
}

impl LevelLayout {
    /// Parse a layout from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| SquadError::DataParseError {
            path: "<level layout>".into(),
            message: e.to_string(),
        })
    }

    fn contains(&self, tile: TileCoord) -> bool {
        tile.row >= 0 && tile.col >= 0 && (tile.row as u32) < self.rows && (tile.col as u32) < self.cols
    }

    fn check(&self, tile: TileCoord, what: &str) -> Result<()> {
        if self.contains(tile) {
            Ok(())
        } else {
            Err(SquadError::InvalidLevel(format!("{what} tile {tile} is off the board")))
        }
    }

    /// Per-tile properties, row-major.
    pub fn tile_properties(&self) -> Result<Vec<Vec<TileProperties>>> {
        if self.rows == 0 || self.cols == 0 {
            return Err(SquadError::InvalidLevel("board has no tiles".into()));
        }
        fn at(props: &mut [Vec<TileProperties>], tile: TileCoord) -> &mut TileProperties {
            &mut props[tile.row as usize][tile.col as usize]
        }

        let mut props = vec![vec![TileProperties::default(); self.cols as usize]; self.rows as usize];

        for segment in &self.lane {
            if segment.size == 0 {
                return Err(SquadError::InvalidLevel("lane segment with no tiles".into()));
            }
            for tile in segment.tiles() {
                self.check(tile, "lane")?;
                at(&mut props, tile).enemy_path = true;
            }
        }
        for &tile in &self.blocked {
            self.check(tile, "blocked")?;
            at(&mut props, tile).collision = true;
        }
        for &tile in &self.crossings {
            self.check(tile, "crossing")?;
            at(&mut props, tile).crossing = true;
        }
        Ok(props)
    }

    /// Build the occupancy grid. Starting units are not placed here.
    pub fn build_grid(&self, tile_size: Fixed) -> Result<OccupancyGrid> {
        let codes: Vec<Vec<TileCode>> = self
            .tile_properties()?
            .into_iter()
            .map(|row| row.into_iter().map(TileProperties::to_code).collect())
            .collect();
        OccupancyGrid::from_rows(&codes, tile_size)
    }

    /// Polyline through the lane: one tile before the first segment,
    /// every segment end, one tile past the last.
    pub fn enemy_path(&self, grid: &OccupancyGrid) -> Result<EnemyPath> {
        let (Some(first), Some(last)) = (self.lane.first(), self.lane.last()) else {
            return Err(SquadError::InvalidLevel("level has no enemy lane".into()));
        };

        let (dr, dc) = first.orientation.step();
        let entry = first.start.offset(-dr, -dc);
        let (dr, dc) = last.orientation.step();
        let exit = last.end().offset(dr, dc);

        let mut tiles = vec![entry];
        tiles.extend(self.lane.iter().map(LaneSegment::end));
        tiles.push(exit);
        tiles.dedup();

        EnemyPath::new(tiles.into_iter().map(|t| grid.tile_center(t)).collect())
    }

    /// Check that enemies can walk from the first lane tile to the last
    /// over lane and crossing tiles.
    pub fn validate_lane(&self, grid: &OccupancyGrid) -> Result<()> {
        let (Some(first), Some(last)) = (self.lane.first(), self.lane.last()) else {
            return Err(SquadError::InvalidLevel("level has no enemy lane".into()));
        };
        let mut planner = PathPlanner::for_enemies();
        match planner.find_now(grid, first.start, last.end()) {
            Some(_) => Ok(()),
            None => Err(SquadError::InvalidLevel(format!(
                "lane from {} to {} is not connected",
                first.start,
                last.end()
            ))),
        }
    }
}
