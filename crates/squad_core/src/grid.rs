//! Occupancy grid: the single source of truth for tile state.
//!
//! Every cell carries exactly one [`TileCode`]. Formation assignment and
//! path planning only read the grid; the only writers are unit placement,
//! unit removal and the move commit inside a unit's state machine, all of
//! which go through [`OccupancyGrid::reserve`] and
//! [`OccupancyGrid::release`].
//!
//! Out-of-range queries never panic. They answer "not traversable" so
//! edge handling is uniform for callers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SquadError};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// State of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TileCode {
    /// Walkable and unreserved.
    #[default]
    Free = 0,
    /// Reserved as some unit's anchor tile.
    Occupied = 1,
    /// Impassable for everyone.
    Blocked = 2,
    /// Shared by units and enemies.
    Crossing = 3,
    /// Enemy-only lane.
    EnemyLane = 4,
}

impl TileCode {
    /// Every code, in discriminant order.
    pub const ALL: [Self; 5] = [
        Self::Free,
        Self::Occupied,
        Self::Blocked,
        Self::Crossing,
        Self::EnemyLane,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Single-character glyph used by ASCII dumps and grid builders.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Free => '.',
            Self::Occupied => 'U',
            Self::Blocked => '#',
            Self::Crossing => '+',
            Self::EnemyLane => '~',
        }
    }

    /// Parse a glyph produced by [`TileCode::glyph`].
    #[must_use]
    pub const fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '.' => Some(Self::Free),
            'U' => Some(Self::Occupied),
            '#' => Some(Self::Blocked),
            '+' => Some(Self::Crossing),
            '~' => Some(Self::EnemyLane),
            _ => None,
        }
    }
}

/// A set of acceptable tile codes for a grid search.
///
/// Units and enemies share one grid but walk different subsets of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileSet(u8);

impl TileSet {
    /// Nothing is acceptable.
    pub const EMPTY: Self = Self(0);

    /// Tiles a squad unit may walk through. Other units' anchors are
    /// `Occupied` and stay out; a search lets the requester's own anchor
    /// through separately.
    pub const UNIT: Self = Self(TileCode::Free.bit() | TileCode::Crossing.bit());

    /// Tiles an enemy may walk through.
    pub const ENEMY: Self = Self(TileCode::EnemyLane.bit() | TileCode::Crossing.bit());

    /// Build a set from a list of codes.
    #[must_use]
    pub fn from_codes(codes: &[TileCode]) -> Self {
        codes.iter().fold(Self::EMPTY, |set, &code| set.with(code))
    }

    /// Return a copy of the set that also accepts `code`.
    #[must_use]
    pub const fn with(self, code: TileCode) -> Self {
        Self(self.0 | code.bit())
    }

    /// Check whether `code` is accepted.
    #[must_use]
    pub const fn contains(self, code: TileCode) -> bool {
        self.0 & code.bit() != 0
    }

    /// Codes in this set, in discriminant order.
    pub fn codes(self) -> impl Iterator<Item = TileCode> {
        TileCode::ALL.into_iter().filter(move |&c| self.contains(c))
    }
}

/// Row/column address of a grid cell.
///
/// Signed so that formation offsets can step off the board; such
/// coordinates are simply out of bounds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TileCoord {
    /// Row index (screen y).
    pub row: i32,
    /// Column index (screen x).
    pub col: i32,
}

impl TileCoord {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Offset this coordinate by a row/column delta.
    #[must_use]
    pub const fn offset(self, d_row: i32, d_col: i32) -> Self {
        Self::new(self.row + d_row, self.col + d_col)
    }

    /// Manhattan distance between two tiles.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// The four orthogonal neighbours, in N, E, S, W order.
    #[must_use]
    pub const fn neighbors(self) -> [Self; 4] {
        [
            self.offset(-1, 0),
            self.offset(0, 1),
            self.offset(1, 0),
            self.offset(0, -1),
        ]
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// 2D array of tile codes, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    rows: u32,
    cols: u32,
    cells: Vec<TileCode>,
    /// Side length of a tile in world units.
    #[serde(with = "fixed_serde")]
    tile_size: Fixed,
}

impl OccupancyGrid {
    /// Create a grid with every cell `Free`.
    ///
    /// # Panics
    ///
    /// Panics if `rows` or `cols` is zero, or if `tile_size` is not positive.
    #[must_use]
    pub fn new(rows: u32, cols: u32, tile_size: Fixed) -> Self {
        assert!(rows > 0, "OccupancyGrid rows must be positive");
        assert!(cols > 0, "OccupancyGrid cols must be positive");
        assert!(tile_size > Fixed::ZERO, "OccupancyGrid tile_size must be positive");

        Self {
            rows,
            cols,
            cells: vec![TileCode::Free; (rows as usize) * (cols as usize)],
            tile_size,
        }
    }

    /// Build a grid from nested rows of codes.
    pub fn from_rows(rows: &[Vec<TileCode>], tile_size: Fixed) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if height == 0 || width == 0 {
            return Err(SquadError::InvalidLevel("grid has no cells".into()));
        }
        if rows.iter().any(|r| r.len() != width) {
            return Err(SquadError::InvalidLevel("grid rows differ in length".into()));
        }
        if tile_size <= Fixed::ZERO {
            return Err(SquadError::InvalidLevel("tile size must be positive".into()));
        }

        Ok(Self {
            rows: height as u32,
            cols: width as u32,
            cells: rows.iter().flatten().copied().collect(),
            tile_size,
        })
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> u32 {
        self.cols
    }

    /// Tile side length in world units.
    #[must_use]
    pub const fn tile_size(&self) -> Fixed {
        self.tile_size
    }

    /// Raw cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[TileCode] {
        &self.cells
    }

    #[inline]
    fn index(&self, tile: TileCoord) -> Option<usize> {
        self.in_bounds(tile)
            .then(|| (tile.row as usize) * (self.cols as usize) + (tile.col as usize))
    }

    /// Check if a coordinate is on the board.
    #[must_use]
    pub fn in_bounds(&self, tile: TileCoord) -> bool {
        tile.row >= 0 && tile.col >= 0 && (tile.row as u32) < self.rows && (tile.col as u32) < self.cols
    }

    /// Code at a tile, `None` if out of bounds.
    #[must_use]
    pub fn code(&self, tile: TileCoord) -> Option<TileCode> {
        self.index(tile).map(|i| self.cells[i])
    }

    /// Overwrite the code at a tile.
    ///
    /// Returns `false` if out of bounds. Level building uses this
    /// directly; live units go through [`Self::reserve`] and
    /// [`Self::release`].
    pub fn set_code(&mut self, tile: TileCoord, code: TileCode) -> bool {
        match self.index(tile) {
            Some(i) => {
                self.cells[i] = code;
                true
            }
            None => false,
        }
    }

    /// True only for in-bounds `Free` tiles.
    #[must_use]
    pub fn is_free(&self, tile: TileCoord) -> bool {
        self.code(tile) == Some(TileCode::Free)
    }

    /// True only for in-bounds `Occupied` tiles.
    #[must_use]
    pub fn is_occupied(&self, tile: TileCoord) -> bool {
        self.code(tile) == Some(TileCode::Occupied)
    }

    /// Whether a tile belongs to `acceptable`. Out of bounds is never
    /// traversable.
    #[must_use]
    pub fn is_traversable(&self, tile: TileCoord, acceptable: TileSet) -> bool {
        self.code(tile).is_some_and(|c| acceptable.contains(c))
    }

    /// Mark a `Free` tile as a unit anchor.
    pub fn reserve(&mut self, tile: TileCoord) -> Result<()> {
        match self.code(tile) {
            None => Err(SquadError::out_of_bounds(tile)),
            Some(TileCode::Free) => {
                self.set_code(tile, TileCode::Occupied);
                Ok(())
            }
            Some(_) => Err(SquadError::not_free(tile)),
        }
    }

    /// Return an `Occupied` tile to `Free`.
    ///
    /// Releasing anything else is a caller bug; it is logged and the cell
    /// is left alone.
    pub fn release(&mut self, tile: TileCoord) -> bool {
        match self.code(tile) {
            Some(TileCode::Occupied) => self.set_code(tile, TileCode::Free),
            other => {
                tracing::warn!(%tile, code = ?other, "release of a tile that is not occupied");
                false
            }
        }
    }

    /// Tile containing a world position, `None` if off the board.
    #[must_use]
    pub fn world_to_tile(&self, pos: Vec2Fixed) -> Option<TileCoord> {
        let tile = self.world_to_tile_unchecked(pos);
        self.in_bounds(tile).then_some(tile)
    }

    /// Tile containing a world position, possibly off the board.
    #[must_use]
    pub fn world_to_tile_unchecked(&self, pos: Vec2Fixed) -> TileCoord {
        let col = (pos.x / self.tile_size).floor().to_num::<i32>();
        let row = (pos.y / self.tile_size).floor().to_num::<i32>();
        TileCoord::new(row, col)
    }

    /// World position of a tile's center.
    #[must_use]
    pub fn tile_center(&self, tile: TileCoord) -> Vec2Fixed {
        let half = self.tile_size / Fixed::from_num(2);
        Vec2Fixed::new(
            Fixed::from_num(tile.col) * self.tile_size + half,
            Fixed::from_num(tile.row) * self.tile_size + half,
        )
    }

    /// In-bounds orthogonal neighbours accepted by `acceptable`, plus
    /// `own` when it is adjacent.
    pub fn passable_neighbors(
        &self,
        tile: TileCoord,
        acceptable: TileSet,
        own: Option<TileCoord>,
    ) -> impl Iterator<Item = TileCoord> + '_ {
        tile.neighbors()
            .into_iter()
            .filter(move |&n| Some(n) == own || self.is_traversable(n, acceptable))
    }

    /// Every coordinate on the board, row-major.
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> {
        let cols = self.cols as i32;
        (0..self.rows as i32).flat_map(move |row| (0..cols).map(move |col| TileCoord::new(row, col)))
    }

    /// Render the grid as one line of glyphs per row.
    #[must_use]
    pub fn to_ascii(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.rows as usize);
        for row in self.cells.chunks(self.cols as usize) {
            out.extend(row.iter().map(|c| c.glyph()));
            out.push('\n');
        }
        out
    }
}
