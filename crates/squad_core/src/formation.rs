//! Formation catalog and tile assignment.
//!
//! A [`FormationShape`] is an ordered list of row/column offsets from an
//! anchor tile. The order is a priority: earlier offsets are tried first.
//!
//! [`assign_formation`] walks the candidate tiles and the units with two
//! cursors and matches greedily. It is a pure query over the grid and
//! never reserves anything.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SquadError};
use crate::grid::{OccupancyGrid, TileCoord};

/// Relative position inside a formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormationOffset {
    /// Row delta.
    pub row: i32,
    /// Column delta.
    pub col: i32,
}

impl FormationOffset {
    /// Create an offset.
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

/// A named formation pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawShape")]
pub struct FormationShape {
    name: String,
    offsets: Vec<FormationOffset>,
}

#[derive(Deserialize)]
struct RawShape {
    name: String,
    offsets: Vec<FormationOffset>,
}

impl TryFrom<RawShape> for FormationShape {
    type Error = SquadError;

    fn try_from(raw: RawShape) -> Result<Self> {
        Self::new(raw.name, raw.offsets)
    }
}

impl FormationShape {
    /// Create a shape, rejecting empty or duplicate offset lists.
    pub fn new(name: impl Into<String>, offsets: Vec<FormationOffset>) -> Result<Self> {
        let name = name.into();
        if offsets.is_empty() {
            return Err(SquadError::InvalidFormation {
                name,
                reason: "no offsets".into(),
            });
        }

        let mut seen = BTreeSet::new();
        for offset in &offsets {
            if !seen.insert((offset.row, offset.col)) {
                return Err(SquadError::InvalidFormation {
                    name,
                    reason: format!("duplicate offset ({}, {})", offset.row, offset.col),
                });
            }
        }

        Ok(Self { name, offsets })
    }

    /// Shape name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offsets in priority order.
    #[must_use]
    pub fn offsets(&self) -> &[FormationOffset] {
        &self.offsets
    }

    /// Candidate tiles around `anchor`, in priority order.
    pub fn candidates(&self, anchor: TileCoord) -> impl Iterator<Item = TileCoord> + '_ {
        self.offsets.iter().map(move |o| anchor.offset(o.row, o.col))
    }

    /// Center, the four orthogonal neighbours, then the diagonals.
    #[must_use]
    pub fn auto() -> Self {
        Self {
            name: "auto".into(),
            offsets: [
                (0, 0),
                (-1, 0),
                (0, 1),
                (1, 0),
                (0, -1),
                (-1, 1),
                (1, 1),
                (1, -1),
                (-1, -1),
            ]
            .into_iter()
            .map(|(r, c)| FormationOffset::new(r, c))
            .collect(),
        }
    }

    /// A single row fanning out from the anchor.
    #[must_use]
    pub fn horizontal() -> Self {
        Self {
            name: "horizontal".into(),
            offsets: fan_out(4).map(|d| FormationOffset::new(0, d)).collect(),
        }
    }

    /// A single column fanning out from the anchor.
    #[must_use]
    pub fn vertical() -> Self {
        Self {
            name: "vertical".into(),
            offsets: fan_out(4).map(|d| FormationOffset::new(d, 0)).collect(),
        }
    }
}

/// 0, 1, -1, 2, -2, ... up to `reach`.
fn fan_out(reach: i32) -> impl Iterator<Item = i32> {
    std::iter::once(0).chain((1..=reach).flat_map(|d| [d, -d]))
}

/// Ordered set of formation shapes.
///
/// Declaration order is the rotation order used by the rotate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationCatalog {
    shapes: Vec<FormationShape>,
}

impl Default for FormationCatalog {
    fn default() -> Self {
        Self {
            shapes: vec![
                FormationShape::auto(),
                FormationShape::horizontal(),
                FormationShape::vertical(),
            ],
        }
    }
}

impl FormationCatalog {
    /// Build a catalog from shapes; names must be unique.
    pub fn new(shapes: Vec<FormationShape>) -> Result<Self> {
        if shapes.is_empty() {
            return Err(SquadError::InvalidFormation {
                name: String::new(),
                reason: "catalog is empty".into(),
            });
        }
        let mut names = BTreeSet::new();
        for shape in &shapes {
            if !names.insert(shape.name.as_str()) {
                return Err(SquadError::InvalidFormation {
                    name: shape.name.clone(),
                    reason: "declared twice".into(),
                });
            }
        }
        Ok(Self { shapes })
    }

    /// Parse a catalog from RON.
    ///
    /// ```ron
    /// FormationCatalog(shapes: [
    ///     (name: "line", offsets: [(row: 0, col: 0), (row: 0, col: 1)]),
    /// ])
    /// ```
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let parsed: Self = ron::from_str(source).map_err(|e| SquadError::DataParseError {
            path: "<formation catalog>".into(),
            message: e.to_string(),
        })?;
        Self::new(parsed.shapes)
    }

    /// Look up a shape by name.
    pub fn get(&self, name: &str) -> Result<&FormationShape> {
        self.shapes
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SquadError::UnknownFormation(name.to_owned()))
    }

    /// Name of the shape after `current`, wrapping around. Unknown names
    /// restart at the first shape.
    #[must_use]
    pub fn next_after(&self, current: &str) -> &str {
        let next = self
            .shapes
            .iter()
            .position(|s| s.name == current)
            .map_or(0, |i| (i + 1) % self.shapes.len());
        &self.shapes[next].name
    }

    /// Index of a named shape in rotation order.
    pub fn position(&self, name: &str) -> Result<usize> {
        self.shapes
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| SquadError::UnknownFormation(name.to_owned()))
    }

    /// Shape at `index`, wrapping around the catalog.
    #[must_use]
    pub fn shape_at(&self, index: usize) -> &FormationShape {
        &self.shapes[index % self.shapes.len()]
    }

    /// Number of shapes; never zero.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Whether the catalog has no shapes. The constructors reject an
    /// empty shape list, so a built catalog never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Shape names in rotation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().map(|s| s.name.as_str())
    }
}

/// Assign destination tiles to units for a formation anchored at `anchor`.
///
/// `unit_anchors` is each unit's current anchor tile in selection order.
/// The result is index-aligned with it and may be shorter: a short result
/// means there was not enough room.
#[must_use]
pub fn assign_formation(
    anchor: TileCoord,
    unit_anchors: &[TileCoord],
    grid: &OccupancyGrid,
    shape: &FormationShape,
) -> Vec<TileCoord> {
    assign_formation_excluding(anchor, unit_anchors, grid, shape, &BTreeSet::new())
}

/// Like [`assign_formation`], but also treats `excluded` tiles as taken.
///
/// The coordinator passes destinations promised to other units that have
/// not committed yet, so two commands in flight never share a tile.
#[must_use]
pub fn assign_formation_excluding(
    anchor: TileCoord,
    unit_anchors: &[TileCoord],
    grid: &OccupancyGrid,
    shape: &FormationShape,
    excluded: &BTreeSet<TileCoord>,
) -> Vec<TileCoord> {
    let mut assigned = Vec::with_capacity(unit_anchors.len().min(shape.offsets.len()));
    let mut units = unit_anchors.iter();
    let mut current = units.next();

    for candidate in shape.candidates(anchor) {
        let Some(&unit_anchor) = current else {
            break;
        };

        let open = grid.is_free(candidate) && !excluded.contains(&candidate);
        if open || candidate == unit_anchor {
            assigned.push(candidate);
            current = units.next();
        }
    }

    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::TileCode;
    use crate::math::Fixed;

    fn line(cols: u32) -> OccupancyGrid {
        OccupancyGrid::new(1, cols, Fixed::from_num(32))
    }

    #[test]
    fn test_self_assignment_on_own_anchor() {
        let mut grid = line(3);
        grid.reserve(TileCoord::new(0, 0)).unwrap();
        grid.reserve(TileCoord::new(0, 1)).unwrap();

        let result = assign_formation(
            TileCoord::new(0, 1),
            &[TileCoord::new(0, 1)],
            &grid,
            &FormationShape::horizontal(),
        );
        assert_eq!(result, vec![TileCoord::new(0, 1)]);
    }

    #[test]
    fn test_other_units_tile_is_skipped() {
        let mut grid = line(3);
        grid.reserve(TileCoord::new(0, 0)).unwrap();
        grid.reserve(TileCoord::new(0, 1)).unwrap();

        // Unit at (0,0) aimed at (0,1): its neighbour holds that tile.
        let result = assign_formation(
            TileCoord::new(0, 1),
            &[TileCoord::new(0, 0)],
            &grid,
            &FormationShape::horizontal(),
        );
        assert_eq!(result, vec![TileCoord::new(0, 2)]);
    }

    #[test]
    fn test_unit_keeps_its_tile_when_it_is_a_later_candidate() {
        let mut grid = line(5);
        let a = TileCoord::new(0, 0);
        let b = TileCoord::new(0, 3);
        grid.reserve(a).unwrap();
        grid.reserve(b).unwrap();

        // (0,2) is free and goes to A; (0,3) is B's own anchor.
        let result = assign_formation(TileCoord::new(0, 2), &[a, b], &grid, &FormationShape::horizontal());
        assert_eq!(result, vec![TileCoord::new(0, 2), b]);
    }

    #[test]
    fn test_short_result_signals_insufficient_space() {
        let mut grid = line(3);
        let a = TileCoord::new(0, 0);
        let b = TileCoord::new(0, 1);
        grid.reserve(a).unwrap();
        grid.reserve(b).unwrap();
        grid.set_code(TileCoord::new(0, 2), TileCode::Blocked);
        let units = [a, b, TileCoord::new(4, 4)];

        // (0,1) belongs to B but A is considered first, so the candidate is
        // passed over; the walk is single-pass and never comes back.
        let result = assign_formation(b, &units, &grid, &FormationShape::horizontal());
        assert_eq!(result, vec![a]);
        assert!(result.len() < units.len());
    }

    #[test]
    fn test_excluded_tiles_are_not_assigned() {
        let grid = line(5);
        let excluded: BTreeSet<_> = [TileCoord::new(0, 2)].into_iter().collect();
        let result = assign_formation_excluding(
            TileCoord::new(0, 2),
            &[TileCoord::new(0, 0)],
            &grid,
            &FormationShape::horizontal(),
            &excluded,
        );
        assert_eq!(result, vec![TileCoord::new(0, 3)]);
    }

    #[test]
    fn test_auto_shape_prefers_center_then_cardinals() {
        let grid = OccupancyGrid::new(3, 3, Fixed::from_num(32));
        let units = [TileCoord::new(9, 9), TileCoord::new(9, 8), TileCoord::new(9, 7)];
        let result = assign_formation(TileCoord::new(1, 1), &units, &grid, &FormationShape::auto());
        assert_eq!(
            result,
            vec![TileCoord::new(1, 1), TileCoord::new(0, 1), TileCoord::new(1, 2)]
        );
    }

    #[test]
    fn test_shape_rejects_duplicates() {
        let err = FormationShape::new(
            "bad",
            vec![FormationOffset::new(0, 0), FormationOffset::new(0, 0)],
        );
        assert!(matches!(err, Err(SquadError::InvalidFormation { .. })));
    }

    #[test]
    fn test_rotation_order() {
        let catalog = FormationCatalog::default();
        assert_eq!(catalog.next_after("auto"), "horizontal");
        assert_eq!(catalog.next_after("horizontal"), "vertical");
        assert_eq!(catalog.next_after("vertical"), "auto");
        assert_eq!(catalog.next_after("missing"), "auto");
    }

    #[test]
    fn test_catalog_is_never_empty() {
        let catalog = FormationCatalog::default();
        assert!(!catalog.is_empty());
        assert_eq!(catalog.len(), 3);

        assert!(matches!(
            FormationCatalog::new(Vec::new()),
            Err(SquadError::InvalidFormation { .. })
        ));
        assert!(FormationCatalog::from_ron_str("(shapes: [])").is_err());
    }

    #[test]
    fn test_catalog_from_ron() {
        let catalog = FormationCatalog::from_ron_str(
            r#"(shapes: [
                (name: "pair", offsets: [(row: 0, col: 0), (row: 1, col: 0)]),
            ])"#,
        )
        .unwrap();
        assert_eq!(catalog.get("pair").unwrap().offsets().len(), 2);
        assert!(matches!(catalog.get("auto"), Err(SquadError::UnknownFormation(_))));
    }

    #[test]
    fn test_catalog_from_ron_rejects_duplicate_offsets() {
        let result = FormationCatalog::from_ron_str(
            r#"(shapes: [(name: "pair", offsets: [(row: 0, col: 0), (row: 0, col: 0)])])"#,
        );
        assert!(matches!(result, Err(SquadError::DataParseError { .. })));
    }
}
