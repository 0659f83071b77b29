//! Error types for the squad simulation.
//!
//! Two families live here. [`SquadError`] covers lookups and caller
//! mistakes inside the core. [`CommandRejection`] is what a player sees
//! when a move order cannot be carried out; it never aborts a tick.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::TileCoord;
use crate::unit::UnitId;

/// Result type alias using [`SquadError`].
pub type Result<T> = std::result::Result<T, SquadError>;

/// Top-level error type for simulation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SquadError {
    /// No unit with this id is on the board.
    #[error("Unknown unit: {0}")]
    UnknownUnit(UnitId),

    /// Tile coordinate lies outside the grid.
    #[error("Tile ({row}, {col}) is out of bounds")]
    OutOfBounds {
        /// Row index.
        row: i32,
        /// Column index.
        col: i32,
    },

    /// Tile cannot be reserved because it is not `Free`.
    #[error("Tile ({row}, {col}) is not free")]
    TileNotFree {
        /// Row index.
        row: i32,
        /// Column index.
        col: i32,
    },

    /// The squad roster is already at capacity.
    #[error("Squad is full ({capacity} units)")]
    SquadFull {
        /// Maximum number of units.
        capacity: usize,
    },

    /// Formation name is not in the catalog.
    #[error("Unknown formation: {0}")]
    UnknownFormation(String),

    /// Formation shape definition is malformed.
    #[error("Invalid formation '{name}': {reason}")]
    InvalidFormation {
        /// Formation name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A move was issued with an empty or unusable path.
    #[error("Invalid path for unit {0}")]
    InvalidPath(UnitId),

    /// Level data does not describe a usable board.
    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    /// Data file parsing error.
    #[error("Failed to parse data '{path}': {message}")]
    DataParseError {
        /// Source name of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Operation is not legal in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl SquadError {
    /// Build an [`SquadError::OutOfBounds`] for a tile.
    #[must_use]
    pub const fn out_of_bounds(tile: TileCoord) -> Self {
        Self::OutOfBounds {
            row: tile.row,
            col: tile.col,
        }
    }

    /// Build an [`SquadError::TileNotFree`] for a tile.
    #[must_use]
    pub const fn not_free(tile: TileCoord) -> Self {
        Self::TileNotFree {
            row: tile.row,
            col: tile.col,
        }
    }
}

/// Reason a player command was refused.
///
/// Rejections are reported through the tick event stream as alerts.
/// A rejected command leaves the grid untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CommandRejection {
    /// A move was issued with nothing selected.
    #[error("No units selected")]
    NoSelection,

    /// The anchor tile cannot be a destination.
    #[error("Invalid target tile ({row}, {col})")]
    InvalidTarget {
        /// Row index.
        row: i32,
        /// Column index.
        col: i32,
    },

    /// The formation could not fit every selected unit.
    #[error("Insufficient space: need {required} tiles, found {available}")]
    InsufficientSpace {
        /// Number of selected units.
        required: usize,
        /// Number of tiles the formation could assign.
        available: usize,
    },

    /// The grid search found no route for one unit.
    #[error("No path for unit {unit}")]
    NoPath {
        /// Unit whose request failed.
        unit: UnitId,
    },

    /// A commit found its destination already taken.
    #[error("Destination ({row}, {col}) for unit {unit} was taken before commit")]
    DestinationTaken {
        /// Unit whose move was dropped.
        unit: UnitId,
        /// Row index.
        row: i32,
        /// Column index.
        col: i32,
    },

    /// The board has no room for another unit here.
    #[error("Cannot place unit: {reason}")]
    PlacementRefused {
        /// Human-readable reason.
        reason: String,
    },
}

impl CommandRejection {
    /// Build an [`CommandRejection::InvalidTarget`] for a tile.
    #[must_use]
    pub const fn invalid_target(tile: TileCoord) -> Self {
        Self::InvalidTarget {
            row: tile.row,
            col: tile.col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages_distinguish_space_and_path() {
        let space = CommandRejection::InsufficientSpace {
            required: 3,
            available: 2,
        };
        let path = CommandRejection::NoPath { unit: UnitId(4) };

        assert_eq!(
            space.to_string(),
            "Insufficient space: need 3 tiles, found 2"
        );
        assert_eq!(path.to_string(), "No path for unit 4");
    }

    #[test]
    fn test_out_of_bounds_helper() {
        let err = SquadError::out_of_bounds(TileCoord::new(-1, 7));
        assert_eq!(err, SquadError::OutOfBounds { row: -1, col: 7 });
    }
}
