//! Decoded pointer and keyboard events, and what they mean for the squad.
//!
//! The host delivers already-decoded events in screen pixels. Decoding is
//! a pure function of the event, the grid and a unit lookup, so it can be
//! tested without any device layer.

use serde::{Deserialize, Serialize};

use crate::grid::{OccupancyGrid, TileCoord};
use crate::math::Vec2Fixed;
use crate::unit::UnitId;

/// Pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointerButton {
    /// Left button or touch.
    #[default]
    Primary,
    /// Right button.
    Secondary,
}

/// Modifier keys held during a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    /// Shift held.
    #[serde(default)]
    pub shift: bool,
    /// Control held.
    #[serde(default)]
    pub ctrl: bool,
}

/// Keys the simulation reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Cycle the active formation.
    RotateFormation,
    /// Drop the current selection.
    ClearSelection,
}

/// A decoded input event in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Button pressed.
    PointerDown {
        /// Screen x.
        x: i32,
        /// Screen y.
        y: i32,
        /// Which button.
        #[serde(default)]
        button: PointerButton,
        /// Modifiers held.
        #[serde(default)]
        modifiers: Modifiers,
    },
    /// Pointer moved.
    PointerMove {
        /// Screen x.
        x: i32,
        /// Screen y.
        y: i32,
    },
    /// Button released.
    PointerUp {
        /// Screen x.
        x: i32,
        /// Screen y.
        y: i32,
        /// Which button.
        #[serde(default)]
        button: PointerButton,
    },
    /// Key pressed.
    KeyDown {
        /// Which key.
        key: Key,
    },
}

/// What an input event asks the simulation to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputAction {
    /// Replace the selection with one unit.
    SelectOnly(UnitId),
    /// Add a unit to the selection.
    AddToSelection(UnitId),
    /// Take a unit off the board.
    RemoveUnit(UnitId),
    /// Place a new squad unit.
    PlaceUnit(TileCoord),
    /// Move the selection in formation around a tile.
    MoveSelection(TileCoord),
    /// Update the formation preview anchor; `None` when off the board.
    Preview(Option<TileCoord>),
    /// Cycle the active formation.
    RotateFormation,
    /// Empty the selection.
    ClearSelection,
}

/// Screen pixel to tile, possibly off the board.
#[must_use]
pub fn screen_to_tile(grid: &OccupancyGrid, x: i32, y: i32) -> TileCoord {
    grid.world_to_tile_unchecked(Vec2Fixed::from_ints(x, y))
}

/// Decode one event.
///
/// `unit_at` answers which unit, if any, is anchored on a tile. Pointer
/// releases carry no meaning of their own and decode to `None`.
pub fn decode<F>(event: InputEvent, grid: &OccupancyGrid, unit_at: F) -> Option<InputAction>
where
    F: Fn(TileCoord) -> Option<UnitId>,
{
    match event {
        InputEvent::PointerDown {
            x,
            y,
            button,
            modifiers,
        } => {
            let tile = screen_to_tile(grid, x, y);
            match (unit_at(tile), button) {
                (Some(unit), PointerButton::Primary) if modifiers.ctrl => {
                    Some(InputAction::RemoveUnit(unit))
                }
                (Some(unit), PointerButton::Primary) if modifiers.shift => {
                    Some(InputAction::AddToSelection(unit))
                }
                (Some(unit), PointerButton::Primary) => Some(InputAction::SelectOnly(unit)),
                (_, PointerButton::Secondary) => Some(InputAction::MoveSelection(tile)),
                (None, PointerButton::Primary) if modifiers.shift => Some(InputAction::PlaceUnit(tile)),
                (None, PointerButton::Primary) => None,
            }
        }
        InputEvent::PointerMove { x, y } => {
            let tile = screen_to_tile(grid, x, y);
            Some(InputAction::Preview(grid.in_bounds(tile).then_some(tile)))
        }
        InputEvent::PointerUp { .. } => None,
        InputEvent::KeyDown {
            key: Key::RotateFormation,
        } => Some(InputAction::RotateFormation),
        InputEvent::KeyDown {
            key: Key::ClearSelection,
        } => Some(InputAction::ClearSelection),
    }
}
