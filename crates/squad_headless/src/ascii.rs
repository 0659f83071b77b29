//! ASCII board renderer for terminal review.
//!
//! Draws the occupancy grid with units, enemies, projectiles and the
//! formation preview layered on top, one character per tile.

use squad_core::grid::TileCoord;
use squad_core::math::Vec2Fixed;
use squad_core::simulation::Simulation;
use squad_core::unit::UnitKind;

/// ASCII rendering configuration.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Append a status line under the board.
    pub show_legend: bool,
    /// Mark the formation preview tiles.
    pub show_preview: bool,
    /// Use colored output (ANSI).
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            show_legend: true,
            show_preview: true,
            use_color: false,
        }
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Character for a squad unit; uppercase when selected.
fn unit_char(kind: UnitKind, selected: bool) -> char {
    let base = match kind {
        UnitKind::Tank => 't',
        UnitKind::Artillery => 'a',
        UnitKind::Scout => 's',
    };
    if selected {
        base.to_ascii_uppercase()
    } else {
        base
    }
}

struct Canvas {
    cols: usize,
    cells: Vec<(char, &'static str)>,
}

impl Canvas {
    fn put(&mut self, tile: Option<TileCoord>, ch: char, color: &'static str) {
        if let Some(tile) = tile {
            let index = tile.row as usize * self.cols + tile.col as usize;
            if let Some(cell) = self.cells.get_mut(index) {
                *cell = (ch, color);
            }
        }
    }
}

/// Render the board of `sim` as ASCII art.
pub fn render(sim: &Simulation, config: &AsciiConfig) -> String {
    let grid = sim.grid();
    let cols = grid.cols() as usize;
    let tile_of = |pos: Vec2Fixed| grid.world_to_tile(pos);

    let mut canvas = Canvas {
        cols,
        cells: grid.cells().iter().map(|c| (c.glyph(), colors::GRAY)).collect(),
    };

    if config.show_preview {
        if let Some(preview) = sim.formation_preview() {
            let color = if preview.valid { colors::CYAN } else { colors::RED };
            for &tile in &preview.tiles {
                canvas.put(Some(tile), 'o', color);
            }
        }
    }

    for projectile in sim.projectiles().active() {
        canvas.put(tile_of(projectile.position), '*', colors::YELLOW);
    }

    for enemy in sim.enemies().enemies().iter().filter(|e| e.is_active()) {
        canvas.put(tile_of(enemy.position()), 'E', colors::RED);
    }

    for unit in sim.units().values() {
        let selected = sim.coordinator().is_selected(unit.id());
        let color = if selected { colors::BOLD } else { colors::CYAN };
        canvas.put(tile_of(unit.position()), unit_char(unit.kind(), selected), color);
    }

    let mut output = String::with_capacity(canvas.cells.len() * 2);
    for row in canvas.cells.chunks(cols.max(1)) {
        for &(ch, color) in row {
            if config.use_color {
                output.push_str(color);
                output.push(ch);
                output.push_str(colors::RESET);
            } else {
                output.push(ch);
            }
        }
        output.push('\n');
    }

    if config.show_legend {
        let base = sim.base();
        output.push_str(&format!(
            "tick {} | base {}/{} | formation {} | selected {} | enemies {}\n",
            sim.get_tick(),
            base.hp(),
            base.max_hp(),
            sim.formation(),
            sim.selection().len(),
            sim.enemies().active_count(),
        ));
    }

    output
}
