// patterns.rs - Preset boards and the random board generator

use rand::Rng;

use crate::codec::BoardCodec;
use crate::grid::{Board, Cell, Dimensions, DEAD_CHAR};

/// A named seed board, stored as its rows.
#[derive(Debug)]
pub struct Preset {
    pub name: &'static str,
    pub rows: &'static [&'static str],
}

pub const PRESETS: &[Preset] = &[
    Preset {
        name: "glider",
        rows: &["     ", "  O  ", "   O ", " OOO ", "     "],
    },
    Preset {
        name: "blinker",
        rows: &["     ", "     ", " OOO ", "     ", "     "],
    },
    Preset {
        name: "block",
        rows: &["   ", " OO", " OO"],
    },
    Preset {
        name: "toad",
        rows: &["      ", "      ", "  OOO ", " OOO  ", "      ", "      "],
    },
    Preset {
        name: "beacon",
        rows: &["      ", " OO   ", " OO   ", "   OO ", "   OO ", "      "],
    },
];

impl Preset {
    /// Builds the preset's board, sized to its widest row.
    pub fn board(&self) -> Board {
        let width = self
            .rows
            .iter()
            .map(|row| row.chars().count())
            .max()
            .unwrap_or(0);
        let mut board = Board::new(Dimensions::clamped(width, self.rows.len()));
        for (y, row) in self.rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                board.set(x, y, Cell::from_char(c));
            }
        }
        board
    }

    /// The preset in wire form.
    pub fn encoded(&self, codec: &BoardCodec) -> String {
        codec.encode(&self.board())
    }
}

/// Looks a preset up by name, ignoring case.
pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name.trim()))
}

pub fn names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|preset| preset.name)
}

/// Random board: each cell is alive with probability `density`, drawing its
/// character uniformly from `alive_chars`. Spaces in `alive_chars` are never
/// used; with nothing left to draw from the board comes out all dead.
pub fn generate<R: Rng>(
    dimensions: Dimensions,
    density: f64,
    alive_chars: &[char],
    rng: &mut R,
) -> Board {
    let pool: Vec<char> = alive_chars
        .iter()
        .copied()
        .filter(|&c| c != DEAD_CHAR)
        .collect();

    let mut board = Board::new(dimensions);
    if pool.is_empty() {
        return board;
    }

    for y in 0..dimensions.height() {
        for x in 0..dimensions.width() {
            if rng.random::<f64>() < density {
                let c = pool[rng.random_range(0..pool.len())];
                board.set(x, y, Cell::Alive(c));
            }
        }
    }
    board
}
