// grid.rs - Board types for Conway's Game of Life

use std::fmt;

/// Character reserved for dead cells in every textual encoding.
pub const DEAD_CHAR: char = ' ';

/// A single cell: dead, or alive and carrying the character it is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Dead,
    Alive(char),
}

impl Cell {
    /// Reads a cell from its encoded character; anything but a space is alive.
    pub fn from_char(c: char) -> Self {
        if c == DEAD_CHAR { Cell::Dead } else { Cell::Alive(c) }
    }

    pub fn to_char(self) -> char {
        match self {
            Cell::Dead => DEAD_CHAR,
            Cell::Alive(c) => c,
        }
    }

    pub fn is_alive(self) -> bool {
        matches!(self, Cell::Alive(_))
    }
}

/// Board size in cells. Both axes are at least 1 once built through `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    width: usize,
    height: usize,
}

impl Dimensions {
    /// Returns `None` when either axis is zero.
    pub fn new(width: usize, height: usize) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    /// Like [`Dimensions::new`], but a zero axis is raised to 1.
    pub fn clamped(width: usize, height: usize) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangular grid of cells stored row-major.
///
/// Every row has exactly `width` cells; construction goes through
/// [`Board::new`] or [`Board::from_rows`], which both keep that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Board {
    dimensions: Dimensions,
    cells: Vec<Cell>,
}

/// Rows handed to [`Board::from_rows`] did not form a rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    Empty,
    Ragged { row: usize, expected: usize, found: usize },
}

impl Board {
    /// All-dead board.
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            cells: vec![Cell::Dead; dimensions.cell_count()],
        }
    }

    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Result<Self, ShapeError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let dimensions = Dimensions::new(width, rows.len()).ok_or(ShapeError::Empty)?;

        let mut cells = Vec::with_capacity(dimensions.cell_count());
        for (row, cells_in_row) in rows.into_iter().enumerate() {
            if cells_in_row.len() != width {
                return Err(ShapeError::Ragged {
                    row,
                    expected: width,
                    found: cells_in_row.len(),
                });
            }
            cells.extend(cells_in_row);
        }

        Ok(Self { dimensions, cells })
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    /// Gets the cell at column `x`, row `y`; out of range reads as dead.
    pub fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width() && y < self.height() {
            self.cells[y * self.width() + x]
        } else {
            Cell::Dead
        }
    }

    /// Sets the cell at column `x`, row `y`; out of range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width() && y < self.height() {
            let width = self.width();
            self.cells[y * width + x] = cell;
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.dimensions.width)
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_alive()).count()
    }

    pub fn is_all_dead(&self) -> bool {
        self.alive_count() == 0
    }
}
