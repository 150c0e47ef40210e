// codec.rs - Board text encoding shared with the render service
//
// A board is its rows joined by a separator token; each cell is one
// character, a space meaning dead and anything else meaning alive with that
// character. The render path carries the two-character `\n` escape, so that
// is the default separator.

use thiserror::Error;

use crate::grid::{Board, Cell, Dimensions, ShapeError, DEAD_CHAR};

const ESCAPED_SEPARATOR: &str = "\\n";
const NEWLINE_SEPARATOR: &str = "\n";

/// Token placed between encoded rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowSeparator {
    /// Backslash followed by `n`.
    #[default]
    Escaped,
    /// A real line feed.
    Newline,
}

impl RowSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            RowSeparator::Escaped => ESCAPED_SEPARATOR,
            RowSeparator::Newline => NEWLINE_SEPARATOR,
        }
    }

    /// Length of the token in characters.
    pub fn char_len(self) -> usize {
        self.as_str().chars().count()
    }
}

/// Decoded text did not describe a rectangular board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("board text is empty")]
    Empty,
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow { row: usize, expected: usize, found: usize },
    #[error("board has {found} rows, expected {expected}")]
    HeightMismatch { expected: usize, found: usize },
}

impl From<ShapeError> for CodecError {
    fn from(err: ShapeError) -> Self {
        match err {
            ShapeError::Empty => CodecError::Empty,
            ShapeError::Ragged { row, expected, found } => {
                CodecError::RaggedRow { row, expected, found }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardCodec {
    separator: RowSeparator,
}

impl BoardCodec {
    pub fn new(separator: RowSeparator) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> RowSeparator {
        self.separator
    }

    /// Length in characters of any encoded board with these dimensions.
    pub fn encoded_len(&self, dimensions: Dimensions) -> usize {
        let sep = self.separator.char_len();
        dimensions.height() * (dimensions.width() + sep) - sep
    }

    pub fn encode(&self, board: &Board) -> String {
        let mut out = String::with_capacity(self.encoded_len(board.dimensions()));
        for (i, row) in board.rows().enumerate() {
            if i > 0 {
                out.push_str(self.separator.as_str());
            }
            out.extend(row.iter().map(|cell| cell.to_char()));
        }
        out
    }

    /// Strict decode: every row must have the width of the first.
    pub fn decode(&self, text: &str) -> Result<Board, CodecError> {
        let rows = text
            .split(self.separator.as_str())
            .map(|row| row.chars().map(Cell::from_char).collect())
            .collect();
        Ok(Board::from_rows(rows)?)
    }

    /// Tolerant decode used on service responses.
    ///
    /// Accepts either separator, ignores trailing line endings and surplus
    /// trailing empty rows, pads short rows with dead cells and trims rows whose
    /// overflow is only whitespace. The canonical width is `expected`'s width when given,
    /// otherwise the first row's.
    pub fn decode_lenient(
        &self,
        text: &str,
        expected: Option<Dimensions>,
    ) -> Result<Board, CodecError> {
        let mut rows: Vec<&str> = split_rows(text, self.separator);
        let keep = expected.map_or(0, |expected| expected.height());
        while rows.len() > keep && rows.last().is_some_and(|row| row.is_empty()) {
            rows.pop();
        }
        let Some(first) = rows.first() else {
            return Err(CodecError::Empty);
        };

        if let Some(expected) = expected {
            if rows.len() != expected.height() {
                return Err(CodecError::HeightMismatch {
                    expected: expected.height(),
                    found: rows.len(),
                });
            }
        }

        let width = match expected {
            Some(expected) => expected.width(),
            None => first.chars().count(),
        };

        let mut cells = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let chars: Vec<char> = row.chars().collect();
            if chars.len() > width && !chars[width..].iter().all(|c| c.is_whitespace()) {
                return Err(CodecError::RaggedRow {
                    row: index,
                    expected: width,
                    found: chars.len(),
                });
            }
            let mut parsed: Vec<Cell> = chars
                .into_iter()
                .take(width)
                .map(Cell::from_char)
                .collect();
            parsed.resize(width, Cell::Dead);
            cells.push(parsed);
        }

        Ok(Board::from_rows(cells)?)
    }
}

fn split_rows(text: &str, separator: RowSeparator) -> Vec<&str> {
    let token = if text.contains(separator.as_str()) {
        separator.as_str()
    } else if text.contains(ESCAPED_SEPARATOR) {
        ESCAPED_SEPARATOR
    } else {
        NEWLINE_SEPARATOR
    };
    // Rows never keep a line ending, even when the token is the escape.
    text.split(token)
        .map(|row| row.trim_end_matches(['\r', '\n']))
        .collect()
}

/// Encodes with the default (escaped) separator.
pub fn encode(board: &Board) -> String {
    BoardCodec::default().encode(board)
}

/// Strict decode with the default (escaped) separator.
pub fn decode(text: &str) -> Result<Board, CodecError> {
    BoardCodec::default().decode(text)
}

/// True when `c` can mark a live cell without clashing with the encoding.
pub fn is_valid_alive_char(c: char) -> bool {
    c != DEAD_CHAR && c != '\\' && !c.is_whitespace() && !c.is_control()
}
