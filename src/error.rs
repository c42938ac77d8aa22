use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions. Any of these aborts the run with no partial output;
/// unmatched start/end pairs are warnings instead (see `engine::MatchWarning`).
#[derive(Debug, Error)]
pub enum StatError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input has no header row")]
    EmptyInput,

    #[error("header is missing required column '{0}'")]
    MissingColumn(String),

    #[error("line {line}: expected {expected} fields, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: field '{column}' is not an unsigned integer: '{value}'")]
    MalformedField {
        line: usize,
        column: String,
        value: String,
    },

    #[error("invalid event kind {kind} in tag {raw:#010x}")]
    InvalidTag { raw: u32, kind: u32 },

    #[error("tile ({x}, {y}) is outside the {dim_x}x{dim_y} mesh with origin ({origin_x}, {origin_y})")]
    TileOutOfBounds {
        x: u32,
        y: u32,
        dim_x: usize,
        dim_y: usize,
        origin_x: u32,
        origin_y: u32,
    },
}
