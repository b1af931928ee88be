//! Error types for sheetmerge-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sheetmerge-core
#[derive(Debug, Error)]
pub enum Error {
    /// The workbook could not be opened or a sheet could not be decoded
    #[error("failed to read workbook '{path}': {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    /// No sheet with the requested name
    #[error("sheet '{sheet}' not found in '{path}' (available: {})", .available.join(", "))]
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },

    /// Sheet index beyond the number of sheets in the workbook
    #[error("sheet index {index} out of range in '{path}' ({count} sheet(s))")]
    SheetIndex {
        path: PathBuf,
        index: usize,
        count: usize,
    },

    /// Malformed glob pattern
    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A matched path could not be inspected while expanding a pattern
    #[error("failed to expand file pattern: {0}")]
    Glob(#[from] glob::GlobError),

    /// CSV writing or re-parsing error from the csv crate
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to assemble the spreadsheet package
    #[error("spreadsheet archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
