//! sheetmerge-core: Core library for discovering and merging spreadsheet files
//!
//! This library provides functionality to:
//! - Locate spreadsheet files by glob pattern, skipping previously exported results
//! - Read one sheet of a workbook into a structured table
//! - Stack many sheets into one table, tagging every row with its source file
//! - Collect per-file read failures without aborting the batch
//! - Export the merged table as CSV, XLSX or JSON

pub mod error;
pub mod export;
pub mod locator;
pub mod merger;
pub mod reader;
pub mod table;

pub use error::{Error, Result};
pub use export::{
    export_all, read_csv_text, write_csv, write_json, write_xlsx, TextTable, EXPORT_CSV_NAME,
    EXPORT_SHEET_NAME, EXPORT_XLSX_NAME,
};
pub use locator::{default_patterns, is_reserved_output, locate, locate_in, DEFAULT_PATTERNS};
pub use merger::{merge_files, merge_tables, MergeResult, MergedRow, MergedTable, ReadFailure, SOURCE_COLUMN};
pub use reader::{read_sheet, SheetSelector};
pub use table::{CellValue, Column, Row, Table};
