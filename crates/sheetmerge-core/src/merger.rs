//! Merge engine for stacking sheet tables with provenance tracking

use crate::reader::{read_sheet, SheetSelector};
use crate::table::{CellValue, Column, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the column that records which file a row came from
pub const SOURCE_COLUMN: &str = "source file";

/// Rows from many files stacked into one table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedTable {
    /// Column definitions (union of all source columns, source column last)
    pub columns: Vec<Column>,
    /// Rows with provenance
    pub rows: Vec<MergedRow>,
    /// Files that contributed rows, in merge order
    pub sources: Vec<PathBuf>,
}

impl MergedTable {
    /// The empty result: no rows, no columns
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when there is nothing to display or export
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get the full path of the file a row came from
    pub fn get_provenance(&self, row_idx: usize) -> Option<&PathBuf> {
        self.rows.get(row_idx).map(|r| &r.source)
    }

    /// Number of rows contributed by each source file
    pub fn rows_per_source(&self) -> BTreeMap<&Path, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.source.as_path()).or_insert(0) += 1;
        }
        counts
    }
}

/// A row in the merged table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedRow {
    /// Dense 0-based position in the merged table
    pub index: usize,
    /// Cells aligned to the merged table's columns
    pub cells: Vec<CellValue>,
    /// Full path of the file this row was read from
    pub source: PathBuf,
}

impl MergedRow {
    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

/// A file that could not be read; reported, never fatal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadFailure {
    /// The file that failed
    pub path: PathBuf,
    /// Human-readable reason
    pub message: String,
}

/// Outcome of merging a batch of files
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The combined table (empty if nothing could be read)
    pub table: MergedTable,
    /// One entry per file that failed to read, in input order
    pub failures: Vec<ReadFailure>,
}

/// Read the selected sheet of every file and stack the results.
///
/// Files are processed in the given order. A file that cannot be read is
/// recorded in [`MergeResult::failures`] and the batch continues.
pub fn merge_files<P: AsRef<Path>>(paths: &[P], sheet: &SheetSelector) -> MergeResult {
    let outcomes: Vec<(PathBuf, crate::Result<Table>)> = paths
        .iter()
        .map(|p| (p.as_ref().to_path_buf(), read_sheet(p, sheet)))
        .collect();

    let mut tables = Vec::new();
    let mut failures = Vec::new();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(table) => tables.push(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                failures.push(ReadFailure {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    let read_ok = tables.len();
    let table = merge_tables(tables);

    info!(
        files = paths.len(),
        read = read_ok,
        failed = failures.len(),
        rows = table.row_count(),
        sheet = %sheet,
        "merged files"
    );

    MergeResult { table, failures }
}

/// Stack already-read tables into one, tagging each row with its file name.
///
/// Returns the empty table when there are no tables or no rows.
pub fn merge_tables(tables: Vec<Table>) -> MergedTable {
    let tables: Vec<Table> = tables.into_iter().map(annotate_source).collect();

    if tables.iter().all(|t| t.rows.is_empty()) {
        return MergedTable::empty();
    }

    // Build unified column list (union of all columns, first-seen order)
    let mut column_names: Vec<String> = Vec::new();
    let mut seen_columns: HashSet<String> = HashSet::new();

    for table in &tables {
        for col in &table.columns {
            if col.name != SOURCE_COLUMN && seen_columns.insert(col.name.clone()) {
                column_names.push(col.name.clone());
            }
        }
    }
    column_names.push(SOURCE_COLUMN.to_string());

    let columns: Vec<Column> = column_names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column::new(name, i))
        .collect();

    // Build column name -> index mapping for the unified columns
    let col_index: BTreeMap<&str, usize> = columns
        .iter()
        .map(|c| (c.name.as_str(), c.index))
        .collect();

    let mut rows: Vec<MergedRow> = Vec::new();
    let mut sources: Vec<PathBuf> = Vec::new();

    for table in tables {
        if table.rows.is_empty() {
            continue;
        }

        // Unified index for each of this table's columns
        let positions: Vec<Option<usize>> = table
            .columns
            .iter()
            .map(|c| col_index.get(c.name.as_str()).copied())
            .collect();

        for row in table.rows {
            let mut cells = vec![CellValue::Empty; columns.len()];
            for (value, unified_idx) in row.cells.into_iter().zip(&positions) {
                if let Some(idx) = *unified_idx {
                    cells[idx] = value;
                }
            }

            rows.push(MergedRow {
                index: rows.len(),
                cells,
                source: table.source_path.clone(),
            });
        }

        sources.push(table.source_path);
    }

    MergedTable {
        columns,
        rows,
        sources,
    }
}

/// Replace any existing source column with one holding the base file name
fn annotate_source(mut table: Table) -> Table {
    let name = table
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| table.source_path.to_string_lossy().into_owned());

    table.remove_column(SOURCE_COLUMN);
    table.push_constant_column(SOURCE_COLUMN, CellValue::String(name));
    table
}
