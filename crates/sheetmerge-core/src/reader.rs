//! Sheet reader: loads one sheet of a spreadsheet file into a [`Table`]

use crate::error::{Error, Result};
use crate::table::{CellValue, Column, Row, Table};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Which sheet of each workbook to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    /// Sheet by position, 0 being the first sheet
    Index(usize),
    /// Sheet by exact name
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

impl FromStr for SheetSelector {
    type Err = Infallible;

    /// Blank input selects the first sheet, anything else is a sheet name
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Ok(SheetSelector::default())
        } else {
            Ok(SheetSelector::Name(trimmed.to_string()))
        }
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(i) => write!(f, "#{}", i),
            SheetSelector::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Read the selected sheet of a workbook into a table.
///
/// The first row of the sheet's used range is the header. Blank rows are
/// skipped. The workbook is closed before this function returns.
pub fn read_sheet<P: AsRef<Path>>(path: P, sheet: &SheetSelector) -> Result<Table> {
    let path = path.as_ref();
    let workbook_err = |source| Error::Workbook {
        path: path.to_path_buf(),
        source,
    };

    let mut workbook = open_workbook_auto(path).map_err(workbook_err)?;
    let names = workbook.sheet_names();

    let name = match sheet {
        SheetSelector::Index(index) => {
            names
                .get(*index)
                .cloned()
                .ok_or_else(|| Error::SheetIndex {
                    path: path.to_path_buf(),
                    index: *index,
                    count: names.len(),
                })?
        }
        SheetSelector::Name(wanted) => {
            names
                .iter()
                .find(|n| *n == wanted)
                .cloned()
                .ok_or_else(|| Error::SheetNotFound {
                    path: path.to_path_buf(),
                    sheet: wanted.clone(),
                    available: names.clone(),
                })?
        }
    };

    let range = workbook.worksheet_range(&name).map_err(workbook_err)?;
    let table = range_to_table(path, &range);

    debug!(
        path = %path.display(),
        sheet = %name,
        rows = table.row_count(),
        columns = table.column_count(),
        "read sheet"
    );
    Ok(table)
}

/// Convert a sheet range into a table, treating the first row as the header
pub(crate) fn range_to_table(path: &Path, range: &Range<Data>) -> Table {
    let mut table = Table::new(path.to_path_buf());
    let mut rows = range.rows();

    let Some(header) = rows.next() else {
        return table;
    };

    let raw_names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match CellValue::from(cell) {
            CellValue::Empty => format!("Unnamed: {}", i),
            value => value.to_string_value(),
        })
        .collect();

    table.columns = unique_names(raw_names)
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column::new(name, i))
        .collect();

    let width = table.columns.len();
    for cells in rows {
        let mut values: Vec<CellValue> = cells.iter().map(CellValue::from).collect();
        values.resize(width, CellValue::Empty);

        let row = Row::new(values);
        if !row.is_blank() {
            table.rows.push(row);
        }
    }

    table
}

/// Make header names unique by suffixing repeats with `.1`, `.2`, ...
fn unique_names(raw: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = raw.iter().cloned().collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();

    raw.into_iter()
        .map(|name| {
            if seen.insert(name.clone()) {
                return name;
            }
            let counter = counters.entry(name.clone()).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{}.{}", name, counter);
                if taken.insert(candidate.clone()) {
                    seen.insert(candidate.clone());
                    return candidate;
                }
            }
        })
        .collect()
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => CellValue::Integer(*i),
            Data::Float(f) => CellValue::Float(*f),
            Data::String(s) => CellValue::String(s.clone()),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(value) => CellValue::DateTime(value),
                None => CellValue::Float(dt.as_f64()),
            },
            Data::DateTimeIso(s) => s
                .parse::<NaiveDateTime>()
                .map(CellValue::DateTime)
                .unwrap_or_else(|_| CellValue::String(s.clone())),
            Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::String(e.to_string()),
            Data::Empty => CellValue::Empty,
        }
    }
}
