//! sheetmerge CLI
//!
//! Command-line tool for finding spreadsheet files, merging them into one
//! table and exporting the result.

use clap::{Args, Parser, Subcommand};
use sheetmerge_core::{
    export_all, locate, locate_in, merge_files, write_csv, write_json, write_xlsx, MergeResult,
    MergedTable, SheetSelector, EXPORT_CSV_NAME, EXPORT_XLSX_NAME,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// File name of the JSON export
const EXPORT_JSON_NAME: &str = "tong_hop.json";

#[derive(Parser)]
#[command(name = "sheetmerge")]
#[command(about = "Merge spreadsheet files into one table", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the spreadsheet files that would be merged
    List {
        /// Directory to search (default: current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// File patterns to match (default: *.xlsx and *.xls)
        #[arg(short, long)]
        pattern: Vec<String>,
    },

    /// Merge files and print the combined table
    Show {
        #[command(flatten)]
        selection: Selection,

        /// Maximum number of rows to display
        #[arg(short, long)]
        limit: Option<usize>,

        /// Columns to display (comma-separated)
        #[arg(short, long)]
        columns: Option<String>,
    },

    /// Merge files and write the combined table to disk
    Export {
        #[command(flatten)]
        selection: Selection,

        /// Directory to write exports into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Output format; "all" writes both CSV and XLSX
        #[arg(long, default_value = "all", value_parser = ["all", "csv", "xlsx", "json"])]
        format: String,
    },
}

/// Which files and which sheet to merge
#[derive(Args)]
struct Selection {
    /// Directory to search (default: current directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// File patterns to match (default: *.xlsx and *.xls)
    #[arg(short, long)]
    pattern: Vec<String>,

    /// Merge only these files instead of everything found
    #[arg(short, long)]
    file: Vec<PathBuf>,

    /// Sheet name to read from every file (default: first sheet)
    #[arg(short, long, conflicts_with = "sheet_index")]
    sheet: Option<String>,

    /// Sheet position to read from every file, 0 being the first
    #[arg(long)]
    sheet_index: Option<usize>,
}

impl Selection {
    fn sheet_selector(&self) -> SheetSelector {
        match (&self.sheet_index, &self.sheet) {
            (Some(index), _) => SheetSelector::Index(*index),
            (None, Some(name)) => name.parse().unwrap_or_default(),
            (None, None) => SheetSelector::default(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> sheetmerge_core::Result<()> {
    match cli.command {
        Commands::List { dir, pattern } => cmd_list(dir.as_deref(), &pattern),
        Commands::Show {
            selection,
            limit,
            columns,
        } => cmd_show(&selection, limit, columns),
        Commands::Export {
            selection,
            output_dir,
            format,
        } => cmd_export(&selection, &output_dir, &format),
    }
}

fn find_files(dir: Option<&Path>, patterns: &[String]) -> sheetmerge_core::Result<Vec<PathBuf>> {
    let patterns = (!patterns.is_empty()).then_some(patterns);
    match dir {
        Some(dir) => locate_in(dir, patterns),
        None => locate(patterns),
    }
}

fn cmd_list(dir: Option<&Path>, patterns: &[String]) -> sheetmerge_core::Result<()> {
    let files = find_files(dir, patterns)?;

    if files.is_empty() {
        println!("No spreadsheet files found.");
        return Ok(());
    }

    println!("Found {} file(s):", files.len());
    for file in &files {
        println!("  {}", file.display());
    }

    Ok(())
}

/// Locate (or take the explicit list of) files and merge them.
/// Prints read warnings; returns None when there is nothing to show.
fn merge_selection(selection: &Selection) -> sheetmerge_core::Result<Option<MergeResult>> {
    let files = if selection.file.is_empty() {
        find_files(selection.dir.as_deref(), &selection.pattern)?
    } else {
        selection.file.clone()
    };

    if files.is_empty() {
        println!("No spreadsheet files found.");
        return Ok(None);
    }

    let sheet = selection.sheet_selector();
    debug!(files = files.len(), sheet = %sheet, "merging selection");

    let result = merge_files(&files, &sheet);

    for failure in &result.failures {
        eprintln!(
            "Warning: failed to read {}: {}",
            failure.path.display(),
            failure.message
        );
    }

    if result.table.is_empty() {
        eprintln!("Warning: no data after merging. Check the selected files and sheet.");
        return Ok(None);
    }

    println!(
        "Merged {} rows from {} file(s).",
        result.table.row_count(),
        files.len()
    );

    Ok(Some(result))
}

fn cmd_show(
    selection: &Selection,
    limit: Option<usize>,
    columns: Option<String>,
) -> sheetmerge_core::Result<()> {
    let Some(result) = merge_selection(selection)? else {
        return Ok(());
    };
    let merged = &result.table;

    // Filter columns if specified
    let col_filter: Option<Vec<&str>> = columns.as_ref().map(|c| c.split(',').map(str::trim).collect());

    let display_cols: Vec<&sheetmerge_core::Column> = if let Some(ref filter) = col_filter {
        merged
            .columns
            .iter()
            .filter(|c| filter.contains(&c.name.as_str()))
            .collect()
    } else {
        merged.columns.iter().collect()
    };

    println!();

    // Print header
    let mut header: Vec<&str> = vec!["#"];
    header.extend(display_cols.iter().map(|c| c.name.as_str()));
    println!("{}", header.join("\t"));
    println!("{}", "-".repeat(header.len() * 12));

    // Print rows
    let row_limit = limit.unwrap_or(merged.rows.len());
    for row in merged.rows.iter().take(row_limit) {
        let mut values: Vec<String> = vec![row.index.to_string()];
        values.extend(display_cols.iter().map(|col| {
            row.get(col.index)
                .map(|c| c.to_string_value())
                .unwrap_or_default()
        }));
        println!("{}", values.join("\t"));
    }

    if merged.rows.len() > row_limit {
        println!("... ({} more rows)", merged.rows.len() - row_limit);
    }

    Ok(())
}

fn cmd_export(selection: &Selection, output_dir: &Path, format: &str) -> sheetmerge_core::Result<()> {
    let Some(result) = merge_selection(selection)? else {
        return Ok(());
    };
    let merged = &result.table;

    let written = match format {
        "csv" => vec![write_single(merged, output_dir, EXPORT_CSV_NAME, |t, w| write_csv(t, w))?],
        "xlsx" => vec![write_single(merged, output_dir, EXPORT_XLSX_NAME, |t, w| write_xlsx(t, w))?],
        "json" => vec![write_single(merged, output_dir, EXPORT_JSON_NAME, |t, w| write_json(t, w))?],
        _ => export_all(merged, output_dir)?,
    };

    for path in &written {
        println!("Exported {} rows to {}", merged.row_count(), path.display());
    }

    Ok(())
}

fn write_single<F>(
    table: &MergedTable,
    output_dir: &Path,
    file_name: &str,
    write: F,
) -> sheetmerge_core::Result<PathBuf>
where
    F: FnOnce(&MergedTable, BufWriter<File>) -> sheetmerge_core::Result<()>,
{
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(file_name);
    write(table, BufWriter::new(File::create(&path)?))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(args: &[&str]) -> Selection {
        let mut argv = vec!["sheetmerge", "show"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Show { selection, .. } => selection,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_sheet_selector_default() {
        assert_eq!(selection(&[]).sheet_selector(), SheetSelector::Index(0));
    }

    #[test]
    fn test_sheet_selector_by_name() {
        assert_eq!(
            selection(&["--sheet", " Data "]).sheet_selector(),
            SheetSelector::Name("Data".to_string())
        );
        assert_eq!(selection(&["--sheet", "  "]).sheet_selector(), SheetSelector::Index(0));
    }

    #[test]
    fn test_sheet_selector_by_index() {
        assert_eq!(
            selection(&["--sheet-index", "2"]).sheet_selector(),
            SheetSelector::Index(2)
        );
    }

    #[test]
    fn test_sheet_and_index_conflict() {
        let parsed = Cli::try_parse_from(["sheetmerge", "show", "--sheet", "a", "--sheet-index", "1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_export_rejects_unknown_format() {
        let parsed = Cli::try_parse_from(["sheetmerge", "export", "--format", "parquet"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_repeated_patterns_and_files() {
        let sel = selection(&["-p", "*.xlsx", "-p", "*.ods", "-f", "a.xlsx", "-f", "b.xls"]);
        assert_eq!(sel.pattern, vec!["*.xlsx", "*.ods"]);
        assert_eq!(sel.file, vec![PathBuf::from("a.xlsx"), PathBuf::from("b.xls")]);
    }
}
