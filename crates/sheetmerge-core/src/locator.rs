//! File locator for discovering spreadsheet files to merge

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Patterns used when the caller does not supply any
pub const DEFAULT_PATTERNS: &[&str] = &["*.xlsx", "*.xls"];

/// Lower-cased file names of previously exported merge results.
/// These are never picked up as sources.
pub const RESERVED_OUTPUT_NAMES: &[&str] = &["tong_hop.xlsx", "tong_hop.xls"];

/// Fresh copy of the default pattern list
pub fn default_patterns() -> Vec<String> {
    DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect()
}

/// Find spreadsheet files in the current working directory.
///
/// `None` uses [`DEFAULT_PATTERNS`]. The result is sorted, contains no
/// duplicates and never includes a reserved output file.
pub fn locate(patterns: Option<&[String]>) -> Result<Vec<PathBuf>> {
    let patterns = patterns.map(<[String]>::to_vec).unwrap_or_else(default_patterns);
    expand(&patterns)
}

/// Find spreadsheet files in `dir`, matching each pattern relative to it.
pub fn locate_in<P: AsRef<Path>>(dir: P, patterns: Option<&[String]>) -> Result<Vec<PathBuf>> {
    let prefix = PathBuf::from(Pattern::escape(&dir.as_ref().to_string_lossy()));
    let patterns: Vec<String> = patterns
        .map(<[String]>::to_vec)
        .unwrap_or_else(default_patterns)
        .iter()
        .map(|p| prefix.join(p).to_string_lossy().into_owned())
        .collect();
    expand(&patterns)
}

/// Check whether a path names one of the reserved output files
pub fn is_reserved_output(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .is_some_and(|name| RESERVED_OUTPUT_NAMES.contains(&name.as_str()))
}

fn expand(patterns: &[String]) -> Result<Vec<PathBuf>> {
    // Wildcards never match a leading dot (`._jan.xlsx`, `.~lock.jan.xlsx#`)
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };
    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    for pattern in patterns {
        let paths = glob::glob_with(pattern, options).map_err(|e| Error::Pattern {
            pattern: pattern.clone(),
            source: e,
        })?;

        for entry in paths {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if is_reserved_output(&path) {
                debug!(path = %path.display(), "skipping reserved output file");
                continue;
            }
            found.insert(path);
        }
    }

    // Order by the full path text; `Path` ordering is per component and
    // would put `sub/x.xlsx` ahead of `sub-a.xlsx`
    let mut found: Vec<PathBuf> = found.into_iter().collect();
    found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));

    debug!(count = found.len(), "located spreadsheet files");
    Ok(found)
}
