//! JSON file scanner
//!
//! Recursive discovery of raw record files under a source directory.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// File scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl From<ScanError> for sparkify_common::Error {
    fn from(err: ScanError) -> Self {
        sparkify_common::Error::InvalidInput(err.to_string())
    }
}

/// Finds `*.json` files in a directory tree
#[derive(Debug, Clone)]
pub struct JsonFileScanner {
    extension: String,
}

impl JsonFileScanner {
    pub fn new() -> Self {
        Self {
            extension: "json".to_string(),
        }
    }

    /// Scan directory for record files, sorted by path
    ///
    /// Hidden files and directories are skipped. Unreadable entries are
    /// logged and skipped.
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.has_extension(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        files.sort();
        tracing::debug!("{} record files discovered under {}", files.len(), root_path.display());
        Ok(files)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

impl Default for JsonFileScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let files = JsonFileScanner::new().scan(temp_dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let result = JsonFileScanner::new().scan(Path::new("/nonexistent/path"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_scan_file_instead_of_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.json");
        fs::write(&file, "{}").unwrap();

        let result = JsonFileScanner::new().scan(&file);
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_scan_nested_sorted_json_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("A/B")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("A/B/TRB.json"), "{}").unwrap();
        fs::write(root.join("A/TRA.JSON"), "{}").unwrap();
        fs::write(root.join("z.json"), "{}").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();
        fs::write(root.join(".hidden.json"), "{}").unwrap();
        fs::write(root.join(".cache/c.json"), "{}").unwrap();

        let files = JsonFileScanner::new().scan(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A/B/TRB.json", "A/TRA.JSON", "z.json"]);
    }

    #[test]
    fn test_scan_error_converts() {
        let err: sparkify_common::Error = ScanError::PathNotFound(PathBuf::from("data/log_data")).into();
        assert!(matches!(err, sparkify_common::Error::InvalidInput(_)));
    }
}
