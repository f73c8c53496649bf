//! Temporary input/archive/fail directory layouts.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A product's directories under a temporary root, removed on drop.
pub struct ProductDirs {
    root: TempDir,
    pub input: PathBuf,
    pub archive: PathBuf,
    pub fail: PathBuf,
}

impl ProductDirs {
    /// Create `in/`, `archive/` and `fail/` under a fresh temporary root.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let input = root.path().join("in");
        let archive = root.path().join("archive");
        let fail = root.path().join("fail");
        for dir in [&input, &archive, &fail] {
            fs::create_dir_all(dir).expect("create product dir");
        }
        Self {
            root,
            input,
            archive,
            fail,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Write a file into the input directory.
    pub fn write_input(&self, name: &str, content: &str) -> PathBuf {
        let path = self.input.join(name);
        fs::write(&path, content).expect("write input file");
        path
    }

    pub fn input_files(&self) -> Vec<String> {
        list_files(&self.input)
    }

    pub fn archive_files(&self) -> Vec<String> {
        list_files(&self.archive)
    }

    pub fn fail_files(&self) -> Vec<String> {
        list_files(&self.fail)
    }
}

impl Default for ProductDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted names of the regular files in `dir`; empty when it does not exist.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dirs = ProductDirs::new();
        dirs.write_input("b.txt", "B");
        dirs.write_input("a.txt", "A");
        assert_eq!(dirs.input_files(), vec!["a.txt", "b.txt"]);
        assert!(dirs.archive_files().is_empty());
        assert!(list_files(&dirs.root().join("missing")).is_empty());
    }
}
