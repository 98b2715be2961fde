//! Source file discovery for directory indexing.
//!
//! Walks with the `ignore` crate so `.gitignore` rules apply, then drops
//! configured ignore patterns and files of disabled languages.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::paths::has_extension;

/// Project-local ignore file, read in addition to `.gitignore`
pub const IGNORE_FILE: &str = ".crosslinkignore";

pub struct FileWalker<'s> {
    settings: &'s Settings,
}

impl<'s> FileWalker<'s> {
    pub fn new(settings: &'s Settings) -> Self {
        Self { settings }
    }

    /// Supported source files under `root`, sorted by path.
    pub fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE);

        // Overrides prefixed with `!` exclude matches
        let mut overrides = ignore::overrides::OverrideBuilder::new(root);
        for pattern in &self.settings.indexing.ignore_patterns {
            if let Err(e) = overrides.add(&format!("!{pattern}")) {
                tracing::warn!("[walker] invalid ignore pattern '{pattern}': {e}");
            }
        }
        match overrides.build() {
            Ok(overrides) => {
                builder.overrides(overrides);
            }
            Err(e) => tracing::warn!("[walker] ignoring pattern set: {e}"),
        }

        let extensions = self.enabled_extensions();
        let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| has_extension(path, &extensions))
            .collect();
        files.sort();
        files
    }

    fn enabled_extensions(&self) -> Vec<String> {
        self.settings
            .languages
            .values()
            .filter(|config| config.enabled)
            .flat_map(|config| config.extensions.iter())
            .map(|ext| ext.trim_start_matches('.').to_string())
            .collect()
    }
}

pub fn read_source(path: &Path) -> IndexResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read every path. Unreadable files are returned as errors instead of
/// stopping the batch.
pub fn read_sources(paths: Vec<PathBuf>) -> (Vec<(PathBuf, Vec<u8>)>, Vec<IndexError>) {
    let mut sources = Vec::with_capacity(paths.len());
    let mut errors = Vec::new();
    for path in paths {
        match read_source(&path) {
            Ok(content) => sources.push((path, content)),
            Err(e) => errors.push(e),
        }
    }
    (sources, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_filters_by_language_and_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("node_modules/lodash")).unwrap();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("main.go"), "package main\n").unwrap();
        fs::write(root.join("pkg/util.py"), "x = 1\n").unwrap();
        fs::write(root.join("pkg/view.tsx"), "export {}\n").unwrap();
        fs::write(root.join("node_modules/lodash/index.js"), "").unwrap();
        fs::write(root.join("README.md"), "# readme\n").unwrap();

        let mut settings = Settings::default();
        let files = FileWalker::new(&settings).walk(root);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("main.go"),
                PathBuf::from("pkg/util.py"),
                PathBuf::from("pkg/view.tsx"),
            ]
        );

        settings.languages["python"].enabled = false;
        let files = FileWalker::new(&settings).walk(root);
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_walk_respects_ignore_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("gen")).unwrap();
        fs::write(root.join("gen/out.go"), "package gen\n").unwrap();
        fs::write(root.join("app.go"), "package app\n").unwrap();
        fs::write(root.join(IGNORE_FILE), "gen/\n").unwrap();

        let files = FileWalker::new(&Settings::default()).walk(root);
        assert_eq!(files, vec![root.join("app.go")]);
    }

    #[test]
    fn test_read_sources_reports_unreadable_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.go"), "package a\n").unwrap();
        let missing = root.join("gone.go");

        let (sources, errors) = read_sources(vec![root.join("a.go"), missing.clone()]);
        assert_eq!(sources, vec![(root.join("a.go"), b"package a\n".to_vec())]);
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            IndexError::Io { path, source } => {
                assert_eq!(path, &missing);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
