//! Import resolution per ecosystem.
//!
//! A [`ModuleResolver`] turns an import string written in a file into a
//! [`ModuleResolution`]. Resolvers only see the world through a
//! [`FileSystem`], so tests and embedders can hand them an in-memory tree.
//! Each resolver keeps its own [`FileRegistry`] mirror of the engine's
//! path/id registry so it can report `target_file` for internal hits.

mod csharp;
mod go;
mod javascript;
mod php;
mod python;

pub use csharp::{CSharpResolver, CsprojInfo, DEFAULT_CONFIG_FILES as CSHARP_CONFIG_FILES};
pub use go::{DEFAULT_CONFIG_FILES as GO_CONFIG_FILES, GoModInfo, GoResolver};
pub use javascript::{
    DEFAULT_CONFIG_FILES as JAVASCRIPT_CONFIG_FILES, JavaScriptResolver, PackageJson, TsConfig,
};
pub use php::{ComposerInfo, DEFAULT_CONFIG_FILES as PHP_CONFIG_FILES, PhpResolver, Psr4Mapping};
pub use python::{DEFAULT_CONFIG_FILES as PYTHON_CONFIG_FILES, PythonResolver};

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::has_extension;
use crate::types::{FileId, ModuleResolution};

/// File access consumed by resolvers.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    /// Direct children of `dir` with extension `ext` (no dot), sorted.
    fn list_files_with_extension(&self, dir: &Path, ext: &str) -> Vec<PathBuf>;
    /// Direct child directories of `dir`, sorted.
    fn list_dirs(&self, dir: &Path) -> Vec<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn list_files_with_extension(&self, dir: &Path, ext: &str) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, &[ext]))
            .collect();
        files.sort();
        files
    }

    fn list_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        dirs
    }
}

/// In-memory file tree. Directories exist implicitly as ancestors of files.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    pub fn remove(&self, path: &Path) -> Option<String> {
        self.files.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files
            .read()
            .keys()
            .any(|file| file != path && file.starts_with(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not in memory filesystem", path.display()),
            )
        })
    }

    fn list_files_with_extension(&self, dir: &Path, ext: &str) -> Vec<PathBuf> {
        self.files
            .read()
            .keys()
            .filter(|file| file.parent() == Some(dir) && has_extension(file, &[ext]))
            .cloned()
            .collect()
    }

    fn list_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        let dirs: BTreeSet<PathBuf> = self
            .files
            .read()
            .keys()
            .filter_map(|file| {
                let rest = file.strip_prefix(dir).ok()?;
                let mut components = rest.components();
                let first = components.next()?;
                // Only paths with something below the first component are dirs
                components.next()?;
                Some(dir.join(first))
            })
            .collect();
        dirs.into_iter().collect()
    }
}

/// Path/id mirror of the engine registry, shared by resolvers through composition.
#[derive(Debug, Default, Clone)]
pub struct FileRegistry {
    by_path: HashMap<PathBuf, FileId>,
    by_id: HashMap<FileId, PathBuf>,
}

impl FileRegistry {
    pub fn register(&mut self, file_id: FileId, path: &Path) {
        if let Some(old) = self.by_id.insert(file_id, path.to_path_buf()) {
            self.by_path.remove(&old);
        }
        self.by_path.insert(path.to_path_buf(), file_id);
    }

    pub fn unregister(&mut self, file_id: FileId) -> Option<PathBuf> {
        let path = self.by_id.remove(&file_id)?;
        self.by_path.remove(&path);
        Some(path)
    }

    pub fn replace(&mut self, registry: &HashMap<PathBuf, FileId>) {
        self.by_path = registry.clone();
        self.by_id = registry.iter().map(|(p, id)| (*id, p.clone())).collect();
    }

    pub fn id_for(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn path_for(&self, file_id: FileId) -> Option<&Path> {
        self.by_id.get(&file_id).map(PathBuf::as_path)
    }

    /// Registered files directly inside `dir`, sorted by path.
    pub fn files_in_dir(&self, dir: &Path) -> Vec<(&Path, FileId)> {
        let mut files: Vec<(&Path, FileId)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .map(|(path, id)| (path.as_path(), *id))
            .collect();
        files.sort();
        files
    }

    /// Whether any registered file lives below `dir`.
    pub fn has_files_under(&self, dir: &Path) -> bool {
        self.by_path
            .keys()
            .any(|path| path != dir && path.starts_with(dir))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Per-resolver counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolverStats {
    pub name: String,
    pub languages: Vec<String>,
    pub registered_files: usize,
    pub resolutions: u64,
    /// Resolution count per kind (`builtin`, `file`, `not_found`, ...)
    pub by_kind: BTreeMap<String, u64>,
}

/// Tally kept by each resolver for [`ModuleResolver::stats`].
#[derive(Debug, Default, Clone)]
pub struct ResolutionCounter {
    total: u64,
    by_kind: BTreeMap<&'static str, u64>,
}

impl ResolutionCounter {
    pub fn record(&mut self, resolution: &ModuleResolution) {
        self.total += 1;
        *self.by_kind.entry(resolution.kind.as_str()).or_default() += 1;
    }

    pub fn stats(&self, name: &str, languages: &[&str], registered_files: usize) -> ResolverStats {
        ResolverStats {
            name: name.to_string(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            registered_files,
            resolutions: self.total,
            by_kind: self
                .by_kind
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

/// Ecosystem-specific import resolution.
pub trait ModuleResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Language tags this resolver serves
    fn languages(&self) -> &'static [&'static str];

    /// Resolve without touching the resolver's counters.
    fn lookup(&mut self, import_path: &str, from: FileId) -> ModuleResolution;

    fn counter_mut(&mut self) -> &mut ResolutionCounter;

    /// Resolve and count the outcome in [`ModuleResolver::stats`].
    fn resolve_import(&mut self, import_path: &str, from: FileId) -> ModuleResolution {
        let resolution = self.lookup(import_path, from);
        tracing::debug!(
            "[{}] {import_path} from {from} -> {} {:?}",
            self.name(),
            resolution.kind,
            resolution.target_file
        );
        self.counter_mut().record(&resolution);
        resolution
    }

    fn register_file(&mut self, file_id: FileId, path: &Path);

    fn unregister_file(&mut self, file_id: FileId);

    /// Replace the whole path/id mirror at once
    fn set_file_registry(&mut self, registry: &HashMap<PathBuf, FileId>);

    fn stats(&self) -> ResolverStats;
}

/// Resolvers keyed by the language tags they serve.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn ModuleResolver>>,
    by_language: HashMap<&'static str, usize>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver. Its languages are routed to it, replacing any
    /// earlier resolver for the same language.
    pub fn register(&mut self, resolver: Box<dyn ModuleResolver>) {
        let index = self.resolvers.len();
        for language in resolver.languages() {
            self.by_language.insert(language, index);
        }
        tracing::debug!(
            "[resolver] registered {} for {:?}",
            resolver.name(),
            resolver.languages()
        );
        self.resolvers.push(resolver);
    }

    pub fn has_language(&self, language: &str) -> bool {
        self.by_language.contains_key(language)
    }

    /// Resolve `import_path` with the resolver for `language`. `None` when
    /// no resolver serves that language.
    pub fn resolve(
        &mut self,
        language: &str,
        import_path: &str,
        from: FileId,
    ) -> Option<ModuleResolution> {
        let index = *self.by_language.get(language)?;
        let resolver = self.resolvers.get_mut(index)?;
        Some(resolver.resolve_import(import_path, from))
    }

    /// Like [`ResolverRegistry::resolve`], but leaves resolver stats untouched.
    pub fn lookup(&mut self, language: &str, import_path: &str, from: FileId) -> Option<ModuleResolution> {
        let index = *self.by_language.get(language)?;
        let resolver = self.resolvers.get_mut(index)?;
        Some(resolver.lookup(import_path, from))
    }

    pub fn register_file(&mut self, file_id: FileId, path: &Path) {
        for resolver in &mut self.resolvers {
            resolver.register_file(file_id, path);
        }
    }

    pub fn unregister_file(&mut self, file_id: FileId) {
        for resolver in &mut self.resolvers {
            resolver.unregister_file(file_id);
        }
    }

    pub fn set_file_registry(&mut self, registry: &HashMap<PathBuf, FileId>) {
        for resolver in &mut self.resolvers {
            resolver.set_file_registry(registry);
        }
    }

    pub fn stats(&self) -> Vec<ResolverStats> {
        self.resolvers.iter().map(|r| r.stats()).collect()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolutionKind;
    use std::sync::Arc;

    fn id(n: u32) -> FileId {
        FileId::new(n).unwrap()
    }

    #[test]
    fn test_memory_filesystem_directories_are_implicit() {
        let fs = MemoryFileSystem::new()
            .with_file("/proj/pkg/a.go", "package pkg")
            .with_file("/proj/pkg/b.go", "package pkg")
            .with_file("/proj/pkg/sub/c.go", "package sub")
            .with_file("/proj/pkg/readme.md", "");

        assert!(fs.is_dir(Path::new("/proj/pkg")));
        assert!(fs.is_dir(Path::new("/proj")));
        assert!(!fs.is_dir(Path::new("/proj/pkg/a.go")));
        assert!(fs.is_file(Path::new("/proj/pkg/a.go")));
        assert!(fs.exists(Path::new("/proj/pkg/sub")));
        assert!(!fs.exists(Path::new("/proj/other")));

        let listed = fs.list_files_with_extension(Path::new("/proj/pkg"), "go");
        assert_eq!(
            listed,
            vec![PathBuf::from("/proj/pkg/a.go"), PathBuf::from("/proj/pkg/b.go")]
        );
        assert!(fs.read_to_string(Path::new("/nope")).is_err());

        assert_eq!(fs.list_dirs(Path::new("/proj/pkg")), vec![PathBuf::from("/proj/pkg/sub")]);
        assert_eq!(fs.list_dirs(Path::new("/proj")), vec![PathBuf::from("/proj/pkg")]);
        assert!(fs.list_dirs(Path::new("/proj/pkg/sub")).is_empty());
    }

    #[test]
    fn test_file_registry_reregister_moves_path() {
        let mut registry = FileRegistry::default();
        registry.register(id(1), Path::new("/p/a.py"));
        registry.register(id(1), Path::new("/p/b.py"));

        assert_eq!(registry.id_for(Path::new("/p/b.py")), Some(id(1)));
        assert_eq!(registry.id_for(Path::new("/p/a.py")), None);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.unregister(id(1)), Some(PathBuf::from("/p/b.py")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_dispatches_by_language() {
        let fs: Arc<dyn FileSystem> = Arc::new(
            MemoryFileSystem::new()
                .with_file("/proj/a.js", "")
                .with_file("/proj/b.js", ""),
        );
        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(JavaScriptResolver::new("/proj", fs.clone())));
        registry.register(Box::new(PythonResolver::new("/proj", fs)));

        registry.register_file(id(1), Path::new("/proj/a.js"));
        registry.register_file(id(2), Path::new("/proj/b.js"));

        let ts = registry.resolve("typescript", "./b", id(1)).unwrap();
        assert_eq!(ts.kind, ResolutionKind::File);
        assert_eq!(ts.target_file, Some(id(2)));

        assert!(registry.resolve("ruby", "x", id(1)).is_none());
        assert!(registry.has_language("python"));

        let stats = registry.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].resolutions, 1);
        assert_eq!(stats[0].by_kind.get("file"), Some(&1));
        assert_eq!(stats[0].registered_files, 2);

        // Lookups leave the counters alone
        let again = registry.lookup("javascript", "./b", id(1)).unwrap();
        assert_eq!(again.target_file, Some(id(2)));
        assert_eq!(registry.stats()[0].resolutions, 1);
        assert!(registry.lookup("ruby", "x", id(1)).is_none());
    }
}
