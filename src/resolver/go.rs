//! Go import resolution driven by `go.mod`.
//!
//! Go imports name package directories, not files. A resolved package
//! reports its first registered file as `target_file` and every registered
//! non-test file of the package in `package_files`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileRegistry, FileSystem, ModuleResolver, ResolutionCounter, ResolverStats};
use crate::paths::clean;
use crate::types::{FileId, ModuleResolution, ResolutionKind};

/// Top-level standard library package roots.
const STDLIB_ROOTS: &[&str] = &[
    "archive", "bufio", "builtin", "bytes", "cmp", "compress", "container", "context", "crypto",
    "database", "debug", "embed", "encoding", "errors", "expvar", "flag", "fmt", "go", "hash",
    "html", "image", "index", "io", "iter", "log", "maps", "math", "mime", "net", "os", "path",
    "plugin", "reflect", "regexp", "runtime", "slices", "sort", "strconv", "strings", "sync",
    "syscall", "testing", "text", "time", "unicode", "unique", "unsafe", "C",
];

pub const DEFAULT_CONFIG_FILES: &[&str] = &["go.mod"];

/// Information extracted from a go.mod file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoModInfo {
    /// Module path from the `module` directive (e.g. "github.com/acme/app")
    pub module_name: Option<String>,
    /// Version from the `go` directive
    pub go_version: Option<String>,
}

impl GoModInfo {
    pub fn parse(content: &str) -> Self {
        let mut info = Self::default();
        for line in content.lines() {
            let line = line.split("//").next().unwrap_or("").trim();
            if let Some(rest) = line.strip_prefix("module") {
                if rest.starts_with(char::is_whitespace) && info.module_name.is_none() {
                    let name = rest.trim().trim_matches('"');
                    if !name.is_empty() {
                        info.module_name = Some(name.to_string());
                    }
                }
            } else if let Some(rest) = line.strip_prefix("go ") {
                info.go_version = Some(rest.trim().to_string());
            }
        }
        info
    }
}

pub struct GoResolver {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: FileRegistry,
    stdlib: HashSet<&'static str>,
    go_mod: GoModInfo,
    /// Directory holding the go.mod in use; module paths are relative to it
    module_dir: PathBuf,
    config_files: Vec<String>,
    counter: ResolutionCounter,
}

impl GoResolver {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let defaults: Vec<String> = DEFAULT_CONFIG_FILES.iter().map(|f| f.to_string()).collect();
        Self::with_config_files(root, fs, &defaults)
    }

    /// Like [`GoResolver::new`], looking for module files named `config_files`.
    pub fn with_config_files(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        config_files: &[String],
    ) -> Self {
        let root = root.into();
        let mut resolver = Self {
            module_dir: root.clone(),
            root,
            fs,
            registry: FileRegistry::default(),
            stdlib: STDLIB_ROOTS.iter().copied().collect(),
            go_mod: GoModInfo::default(),
            config_files: config_files.to_vec(),
            counter: ResolutionCounter::default(),
        };
        resolver.load_go_mod();
        resolver
    }

    pub fn module_name(&self) -> Option<&str> {
        self.go_mod.module_name.as_deref()
    }

    pub fn go_mod(&self) -> &GoModInfo {
        &self.go_mod
    }

    /// Nearest go.mod at or above the project root.
    fn load_go_mod(&mut self) {
        let found = self.root.ancestors().find_map(|dir| {
            self.config_files
                .iter()
                .map(|name| dir.join(name))
                .find(|candidate| self.fs.is_file(candidate))
                .map(|candidate| (dir.to_path_buf(), candidate))
        });
        let Some((dir, path)) = found else {
            tracing::debug!("[go] no go.mod at or above {}", self.root.display());
            return;
        };

        match self.fs.read_to_string(&path) {
            Ok(content) => {
                let info = GoModInfo::parse(&content);
                if info.module_name.is_none() {
                    tracing::warn!(
                        "[go] {} has no module directive, module imports stay external",
                        path.display()
                    );
                }
                self.go_mod = info;
                self.module_dir = dir;
            }
            Err(e) => {
                tracing::warn!("[go] failed to read {}: {e}", path.display());
            }
        }
    }

    fn is_stdlib(&self, import_path: &str) -> bool {
        let first = import_path.split('/').next().unwrap_or(import_path);
        !first.contains('.') && self.stdlib.contains(first)
    }

    /// Non-test Go files of the package in `dir`: registered ones first,
    /// falling back to what the filesystem lists.
    fn package_files(&self, dir: &Path) -> (Vec<FileId>, bool) {
        let registered: Vec<FileId> = self
            .registry
            .files_in_dir(dir)
            .into_iter()
            .filter(|(path, _)| is_package_source(path))
            .map(|(_, id)| id)
            .collect();
        if !registered.is_empty() {
            return (registered, true);
        }
        let on_disk = self.fs.is_dir(dir)
            && self
                .fs
                .list_files_with_extension(dir, "go")
                .iter()
                .any(|p| is_package_source(p));
        (Vec::new(), on_disk)
    }

    fn resolve_relative(&self, import_path: &str, from: FileId) -> ModuleResolution {
        let Some(from_path) = self.registry.path_for(from) else {
            return ModuleResolution::not_found(import_path, "importing file is not registered");
        };
        let from_dir = from_path.parent().unwrap_or(Path::new(""));
        let target = clean(&from_dir.join(import_path));

        match self.package_files(&target) {
            (files, _) if !files.is_empty() => {
                return ModuleResolution::internal(
                    import_path,
                    ResolutionKind::Directory,
                    target,
                    files.first().copied(),
                )
                .with_package_files(files);
            }
            (_, true) => return ModuleResolution::external(import_path, Some(target)),
            _ => {}
        }

        let mut file = target.into_os_string();
        file.push(".go");
        let file = PathBuf::from(file);
        if let Some(id) = self.registry.id_for(&file) {
            return ModuleResolution::internal(import_path, ResolutionKind::File, file, Some(id));
        }
        if self.fs.is_file(&file) {
            return ModuleResolution::external(import_path, Some(file));
        }
        ModuleResolution::not_found(import_path, "no package directory or .go file")
    }

    fn resolve_module(&self, import_path: &str, relative: &str) -> ModuleResolution {
        let target = clean(&self.module_dir.join(relative.trim_start_matches('/')));
        match self.package_files(&target) {
            (files, _) if !files.is_empty() => ModuleResolution::internal(
                import_path,
                ResolutionKind::Module,
                target,
                files.first().copied(),
            )
            .with_package_files(files),
            // Present on disk but never registered with the engine
            (_, true) => {
                ModuleResolution::internal(import_path, ResolutionKind::Directory, target, None)
            }
            _ => ModuleResolution::not_found(import_path, "package directory not found in module"),
        }
    }

    fn resolve_vendor(&self, import_path: &str) -> Option<ModuleResolution> {
        let vendor = clean(&self.root.join("vendor").join(import_path));
        match self.package_files(&vendor) {
            (files, _) if !files.is_empty() => Some(
                ModuleResolution::internal(
                    import_path,
                    ResolutionKind::Module,
                    vendor,
                    files.first().copied(),
                )
                .with_package_files(files),
            ),
            (_, true) => Some(ModuleResolution::external(import_path, Some(vendor))),
            _ => None,
        }
    }

    fn resolve(&self, import_path: &str, from: FileId) -> ModuleResolution {
        if self.is_stdlib(import_path) {
            return ModuleResolution::builtin(import_path);
        }

        if import_path.starts_with("./") || import_path.starts_with("../") {
            return self.resolve_relative(import_path, from);
        }

        if let Some(module) = self.go_mod.module_name.as_deref() {
            if let Some(rest) = import_path.strip_prefix(module) {
                if rest.is_empty() || rest.starts_with('/') {
                    return self.resolve_module(import_path, rest);
                }
            }
        }

        if let Some(vendored) = self.resolve_vendor(import_path) {
            return vendored;
        }

        ModuleResolution::external(import_path, None)
    }
}

fn is_package_source(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".go") && !name.ends_with("_test.go")
}

impl ModuleResolver for GoResolver {
    fn name(&self) -> &'static str {
        "go"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn lookup(&mut self, import_path: &str, from: FileId) -> ModuleResolution {
        self.resolve(import_path, from)
    }

    fn counter_mut(&mut self) -> &mut ResolutionCounter {
        &mut self.counter
    }

    fn register_file(&mut self, file_id: FileId, path: &Path) {
        self.registry.register(file_id, path);
    }

    fn unregister_file(&mut self, file_id: FileId) {
        self.registry.unregister(file_id);
    }

    fn set_file_registry(&mut self, registry: &HashMap<PathBuf, FileId>) {
        self.registry.replace(registry);
    }

    fn stats(&self) -> ResolverStats {
        self.counter
            .stats(self.name(), self.languages(), self.registry.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryFileSystem;

    fn id(n: u32) -> FileId {
        FileId::new(n).unwrap()
    }

    fn project() -> GoResolver {
        let fs = MemoryFileSystem::new()
            .with_file("/proj/go.mod", "module example.com/app // main module\n\ngo 1.22\n")
            .with_file("/proj/main.go", "package main")
            .with_file("/proj/util/util.go", "package util")
            .with_file("/proj/util/helper.go", "package util")
            .with_file("/proj/util/util_test.go", "package util")
            .with_file("/proj/cmd/tool.go", "package cmd")
            .with_file("/proj/unregistered/x.go", "package unregistered")
            .with_file("/proj/vendor/github.com/acme/lib/lib.go", "package lib")
            .with_file("/proj/vendor/github.com/acme/raw/raw.go", "package raw");

        let mut resolver = GoResolver::new("/proj", Arc::new(fs));
        resolver.register_file(id(1), Path::new("/proj/main.go"));
        resolver.register_file(id(2), Path::new("/proj/util/helper.go"));
        resolver.register_file(id(3), Path::new("/proj/util/util.go"));
        resolver.register_file(id(4), Path::new("/proj/util/util_test.go"));
        resolver.register_file(id(5), Path::new("/proj/vendor/github.com/acme/lib/lib.go"));
        resolver.register_file(id(6), Path::new("/proj/cmd/tool.go"));
        resolver
    }

    #[test]
    fn test_parse_go_mod() {
        let info = GoModInfo::parse("// header\nmodule \"github.com/x/y\"\n\ngo 1.21\nrequire foo v1\n");
        assert_eq!(info.module_name.as_deref(), Some("github.com/x/y"));
        assert_eq!(info.go_version.as_deref(), Some("1.21"));

        assert_eq!(GoModInfo::parse("modulefoo\n").module_name, None);
    }

    #[test]
    fn test_stdlib_is_builtin() {
        let mut resolver = project();
        for path in ["fmt", "net/http", "encoding/json", "C"] {
            let r = resolver.resolve_import(path, id(1));
            assert_eq!(r.kind, ResolutionKind::Builtin, "{path}");
            assert!(r.is_builtin);
        }
        // A dotted first segment is never stdlib
        let r = resolver.resolve_import("fmt.example.com/x", id(1));
        assert_eq!(r.kind, ResolutionKind::External);
    }

    #[test]
    fn test_module_import_resolves_package_directory() {
        let mut resolver = project();
        assert_eq!(resolver.module_name(), Some("example.com/app"));

        let r = resolver.resolve_import("example.com/app/util", id(1));
        assert_eq!(r.kind, ResolutionKind::Module);
        assert_eq!(r.resolved_path, Some(PathBuf::from("/proj/util")));
        assert_eq!(r.target_file, Some(id(2)));
        // Test files are not part of the package
        assert_eq!(r.package_files, vec![id(2), id(3)]);
        assert_eq!(r.dependency_targets(), vec![id(2), id(3)]);

        let unregistered = resolver.resolve_import("example.com/app/unregistered", id(1));
        assert_eq!(unregistered.kind, ResolutionKind::Directory);
        assert_eq!(unregistered.target_file, None);

        let missing = resolver.resolve_import("example.com/app/missing", id(1));
        assert_eq!(missing.kind, ResolutionKind::NotFound);

        // Prefix must end at a path boundary
        let other = resolver.resolve_import("example.com/application", id(1));
        assert_eq!(other.kind, ResolutionKind::External);
    }

    #[test]
    fn test_relative_imports() {
        let mut resolver = project();

        let dir = resolver.resolve_import("./util", id(1));
        assert_eq!(dir.kind, ResolutionKind::Directory);
        assert_eq!(dir.target_file, Some(id(2)));

        let file = resolver.resolve_import("../main", id(6));
        assert_eq!(file.kind, ResolutionKind::File);
        assert_eq!(file.target_file, Some(id(1)));

        let missing = resolver.resolve_import("./nope", id(1));
        assert_eq!(missing.kind, ResolutionKind::NotFound);

        let unknown_from = resolver.resolve_import("./util", id(99));
        assert_eq!(unknown_from.kind, ResolutionKind::NotFound);
    }

    #[test]
    fn test_vendor_and_external() {
        let mut resolver = project();

        let vendored = resolver.resolve_import("github.com/acme/lib", id(1));
        assert_eq!(vendored.kind, ResolutionKind::Module);
        assert_eq!(vendored.target_file, Some(id(5)));

        let raw = resolver.resolve_import("github.com/acme/raw", id(1));
        assert_eq!(raw.kind, ResolutionKind::External);
        assert!(raw.is_external);

        let external = resolver.resolve_import("github.com/other/pkg", id(1));
        assert_eq!(external.kind, ResolutionKind::External);
        assert!(external.dependency_targets().is_empty());
    }

    #[test]
    fn test_missing_module_directive_disables_prefix() {
        let fs = MemoryFileSystem::new()
            .with_file("/proj/go.mod", "go 1.22\n")
            .with_file("/proj/util/util.go", "package util");
        let mut resolver = GoResolver::new("/proj", Arc::new(fs));
        resolver.register_file(id(1), Path::new("/proj/util/util.go"));

        assert_eq!(resolver.module_name(), None);
        let r = resolver.resolve_import("example.com/app/util", id(1));
        assert_eq!(r.kind, ResolutionKind::External);
    }

    #[test]
    fn test_unregister_drops_target() {
        let mut resolver = project();
        resolver.unregister_file(id(2));
        resolver.unregister_file(id(3));

        // Only the test file remains registered, which is not a package source
        let r = resolver.resolve_import("./util", id(1));
        assert_eq!(r.kind, ResolutionKind::External);
        assert_eq!(resolver.stats().registered_files, 4);
    }
}
