//! JavaScript/TypeScript import resolution.
//!
//! Follows the Node lookup shape: relative and root-absolute specifiers try a
//! fixed extension list, directories go through `package.json` and `index.*`,
//! bare specifiers go to the nearest `node_modules`. `compilerOptions.paths`
//! aliases from `tsconfig.json`/`jsconfig.json` are tried before packages.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileRegistry, FileSystem, ModuleResolver, ResolutionCounter, ResolverStats};
use crate::paths::clean;
use crate::types::{FileId, ModuleResolution, ResolutionKind};

const EXTENSIONS: &[&str] = &["", ".js", ".ts", ".jsx", ".tsx", ".mjs", ".cjs", ".json", ".d.ts"];

const INDEX_FILES: &[&str] = &[
    "index.js", "index.ts", "index.jsx", "index.tsx", "index.mjs", "index.cjs", "index.json",
    "index.d.ts",
];

const NODE_BUILTINS: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "fs/promises",
    "http", "http2", "https", "inspector", "module", "net", "os", "path", "perf_hooks",
    "process", "punycode", "querystring", "readline", "repl", "stream", "string_decoder",
    "test", "timers", "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

pub const DEFAULT_CONFIG_FILES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// The `package.json` fields that pick an entry point
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub main: Option<String>,
    pub module: Option<String>,
    pub types: Option<String>,
    pub typings: Option<String>,
    pub exports: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub package_type: Option<String>,
}

impl PackageJson {
    /// Entry point relative to the package directory.
    pub fn entry(&self) -> Option<&str> {
        if let Some(entry) = self.exports.as_ref().and_then(exports_entry) {
            return Some(entry);
        }
        if let Some(types) = self.types.as_deref().or(self.typings.as_deref()) {
            return Some(types);
        }
        if self.package_type.as_deref() == Some("module") {
            if let Some(module) = self.module.as_deref() {
                return Some(module);
            }
        }
        self.main.as_deref()
    }
}

/// `"exports": "./x.js"`, `{".": "./x.js"}` or `{".": {"import": "./x.mjs"}}`
fn exports_entry(exports: &serde_json::Value) -> Option<&str> {
    match exports {
        serde_json::Value::String(entry) => Some(entry),
        serde_json::Value::Object(map) => {
            let root = map.get(".")?;
            match root {
                serde_json::Value::String(entry) => Some(entry),
                serde_json::Value::Object(conditions) => ["import", "require", "types", "default"]
                    .iter()
                    .find_map(|key| conditions.get(*key).and_then(|v| v.as_str())),
                _ => None,
            }
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerOptions {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub paths: HashMap<String, Vec<String>>,
}

/// Subset of tsconfig.json / jsconfig.json used for path aliases
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TsConfig {
    #[serde(rename = "compilerOptions", default)]
    pub compiler_options: CompilerOptions,
}

/// One `paths` entry, e.g. `"@app/*": ["src/app/*"]`.
#[derive(Debug, Clone)]
struct PathAlias {
    prefix: String,
    wildcard: bool,
    targets: Vec<String>,
}

impl PathAlias {
    fn new(pattern: &str, targets: Vec<String>) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self {
                prefix: prefix.to_string(),
                wildcard: true,
                targets,
            },
            None => Self {
                prefix: pattern.to_string(),
                wildcard: false,
                targets,
            },
        }
    }

    /// Candidate paths (relative to the base url) for `specifier`.
    fn expand(&self, specifier: &str) -> Option<Vec<String>> {
        let captured = if self.wildcard {
            specifier.strip_prefix(self.prefix.as_str())?
        } else if specifier == self.prefix {
            ""
        } else {
            return None;
        };
        Some(
            self.targets
                .iter()
                .map(|t| t.replacen('*', captured, 1))
                .collect(),
        )
    }
}

pub struct JavaScriptResolver {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: FileRegistry,
    base_url: PathBuf,
    /// Longest prefix first
    aliases: Vec<PathAlias>,
    package_cache: HashMap<PathBuf, Option<PackageJson>>,
    counter: ResolutionCounter,
}

impl JavaScriptResolver {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let defaults: Vec<String> = DEFAULT_CONFIG_FILES.iter().map(|f| f.to_string()).collect();
        Self::with_config_files(root, fs, &defaults)
    }

    /// Like [`JavaScriptResolver::new`]; the first of `config_files` that
    /// parses supplies the path aliases.
    pub fn with_config_files(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        config_files: &[String],
    ) -> Self {
        let root = root.into();
        let mut resolver = Self {
            base_url: root.clone(),
            root,
            fs,
            registry: FileRegistry::default(),
            aliases: Vec::new(),
            package_cache: HashMap::new(),
            counter: ResolutionCounter::default(),
        };
        resolver.load_path_aliases(config_files);
        resolver
    }

    fn load_path_aliases(&mut self, config_files: &[String]) {
        for name in config_files {
            let path = self.root.join(name);
            if !self.fs.is_file(&path) {
                continue;
            }
            let content = match self.fs.read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("[javascript] failed to read {}: {e}", path.display());
                    continue;
                }
            };
            // JSONC: comments and trailing commas are allowed
            let config: TsConfig = match serde_json5::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("[javascript] ignoring malformed {}: {e}", path.display());
                    continue;
                }
            };

            let options = config.compiler_options;
            if let Some(base) = options.base_url {
                self.base_url = clean(&self.root.join(base));
            }
            self.aliases = options
                .paths
                .into_iter()
                .map(|(pattern, targets)| PathAlias::new(&pattern, targets))
                .collect();
            self.aliases.sort_by(|a, b| {
                b.prefix
                    .len()
                    .cmp(&a.prefix.len())
                    .then_with(|| a.prefix.cmp(&b.prefix))
            });
            tracing::debug!(
                "[javascript] loaded {} path aliases from {}",
                self.aliases.len(),
                path.display()
            );
            return;
        }
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.registry.id_for(path).is_some() || self.fs.is_file(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.registry.has_files_under(path) || self.fs.is_dir(path)
    }

    fn is_within_project(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    fn hit(&self, import_path: &str, kind: ResolutionKind, path: PathBuf) -> ModuleResolution {
        let target = self.registry.id_for(&path);
        if target.is_none() && !self.is_within_project(&path) {
            return ModuleResolution::external(import_path, Some(path));
        }
        ModuleResolution::internal(import_path, kind, path, target)
    }

    fn try_file(&self, import_path: &str, base: &Path) -> Option<ModuleResolution> {
        EXTENSIONS.iter().find_map(|ext| {
            let mut candidate = base.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if self.registry.id_for(&candidate).is_some() || self.fs.is_file(&candidate) {
                Some(self.hit(import_path, ResolutionKind::File, candidate))
            } else {
                None
            }
        })
    }

    fn package_json(&mut self, dir: &Path) -> Option<PackageJson> {
        if let Some(cached) = self.package_cache.get(dir) {
            return cached.clone();
        }
        let path = dir.join("package.json");
        let parsed = if self.fs.is_file(&path) {
            match self.fs.read_to_string(&path).map(|c| serde_json::from_str::<PackageJson>(&c)) {
                Ok(Ok(pkg)) => Some(pkg),
                Ok(Err(e)) => {
                    tracing::warn!("[javascript] ignoring malformed {}: {e}", path.display());
                    None
                }
                Err(e) => {
                    tracing::warn!("[javascript] failed to read {}: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };
        self.package_cache.insert(dir.to_path_buf(), parsed.clone());
        parsed
    }

    fn try_directory(&mut self, import_path: &str, dir: &Path) -> Option<ModuleResolution> {
        if !self.dir_exists(dir) {
            return None;
        }

        if let Some(entry) = self.package_json(dir).as_ref().and_then(PackageJson::entry) {
            let entry_path = clean(&dir.join(entry));
            if self.file_exists(&entry_path) {
                return Some(self.hit(import_path, ResolutionKind::Directory, entry_path));
            }
        }

        INDEX_FILES.iter().find_map(|index| {
            let candidate = dir.join(index);
            self.file_exists(&candidate)
                .then(|| self.hit(import_path, ResolutionKind::Directory, candidate))
        })
    }

    fn resolve_path(&mut self, import_path: &str, target: &Path) -> Option<ModuleResolution> {
        self.try_file(import_path, target)
            .or_else(|| self.try_directory(import_path, target))
    }

    fn resolve_alias(&mut self, import_path: &str) -> Option<ModuleResolution> {
        let candidates: Vec<String> = self
            .aliases
            .iter()
            .filter_map(|alias| alias.expand(import_path))
            .flatten()
            .collect();
        candidates.iter().find_map(|candidate| {
            let target = clean(&self.base_url.join(candidate));
            self.resolve_path(import_path, &target)
        })
    }

    fn find_node_modules(&self, from_dir: &Path) -> Option<PathBuf> {
        from_dir
            .ancestors()
            .map(|dir| dir.join("node_modules"))
            .find(|candidate| self.fs.is_dir(candidate))
    }

    fn resolve_package(&mut self, import_path: &str, from_dir: &Path) -> ModuleResolution {
        let Some(node_modules) = self.find_node_modules(from_dir) else {
            return ModuleResolution::external(import_path, None);
        };

        let mut segments = import_path.splitn(3, '/');
        let (name, subpath) = match (segments.next(), segments.next(), segments.next()) {
            (Some(scope), Some(pkg), rest) if scope.starts_with('@') => {
                (format!("{scope}/{pkg}"), rest.map(str::to_string))
            }
            (Some(pkg), second, third) => {
                let sub = match (second, third) {
                    (Some(a), Some(b)) => Some(format!("{a}/{b}")),
                    (Some(a), None) => Some(a.to_string()),
                    _ => None,
                };
                (pkg.to_string(), sub)
            }
            _ => return ModuleResolution::external(import_path, None),
        };

        let package_dir = node_modules.join(&name);
        if !self.fs.is_dir(&package_dir) {
            return ModuleResolution::external(import_path, None);
        }

        let resolved = match subpath {
            Some(sub) => self.resolve_path(import_path, &package_dir.join(sub)),
            None => self.try_directory(import_path, &package_dir),
        };
        let resolved_path = resolved
            .and_then(|r| r.resolved_path)
            .unwrap_or(package_dir);

        // Installed packages never become dependency edges
        ModuleResolution {
            kind: ResolutionKind::Module,
            target_file: self.registry.id_for(&resolved_path),
            ..ModuleResolution::external(import_path, Some(resolved_path))
        }
    }

    fn resolve(&mut self, import_path: &str, from: FileId) -> ModuleResolution {
        let Some(from_dir) = self
            .registry
            .path_for(from)
            .and_then(Path::parent)
            .map(Path::to_path_buf)
        else {
            return ModuleResolution::not_found(import_path, "importing file is not registered");
        };

        if is_relative(import_path) {
            let target = clean(&from_dir.join(import_path));
            return self
                .resolve_path(import_path, &target)
                .unwrap_or_else(|| ModuleResolution::not_found(import_path, "no matching file or directory"));
        }

        if let Some(rooted) = import_path.strip_prefix('/') {
            let target = clean(&self.root.join(rooted));
            return self
                .resolve_path(import_path, &target)
                .unwrap_or_else(|| ModuleResolution::not_found(import_path, "no matching file under project root"));
        }

        if is_node_builtin(import_path) {
            return ModuleResolution::builtin(import_path);
        }

        if let Some(aliased) = self.resolve_alias(import_path) {
            return aliased;
        }

        self.resolve_package(import_path, &from_dir)
    }
}

fn is_relative(import_path: &str) -> bool {
    import_path == "."
        || import_path == ".."
        || import_path.starts_with("./")
        || import_path.starts_with("../")
}

fn is_node_builtin(import_path: &str) -> bool {
    let name = import_path.strip_prefix("node:").unwrap_or(import_path);
    NODE_BUILTINS.contains(&name)
}

impl ModuleResolver for JavaScriptResolver {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["javascript", "typescript"]
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

    fn project(tsconfig: &str) -> JavaScriptResolver {
        let fs = MemoryFileSystem::new()
            .with_file("/proj/src/app.ts", "")
            .with_file("/proj/src/util.ts", "")
            .with_file("/proj/src/types.d.ts", "")
            .with_file("/proj/src/components/index.tsx", "")
            .with_file("/proj/src/lib/package.json", r#"{"main": "./main.js"}"#)
            .with_file("/proj/src/lib/main.js", "")
            .with_file("/proj/src/broken/package.json", "{ not json")
            .with_file("/proj/src/broken/index.js", "")
            .with_file("/proj/src/config.json", "{}")
            .with_file("/proj/node_modules/lodash/package.json", r#"{"main": "lodash.js"}"#)
            .with_file("/proj/node_modules/lodash/lodash.js", "")
            .with_file("/proj/node_modules/lodash/fp.js", "")
            .with_file(
                "/proj/node_modules/@scope/pkg/package.json",
                r#"{"exports": {".": {"import": "./esm/index.mjs"}}}"#,
            )
            .with_file("/proj/node_modules/@scope/pkg/esm/index.mjs", "")
            .with_file("/proj/tsconfig.json", tsconfig);

        let mut resolver = JavaScriptResolver::new("/proj", Arc::new(fs));
        let files = [
            "/proj/src/app.ts",
            "/proj/src/util.ts",
            "/proj/src/components/index.tsx",
            "/proj/src/lib/main.js",
            "/proj/src/types.d.ts",
        ];
        for (i, path) in files.iter().enumerate() {
            resolver.register_file(id(i as u32 + 1), Path::new(path));
        }
        resolver
    }

    #[test]
    fn test_relative_file_and_directory() {
        let mut resolver = project("{}");

        let util = resolver.resolve_import("./util", id(1));
        assert_eq!(util.kind, ResolutionKind::File);
        assert_eq!(util.target_file, Some(id(2)));
        assert!(!util.is_external);

        let components = resolver.resolve_import("./components", id(1));
        assert_eq!(components.kind, ResolutionKind::Directory);
        assert_eq!(components.target_file, Some(id(3)));

        let lib = resolver.resolve_import("./lib", id(1));
        assert_eq!(lib.kind, ResolutionKind::Directory);
        assert_eq!(lib.target_file, Some(id(4)));

        let types = resolver.resolve_import("./types", id(1));
        assert_eq!(types.target_file, Some(id(5)));

        // Malformed package.json falls back to index files
        let broken = resolver.resolve_import("./broken", id(1));
        assert_eq!(broken.kind, ResolutionKind::Directory);
        assert_eq!(broken.resolved_path, Some(PathBuf::from("/proj/src/broken/index.js")));
        assert_eq!(broken.target_file, None);

        let json = resolver.resolve_import("./config.json", id(1));
        assert_eq!(json.kind, ResolutionKind::File);

        let missing = resolver.resolve_import("./missing", id(1));
        assert_eq!(missing.kind, ResolutionKind::NotFound);
    }

    #[test]
    fn test_root_absolute_import() {
        let mut resolver = project("{}");
        let r = resolver.resolve_import("/src/util", id(3));
        assert_eq!(r.target_file, Some(id(2)));
    }

    #[test]
    fn test_node_builtins() {
        let mut resolver = project("{}");
        for path in ["fs", "node:fs", "path", "node:worker_threads", "fs/promises"] {
            let r = resolver.resolve_import(path, id(1));
            assert_eq!(r.kind, ResolutionKind::Builtin, "{path}");
            assert!(r.is_external);
        }
    }

    #[test]
    fn test_packages_are_external_modules() {
        let mut resolver = project("{}");

        let lodash = resolver.resolve_import("lodash", id(1));
        assert_eq!(lodash.kind, ResolutionKind::Module);
        assert!(lodash.is_external);
        assert_eq!(
            lodash.resolved_path,
            Some(PathBuf::from("/proj/node_modules/lodash/lodash.js"))
        );
        assert!(lodash.dependency_targets().is_empty());

        let fp = resolver.resolve_import("lodash/fp", id(1));
        assert_eq!(
            fp.resolved_path,
            Some(PathBuf::from("/proj/node_modules/lodash/fp.js"))
        );

        let scoped = resolver.resolve_import("@scope/pkg", id(1));
        assert_eq!(
            scoped.resolved_path,
            Some(PathBuf::from("/proj/node_modules/@scope/pkg/esm/index.mjs"))
        );

        let absent = resolver.resolve_import("react", id(1));
        assert_eq!(absent.kind, ResolutionKind::External);
    }

    #[test]
    fn test_tsconfig_path_aliases() {
        let mut resolver = project(
            r#"{
                // comments are fine
                "compilerOptions": {
                    "baseUrl": ".",
                    "paths": {
                        "@/*": ["src/*"],
                        "@components": ["src/components"],
                    },
                },
            }"#,
        );

        let util = resolver.resolve_import("@/util", id(1));
        assert_eq!(util.target_file, Some(id(2)));

        let components = resolver.resolve_import("@components", id(2));
        assert_eq!(components.target_file, Some(id(3)));

        // Unmatched alias targets fall through to packages
        let scoped = resolver.resolve_import("@scope/pkg", id(1));
        assert_eq!(scoped.kind, ResolutionKind::Module);
    }

    #[test]
    fn test_malformed_tsconfig_is_ignored() {
        let mut resolver = project("{ compilerOptions: ");
        let r = resolver.resolve_import("@/util", id(1));
        assert_eq!(r.kind, ResolutionKind::External);
    }

    #[test]
    fn test_alias_expansion() {
        let alias = PathAlias::new("@app/*", vec!["src/app/*".into(), "lib/*".into()]);
        assert_eq!(
            alias.expand("@app/x/y"),
            Some(vec!["src/app/x/y".to_string(), "lib/x/y".to_string()])
        );
        assert_eq!(alias.expand("other"), None);

        let exact = PathAlias::new("config", vec!["src/config".into()]);
        assert_eq!(exact.expand("config"), Some(vec!["src/config".to_string()]));
        assert_eq!(exact.expand("config/x"), None);
    }

    #[test]
    fn test_package_entry_precedence() {
        let pkg: PackageJson =
            serde_json::from_str(r#"{"main": "a.js", "module": "b.mjs", "type": "module"}"#).unwrap();
        assert_eq!(pkg.entry(), Some("b.mjs"));

        let pkg: PackageJson =
            serde_json::from_str(r#"{"main": "a.js", "types": "a.d.ts"}"#).unwrap();
        assert_eq!(pkg.entry(), Some("a.d.ts"));

        let pkg: PackageJson = serde_json::from_str(r#"{"exports": "./x.js", "main": "a.js"}"#).unwrap();
        assert_eq!(pkg.entry(), Some("./x.js"));
    }
}
