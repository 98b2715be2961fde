//! Python import resolution.
//!
//! Modules are looked up on a search path made of the project root and the
//! conventional `src`, `lib` and `modules` directories. Third-party names come
//! from `requirements.txt`, `pyproject.toml`, `setup.py` and a list of
//! well-known packages. A virtual environment (`$VIRTUAL_ENV`, or `.venv`,
//! `venv`, `env` under the root) contributes its `site-packages` directories,
//! and whatever is installed there resolves as external.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileRegistry, FileSystem, ModuleResolver, ResolutionCounter, ResolverStats};
use crate::types::{FileId, ModuleResolution, ResolutionKind};

const BUILTIN_MODULES: &[&str] = &[
    "builtins", "sys", "os", "math", "random", "time", "datetime", "itertools", "functools",
    "collections", "operator", "copy", "pickle", "struct", "array", "weakref", "types", "gc",
];

const STDLIB_MODULES: &[&str] = &[
    "abc", "argparse", "ast", "asyncio", "base64", "bisect", "calendar", "cmath", "codecs",
    "concurrent", "configparser", "contextlib", "contextvars", "csv", "ctypes", "dataclasses",
    "decimal", "difflib", "dis", "email", "enum", "errno", "fnmatch", "fractions", "getpass",
    "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "importlib", "inspect", "io",
    "ipaddress", "json", "locale", "logging", "lzma", "mimetypes", "multiprocessing", "numbers",
    "pathlib", "platform", "pprint", "queue", "re", "secrets", "select", "shelve", "shlex",
    "shutil", "signal", "socket", "sqlite3", "ssl", "statistics", "string", "subprocess",
    "tarfile", "tempfile", "textwrap", "threading", "timeit", "tkinter", "tomllib", "traceback",
    "typing", "unittest", "urllib", "uuid", "warnings", "xml", "zipfile", "zlib", "zoneinfo",
];

const KNOWN_THIRD_PARTY: &[&str] = &[
    "numpy", "pandas", "matplotlib", "scipy", "sklearn", "requests", "flask", "django",
    "fastapi", "aiohttp", "pytest", "click", "pydantic", "sqlalchemy", "alembic", "celery",
    "redis", "boto3", "paramiko", "fabric", "pillow", "opencv", "tensorflow", "torch", "keras",
];

const EXTRA_SEARCH_DIRS: &[&str] = &["src", "lib", "modules"];

const VIRTUAL_ENV_DIRS: &[&str] = &[".venv", "venv", "env", "virtualenv"];

pub const DEFAULT_CONFIG_FILES: &[&str] = &["requirements.txt", "pyproject.toml", "setup.py"];

pub struct PythonResolver {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: FileRegistry,
    search_paths: Vec<PathBuf>,
    stdlib: HashSet<&'static str>,
    /// Normalized names of declared dependencies
    declared: BTreeSet<String>,
    site_packages: Vec<PathBuf>,
    /// Top-level modules found in `site_packages`
    installed: BTreeSet<String>,
    counter: ResolutionCounter,
}

impl PythonResolver {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let defaults: Vec<String> = DEFAULT_CONFIG_FILES.iter().map(|f| f.to_string()).collect();
        Self::with_config_files(root, fs, &defaults)
    }

    /// Like [`PythonResolver::new`], reading dependencies from `config_files`
    /// under the root. `.toml` files are read as pyproject, `setup.py` for its
    /// `install_requires`, anything else as a requirements list.
    pub fn with_config_files(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        config_files: &[String],
    ) -> Self {
        let root = root.into();
        let mut search_paths = vec![root.clone()];
        search_paths.extend(
            EXTRA_SEARCH_DIRS
                .iter()
                .map(|dir| root.join(dir))
                .filter(|dir| fs.is_dir(dir)),
        );

        let mut resolver = Self {
            root,
            fs,
            registry: FileRegistry::default(),
            search_paths,
            stdlib: BUILTIN_MODULES
                .iter()
                .chain(STDLIB_MODULES)
                .copied()
                .collect(),
            declared: BTreeSet::new(),
            site_packages: Vec::new(),
            installed: BTreeSet::new(),
            counter: ResolutionCounter::default(),
        };
        for name in config_files {
            let path = resolver.root.join(name);
            if !resolver.fs.is_file(&path) {
                continue;
            }
            if name.ends_with(".toml") {
                resolver.load_pyproject(&path);
            } else if name.ends_with("setup.py") {
                resolver.load_setup_py(&path);
            } else {
                resolver.load_requirements(&path);
            }
        }

        let venv = std::env::var_os("VIRTUAL_ENV")
            .map(PathBuf::from)
            .filter(|path| resolver.fs.is_dir(path))
            .or_else(|| resolver.find_virtual_env());
        if let Some(venv) = venv {
            resolver.add_virtual_env(&venv);
        }
        resolver
    }

    /// Also search the `site-packages` of the virtual environment at `venv`.
    pub fn with_virtual_env(mut self, venv: impl AsRef<Path>) -> Self {
        self.add_virtual_env(venv.as_ref());
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn site_packages(&self) -> &[PathBuf] {
        &self.site_packages
    }

    pub fn declared_packages(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    pub fn installed_packages(&self) -> impl Iterator<Item = &str> {
        self.installed.iter().map(String::as_str)
    }

    fn find_virtual_env(&self) -> Option<PathBuf> {
        VIRTUAL_ENV_DIRS
            .iter()
            .map(|dir| self.root.join(dir))
            .find(|dir| self.fs.is_dir(dir))
    }

    /// `lib/python3.X/site-packages` on Unix, `Lib/site-packages` on Windows.
    fn add_virtual_env(&mut self, venv: &Path) {
        let mut candidates: Vec<PathBuf> = self
            .fs
            .list_dirs(&venv.join("lib"))
            .into_iter()
            .filter(|dir| {
                dir.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("python"))
            })
            .map(|dir| dir.join("site-packages"))
            .collect();
        candidates.push(venv.join("Lib").join("site-packages"));

        for dir in candidates {
            if self.fs.is_dir(&dir) && !self.site_packages.contains(&dir) {
                self.scan_site_packages(&dir);
                self.site_packages.push(dir);
            }
        }
        tracing::debug!(
            "[python] virtual environment {}: {} site-packages, {} installed",
            venv.display(),
            self.site_packages.len(),
            self.installed.len()
        );
    }

    fn scan_site_packages(&mut self, dir: &Path) {
        for package in self.fs.list_dirs(dir) {
            let Some(name) = package.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if name.starts_with('_')
                || name.starts_with('.')
                || name.ends_with(".dist-info")
                || name.ends_with(".egg-info")
            {
                continue;
            }
            self.installed.insert(normalize_package(name));
        }
        for module in self.fs.list_files_with_extension(dir, "py") {
            if let Some(stem) = module.file_stem().and_then(|stem| stem.to_str()) {
                self.installed.insert(normalize_package(stem));
            }
        }
    }

    fn load_requirements(&mut self, path: &Path) {
        match self.fs.read_to_string(path) {
            Ok(content) => {
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                        continue;
                    }
                    if let Some(name) = requirement_name(line) {
                        self.declared.insert(name);
                    }
                }
            }
            Err(e) => tracing::warn!("[python] failed to read {}: {e}", path.display()),
        }
    }

    fn load_pyproject(&mut self, path: &Path) {
        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[python] failed to read {}: {e}", path.display());
                return;
            }
        };
        let doc: toml::Table = match toml::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("[python] ignoring malformed {}: {e}", path.display());
                return;
            }
        };

        // PEP 621: [project] dependencies = ["requests>=2"]
        let pep621 = doc
            .get("project")
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_array());
        for dep in pep621.into_iter().flatten() {
            if let Some(name) = dep.as_str().and_then(requirement_name) {
                self.declared.insert(name);
            }
        }

        // Poetry: [tool.poetry.dependencies] requests = "^2"
        let poetry = doc
            .get("tool")
            .and_then(|t| t.get("poetry"))
            .and_then(|p| p.get("dependencies"))
            .and_then(|d| d.as_table());
        for name in poetry.into_iter().flat_map(|t| t.keys()) {
            if name != "python" {
                self.declared.insert(normalize_package(name));
            }
        }
    }

    fn load_setup_py(&mut self, path: &Path) {
        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[python] failed to read {}: {e}", path.display());
                return;
            }
        };
        match install_requires(&content) {
            Some(specs) => self
                .declared
                .extend(specs.into_iter().filter_map(requirement_name)),
            None => tracing::warn!(
                "[python] ignoring malformed install_requires in {}",
                path.display()
            ),
        }
    }

    fn is_builtin(&self, import_path: &str) -> bool {
        let top = import_path.split('.').next().unwrap_or(import_path);
        self.stdlib.contains(import_path) || self.stdlib.contains(top)
    }

    fn is_third_party(&self, import_path: &str) -> bool {
        let top = normalize_package(import_path.split('.').next().unwrap_or(import_path));
        self.declared.contains(&top)
            || self.installed.contains(&top)
            || KNOWN_THIRD_PARTY.contains(&top.as_str())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.registry.id_for(path).is_some() || self.fs.is_file(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.registry.has_files_under(path) || self.fs.is_dir(path)
    }

    fn init_file(&self, dir: &Path) -> Option<PathBuf> {
        let init = dir.join("__init__.py");
        self.file_exists(&init).then_some(init)
    }

    /// `a.b.c` under `base`: `a/b/c.py` or `a/b/c/__init__.py`, with every
    /// intermediate directory a package.
    fn find_module(&self, parts: &[&str], base: &Path) -> Option<PathBuf> {
        let (last, packages) = parts.split_last()?;
        let mut dir = base.to_path_buf();
        for part in packages {
            dir.push(part);
            if !self.dir_exists(&dir) || self.init_file(&dir).is_none() {
                return None;
            }
        }

        let module = dir.join(format!("{last}.py"));
        if self.file_exists(&module) {
            return Some(module);
        }
        self.init_file(&dir.join(last))
    }

    fn check_resolved(&self, import_path: &str, path: PathBuf) -> ModuleResolution {
        if let Some(id) = self.registry.id_for(&path) {
            return ModuleResolution::internal(import_path, ResolutionKind::Internal, path, Some(id));
        }
        if self.fs.is_file(&path) {
            return ModuleResolution::external(import_path, Some(path));
        }
        ModuleResolution::error(import_path, "file not found")
    }

    fn resolve_relative(&self, import_path: &str, from: FileId) -> ModuleResolution {
        let Some(from_path) = self.registry.path_for(from) else {
            return ModuleResolution::error(import_path, "source file not found");
        };

        let dots = import_path.chars().take_while(|c| *c == '.').count();
        let rest = &import_path[dots..];

        let mut dir = from_path.parent().unwrap_or(Path::new("")).to_path_buf();
        for _ in 1..dots {
            if !dir.pop() {
                return ModuleResolution::error(import_path, "relative import beyond top-level package");
            }
        }

        if rest.is_empty() {
            return match self.init_file(&dir) {
                Some(init) => self.check_resolved(import_path, init),
                None => ModuleResolution::error(import_path, "relative import target not found"),
            };
        }

        let parts: Vec<&str> = rest.split('.').collect();
        match self.find_module(&parts, &dir) {
            Some(path) => self.check_resolved(import_path, path),
            None => ModuleResolution::error(import_path, "module not found in directory"),
        }
    }

    fn resolve_absolute(&self, import_path: &str) -> ModuleResolution {
        let parts: Vec<&str> = import_path.split('.').collect();
        let found = self
            .search_paths
            .iter()
            .find_map(|base| self.find_module(&parts, base));
        if let Some(path) = found {
            return self.check_resolved(import_path, path);
        }

        let installed = self
            .site_packages
            .iter()
            .find_map(|base| self.find_module(&parts, base));
        if let Some(path) = installed {
            return ModuleResolution::external(import_path, Some(path));
        }

        if self.is_third_party(import_path) {
            return ModuleResolution::external(import_path, None);
        }

        ModuleResolution::error(import_path, "module not found")
    }

    fn resolve(&self, import_path: &str, from: FileId) -> ModuleResolution {
        if import_path.starts_with('.') {
            return self.resolve_relative(import_path, from);
        }
        if self.is_builtin(import_path) {
            return ModuleResolution::builtin(import_path);
        }
        self.resolve_absolute(import_path)
    }
}

/// Distribution name of a requirement specifier, normalized.
fn requirement_name(spec: &str) -> Option<String> {
    let end = spec
        .find(|c: char| "=<>!~;[ @".contains(c))
        .unwrap_or(spec.len());
    let name = spec[..end].trim();
    (!name.is_empty()).then(|| normalize_package(name))
}

/// Requirement strings of a literal `install_requires=[...]` list. Empty when
/// there is no literal list, `None` when the list or a string in it is not
/// closed.
fn install_requires(source: &str) -> Option<Vec<&str>> {
    const KEY: &str = "install_requires";
    let Some(start) = source.find(KEY) else {
        return Some(Vec::new());
    };
    // Keyword argument or dict key
    let rest = source[start + KEY.len()..]
        .trim_start_matches(['"', '\''])
        .trim_start();
    let Some(rest) = rest.strip_prefix(['=', ':']) else {
        return Some(Vec::new());
    };
    let Some(list) = rest.trim_start().strip_prefix('[') else {
        return Some(Vec::new());
    };

    let mut specs = Vec::new();
    let mut chars = list.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            ']' => return Some(specs),
            '"' | '\'' => {
                let (end, _) = chars.by_ref().find(|(_, q)| *q == c)?;
                specs.push(&list[i + 1..end]);
            }
            '#' => {
                chars.by_ref().find(|(_, n)| *n == '\n');
            }
            _ => {}
        }
    }
    None
}

fn normalize_package(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

impl ModuleResolver for PythonResolver {
    fn name(&self) -> &'static str {
        "python"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["python"]
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
