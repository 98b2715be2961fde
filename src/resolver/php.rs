//! PHP import resolution driven by `composer.json`.
//!
//! A `use` names a class. It is looked up through the PSR-4 and PSR-0
//! autoload maps, then as a class file next to the importing file. Classes
//! from required Composer packages are external. `include` and `require`
//! paths are files relative to the importing file, then to the root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileRegistry, FileSystem, ModuleResolver, ResolutionCounter, ResolverStats};
use crate::paths::clean;
use crate::types::{FileId, ModuleResolution, ResolutionKind};

/// Classes and interfaces that ship with the PHP runtime.
const BUILTIN_CLASSES: &[&str] = &[
    "ArgumentCountError", "ArithmeticError", "ArrayAccess", "ArrayIterator", "ArrayObject",
    "Attribute", "BackedEnum", "BadFunctionCallException", "BadMethodCallException", "Closure",
    "Countable", "DOMDocument", "DOMElement", "DateInterval", "DatePeriod", "DateTime",
    "DateTimeImmutable", "DateTimeInterface", "DateTimeZone", "DivisionByZeroError",
    "DomainException", "Error", "ErrorException", "Exception", "Generator",
    "InvalidArgumentException", "Iterator", "IteratorAggregate", "JsonException",
    "JsonSerializable", "LengthException", "LogicException", "OutOfBoundsException",
    "OutOfRangeException", "OverflowException", "Override", "PDO", "PDOException", "PDOStatement",
    "RangeException", "ReflectionClass", "ReflectionException", "ReflectionFunction",
    "ReflectionMethod", "ReflectionNamedType", "ReflectionProperty", "ReturnTypeWillChange",
    "RuntimeException", "SensitiveParameter", "Serializable", "SimpleXMLElement", "SplFileInfo",
    "SplFixedArray", "SplObjectStorage", "SplQueue", "SplStack", "Stringable", "Throwable",
    "Traversable", "TypeError", "UnderflowException", "UnexpectedValueException", "UnitEnum",
    "ValueError", "WeakMap", "WeakReference", "stdClass",
];

pub const DEFAULT_CONFIG_FILES: &[&str] = &["composer.json"];

/// Namespace prefix and the directories it autoloads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psr4Mapping {
    /// Namespace prefix (e.g., "App\\")
    pub namespace_prefix: String,
    pub directories: Vec<PathBuf>,
}

/// Information extracted from composer.json
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposerInfo {
    /// `psr-4` of `autoload` and `autoload-dev`, longest prefix first
    pub psr4: Vec<Psr4Mapping>,
    /// `psr-0` of `autoload` and `autoload-dev`, longest prefix first
    pub psr0: Vec<Psr4Mapping>,
    /// `vendor/package` names from `require` and `require-dev`
    pub packages: Vec<String>,
}

impl ComposerInfo {
    /// Directories are joined onto `project_root`.
    pub fn parse(content: &str, project_root: &Path) -> Result<Self, serde_json::Error> {
        let json: serde_json::Value = serde_json::from_str(content)?;
        let mut info = Self::default();

        for section in ["autoload", "autoload-dev"] {
            let Some(autoload) = json.get(section) else {
                continue;
            };
            if let Some(psr4) = autoload.get("psr-4") {
                info.psr4.extend(autoload_section(psr4, project_root));
            }
            if let Some(psr0) = autoload.get("psr-0") {
                info.psr0.extend(autoload_section(psr0, project_root));
            }
        }
        for mappings in [&mut info.psr4, &mut info.psr0] {
            mappings.sort_by(|a, b| {
                b.namespace_prefix
                    .len()
                    .cmp(&a.namespace_prefix.len())
                    .then_with(|| a.namespace_prefix.cmp(&b.namespace_prefix))
            });
        }

        for section in ["require", "require-dev"] {
            let names = json
                .get(section)
                .and_then(|r| r.as_object())
                .into_iter()
                .flat_map(|r| r.keys());
            // Platform requirements (`php`, `ext-json`) have no vendor
            info.packages
                .extend(names.filter(|name| name.contains('/')).cloned());
        }
        Ok(info)
    }
}

/// `"App\\": "src/"` or `"App\\": ["src/", "lib/"]`.
fn autoload_section(section: &serde_json::Value, project_root: &Path) -> Vec<Psr4Mapping> {
    let mut mappings = Vec::new();
    let Some(obj) = section.as_object() else {
        return mappings;
    };
    for (namespace_prefix, dirs) in obj {
        let directories: Vec<PathBuf> = match dirs {
            serde_json::Value::Array(arr) => arr
                .iter()
                .filter_map(|v| v.as_str())
                .map(|d| clean(&project_root.join(d)))
                .collect(),
            serde_json::Value::String(s) => vec![clean(&project_root.join(s))],
            _ => continue,
        };
        if !directories.is_empty() {
            mappings.push(Psr4Mapping {
                namespace_prefix: namespace_prefix.clone(),
                directories,
            });
        }
    }
    mappings
}

/// Whether an import string names a file rather than a class.
fn is_file_path(import_path: &str) -> bool {
    import_path.contains('/')
        || import_path.starts_with('.')
        || [".php", ".phar", ".inc"]
            .iter()
            .any(|ext| import_path.ends_with(ext))
}

pub struct PhpResolver {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: FileRegistry,
    composer: ComposerInfo,
    counter: ResolutionCounter,
}

impl PhpResolver {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let defaults: Vec<String> = DEFAULT_CONFIG_FILES.iter().map(|f| f.to_string()).collect();
        Self::with_config_files(root, fs, &defaults)
    }

    /// Like [`PhpResolver::new`], merging every composer file in
    /// `config_files` that exists under the root.
    pub fn with_config_files(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        config_files: &[String],
    ) -> Self {
        let mut resolver = Self {
            root: root.into(),
            fs,
            registry: FileRegistry::default(),
            composer: ComposerInfo::default(),
            counter: ResolutionCounter::default(),
        };
        for name in config_files {
            let path = resolver.root.join(name);
            if resolver.fs.is_file(&path) {
                resolver.load_composer(&path);
            }
        }
        resolver
    }

    fn load_composer(&mut self, path: &Path) {
        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[php] failed to read {}: {e}", path.display());
                return;
            }
        };
        let dir = path.parent().unwrap_or(&self.root);
        match ComposerInfo::parse(&content, dir) {
            Ok(info) => {
                tracing::debug!(
                    "[php] {}: {} psr-4, {} psr-0 prefixes, {} packages",
                    path.display(),
                    info.psr4.len(),
                    info.psr0.len(),
                    info.packages.len()
                );
                self.composer.psr4.extend(info.psr4);
                self.composer.psr0.extend(info.psr0);
                self.composer.packages.extend(info.packages);
            }
            Err(e) => tracing::warn!("[php] ignoring malformed {}: {e}", path.display()),
        }
    }

    pub fn composer(&self) -> &ComposerInfo {
        &self.composer
    }

    /// Registered file first, then an unregistered file on disk.
    fn check_class_file(&self, import_path: &str, path: PathBuf) -> Option<ModuleResolution> {
        if let Some(id) = self.registry.id_for(&path) {
            return Some(ModuleResolution::internal(
                import_path,
                ResolutionKind::File,
                path,
                Some(id),
            ));
        }
        self.fs
            .is_file(&path)
            .then(|| ModuleResolution::internal(import_path, ResolutionKind::File, path, None))
    }

    fn resolve_file(&self, import_path: &str, from: FileId) -> ModuleResolution {
        let from_dir = self
            .registry
            .path_for(from)
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let candidates = from_dir
            .into_iter()
            .chain(std::iter::once(self.root.clone()))
            .map(|base| clean(&base.join(import_path)));

        for path in candidates {
            if let Some(id) = self.registry.id_for(&path) {
                return ModuleResolution::internal(
                    import_path,
                    ResolutionKind::Internal,
                    path,
                    Some(id),
                );
            }
            if self.fs.is_file(&path) {
                return ModuleResolution::external(import_path, Some(path));
            }
        }
        ModuleResolution::error(import_path, "file not found")
    }

    fn resolve_psr4(&self, import_path: &str, class: &str) -> Option<ModuleResolution> {
        for mapping in &self.composer.psr4 {
            let Some(rest) = class.strip_prefix(mapping.namespace_prefix.as_str()) else {
                continue;
            };
            let relative = format!("{}.php", rest.replace('\\', "/"));
            for dir in &mapping.directories {
                if let Some(resolution) = self.check_class_file(import_path, dir.join(&relative))
                {
                    return Some(resolution);
                }
            }
        }
        None
    }

    /// PSR-0 keeps the full name in the path, with `_` in the class name as a
    /// directory separator.
    fn resolve_psr0(&self, import_path: &str, class: &str) -> Option<ModuleResolution> {
        let (namespace, name) = match class.rsplit_once('\\') {
            Some((namespace, name)) => (format!("{}/", namespace.replace('\\', "/")), name),
            None => (String::new(), class),
        };
        let relative = format!("{namespace}{}.php", name.replace('_', "/"));

        for mapping in &self.composer.psr0 {
            if !class.starts_with(mapping.namespace_prefix.as_str()) {
                continue;
            }
            for dir in &mapping.directories {
                if let Some(resolution) = self.check_class_file(import_path, dir.join(&relative))
                {
                    return Some(resolution);
                }
            }
        }
        None
    }

    /// `Foo`, `class.Foo`, `Foo.class` and `foo` next to the importing file.
    fn resolve_local_class(
        &self,
        import_path: &str,
        class: &str,
        from: FileId,
    ) -> Option<ModuleResolution> {
        let dir = self.registry.path_for(from)?.parent()?;
        let name = class.rsplit('\\').next().unwrap_or(class);
        let candidates = [
            format!("{name}.php"),
            format!("class.{name}.php"),
            format!("{name}.class.php"),
            format!("{}.php", name.to_ascii_lowercase()),
        ];
        candidates
            .iter()
            .find_map(|file| self.check_class_file(import_path, dir.join(file)))
    }

    /// `Monolog\Logger` belongs to `monolog/monolog`; the first namespace
    /// segment is matched against the vendor and package names.
    fn is_package_class(&self, class: &str) -> bool {
        let top = class
            .split('\\')
            .next()
            .unwrap_or(class)
            .to_ascii_lowercase();
        self.composer.packages.iter().any(|package| {
            package
                .split('/')
                .any(|part| part.to_ascii_lowercase().replace('-', "") == top)
        })
    }

    fn resolve(&self, import_path: &str, from: FileId) -> ModuleResolution {
        if is_file_path(import_path) {
            return self.resolve_file(import_path, from);
        }

        let class = import_path.trim_start_matches('\\');
        if !class.contains('\\') && BUILTIN_CLASSES.contains(&class) {
            return ModuleResolution::builtin(import_path);
        }
        if let Some(resolution) = self
            .resolve_psr4(import_path, class)
            .or_else(|| self.resolve_psr0(import_path, class))
        {
            return resolution;
        }
        if self.is_package_class(class) {
            return ModuleResolution::external(import_path, None);
        }
        if let Some(resolution) = self.resolve_local_class(import_path, class, from) {
            return resolution;
        }
        ModuleResolution::error(import_path, "class not found")
    }
}

impl ModuleResolver for PhpResolver {
    fn name(&self) -> &'static str {
        "php"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["php"]
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

    const COMPOSER: &str = r#"{
  "name": "acme/shop",
  "autoload": {
    "psr-4": { "App\\": "src/", "App\\Tests\\": ["tests/"] },
    "psr-0": { "Legacy_": "legacy/" }
  },
  "autoload-dev": { "psr-4": { "Database\\Factories\\": "database/factories/" } },
  "require": { "php": "^8.2", "ext-json": "*", "monolog/monolog": "^3.0" },
  "require-dev": { "phpunit/phpunit": "^10.5" }
}"#;

    fn project(composer: &str) -> PhpResolver {
        let fs = MemoryFileSystem::new()
            .with_file("/proj/composer.json", composer)
            .with_file("/proj/src/Models/User.php", "")
            .with_file("/proj/src/Http/Controller.php", "")
            .with_file("/proj/tests/UserTest.php", "")
            .with_file("/proj/legacy/Legacy/Mail/Sender.php", "")
            .with_file("/proj/lib/helpers.php", "")
            .with_file("/proj/src/Http/routes.php", "")
            .with_file("/proj/src/Http/class.Helper.php", "")
            .with_file("/proj/src/Unregistered.php", "")
            .with_file("/proj/vendor/autoload.php", "");

        let mut resolver = PhpResolver::new("/proj", Arc::new(fs));
        let files = [
            "/proj/src/Models/User.php",
            "/proj/src/Http/Controller.php",
            "/proj/tests/UserTest.php",
            "/proj/legacy/Legacy/Mail/Sender.php",
            "/proj/lib/helpers.php",
            "/proj/src/Http/routes.php",
            "/proj/src/Http/class.Helper.php",
        ];
        for (i, path) in files.iter().enumerate() {
            resolver.register_file(id(i as u32 + 1), Path::new(path));
        }
        resolver
    }

    #[test]
    fn test_parse_composer() {
        let info = ComposerInfo::parse(COMPOSER, Path::new("/proj")).unwrap();
        let prefixes: Vec<&str> = info.psr4.iter().map(|m| m.namespace_prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["Database\\Factories\\", "App\\Tests\\", "App\\"]);
        assert_eq!(info.psr4[2].directories, vec![PathBuf::from("/proj/src")]);
        assert_eq!(info.psr0[0].namespace_prefix, "Legacy_");
        assert_eq!(info.packages, vec!["monolog/monolog", "phpunit/phpunit"]);

        assert!(ComposerInfo::parse("{ \"autoload\": ", Path::new("/proj")).is_err());
    }

    #[test]
    fn test_psr4_and_psr0_classes() {
        let mut resolver = project(COMPOSER);

        let user = resolver.resolve_import("App\\Models\\User", id(2));
        assert_eq!(user.kind, ResolutionKind::File);
        assert_eq!(user.target_file, Some(id(1)));
        let rooted = resolver.resolve_import("\\App\\Models\\User", id(2));
        assert_eq!(rooted.target_file, Some(id(1)));

        // Longest prefix wins over `App\`
        let test = resolver.resolve_import("App\\Tests\\UserTest", id(2));
        assert_eq!(test.target_file, Some(id(3)));

        let legacy = resolver.resolve_import("Legacy_Mail_Sender", id(2));
        assert_eq!(legacy.target_file, Some(id(4)));

        let unregistered = resolver.resolve_import("App\\Unregistered", id(2));
        assert_eq!(unregistered.kind, ResolutionKind::File);
        assert_eq!(unregistered.target_file, None);
        assert!(!unregistered.is_external);
    }

    #[test]
    fn test_includes_relative_to_file_then_root() {
        let mut resolver = project(COMPOSER);

        let helpers = resolver.resolve_import("lib/helpers.php", id(2));
        assert_eq!(helpers.kind, ResolutionKind::Internal);
        assert_eq!(helpers.target_file, Some(id(5)));

        let routes = resolver.resolve_import("./routes.php", id(2));
        assert_eq!(routes.target_file, Some(id(6)));

        let autoload = resolver.resolve_import("vendor/autoload.php", id(2));
        assert_eq!(autoload.kind, ResolutionKind::External);
        assert_eq!(autoload.resolved_path, Some(PathBuf::from("/proj/vendor/autoload.php")));

        let missing = resolver.resolve_import("missing.php", id(2));
        assert_eq!(missing.error.as_deref(), Some("file not found"));
    }

    #[test]
    fn test_builtins_packages_and_local_classes() {
        let mut resolver = project(COMPOSER);

        assert!(resolver.resolve_import("Exception", id(2)).is_builtin);
        assert!(resolver.resolve_import("\\DateTimeImmutable", id(2)).is_builtin);

        let logger = resolver.resolve_import("Monolog\\Logger", id(2));
        assert_eq!(logger.kind, ResolutionKind::External);
        assert!(resolver.resolve_import("PHPUnit\\Framework\\TestCase", id(3)).is_external);

        let helper = resolver.resolve_import("Helper", id(2));
        assert_eq!(helper.target_file, Some(id(7)));

        let missing = resolver.resolve_import("App\\Missing", id(2));
        assert_eq!(missing.kind, ResolutionKind::Error);
        assert_eq!(missing.error.as_deref(), Some("class not found"));
    }

    #[test]
    fn test_malformed_composer_is_ignored() {
        let mut resolver = project("{ \"autoload\": { \"psr-4\": ");
        assert!(resolver.composer().psr4.is_empty());

        let user = resolver.resolve_import("App\\Models\\User", id(2));
        assert_eq!(user.kind, ResolutionKind::Error);
        // Local lookup still works without autoload rules
        assert_eq!(resolver.resolve_import("Helper", id(2)).target_file, Some(id(7)));
    }
}
