//! Layered configuration for the linker and incremental engine.
//!
//! Sources, lowest precedence first:
//! - Default values
//! - `.crosslink/settings.toml` (found by walking up from the current directory)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CL_` and use double underscores
//! to separate nested levels:
//! - `CL_INDEXING__MAX_CASCADE_DEPTH=20` sets `indexing.max_cascade_depth`
//! - `CL_LANGUAGES__PYTHON__ENABLED=false` sets `languages.python.enabled`
//! - `CL_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::resolver::{
    CSHARP_CONFIG_FILES, GO_CONFIG_FILES, JAVASCRIPT_CONFIG_FILES, PHP_CONFIG_FILES,
    PYTHON_CONFIG_FILES,
};

/// Directory holding the settings file, relative to the workspace root
pub const CONFIG_DIR: &str = ".crosslink";
pub const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "CL_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .crosslink is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Per-language switches, keyed by language tag
    #[serde(default = "default_languages")]
    pub languages: IndexMap<String, LanguageConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Maximum number of cascade waves before an update is aborted
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,

    /// Project root used for import resolution (defaults to the indexed directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    /// Gitignore-style patterns skipped while walking
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LanguageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra file extensions routed to this language, without dots
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Project manifests the resolver reads, relative to the project root
    #[serde(default)]
    pub config_files: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level for everything not listed in `modules`
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `incremental = "debug"`
    #[serde(default)]
    pub modules: IndexMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_cascade_depth() -> usize {
    10
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            indexing: IndexingConfig::default(),
            languages: default_languages(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_cascade_depth: default_max_cascade_depth(),
            project_root: None,
            ignore_patterns: vec![
                "target/**".to_string(),
                "node_modules/**".to_string(),
                "vendor/**".to_string(),
                "venv/**".to_string(),
                ".git/**".to_string(),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
        }
    }
}

fn language(extensions: &[&str], config_files: &[&str]) -> LanguageConfig {
    LanguageConfig {
        enabled: true,
        extensions: extensions.iter().map(|e| e.to_string()).collect(),
        config_files: config_files.iter().map(|f| f.to_string()).collect(),
    }
}

fn default_languages() -> IndexMap<String, LanguageConfig> {
    let mut langs = IndexMap::new();
    langs.insert("go".to_string(), language(&["go"], GO_CONFIG_FILES));
    langs.insert(
        "python".to_string(),
        language(&["py", "pyi"], PYTHON_CONFIG_FILES),
    );
    langs.insert(
        "javascript".to_string(),
        language(&["js", "jsx", "mjs", "cjs"], JAVASCRIPT_CONFIG_FILES),
    );
    langs.insert(
        "typescript".to_string(),
        language(&["ts", "tsx", "mts", "cts"], JAVASCRIPT_CONFIG_FILES),
    );
    langs.insert(
        "csharp".to_string(),
        language(&["cs", "csx"], CSHARP_CONFIG_FILES),
    );
    langs.insert(
        "php".to_string(),
        language(&["php", "phtml"], PHP_CONFIG_FILES),
    );
    langs
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nesting levels; single underscores
            // stay part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for .crosslink from the current directory up
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Get the workspace root directory (where .crosslink is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let current_dir = std::env::current_dir()?;
        Self::init_config_file_at(&current_dir, force)
    }

    /// Create a default settings file under `root`
    pub fn init_config_file_at(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            workspace_root: Some(root.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;
        tracing::info!("[config] wrote {}", config_path.display());

        Ok(config_path)
    }

    /// Settings for `language`, if it is configured and enabled
    pub fn enabled_language(&self, language: &str) -> Option<&LanguageConfig> {
        self.languages.get(language).filter(|l| l.enabled)
    }

    /// Project root for import resolution: the configured one, else `fallback`
    pub fn project_root_or(&self, fallback: &Path) -> PathBuf {
        match &self.indexing.project_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => fallback.join(root),
            None => fallback.to_path_buf(),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.indexing.max_cascade_depth, 10);
        assert_eq!(settings.logging.default, "warn");
        let langs: Vec<&str> = settings.languages.keys().map(String::as_str).collect();
        assert_eq!(
            langs,
            vec!["go", "python", "javascript", "typescript", "csharp", "php"]
        );
        assert_eq!(settings.languages["go"].config_files, vec!["go.mod"]);
        assert_eq!(settings.languages["php"].config_files, vec!["composer.json"]);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[indexing]
max_cascade_depth = 4
ignore_patterns = ["gen/**"]

[languages.python]
enabled = false

[logging]
default = "info"

[logging.modules]
incremental = "debug"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.indexing.max_cascade_depth, 4);
        // Configured patterns replace the defaults
        assert_eq!(settings.indexing.ignore_patterns, vec!["gen/**"]);
        assert!(settings.enabled_language("python").is_none());
        assert!(settings.enabled_language("go").is_some());
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["incremental"], "debug");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[languages.go]\nextensions = [\"go\", \"gotmpl\"]\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.languages["go"].extensions, vec!["go", "gotmpl"]);
        assert!(settings.languages["go"].enabled);
        assert_eq!(settings.indexing.max_cascade_depth, 10);
        assert!(!settings.indexing.ignore_patterns.is_empty());
    }

    #[test]
    fn test_save_and_init() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file_at(temp_dir.path(), false).unwrap();
        assert_eq!(path, temp_dir.path().join(".crosslink/settings.toml"));
        assert!(Settings::init_config_file_at(temp_dir.path(), false).is_err());

        let mut settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.workspace_root.as_deref(), Some(temp_dir.path()));

        settings.indexing.max_cascade_depth = 3;
        settings.save(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.indexing.max_cascade_depth, 3);

        // Forced init restores defaults
        Settings::init_config_file_at(temp_dir.path(), true).unwrap();
        let reset = Settings::load_from(&path).unwrap();
        assert_eq!(reset.indexing.max_cascade_depth, 10);
    }

    #[test]
    fn test_project_root_resolution() {
        let mut settings = Settings::default();
        let base = Path::new("/work/repo");
        assert_eq!(settings.project_root_or(base), PathBuf::from("/work/repo"));

        settings.indexing.project_root = Some(PathBuf::from("services/api"));
        assert_eq!(
            settings.project_root_or(base),
            PathBuf::from("/work/repo/services/api")
        );
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[indexing]\nmax_cascade_depth = 5\n").unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("CL_INDEXING__MAX_CASCADE_DEPTH", "7");
            jail.set_env("CL_LOGGING__DEFAULT", "debug");
            let settings = Settings::load_from(&config_path).map_err(|e| e.to_string())?;
            assert_eq!(settings.indexing.max_cascade_depth, 7);
            assert_eq!(settings.logging.default, "debug");
            Ok(())
        });
    }
}
