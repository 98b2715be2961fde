//! C# namespace resolution driven by `.csproj` files.
//!
//! A `using` names a namespace, and namespaces follow folders by convention.
//! Each project maps its root namespace (`RootNamespace`, then `AssemblyName`,
//! then the project file name) to the project directory; the rest of the
//! namespace is a path below it. A resolved namespace reports every registered
//! `.cs` file of the folder in `package_files`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FileRegistry, FileSystem, ModuleResolver, ResolutionCounter, ResolverStats};
use crate::paths::{clean, has_extension};
use crate::types::{FileId, ModuleResolution, ResolutionKind};

const BUILTIN_ROOTS: &[&str] = &["System", "Microsoft", "Windows"];

const KNOWN_THIRD_PARTY: &[&str] = &[
    "Newtonsoft", "NUnit", "Xunit", "Moq", "AutoMapper", "FluentValidation", "FluentAssertions",
    "Serilog", "NLog", "EntityFramework", "Dapper", "MediatR", "Polly", "StackExchange",
];

/// Folders searched for a namespace path when no project claims it.
const SOURCE_DIRS: &[&str] = &["", "src", "lib"];

/// `*.ext` entries match every project file with that extension in the root,
/// its child folders and the folders under `src`.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["*.csproj", "Directory.Build.props"];

/// Information extracted from a .csproj file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsprojInfo {
    pub root_namespace: Option<String>,
    pub assembly_name: Option<String>,
    /// `<Project Sdk="...">`
    pub is_sdk_style: bool,
    /// `Include` of each `<PackageReference>`
    pub package_references: Vec<String>,
    /// `Include` of each `<ProjectReference>`, with `/` separators
    pub project_references: Vec<String>,
    /// `Include` of each `<Using>`, applied to every file of the project
    pub global_usings: Vec<String>,
}

impl CsprojInfo {
    pub fn parse(content: &str) -> Self {
        Self {
            root_namespace: xml_element(content, "RootNamespace"),
            assembly_name: xml_element(content, "AssemblyName"),
            is_sdk_style: content
                .find("<Project")
                .and_then(|at| tag_attribute(tag_at(&content[at..]), "Sdk"))
                .is_some(),
            package_references: include_values(content, "PackageReference"),
            project_references: include_values(content, "ProjectReference")
                .into_iter()
                .map(|path| path.replace('\\', "/"))
                .collect(),
            global_usings: include_values(content, "Using"),
        }
    }

    /// Root namespace of the project at `project_file`.
    pub fn namespace(&self, project_file: &Path) -> Option<String> {
        self.root_namespace
            .clone()
            .or_else(|| self.assembly_name.clone())
            .or_else(|| {
                has_extension(project_file, &["csproj"])
                    .then(|| project_file.file_stem()?.to_str().map(str::to_string))
                    .flatten()
            })
    }
}

/// Trimmed text of the first `<name>...</name>`.
fn xml_element(content: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = content.find(&open)? + open.len();
    let end = content[start..].find(&close)? + start;
    let value = content[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// The opening tag at the start of `text`, without the closing `>`.
fn tag_at(text: &str) -> &str {
    &text[..text.find('>').unwrap_or(text.len())]
}

/// Quoted value of `name="..."` inside a tag.
fn tag_attribute(tag: &str, name: &str) -> Option<String> {
    let key = format!("{name}=");
    let mut search = tag;
    loop {
        let at = search.find(&key)?;
        let after = &search[at + key.len()..];
        // Not the tail of a longer attribute name
        if search[..at].ends_with(char::is_whitespace) {
            let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let value = &after[1..];
            let end = value.find(quote)?;
            return Some(value[..end].trim().to_string());
        }
        search = after;
    }
}

/// `Include` of every `<element ...>` tag.
fn include_values(content: &str, element: &str) -> Vec<String> {
    let open = format!("<{element}");
    let mut values = Vec::new();
    let mut rest = content;
    while let Some(at) = rest.find(&open) {
        let tail = &rest[at + open.len()..];
        // `<PackageReferences>` or `<UsingTask>` is another element
        if tail.starts_with(char::is_whitespace) {
            let tag = tag_at(tail);
            if let Some(value) = tag_attribute(tag, "Include").filter(|v| !v.is_empty()) {
                values.push(value);
            }
        }
        rest = tail;
    }
    values
}

pub struct CSharpResolver {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: FileRegistry,
    /// Root namespace and project directory, longest namespace first
    namespace_roots: Vec<(String, PathBuf)>,
    packages: BTreeSet<String>,
    global_usings: Vec<String>,
    counter: ResolutionCounter,
}

impl CSharpResolver {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let defaults: Vec<String> = DEFAULT_CONFIG_FILES.iter().map(|f| f.to_string()).collect();
        Self::with_config_files(root, fs, &defaults)
    }

    /// Like [`CSharpResolver::new`], reading the project files named by
    /// `config_files`. Referenced projects are followed.
    pub fn with_config_files(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        config_files: &[String],
    ) -> Self {
        let mut resolver = Self {
            root: root.into(),
            fs,
            registry: FileRegistry::default(),
            namespace_roots: Vec::new(),
            packages: BTreeSet::new(),
            global_usings: Vec::new(),
            counter: ResolutionCounter::default(),
        };

        let mut pending: Vec<PathBuf> = Vec::new();
        for name in config_files {
            match name.strip_prefix("*.") {
                Some(ext) => pending.extend(resolver.find_project_files(ext)),
                None => pending.push(resolver.root.join(name)),
            }
        }

        let mut loaded = BTreeSet::new();
        while let Some(path) = pending.pop() {
            let path = clean(&path);
            if !resolver.fs.is_file(&path) || !loaded.insert(path.clone()) {
                continue;
            }
            pending.extend(resolver.load_project(&path));
        }

        resolver
            .namespace_roots
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.cmp(b)));
        resolver.namespace_roots.dedup();
        tracing::debug!(
            "[csharp] {} project namespaces, {} package references",
            resolver.namespace_roots.len(),
            resolver.packages.len()
        );
        resolver
    }

    fn find_project_files(&self, ext: &str) -> Vec<PathBuf> {
        let mut dirs = vec![self.root.clone()];
        dirs.extend(self.fs.list_dirs(&self.root));
        dirs.extend(self.fs.list_dirs(&self.root.join("src")));
        dirs.iter()
            .flat_map(|dir| self.fs.list_files_with_extension(dir, ext))
            .collect()
    }

    /// Records one project file and returns the projects it references.
    fn load_project(&mut self, path: &Path) -> Vec<PathBuf> {
        let content = match self.fs.read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[csharp] failed to read {}: {e}", path.display());
                return Vec::new();
            }
        };
        let info = CsprojInfo::parse(&content);
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();

        if let Some(namespace) = info.namespace(path) {
            self.namespace_roots.push((namespace, dir.clone()));
        }
        self.packages.extend(info.package_references);
        for using in info.global_usings {
            if !self.global_usings.contains(&using) {
                self.global_usings.push(using);
            }
        }
        info.project_references
            .iter()
            .map(|reference| dir.join(reference))
            .collect()
    }

    /// Namespaces every file of the project imports implicitly.
    pub fn global_usings(&self) -> &[String] {
        &self.global_usings
    }

    pub fn package_references(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    /// Root namespace of each loaded project with its directory.
    pub fn project_namespaces(&self) -> &[(String, PathBuf)] {
        &self.namespace_roots
    }

    fn is_builtin(namespace: &str) -> bool {
        let top = namespace.split('.').next().unwrap_or(namespace);
        BUILTIN_ROOTS.contains(&top)
    }

    /// A package reference `Acme.Json` covers `Acme.Json` and `Acme.Json.*`.
    fn is_package(&self, namespace: &str) -> bool {
        let namespace = namespace.to_ascii_lowercase();
        let by_reference = self.packages.iter().any(|package| {
            let package = package.to_ascii_lowercase();
            namespace == package
                || namespace
                    .strip_prefix(&package)
                    .is_some_and(|rest| rest.starts_with('.'))
        });
        let top = namespace.split('.').next().unwrap_or(&namespace);
        by_reference
            || KNOWN_THIRD_PARTY
                .iter()
                .any(|known| known.eq_ignore_ascii_case(top))
    }

    /// Folders that may hold `namespace`, most specific first.
    fn candidate_dirs(&self, namespace: &str) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for (prefix, dir) in &self.namespace_roots {
            if namespace == prefix {
                dirs.push(dir.clone());
            } else if let Some(rest) = namespace
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
            {
                dirs.push(rest.split('.').fold(dir.clone(), |path, part| path.join(part)));
            }
        }
        for base in SOURCE_DIRS {
            let base = self.root.join(base);
            dirs.push(namespace.split('.').fold(base, |path, part| path.join(part)));
        }
        dirs
    }

    fn resolve_namespace(&self, import_path: &str, namespace: &str) -> Option<ModuleResolution> {
        for dir in self.candidate_dirs(namespace) {
            let files: Vec<FileId> = self
                .registry
                .files_in_dir(&dir)
                .into_iter()
                .filter(|(path, _)| has_extension(path, &["cs"]))
                .map(|(_, id)| id)
                .collect();
            if let Some(first) = files.first().copied() {
                return Some(
                    ModuleResolution::internal(
                        import_path,
                        ResolutionKind::Directory,
                        dir,
                        Some(first),
                    )
                    .with_package_files(files),
                );
            }
            if !self.fs.list_files_with_extension(&dir, "cs").is_empty() {
                return Some(ModuleResolution::internal(
                    import_path,
                    ResolutionKind::Directory,
                    dir,
                    None,
                ));
            }
        }
        None
    }

    fn resolve(&self, import_path: &str) -> ModuleResolution {
        let namespace = import_path.trim_start_matches("global::");
        if Self::is_builtin(namespace) {
            return ModuleResolution::builtin(import_path);
        }
        if let Some(resolution) = self.resolve_namespace(import_path, namespace) {
            return resolution;
        }
        // `using static` and type aliases name a type inside a namespace
        if let Some((parent, _)) = namespace.rsplit_once('.')
            && let Some(resolution) = self.resolve_namespace(import_path, parent)
        {
            return resolution;
        }
        if self.is_package(namespace) {
            return ModuleResolution::external(import_path, None);
        }
        ModuleResolution::error(import_path, "namespace not found")
    }
}

impl ModuleResolver for CSharpResolver {
    fn name(&self) -> &'static str {
        "csharp"
    }

    fn languages(&self) -> &'static [&'static str] {
        &["csharp"]
    }

    fn lookup(&mut self, import_path: &str, _from: FileId) -> ModuleResolution {
        self.resolve(import_path)
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

    const APP_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net8.0</TargetFramework>
    <RootNamespace>Acme.App</RootNamespace>
  </PropertyGroup>
  <ItemGroup>
    <PackageReference Include="Newtonsoft.Json" Version="13.0.3" />
    <ProjectReference Include="..\Shared\Shared.csproj" />
    <Using Include="Acme.App.Models" />
  </ItemGroup>
</Project>"#;

    fn project() -> CSharpResolver {
        let fs = MemoryFileSystem::new()
            .with_file("/proj/src/App/App.csproj", APP_CSPROJ)
            .with_file("/proj/src/App/Program.cs", "")
            .with_file("/proj/src/App/Models/User.cs", "")
            .with_file("/proj/src/App/Models/Order.cs", "")
            .with_file("/proj/src/App/Models/README.md", "")
            .with_file(
                "/proj/src/Shared/Shared.csproj",
                "<Project><PropertyGroup><AssemblyName>Acme.Shared</AssemblyName></PropertyGroup></Project>",
            )
            .with_file("/proj/src/Shared/Text/Slug.cs", "")
            .with_file("/proj/Tools/Format.cs", "");

        let mut resolver = CSharpResolver::new("/proj", Arc::new(fs));
        let files = [
            "/proj/src/App/Program.cs",
            "/proj/src/App/Models/User.cs",
            "/proj/src/App/Models/Order.cs",
            "/proj/src/App/Models/README.md",
            "/proj/src/Shared/Text/Slug.cs",
        ];
        for (i, path) in files.iter().enumerate() {
            resolver.register_file(id(i as u32 + 1), Path::new(path));
        }
        resolver
    }

    #[test]
    fn test_parse_csproj() {
        let info = CsprojInfo::parse(APP_CSPROJ);
        assert!(info.is_sdk_style);
        assert_eq!(info.root_namespace.as_deref(), Some("Acme.App"));
        assert!(info.assembly_name.is_none());
        assert_eq!(info.package_references, vec!["Newtonsoft.Json"]);
        assert_eq!(info.project_references, vec!["../Shared/Shared.csproj"]);
        assert_eq!(info.global_usings, vec!["Acme.App.Models"]);

        let implicit = CsprojInfo::parse("<Project>\n</Project>");
        assert!(!implicit.is_sdk_style);
        assert_eq!(
            implicit.namespace(Path::new("/p/Acme.Tools.csproj")).as_deref(),
            Some("Acme.Tools")
        );
        assert!(implicit.namespace(Path::new("/p/Directory.Build.props")).is_none());
    }

    #[test]
    fn test_project_namespace_maps_to_folder() {
        let mut resolver = project();

        let models = resolver.resolve_import("Acme.App.Models", id(1));
        assert_eq!(models.kind, ResolutionKind::Directory);
        assert_eq!(models.resolved_path, Some(PathBuf::from("/proj/src/App/Models")));
        // Sorted by path, the markdown file left out
        assert_eq!(models.package_files, vec![id(3), id(2)]);
        assert_eq!(models.target_file, Some(id(3)));

        let root = resolver.resolve_import("Acme.App", id(2));
        assert_eq!(root.package_files, vec![id(1)]);
    }

    #[test]
    fn test_referenced_project_uses_assembly_name() {
        let mut resolver = project();
        let namespaces: Vec<&str> = resolver
            .project_namespaces()
            .iter()
            .map(|(ns, _)| ns.as_str())
            .collect();
        assert_eq!(namespaces, vec!["Acme.Shared", "Acme.App"]);

        let text = resolver.resolve_import("Acme.Shared.Text", id(1));
        assert_eq!(text.target_file, Some(id(5)));
    }

    #[test]
    fn test_static_using_resolves_to_enclosing_namespace() {
        let mut resolver = project();
        let user = resolver.resolve_import("Acme.App.Models.User", id(1));
        assert_eq!(user.kind, ResolutionKind::Directory);
        assert_eq!(user.package_files, vec![id(3), id(2)]);
    }

    #[test]
    fn test_unregistered_folder_under_root() {
        let mut resolver = project();
        let tools = resolver.resolve_import("Tools", id(1));
        assert_eq!(tools.kind, ResolutionKind::Directory);
        assert_eq!(tools.target_file, None);
        assert!(!tools.is_external);
    }

    #[test]
    fn test_builtin_packages_and_failures() {
        let mut resolver = project();

        let system = resolver.resolve_import("System.Collections.Generic", id(1));
        assert!(system.is_builtin);
        assert!(resolver.resolve_import("Microsoft.Extensions.Logging", id(1)).is_builtin);

        let json = resolver.resolve_import("Newtonsoft.Json.Linq", id(1));
        assert_eq!(json.kind, ResolutionKind::External);
        assert!(resolver.resolve_import("Serilog.Sinks", id(1)).is_external);

        let missing = resolver.resolve_import("Contoso.Billing", id(1));
        assert_eq!(missing.kind, ResolutionKind::Error);
        assert_eq!(missing.error.as_deref(), Some("namespace not found"));

        assert_eq!(resolver.global_usings(), ["Acme.App.Models".to_string()]);
        assert_eq!(resolver.package_references().collect::<Vec<_>>(), vec!["Newtonsoft.Json"]);

        let stats = resolver.stats();
        assert_eq!(stats.name, "csharp");
        assert_eq!(stats.by_kind["error"], 1);
    }

    #[test]
    fn test_package_reference_prefix_boundary() {
        let fs = MemoryFileSystem::new().with_file(
            "/p/Lib.csproj",
            r#"<Project><ItemGroup><PackageReference Include="Contoso.Data" /></ItemGroup></Project>"#,
        );
        let mut resolver = CSharpResolver::new("/p", Arc::new(fs));
        assert!(resolver.resolve_import("contoso.data.sql", id(1)).is_external);
        assert_eq!(
            resolver.resolve_import("Contoso.DataExtras", id(1)).kind,
            ResolutionKind::Error
        );
    }
}
