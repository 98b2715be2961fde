//! Cross-file linking over the per-file symbol tables.
//!
//! The [`LinkerEngine`] owns the path/id registry, runs extraction for one
//! file at a time, and resolves every import through the resolver serving the
//! file's language. Its state sits behind a single `RwLock`; the incremental
//! engine wraps it and always takes its own lock first.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::extractor::{
    CSharpExtractor, ExtractorRegistry, GoExtractor, JavaScriptExtractor, PhpExtractor,
    PythonExtractor, SymbolExtractor,
};
use crate::paths::normalize_path;
use crate::resolver::{
    CSharpResolver, FileSystem, GoResolver, JavaScriptResolver, ModuleResolver, OsFileSystem,
    PhpResolver, PythonResolver, ResolverRegistry, ResolverStats,
};
use crate::scope::ScopeId;
use crate::symbol_table::SymbolTable;
use crate::types::{
    CompositeSymbolId, FileId, ImportRecord, MAX_FILE_ID, ModuleResolution, ResolutionKind,
    SymbolInfo, SymbolLocation,
};

/// One use of a symbol by another file's import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolReference {
    pub from_file: FileId,
    pub import_local_id: u32,
    pub import_path: String,
    pub location: SymbolLocation,
}

/// Cross-file facts about one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolLink {
    pub symbol: CompositeSymbolId,
    /// Local id of the export record that makes the symbol visible
    pub exported_by: Option<u32>,
    pub references: Vec<SymbolReference>,
}

impl SymbolLink {
    fn new(symbol: CompositeSymbolId) -> Self {
        Self {
            symbol,
            exported_by: None,
            references: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.exported_by.is_none() && self.references.is_empty()
    }
}

/// Resolution of one import record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportLink {
    pub from_file: FileId,
    pub import_local_id: u32,
    pub import_path: String,
    pub target_file: Option<FileId>,
    pub imported_names: Vec<String>,
    pub resolution: ModuleResolution,
    pub is_external: bool,
    /// Next unallocated file id when this link was resolved. Files allocated
    /// at or after it were unknown to the resolver.
    pub registry_generation: u32,
}

impl ImportLink {
    /// Whether a file registered later could change this resolution.
    fn may_resolve_to(&self, file_id: FileId) -> bool {
        !self.resolution.is_builtin && file_id.value() >= self.registry_generation
    }
}

/// Problem found by [`LinkerEngine::validate_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConsistencyIssue {
    /// A path maps to an id whose reverse entry is missing
    MissingReverseEntry { path: PathBuf, file_id: FileId },
    /// The reverse entry for an id points at a different path
    MismatchedReverseEntry {
        file_id: FileId,
        path: PathBuf,
        expected: PathBuf,
    },
    /// An id maps to a path that has no forward entry
    MissingForwardEntry { file_id: FileId, path: PathBuf },
    NoExtractor { path: PathBuf },
    /// A symbol table is stored for an id that is not registered
    OrphanSymbolTable { file_id: FileId },
    /// An import link targets an id that is not registered
    DanglingImportTarget { from_file: FileId, target: FileId },
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingReverseEntry { path, file_id } => {
                write!(f, "{} -> {file_id} has no reverse entry", path.display())
            }
            Self::MismatchedReverseEntry {
                file_id,
                path,
                expected,
            } => write!(
                f,
                "{file_id} maps back to {} instead of {}",
                path.display(),
                expected.display()
            ),
            Self::MissingForwardEntry { file_id, path } => {
                write!(f, "{file_id} -> {} has no forward entry", path.display())
            }
            Self::NoExtractor { path } => write!(f, "no extractor for {}", path.display()),
            Self::OrphanSymbolTable { file_id } => {
                write!(f, "symbol table for unregistered file {file_id}")
            }
            Self::DanglingImportTarget { from_file, target } => {
                write!(f, "import in {from_file} targets unregistered file {target}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkerStats {
    pub files: usize,
    pub symbols: usize,
    pub imports: usize,
    pub exports: usize,
    pub import_links: usize,
    pub unresolved_imports: usize,
    pub symbol_links: usize,
    pub extractors: usize,
    pub resolvers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractorStats {
    pub language: String,
    pub extensions: Vec<String>,
    pub files_parsed: u64,
    pub parse_failures: u64,
    pub symbols_extracted: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct ParseCounter {
    files_parsed: u64,
    parse_failures: u64,
    symbols_extracted: u64,
}

struct LinkerState {
    path_to_id: HashMap<PathBuf, FileId>,
    id_to_path: HashMap<FileId, PathBuf>,
    next_file_id: u32,
    extractors: ExtractorRegistry,
    resolvers: ResolverRegistry,
    symbol_tables: HashMap<FileId, Arc<SymbolTable>>,
    symbol_links: HashMap<CompositeSymbolId, SymbolLink>,
    import_links: HashMap<FileId, Vec<ImportLink>>,
    parse_counters: HashMap<&'static str, ParseCounter>,
}

impl LinkerState {
    fn new() -> Self {
        Self {
            path_to_id: HashMap::new(),
            id_to_path: HashMap::new(),
            next_file_id: 1,
            extractors: ExtractorRegistry::new(),
            resolvers: ResolverRegistry::new(),
            symbol_tables: HashMap::new(),
            symbol_links: HashMap::new(),
            import_links: HashMap::new(),
            parse_counters: HashMap::new(),
        }
    }

    fn sorted_file_ids(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self.id_to_path.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every reference created by `file_id`'s imports.
    fn drop_references_from(&mut self, file_id: FileId) {
        for link in self.symbol_links.values_mut() {
            link.references.retain(|r| r.from_file != file_id);
        }
        self.symbol_links.retain(|_, link| !link.is_empty());
    }

    fn refresh_exports(&mut self, table: &SymbolTable) {
        for link in self.symbol_links.values_mut() {
            if link.symbol.file_id == table.file_id {
                link.exported_by = None;
            }
        }
        for export in table.exports.iter().filter(|e| !e.is_reexport) {
            for symbol in top_level_named(table, &export.local_name) {
                let id = CompositeSymbolId::new(table.file_id, symbol.local_id);
                self.symbol_links
                    .entry(id)
                    .or_insert_with(|| SymbolLink::new(id))
                    .exported_by = Some(export.local_id);
            }
        }
        self.symbol_links.retain(|_, link| !link.is_empty());
    }

    fn resolve(&mut self, language: &str, import_path: &str, from: FileId) -> ModuleResolution {
        self.resolvers
            .resolve(language, import_path, from)
            .unwrap_or_else(|| {
                ModuleResolution::error(import_path, format!("no resolver for language {language}"))
            })
    }

    /// Resolution for speculative checks; resolver stats stay untouched.
    fn lookup(&mut self, language: &str, import_path: &str, from: FileId) -> Option<ModuleResolution> {
        self.resolvers.lookup(language, import_path, from)
    }

    /// Relink one file. Returns the number of import links recorded.
    fn link_file(&mut self, file_id: FileId) -> IndexResult<usize> {
        if !self.id_to_path.contains_key(&file_id) {
            return Err(IndexError::UnknownFileId { id: file_id });
        }

        self.drop_references_from(file_id);
        let Some(table) = self.symbol_tables.get(&file_id).cloned() else {
            self.import_links.remove(&file_id);
            return Ok(0);
        };
        self.refresh_exports(&table);

        let generation = self.next_file_id;
        let mut links = Vec::with_capacity(table.imports.len());
        for import in &table.imports {
            let resolution = self.resolve(&table.language, &import.path, file_id);
            for target in resolution.dependency_targets() {
                if target != file_id {
                    self.link_import_symbols(file_id, import, target);
                }
            }
            links.push(ImportLink {
                from_file: file_id,
                import_local_id: import.local_id,
                import_path: import.path.clone(),
                target_file: resolution.target_file,
                imported_names: import.imported_names.clone(),
                is_external: resolution.is_external,
                resolution,
                registry_generation: generation,
            });
        }

        let count = links.len();
        self.import_links.insert(file_id, links);
        Ok(count)
    }

    /// Add references from `import` to the symbols it names in `target`.
    fn link_import_symbols(&mut self, from: FileId, import: &ImportRecord, target: FileId) {
        let Some(target_table) = self.symbol_tables.get(&target).cloned() else {
            return;
        };

        let mut local_ids = BTreeSet::new();
        let exports = target_table.exports.iter().filter(|e| !e.is_reexport);
        for export in exports {
            let wanted = import.is_namespace
                || (import.is_default && export.is_default)
                || import.imported_names.iter().any(|n| *n == export.exported_name);
            if wanted {
                local_ids.extend(
                    top_level_named(&target_table, &export.local_name).map(|s| s.local_id),
                );
            }
        }

        for local_id in local_ids {
            let id = CompositeSymbolId::new(target, local_id);
            self.symbol_links
                .entry(id)
                .or_insert_with(|| SymbolLink::new(id))
                .references
                .push(SymbolReference {
                    from_file: from,
                    import_local_id: import.local_id,
                    import_path: import.path.clone(),
                    location: import.location,
                });
        }
    }
}

/// Top-level declarations of `name`; nested members never satisfy an export.
fn top_level_named<'a>(table: &'a SymbolTable, name: &str) -> impl Iterator<Item = &'a SymbolInfo> {
    table.symbols_named(name).filter(|symbol| {
        symbol.parent.is_none()
            && table
                .scope(symbol.scope)
                .is_none_or(|scope| scope.parent.is_none_or(|p| p == ScopeId::GLOBAL))
    })
}

pub struct LinkerEngine {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    state: RwLock<LinkerState>,
}

impl LinkerEngine {
    /// Engine over the real filesystem, with no languages registered.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_filesystem(root, Arc::new(OsFileSystem))
    }

    pub fn with_filesystem(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
            state: RwLock::new(LinkerState::new()),
        }
    }

    /// Engine over the real filesystem with every language enabled in `settings`.
    pub fn with_default_languages(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        let engine = Self::new(root);
        engine.register_default_languages(settings);
        engine
    }

    /// Register the built-in extractors and resolvers for the enabled languages.
    pub fn register_default_languages(&self, settings: &Settings) {
        let project_root = settings.project_root_or(&self.root);

        if let Some(go) = settings.enabled_language("go") {
            self.register_extractor(Arc::new(GoExtractor::new()));
            self.register_resolver(Box::new(GoResolver::with_config_files(
                &project_root,
                self.fs.clone(),
                &go.config_files,
            )));
        }

        if let Some(python) = settings.enabled_language("python") {
            self.register_extractor(Arc::new(PythonExtractor::new()));
            self.register_resolver(Box::new(PythonResolver::with_config_files(
                &project_root,
                self.fs.clone(),
                &python.config_files,
            )));
        }

        if let Some(csharp) = settings.enabled_language("csharp") {
            self.register_extractor(Arc::new(CSharpExtractor::new()));
            self.register_resolver(Box::new(CSharpResolver::with_config_files(
                &project_root,
                self.fs.clone(),
                &csharp.config_files,
            )));
        }

        if let Some(php) = settings.enabled_language("php") {
            self.register_extractor(Arc::new(PhpExtractor::new()));
            self.register_resolver(Box::new(PhpResolver::with_config_files(
                &project_root,
                self.fs.clone(),
                &php.config_files,
            )));
        }

        // One resolver serves both dialects
        let mut js_config_files: Vec<String> = Vec::new();
        let mut any_js = false;
        for (tag, extractor) in [
            ("javascript", JavaScriptExtractor::javascript()),
            ("typescript", JavaScriptExtractor::typescript()),
        ] {
            if let Some(config) = settings.enabled_language(tag) {
                any_js = true;
                self.register_extractor(Arc::new(extractor));
                for file in &config.config_files {
                    if !js_config_files.contains(file) {
                        js_config_files.push(file.clone());
                    }
                }
            }
        }
        if any_js {
            self.register_resolver(Box::new(JavaScriptResolver::with_config_files(
                &project_root,
                self.fs.clone(),
                &js_config_files,
            )));
        }

        let mut state = self.state.write();
        for (language, config) in &settings.languages {
            if !config.enabled {
                continue;
            }
            for ext in &config.extensions {
                if !state.extractors.map_extension(ext, language) {
                    tracing::debug!("[linker] no extractor for {language}, ignoring .{ext}");
                }
            }
        }
    }

    pub fn register_extractor(&self, extractor: Arc<dyn SymbolExtractor>) {
        self.state.write().extractors.register(extractor);
    }

    /// Register a resolver and hand it the current registry.
    pub fn register_resolver(&self, mut resolver: Box<dyn ModuleResolver>) {
        let mut state = self.state.write();
        resolver.set_file_registry(&state.path_to_id);
        state.resolvers.register(resolver);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filesystem(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    pub fn normalize(&self, path: &Path) -> PathBuf {
        normalize_path(&self.root, path)
    }

    /// Id for `path`, allocating and announcing it to the resolvers on first sight.
    pub fn get_or_create_file_id(&self, path: &Path) -> IndexResult<FileId> {
        let path = self.normalize(path);
        if let Some(id) = self.state.read().path_to_id.get(&path) {
            return Ok(*id);
        }

        let mut state = self.state.write();
        // Another writer may have won the race between the two locks
        if let Some(id) = state.path_to_id.get(&path) {
            return Ok(*id);
        }

        let file_id = FileId::new(state.next_file_id)
            .filter(|id| id.value() <= MAX_FILE_ID)
            .ok_or(IndexError::TooManyFiles { limit: MAX_FILE_ID })?;
        state.next_file_id += 1;

        state.path_to_id.insert(path.clone(), file_id);
        state.id_to_path.insert(file_id, path.clone());
        state.resolvers.register_file(file_id, &path);
        tracing::debug!("[linker] registered {} as {file_id}", path.display());

        Ok(file_id)
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        let path = self.normalize(path);
        self.state.read().path_to_id.get(&path).copied()
    }

    pub fn file_path(&self, file_id: FileId) -> Option<PathBuf> {
        self.state.read().id_to_path.get(&file_id).cloned()
    }

    /// Registered ids, ascending
    pub fn file_ids(&self) -> Vec<FileId> {
        self.state.read().sorted_file_ids()
    }

    /// Registered files, ascending by id
    pub fn files(&self) -> Vec<(FileId, PathBuf)> {
        let state = self.state.read();
        state
            .sorted_file_ids()
            .into_iter()
            .filter_map(|id| state.id_to_path.get(&id).map(|p| (id, p.clone())))
            .collect()
    }

    /// Whether some registered extractor handles `path`.
    pub fn supports(&self, path: &Path) -> bool {
        self.state.read().extractors.extractor_for_file(path).is_some()
    }

    pub fn supported_languages(&self) -> Vec<&'static str> {
        self.state.read().extractors.supported_languages()
    }

    /// Parse and extract `path`, replacing any table stored for its id.
    ///
    /// Parsing runs without holding the engine lock.
    pub fn index_file(&self, path: &Path, content: &[u8]) -> IndexResult<FileId> {
        let file_id = self.get_or_create_file_id(path)?;
        let path = self.normalize(path);

        let extractor = self
            .state
            .read()
            .extractors
            .extractor_for_file(&path)
            .ok_or_else(|| IndexError::NoExtractor { path: path.clone() })?;
        let language = extractor.language();

        let extracted = parse_and_extract(extractor.as_ref(), &path, file_id, content);

        let mut state = self.state.write();
        let counter = state.parse_counters.entry(language).or_default();
        let table = match extracted {
            Ok(table) => {
                counter.files_parsed += 1;
                counter.symbols_extracted += table.symbols.len() as u64;
                table
            }
            Err(e) => {
                counter.parse_failures += 1;
                return Err(e);
            }
        };

        tracing::debug!(
            "[linker] indexed {} ({language}): {} symbols, {} imports, {} exports",
            path.display(),
            table.symbols.len(),
            table.imports.len(),
            table.exports.len()
        );
        state.symbol_tables.insert(file_id, Arc::new(table));

        Ok(file_id)
    }

    /// Relink every stored table from scratch. Returns the number of import links.
    pub fn link_symbols(&self) -> usize {
        let mut state = self.state.write();
        let registry = state.path_to_id.clone();
        state.resolvers.set_file_registry(&registry);
        state.symbol_links.clear();
        state.import_links.clear();

        let mut total = 0;
        for file_id in state.sorted_file_ids() {
            match state.link_file(file_id) {
                Ok(count) => total += count,
                Err(e) => tracing::warn!("[linker] failed to link {file_id}: {e}"),
            }
        }

        tracing::info!(
            "[linker] linked {} files: {total} import links, {} symbol links",
            state.id_to_path.len(),
            state.symbol_links.len()
        );
        total
    }

    /// Re-resolve the imports of one file. Its symbols are not re-extracted.
    pub fn link_file(&self, file_id: FileId) -> IndexResult<usize> {
        self.state.write().link_file(file_id)
    }

    /// Files with imports that now resolve to `file_id` but were resolved
    /// before it was registered.
    pub fn files_awaiting(&self, file_id: FileId) -> Vec<FileId> {
        let mut state = self.state.write();
        let stale: Vec<(FileId, String)> = state
            .import_links
            .iter()
            .filter(|(from, _)| **from != file_id)
            .flat_map(|(from, links)| {
                links
                    .iter()
                    .filter(|link| link.may_resolve_to(file_id))
                    .map(move |link| (*from, link.import_path.clone()))
            })
            .collect();

        let mut awaiting = BTreeSet::new();
        for (from, import_path) in stale {
            if awaiting.contains(&from) {
                continue;
            }
            let Some(language) = state.symbol_tables.get(&from).map(|t| t.language.clone())
            else {
                continue;
            };
            let Some(resolution) = state.lookup(&language, &import_path, from) else {
                continue;
            };
            if resolution.dependency_targets().contains(&file_id) {
                awaiting.insert(from);
            }
        }
        awaiting.into_iter().collect()
    }

    pub fn symbol_table(&self, file_id: FileId) -> Option<Arc<SymbolTable>> {
        self.state.read().symbol_tables.get(&file_id).cloned()
    }

    /// Symbols of one file, ascending by local id
    pub fn symbols_in_file(&self, file_id: FileId) -> Vec<SymbolInfo> {
        let Some(table) = self.symbol_table(file_id) else {
            return Vec::new();
        };
        table
            .symbol_ids()
            .into_iter()
            .filter_map(|id| table.symbol(id).cloned())
            .collect()
    }

    pub fn symbol_definition(&self, id: CompositeSymbolId) -> IndexResult<SymbolInfo> {
        self.state
            .read()
            .symbol_tables
            .get(&id.file_id)
            .and_then(|table| table.symbol(id.local_id).cloned())
            .ok_or(IndexError::SymbolNotFound { id })
    }

    pub fn symbol_references(&self, id: CompositeSymbolId) -> Vec<SymbolReference> {
        self.state
            .read()
            .symbol_links
            .get(&id)
            .map(|link| link.references.clone())
            .unwrap_or_default()
    }

    pub fn symbol_link(&self, id: CompositeSymbolId) -> Option<SymbolLink> {
        self.state.read().symbol_links.get(&id).cloned()
    }

    pub fn import_links(&self, file_id: FileId) -> Vec<ImportLink> {
        self.state
            .read()
            .import_links
            .get(&file_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Internal files `file_id` imports, ascending, itself excluded.
    pub fn dependency_targets(&self, file_id: FileId) -> Vec<FileId> {
        let state = self.state.read();
        let mut targets = BTreeSet::new();
        for link in state.import_links.get(&file_id).into_iter().flatten() {
            if link.is_external {
                continue;
            }
            targets.extend(
                link.resolution
                    .dependency_targets()
                    .into_iter()
                    .filter(|t| *t != file_id),
            );
        }
        targets.into_iter().collect()
    }

    /// Forget the link records of `ids`. Returns how many existed.
    pub fn drop_symbol_links(&self, ids: &[CompositeSymbolId]) -> usize {
        let mut state = self.state.write();
        ids.iter()
            .filter(|id| state.symbol_links.remove(*id).is_some())
            .count()
    }

    /// Purge a file: table, links in both directions, registry and resolver entries.
    ///
    /// The id is retired, never handed out again.
    pub fn remove_file(&self, file_id: FileId) -> Option<Arc<SymbolTable>> {
        let mut state = self.state.write();
        let path = state.id_to_path.remove(&file_id)?;
        state.path_to_id.remove(&path);
        state.resolvers.unregister_file(file_id);

        state.import_links.remove(&file_id);
        state.symbol_links.retain(|id, _| id.file_id != file_id);
        state.drop_references_from(file_id);

        let table = state.symbol_tables.remove(&file_id);
        tracing::debug!("[linker] removed {} ({file_id})", path.display());
        table
    }

    /// Check the registry bijection and extractor coverage.
    pub fn validate_consistency(&self) -> Vec<ConsistencyIssue> {
        let state = self.state.read();
        let mut issues = Vec::new();

        let mut forward: Vec<(&PathBuf, &FileId)> = state.path_to_id.iter().collect();
        forward.sort();
        for (path, id) in forward {
            match state.id_to_path.get(id) {
                None => issues.push(ConsistencyIssue::MissingReverseEntry {
                    path: path.clone(),
                    file_id: *id,
                }),
                Some(back) if back != path => {
                    issues.push(ConsistencyIssue::MismatchedReverseEntry {
                        file_id: *id,
                        path: back.clone(),
                        expected: path.clone(),
                    })
                }
                Some(_) => {}
            }
            if state.extractors.extractor_for_file(path).is_none() {
                issues.push(ConsistencyIssue::NoExtractor { path: path.clone() });
            }
        }

        for id in state.sorted_file_ids() {
            if let Some(path) = state.id_to_path.get(&id)
                && !state.path_to_id.contains_key(path)
            {
                issues.push(ConsistencyIssue::MissingForwardEntry {
                    file_id: id,
                    path: path.clone(),
                });
            }
        }

        let mut tables: Vec<FileId> = state.symbol_tables.keys().copied().collect();
        tables.sort_unstable();
        for id in tables {
            if !state.id_to_path.contains_key(&id) {
                issues.push(ConsistencyIssue::OrphanSymbolTable { file_id: id });
            }
        }

        let mut sources: Vec<FileId> = state.import_links.keys().copied().collect();
        sources.sort_unstable();
        for from in sources {
            let targets: BTreeSet<FileId> = state.import_links[&from]
                .iter()
                .flat_map(|link| link.resolution.dependency_targets())
                .collect();
            for target in targets {
                if !state.id_to_path.contains_key(&target) {
                    issues.push(ConsistencyIssue::DanglingImportTarget {
                        from_file: from,
                        target,
                    });
                }
            }
        }

        issues
    }

    pub fn stats(&self) -> LinkerStats {
        let state = self.state.read();
        let tables = state.symbol_tables.values();
        let (symbols, imports, exports) = tables.fold((0, 0, 0), |(s, i, e), table| {
            (
                s + table.symbols.len(),
                i + table.imports.len(),
                e + table.exports.len(),
            )
        });
        let links = state.import_links.values().flatten();
        let (import_links, unresolved_imports) = links.fold((0, 0), |(total, bad), link| {
            (total + 1, bad + usize::from(link.resolution.kind.is_unresolved()))
        });

        LinkerStats {
            files: state.id_to_path.len(),
            symbols,
            imports,
            exports,
            import_links,
            unresolved_imports,
            symbol_links: state.symbol_links.len(),
            extractors: state.extractors.len(),
            resolvers: state.resolvers.len(),
        }
    }

    pub fn extractor_stats(&self) -> Vec<ExtractorStats> {
        let state = self.state.read();
        state
            .extractors
            .supported_languages()
            .into_iter()
            .filter_map(|language| {
                let extractor = state.extractors.extractor_for_language(language)?;
                let counter = state
                    .parse_counters
                    .get(language)
                    .copied()
                    .unwrap_or_default();
                Some(ExtractorStats {
                    language: language.to_string(),
                    extensions: extractor.extensions().iter().map(|e| e.to_string()).collect(),
                    files_parsed: counter.files_parsed,
                    parse_failures: counter.parse_failures,
                    symbols_extracted: counter.symbols_extracted,
                })
            })
            .collect()
    }

    pub fn resolver_stats(&self) -> Vec<ResolverStats> {
        self.state.read().resolvers.stats()
    }

    /// Resolution kind counts over every recorded import link.
    pub fn resolution_summary(&self) -> HashMap<ResolutionKind, usize> {
        let state = self.state.read();
        let mut summary = HashMap::new();
        for link in state.import_links.values().flatten() {
            *summary.entry(link.resolution.kind).or_insert(0) += 1;
        }
        summary
    }
}

fn parse_and_extract(
    extractor: &dyn SymbolExtractor,
    path: &Path,
    file_id: FileId,
    content: &[u8],
) -> IndexResult<SymbolTable> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&extractor.grammar(path))
        .map_err(|e| IndexError::ParserSetup {
            language: extractor.language().to_string(),
            reason: e.to_string(),
        })?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| IndexError::ParseFailed {
            path: path.to_path_buf(),
        })?;

    extractor
        .extract_symbols(file_id, content, Some(&tree))
        .map_err(|source| IndexError::Extraction {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryFileSystem;

    const ROOT: &str = "/proj";

    fn go_engine(files: &[(&str, &str)]) -> LinkerEngine {
        let mut fs = MemoryFileSystem::new().with_file("/proj/go.mod", "module example.com/app\n");
        for (path, content) in files {
            fs = fs.with_file(format!("{ROOT}/{path}"), *content);
        }
        let engine = LinkerEngine::with_filesystem(ROOT, Arc::new(fs));
        engine.register_default_languages(&Settings::default());
        engine
    }

    fn index_all(engine: &LinkerEngine, files: &[(&str, &str)]) -> Vec<FileId> {
        files
            .iter()
            .map(|(path, content)| engine.index_file(Path::new(path), content.as_bytes()).unwrap())
            .collect()
    }

    const UTIL_GO: &str = "package util\n\nfunc Helper() int { return 1 }\n\nfunc private() {}\n";
    const MAIN_GO: &str = "package main\n\nimport (\n\t\"fmt\"\n\t\"example.com/app/util\"\n)\n\nfunc main() { fmt.Println(util.Helper()) }\n";

    #[test]
    fn test_file_ids_are_stable_and_never_reused() {
        let engine = go_engine(&[]);
        let a = engine.get_or_create_file_id(Path::new("a.go")).unwrap();
        let b = engine.get_or_create_file_id(Path::new("/proj/./sub/../b.go")).unwrap();
        assert_eq!((a.value(), b.value()), (1, 2));
        assert_eq!(engine.get_or_create_file_id(Path::new("/proj/a.go")).unwrap(), a);
        assert_eq!(engine.file_path(b), Some(PathBuf::from("/proj/b.go")));

        engine.remove_file(a);
        assert_eq!(engine.file_id(Path::new("a.go")), None);
        let again = engine.get_or_create_file_id(Path::new("a.go")).unwrap();
        assert_eq!(again.value(), 3);
    }

    #[test]
    fn test_index_file_requires_extractor() {
        let engine = go_engine(&[]);
        let err = engine
            .index_file(Path::new("notes.txt"), b"hello")
            .unwrap_err();
        assert!(matches!(err, IndexError::NoExtractor { .. }));
    }

    #[test]
    fn test_link_go_package_import() {
        let files = [("util/util.go", UTIL_GO), ("main.go", MAIN_GO)];
        let engine = go_engine(&files);
        let ids = index_all(&engine, &files);
        let (util, main) = (ids[0], ids[1]);

        assert_eq!(engine.link_symbols(), 2);

        let links = engine.import_links(main);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].resolution.kind, ResolutionKind::Builtin);
        assert_eq!(links[1].resolution.kind, ResolutionKind::Module);
        assert_eq!(links[1].target_file, Some(util));
        assert_eq!(engine.dependency_targets(main), vec![util]);
        assert!(engine.dependency_targets(util).is_empty());

        let helper = engine
            .symbols_in_file(util)
            .into_iter()
            .find(|s| s.name == "Helper")
            .unwrap();
        let helper_id = CompositeSymbolId::new(util, helper.local_id);
        let refs = engine.symbol_references(helper_id);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].from_file, main);
        assert_eq!(refs[0].import_path, "example.com/app/util");
        assert!(engine.symbol_link(helper_id).unwrap().exported_by.is_some());

        // Unexported functions are not reachable through the package import
        let private = engine
            .symbols_in_file(util)
            .into_iter()
            .find(|s| s.name == "private")
            .unwrap();
        assert!(
            engine
                .symbol_references(CompositeSymbolId::new(util, private.local_id))
                .is_empty()
        );
    }

    #[test]
    fn test_link_file_replaces_own_references() {
        let files = [("util/util.go", UTIL_GO), ("main.go", MAIN_GO)];
        let engine = go_engine(&files);
        let ids = index_all(&engine, &files);
        engine.link_symbols();

        engine.link_file(ids[1]).unwrap();
        engine.link_file(ids[1]).unwrap();

        let stats = engine.stats();
        let helper = engine
            .symbols_in_file(ids[0])
            .into_iter()
            .find(|s| s.name == "Helper")
            .unwrap();
        assert_eq!(
            engine
                .symbol_references(CompositeSymbolId::new(ids[0], helper.local_id))
                .len(),
            1
        );
        assert_eq!(stats.import_links, 2);
    }

    #[test]
    fn test_files_awaiting_new_file() {
        let engine = go_engine(&[("main.go", MAIN_GO)]);
        let main = engine
            .index_file(Path::new("main.go"), MAIN_GO.as_bytes())
            .unwrap();
        engine.link_file(main).unwrap();
        assert_eq!(
            engine.import_links(main)[1].resolution.kind,
            ResolutionKind::NotFound
        );

        let util = engine
            .index_file(Path::new("util/util.go"), UTIL_GO.as_bytes())
            .unwrap();
        let counted = engine.resolver_stats()[0].resolutions;
        assert_eq!(engine.files_awaiting(util), vec![main]);
        // The re-check is not counted as a resolution
        assert_eq!(engine.resolver_stats()[0].resolutions, counted);

        engine.link_file(main).unwrap();
        assert_eq!(engine.resolver_stats()[0].resolutions, counted + 2);
        assert_eq!(engine.dependency_targets(main), vec![util]);
        // Links resolved after registration are never re-checked
        assert!(engine.files_awaiting(util).is_empty());
    }

    #[test]
    fn test_missing_resolver_records_error_link() {
        let engine = LinkerEngine::with_filesystem(ROOT, Arc::new(MemoryFileSystem::new()));
        engine.register_extractor(Arc::new(PythonExtractor::new()));
        let id = engine
            .index_file(Path::new("app.py"), b"import os\n")
            .unwrap();
        engine.link_file(id).unwrap();

        let links = engine.import_links(id);
        assert_eq!(links[0].resolution.kind, ResolutionKind::Error);
        assert!(links[0].resolution.error.as_deref().unwrap().contains("python"));
        assert_eq!(engine.stats().unresolved_imports, 1);
    }

    #[test]
    fn test_remove_file_purges_links() {
        let files = [("util/util.go", UTIL_GO), ("main.go", MAIN_GO)];
        let engine = go_engine(&files);
        let ids = index_all(&engine, &files);
        engine.link_symbols();

        let removed = engine.remove_file(ids[0]).unwrap();
        assert!(removed.symbols_by_name.contains_key("Helper"));
        assert!(engine.symbol_table(ids[0]).is_none());
        assert!(engine.remove_file(ids[0]).is_none());

        for local in removed.symbol_ids() {
            assert!(engine.symbol_link(CompositeSymbolId::new(ids[0], local)).is_none());
        }
        // main still carries the stale link until it is relinked
        assert_eq!(
            engine.validate_consistency(),
            vec![ConsistencyIssue::DanglingImportTarget {
                from_file: ids[1],
                target: ids[0],
            }]
        );
        engine.link_file(ids[1]).unwrap();
        assert!(engine.validate_consistency().is_empty());
    }

    #[test]
    fn test_validate_consistency_flags_unsupported_paths() {
        let engine = go_engine(&[]);
        engine.get_or_create_file_id(Path::new("README.md")).unwrap();
        assert_eq!(
            engine.validate_consistency(),
            vec![ConsistencyIssue::NoExtractor {
                path: PathBuf::from("/proj/README.md"),
            }]
        );
    }

    #[test]
    fn test_symbol_definition_lookup() {
        let engine = go_engine(&[]);
        let id = engine
            .index_file(Path::new("util/util.go"), UTIL_GO.as_bytes())
            .unwrap();
        let first = engine.symbols_in_file(id)[0].clone();
        assert_eq!(first.local_id, 1);
        assert_eq!(
            engine
                .symbol_definition(CompositeSymbolId::new(id, first.local_id))
                .unwrap(),
            first
        );
        assert!(matches!(
            engine.symbol_definition(CompositeSymbolId::new(id, 999)),
            Err(IndexError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn test_stats_and_extractor_counters() {
        let files = [("util/util.go", UTIL_GO), ("main.go", MAIN_GO)];
        let engine = go_engine(&files);
        index_all(&engine, &files);
        engine.link_symbols();

        let stats = engine.stats();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.extractors, 6);
        assert_eq!(stats.resolvers, 5);
        assert_eq!(stats.import_links, 2);

        let go = engine
            .extractor_stats()
            .into_iter()
            .find(|s| s.language == "go")
            .unwrap();
        assert_eq!(go.files_parsed, 2);
        assert_eq!(go.parse_failures, 0);

        let summary = engine.resolution_summary();
        assert_eq!(summary.get(&ResolutionKind::Builtin), Some(&1));
        assert_eq!(summary.get(&ResolutionKind::Module), Some(&1));
    }

    #[test]
    fn test_disabled_languages_are_skipped() {
        let mut settings = Settings::default();
        settings.languages["python"].enabled = false;
        settings.languages["typescript"].enabled = false;
        let engine = LinkerEngine::with_filesystem(ROOT, Arc::new(MemoryFileSystem::new()));
        engine.register_default_languages(&settings);

        assert_eq!(
            engine.supported_languages(),
            vec!["go", "csharp", "php", "javascript"]
        );
        assert!(!engine.supports(Path::new("a.py")));
        assert!(engine.supports(Path::new("a.mjs")));
        assert!(engine.supports(Path::new("Program.cs")));
        assert!(engine.supports(Path::new("index.php")));
    }
}
