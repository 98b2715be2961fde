//! Incremental updates with dependency tracking and cascading relinks.
//!
//! The engine keeps content hashes and a bidirectional import graph on top of
//! a [`LinkerEngine`]. Every public mutation queues work in `pending_updates`
//! and drains it in waves: a wave is the whole pending set, and the files that
//! depend on anything touched in it form the next wave. Draining stops when
//! nothing is pending, or fails with [`IndexError::CascadeOverflow`] after
//! `max_cascade_depth` waves, which is how import cycles terminate.
//!
//! Lock order: the incremental state lock is always taken first, then the
//! linker's own lock inside each linker call.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::linker::LinkerEngine;
use crate::types::{CompositeSymbolId, FileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateKind {
    Added,
    Modified,
    Removed,
    /// Relink only; a dependency changed but the file did not
    Cascade,
}

/// Outcome of one update call, accumulated over every wave.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateResult {
    /// Files re-extracted because their content changed
    pub updated_files: Vec<FileId>,
    /// Files relinked because a dependency changed
    pub affected_files: Vec<FileId>,
    pub removed_files: Vec<FileId>,
    pub failed_files: Vec<(FileId, String)>,
    pub added_symbols: Vec<CompositeSymbolId>,
    pub removed_symbols: Vec<CompositeSymbolId>,
    /// Import links recomputed
    pub modified_links: usize,
    /// Waves processed
    pub cascade_depth: usize,
    pub duration: Duration,
}

impl UpdateResult {
    /// Whether the call changed nothing.
    pub fn is_noop(&self) -> bool {
        self.updated_files.is_empty()
            && self.affected_files.is_empty()
            && self.removed_files.is_empty()
            && self.failed_files.is_empty()
    }

    fn mark_affected(&mut self, file_id: FileId) {
        if !self.affected_files.contains(&file_id) {
            self.affected_files.push(file_id);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncrementalStats {
    pub tracked_files: usize,
    pub dependency_edges: usize,
    pub files_with_dependents: usize,
    pub pending_updates: usize,
    pub max_cascade_depth: usize,
}

/// Broken half-edge found by [`IncrementalEngine::check_graph_symmetry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GraphIssue {
    /// `file` imports `dependency`, but `dependency` does not list `file` as dependent
    MissingDependent { file: FileId, dependency: FileId },
    /// `file` lists `dependent`, but `dependent` does not import `file`
    MissingDependency { file: FileId, dependent: FileId },
    SelfEdge { file: FileId },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependent { file, dependency } => {
                write!(f, "{file} imports {dependency} but is not among its dependents")
            }
            Self::MissingDependency { file, dependent } => {
                write!(f, "{dependent} is listed as dependent of {file} but does not import it")
            }
            Self::SelfEdge { file } => write!(f, "{file} depends on itself"),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingUpdate {
    kind: UpdateKind,
    /// New content and its digest, for Added and Modified
    content: Option<(Vec<u8>, String)>,
}

impl PendingUpdate {
    fn index(kind: UpdateKind, content: &[u8], hash: String) -> Self {
        Self {
            kind,
            content: Some((content.to_vec(), hash)),
        }
    }

    fn of(kind: UpdateKind) -> Self {
        Self {
            kind,
            content: None,
        }
    }
}

#[derive(Default)]
struct IncrementalState {
    file_hashes: HashMap<FileId, String>,
    file_timestamps: HashMap<FileId, DateTime<Utc>>,
    import_graph: HashMap<FileId, BTreeSet<FileId>>,
    file_dependents: HashMap<FileId, BTreeSet<FileId>>,
    pending_updates: BTreeMap<FileId, PendingUpdate>,
}

impl IncrementalState {
    fn dependents_of(&self, file_id: FileId) -> BTreeSet<FileId> {
        self.file_dependents
            .get(&file_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace `file_id`'s outgoing edges, keeping the inverse map in step.
    fn set_dependencies(&mut self, file_id: FileId, dependencies: BTreeSet<FileId>) {
        let old = self
            .import_graph
            .insert(file_id, dependencies.clone())
            .unwrap_or_default();

        for gone in old.difference(&dependencies) {
            if let Some(dependents) = self.file_dependents.get_mut(gone) {
                dependents.remove(&file_id);
                if dependents.is_empty() {
                    self.file_dependents.remove(gone);
                }
            }
        }
        for added in dependencies.difference(&old) {
            self.file_dependents
                .entry(*added)
                .or_default()
                .insert(file_id);
        }
    }

    /// Drop every edge touching `file_id`, scanning all lists in both maps.
    fn purge_file(&mut self, file_id: FileId) {
        self.file_hashes.remove(&file_id);
        self.file_timestamps.remove(&file_id);
        self.import_graph.remove(&file_id);
        self.file_dependents.remove(&file_id);

        for dependencies in self.import_graph.values_mut() {
            dependencies.remove(&file_id);
        }
        for dependents in self.file_dependents.values_mut() {
            dependents.remove(&file_id);
        }
        self.file_dependents.retain(|_, dependents| !dependents.is_empty());
    }
}

/// Lower-hex SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

pub struct IncrementalEngine {
    linker: LinkerEngine,
    max_cascade_depth: usize,
    state: RwLock<IncrementalState>,
}

impl IncrementalEngine {
    pub fn new(linker: LinkerEngine, max_cascade_depth: usize) -> Self {
        Self {
            linker,
            max_cascade_depth: max_cascade_depth.max(1),
            state: RwLock::new(IncrementalState::default()),
        }
    }

    /// Engine over the real filesystem with the languages enabled in `settings`.
    pub fn from_settings(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self::new(
            LinkerEngine::with_default_languages(root, settings),
            settings.indexing.max_cascade_depth,
        )
    }

    pub fn linker(&self) -> &LinkerEngine {
        &self.linker
    }

    pub fn max_cascade_depth(&self) -> usize {
        self.max_cascade_depth
    }

    /// Index new or changed content for `path` and cascade to its dependents.
    ///
    /// Content identical to the last successful update returns an empty result.
    pub fn update_file(&self, path: &Path, content: &[u8]) -> IndexResult<UpdateResult> {
        let started = Instant::now();
        let mut state = self.state.write();

        if !self.linker.supports(path) {
            return Err(IndexError::NoExtractor {
                path: self.linker.normalize(path),
            });
        }

        let hash = content_hash(content);
        let previous = self
            .linker
            .file_id(path)
            .and_then(|id| state.file_hashes.get(&id));
        let kind = match previous {
            Some(old) if *old == hash => {
                tracing::debug!("[incremental] {} unchanged", path.display());
                return Ok(UpdateResult {
                    duration: started.elapsed(),
                    ..UpdateResult::default()
                });
            }
            Some(_) => UpdateKind::Modified,
            None => UpdateKind::Added,
        };

        let file_id = self.linker.get_or_create_file_id(path)?;
        state
            .pending_updates
            .insert(file_id, PendingUpdate::index(kind, content, hash));

        self.drain(&mut state, started)
    }

    /// Remove `path` from the index and cascade to the files that imported it.
    pub fn remove_file(&self, path: &Path) -> IndexResult<UpdateResult> {
        let started = Instant::now();
        let mut state = self.state.write();

        let file_id = self
            .linker
            .file_id(path)
            .ok_or_else(|| IndexError::UnknownFile {
                path: self.linker.normalize(path),
            })?;
        state
            .pending_updates
            .insert(file_id, PendingUpdate::of(UpdateKind::Removed));

        self.drain(&mut state, started)
    }

    /// Apply many changes as one first wave.
    ///
    /// Unchanged files are skipped and unsupported paths are ignored. Every
    /// new path is registered before the first wave runs, so files in the
    /// batch resolve against each other directly.
    pub fn batch_update(&self, files: &[(PathBuf, Vec<u8>)]) -> IndexResult<UpdateResult> {
        let started = Instant::now();
        let mut state = self.state.write();

        let mut changed = Vec::new();
        for (path, content) in files {
            if !self.linker.supports(path) {
                tracing::debug!("[incremental] skipping unsupported {}", path.display());
                continue;
            }
            let hash = content_hash(content);
            let previous = self
                .linker
                .file_id(path)
                .and_then(|id| state.file_hashes.get(&id));
            let kind = match previous {
                Some(old) if *old == hash => continue,
                Some(_) => UpdateKind::Modified,
                None => UpdateKind::Added,
            };
            changed.push((path, content, hash, kind));
        }

        let mut queued = Vec::with_capacity(changed.len());
        for (path, _, _, _) in &changed {
            queued.push(self.linker.get_or_create_file_id(path)?);
        }
        for (file_id, (_, content, hash, kind)) in queued.into_iter().zip(changed) {
            state
                .pending_updates
                .insert(file_id, PendingUpdate::index(kind, content, hash));
        }

        crate::log_event!(
            "incremental",
            "batch",
            "{} files, {} changed",
            files.len(),
            state.pending_updates.len()
        );
        self.drain(&mut state, started)
    }

    fn drain(&self, state: &mut IncrementalState, started: Instant) -> IndexResult<UpdateResult> {
        let mut result = UpdateResult::default();

        while !state.pending_updates.is_empty() {
            if result.cascade_depth >= self.max_cascade_depth {
                let dropped = std::mem::take(&mut state.pending_updates);
                tracing::warn!(
                    "[incremental] cascade exceeded {} waves, dropping {} pending updates: {:?}",
                    self.max_cascade_depth,
                    dropped.len(),
                    dropped.keys().collect::<Vec<_>>()
                );
                result.duration = started.elapsed();
                return Err(IndexError::CascadeOverflow {
                    limit: self.max_cascade_depth,
                    partial: Box::new(result),
                });
            }

            result.cascade_depth += 1;
            let wave = std::mem::take(&mut state.pending_updates);
            crate::debug_event!(
                "incremental",
                format!("wave {}", result.cascade_depth),
                "{} files",
                wave.len()
            );

            let next = self.process_wave(state, &wave, &mut result);
            for file_id in next {
                state
                    .pending_updates
                    .entry(file_id)
                    .or_insert_with(|| PendingUpdate::of(UpdateKind::Cascade));
            }
        }

        result.duration = started.elapsed();
        crate::log_event!(
            "incremental",
            "drained",
            "{} updated, {} relinked, {} removed, {} failed in {} waves ({:?})",
            result.updated_files.len(),
            result.affected_files.len(),
            result.removed_files.len(),
            result.failed_files.len(),
            result.cascade_depth,
            result.duration
        );
        Ok(result)
    }

    /// Run one wave and return the files scheduled for the next.
    ///
    /// Removals run first and every changed file is extracted before any file
    /// of the wave is linked, so files changed together see each other's tables.
    fn process_wave(
        &self,
        state: &mut IncrementalState,
        wave: &BTreeMap<FileId, PendingUpdate>,
        result: &mut UpdateResult,
    ) -> BTreeSet<FileId> {
        let dependents: BTreeMap<FileId, BTreeSet<FileId>> = wave
            .keys()
            .map(|id| (*id, state.dependents_of(*id)))
            .collect();
        let mut touched: BTreeSet<FileId> = BTreeSet::new();
        let mut awaiting: BTreeSet<FileId> = BTreeSet::new();

        for (file_id, update) in wave {
            if update.kind == UpdateKind::Removed {
                self.apply_removal(state, *file_id, result);
                touched.insert(*file_id);
            }
        }

        let mut extracted = Vec::new();
        for (file_id, update) in wave {
            let Some((content, hash)) = &update.content else {
                continue;
            };
            if let Some(old_ids) = self.extract(*file_id, content, result) {
                extracted.push((*file_id, update.kind, hash.clone(), old_ids));
            }
        }

        for (file_id, kind, hash, old_ids) in extracted {
            self.finish_update(state, file_id, hash, old_ids, result);
            touched.insert(file_id);
            if kind == UpdateKind::Added {
                awaiting.extend(self.linker.files_awaiting(file_id));
            }
        }

        for (file_id, update) in wave {
            if update.kind == UpdateKind::Cascade && self.relink(state, *file_id, result) {
                touched.insert(*file_id);
            }
        }

        let mut next: BTreeSet<FileId> = touched
            .iter()
            .filter_map(|id| dependents.get(id))
            .flatten()
            .copied()
            .collect();
        next.extend(awaiting);
        next.retain(|id| !wave.contains_key(id) && self.linker.file_path(*id).is_some());
        next
    }

    /// Re-extract one file. Returns its previous symbol ids, or `None` after
    /// recording a failure.
    fn extract(
        &self,
        file_id: FileId,
        content: &[u8],
        result: &mut UpdateResult,
    ) -> Option<BTreeSet<CompositeSymbolId>> {
        let Some(path) = self.linker.file_path(file_id) else {
            result
                .failed_files
                .push((file_id, IndexError::UnknownFileId { id: file_id }.to_string()));
            return None;
        };

        let old_ids: BTreeSet<CompositeSymbolId> = self
            .linker
            .symbol_table(file_id)
            .map(|table| table.composite_ids().into_iter().collect())
            .unwrap_or_default();

        match self.linker.index_file(&path, content) {
            Ok(_) => Some(old_ids),
            Err(e) => {
                tracing::warn!("[incremental] failed to index {}: {e}", path.display());
                result.failed_files.push((file_id, e.to_string()));
                None
            }
        }
    }

    /// Link a freshly extracted file, record its hash and diff its symbols.
    fn finish_update(
        &self,
        state: &mut IncrementalState,
        file_id: FileId,
        hash: String,
        old_ids: BTreeSet<CompositeSymbolId>,
        result: &mut UpdateResult,
    ) {
        match self.linker.link_file(file_id) {
            Ok(count) => result.modified_links += count,
            Err(e) => tracing::warn!("[incremental] failed to link {file_id}: {e}"),
        }
        state.file_hashes.insert(file_id, hash);
        state.file_timestamps.insert(file_id, Utc::now());

        let new_ids: BTreeSet<CompositeSymbolId> = self
            .linker
            .symbol_table(file_id)
            .map(|table| table.composite_ids().into_iter().collect())
            .unwrap_or_default();
        let removed: Vec<CompositeSymbolId> = old_ids.difference(&new_ids).copied().collect();
        result
            .added_symbols
            .extend(new_ids.difference(&old_ids).copied());
        self.linker.drop_symbol_links(&removed);
        result.removed_symbols.extend(removed);

        self.update_dependency_graph(state, file_id);
        result.updated_files.push(file_id);
    }

    fn relink(&self, state: &mut IncrementalState, file_id: FileId, result: &mut UpdateResult) -> bool {
        match self.linker.link_file(file_id) {
            Ok(count) => {
                result.modified_links += count;
                self.update_dependency_graph(state, file_id);
                result.mark_affected(file_id);
                true
            }
            // Removed while the cascade was pending
            Err(IndexError::UnknownFileId { .. }) => false,
            Err(e) => {
                result.failed_files.push((file_id, e.to_string()));
                false
            }
        }
    }

    fn apply_removal(&self, state: &mut IncrementalState, file_id: FileId, result: &mut UpdateResult) {
        if let Some(table) = self.linker.remove_file(file_id) {
            result.removed_symbols.extend(table.composite_ids());
        }
        state.purge_file(file_id);
        result.removed_files.push(file_id);
    }

    fn update_dependency_graph(&self, state: &mut IncrementalState, file_id: FileId) {
        let dependencies: BTreeSet<FileId> =
            self.linker.dependency_targets(file_id).into_iter().collect();
        state.set_dependencies(file_id, dependencies);
    }

    /// Rebuild both graph maps from the linker's current import links.
    ///
    /// Needed after driving the linker directly with `index_file`/`link_symbols`.
    pub fn rebuild_dependency_graph(&self) {
        let mut state = self.state.write();
        state.import_graph.clear();
        state.file_dependents.clear();
        for file_id in self.linker.file_ids() {
            self.update_dependency_graph(&mut state, file_id);
        }
        tracing::debug!(
            "[incremental] rebuilt graph for {} files",
            state.import_graph.len()
        );
    }

    /// Files that import `file_id`, ascending
    pub fn file_dependents(&self, file_id: FileId) -> Vec<FileId> {
        self.state
            .read()
            .dependents_of(file_id)
            .into_iter()
            .collect()
    }

    /// Files `file_id` imports, ascending
    pub fn file_dependencies(&self, file_id: FileId) -> Vec<FileId> {
        self.state
            .read()
            .import_graph
            .get(&file_id)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the whole import graph, including files without imports.
    pub fn dependency_graph(&self) -> BTreeMap<FileId, Vec<FileId>> {
        self.state
            .read()
            .import_graph
            .iter()
            .map(|(id, deps)| (*id, deps.iter().copied().collect()))
            .collect()
    }

    pub fn file_hash(&self, file_id: FileId) -> Option<String> {
        self.state.read().file_hashes.get(&file_id).cloned()
    }

    pub fn file_timestamp(&self, file_id: FileId) -> Option<DateTime<Utc>> {
        self.state.read().file_timestamps.get(&file_id).copied()
    }

    pub fn stats(&self) -> IncrementalStats {
        let state = self.state.read();
        IncrementalStats {
            tracked_files: state.file_hashes.len(),
            dependency_edges: state.import_graph.values().map(BTreeSet::len).sum(),
            files_with_dependents: state.file_dependents.len(),
            pending_updates: state.pending_updates.len(),
            max_cascade_depth: self.max_cascade_depth,
        }
    }

    /// Every edge must appear in both maps; an empty result means the graph is symmetric.
    pub fn check_graph_symmetry(&self) -> Vec<GraphIssue> {
        let state = self.state.read();
        let mut issues = Vec::new();

        let forward: BTreeMap<_, _> = state.import_graph.iter().collect();
        for (file, dependencies) in forward {
            for dependency in dependencies {
                if dependency == file {
                    issues.push(GraphIssue::SelfEdge { file: *file });
                }
                let listed = state
                    .file_dependents
                    .get(dependency)
                    .is_some_and(|d| d.contains(file));
                if !listed {
                    issues.push(GraphIssue::MissingDependent {
                        file: *file,
                        dependency: *dependency,
                    });
                }
            }
        }

        let reverse: BTreeMap<_, _> = state.file_dependents.iter().collect();
        for (file, dependents) in reverse {
            for dependent in dependents {
                let imports = state
                    .import_graph
                    .get(dependent)
                    .is_some_and(|d| d.contains(file));
                if !imports {
                    issues.push(GraphIssue::MissingDependency {
                        file: *file,
                        dependent: *dependent,
                    });
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ExtractError, SymbolExtractor};
    use crate::resolver::MemoryFileSystem;
    use crate::symbol_table::SymbolTable;
    use std::sync::Arc;

    fn engine() -> IncrementalEngine {
        let fs = MemoryFileSystem::new().with_file("/proj/go.mod", "module example.com/app\n");
        let linker = LinkerEngine::with_filesystem("/proj", Arc::new(fs));
        linker.register_default_languages(&Settings::default());
        IncrementalEngine::new(linker, 10)
    }

    fn go_file(package: &str, imports: &[&str], body: &str) -> Vec<u8> {
        let mut src = format!("package {package}\n\n");
        for import in imports {
            src.push_str(&format!("import \"example.com/app/{import}\"\n"));
        }
        src.push('\n');
        src.push_str(body);
        src.into_bytes()
    }

    fn id(engine: &IncrementalEngine, path: &str) -> FileId {
        engine.linker().file_id(Path::new(path)).unwrap()
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = content_hash(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_update_is_idempotent() {
        let engine = engine();
        let content = go_file("util", &[], "func Helper() {}\n");

        let first = engine.update_file(Path::new("util/util.go"), &content).unwrap();
        assert_eq!(first.updated_files.len(), 1);
        assert_eq!(first.cascade_depth, 1);
        assert!(!first.added_symbols.is_empty());

        let second = engine.update_file(Path::new("util/util.go"), &content).unwrap();
        assert!(second.is_noop());
        assert!(second.updated_files.is_empty());
        assert_eq!(second.cascade_depth, 0);
    }

    #[test]
    fn test_modification_cascades_to_dependents() {
        let engine = engine();
        engine
            .update_file(Path::new("util/util.go"), &go_file("util", &[], "func A() {}\n"))
            .unwrap();
        engine
            .update_file(
                Path::new("main.go"),
                &go_file("main", &["util"], "func main() { util.A() }\n"),
            )
            .unwrap();
        let (util, main) = (id(&engine, "util/util.go"), id(&engine, "main.go"));
        assert_eq!(engine.file_dependencies(main), vec![util]);
        assert_eq!(engine.file_dependents(util), vec![main]);

        let old_hash = engine.file_hash(util).unwrap();
        let result = engine
            .update_file(
                Path::new("util/util.go"),
                &go_file("util", &[], "func A() {}\nfunc B() {}\n"),
            )
            .unwrap();

        assert_eq!(result.updated_files, vec![util]);
        assert_eq!(result.affected_files, vec![main]);
        assert_eq!(result.cascade_depth, 2);
        assert_eq!(result.added_symbols.len(), 1);
        assert_ne!(engine.file_hash(util).unwrap(), old_hash);
        assert!(engine.check_graph_symmetry().is_empty());
    }

    #[test]
    fn test_new_file_satisfies_earlier_import() {
        let engine = engine();
        engine
            .update_file(
                Path::new("main.go"),
                &go_file("main", &["util"], "func main() {}\n"),
            )
            .unwrap();
        let main = id(&engine, "main.go");
        assert!(engine.file_dependencies(main).is_empty());

        let result = engine
            .update_file(Path::new("util/util.go"), &go_file("util", &[], "func A() {}\n"))
            .unwrap();
        let util = id(&engine, "util/util.go");

        assert_eq!(result.affected_files, vec![main]);
        assert_eq!(engine.file_dependencies(main), vec![util]);
        assert_eq!(engine.file_dependents(util), vec![main]);
    }

    #[test]
    fn test_removal_strips_every_edge() {
        let engine = engine();
        let files = vec![
            (PathBuf::from("util/util.go"), go_file("util", &[], "func A() {}\nfunc B() {}\n")),
            (PathBuf::from("api/api.go"), go_file("api", &["util"], "func Serve() {}\n")),
            (PathBuf::from("main.go"), go_file("main", &["util", "api"], "func main() {}\n")),
        ];
        engine.batch_update(&files).unwrap();
        let util = id(&engine, "util/util.go");
        let owned = engine.linker().symbol_table(util).unwrap().composite_ids();

        let result = engine.remove_file(Path::new("util/util.go")).unwrap();
        assert_eq!(result.removed_files, vec![util]);
        for symbol in &owned {
            assert!(result.removed_symbols.contains(symbol));
        }
        assert_eq!(result.affected_files.len(), 2);

        for file in engine.linker().file_ids() {
            assert!(!engine.file_dependencies(file).contains(&util));
            assert!(!engine.file_dependents(file).contains(&util));
        }
        assert!(engine.file_dependents(util).is_empty());
        assert!(engine.file_hash(util).is_none());
        assert!(engine.check_graph_symmetry().is_empty());
        assert!(engine.linker().validate_consistency().is_empty());
    }

    #[test]
    fn test_remove_unknown_file_errors() {
        let engine = engine();
        let err = engine.remove_file(Path::new("ghost.go")).unwrap_err();
        assert!(matches!(err, IndexError::UnknownFile { .. }));
    }

    #[test]
    fn test_cycle_hits_cascade_ceiling() {
        let engine = engine();
        let files = vec![
            (PathBuf::from("a/a.go"), go_file("a", &["b"], "func A() {}\n")),
            (PathBuf::from("b/b.go"), go_file("b", &["a"], "func B() {}\n")),
        ];
        let initial = engine.batch_update(&files).unwrap();
        assert_eq!(initial.cascade_depth, 1);

        let err = engine
            .update_file(Path::new("a/a.go"), &go_file("a", &["b"], "func A2() {}\n"))
            .unwrap_err();
        match &err {
            IndexError::CascadeOverflow { limit, partial } => {
                assert_eq!(*limit, 10);
                assert_eq!(partial.cascade_depth, 10);
                assert_eq!(partial.updated_files, vec![id(&engine, "a/a.go")]);
            }
            other => panic!("expected cascade overflow, got {other:?}"),
        }
        assert!(err.partial_result().is_some());
        assert_eq!(engine.stats().pending_updates, 0);

        // The committed part stays applied
        let again = engine
            .update_file(Path::new("a/a.go"), &go_file("a", &["b"], "func A2() {}\n"))
            .unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn test_batch_skips_unchanged_and_runs_one_wave() {
        let engine = engine();
        let util = go_file("util", &[], "func A() {}\n");
        let main = go_file("main", &["util"], "func main() {}\n");
        let files = vec![
            (PathBuf::from("main.go"), main.clone()),
            (PathBuf::from("util/util.go"), util.clone()),
            (PathBuf::from("README.md"), b"# readme".to_vec()),
        ];

        let result = engine.batch_update(&files).unwrap();
        assert_eq!(result.updated_files.len(), 2);
        assert!(result.affected_files.is_empty());
        assert_eq!(result.cascade_depth, 1);
        assert!(engine.linker().file_id(Path::new("README.md")).is_none());

        // main linked to util's symbols even though it came first in the batch
        let util_id = id(&engine, "util/util.go");
        let table = engine.linker().symbol_table(util_id).unwrap();
        let a = table.symbols_named("A").next().unwrap();
        let refs = engine
            .linker()
            .symbol_references(CompositeSymbolId::new(util_id, a.local_id));
        assert_eq!(refs.len(), 1);

        let unchanged = engine.batch_update(&files).unwrap();
        assert!(unchanged.is_noop());
    }

    struct BrokenExtractor;

    impl SymbolExtractor for BrokenExtractor {
        fn language(&self) -> &'static str {
            "broken"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["brk"]
        }

        fn grammar(&self, _path: &Path) -> tree_sitter::Language {
            tree_sitter_go::LANGUAGE.into()
        }

        fn extract_symbols(
            &self,
            _file_id: FileId,
            _content: &[u8],
            _tree: Option<&tree_sitter::Tree>,
        ) -> Result<SymbolTable, ExtractError> {
            Err(ExtractError::InvalidTree)
        }
    }

    #[test]
    fn test_extraction_failure_keeps_file_retryable() {
        let engine = engine();
        engine.linker().register_extractor(Arc::new(BrokenExtractor));

        let result = engine.update_file(Path::new("x.brk"), b"data").unwrap();
        let file = id(&engine, "x.brk");
        assert_eq!(result.failed_files.len(), 1);
        assert_eq!(result.failed_files[0].0, file);
        assert!(result.updated_files.is_empty());
        assert!(engine.file_hash(file).is_none());

        let retry = engine.update_file(Path::new("x.brk"), b"data").unwrap();
        assert_eq!(retry.failed_files.len(), 1);
    }

    #[test]
    fn test_unsupported_path_is_rejected() {
        let engine = engine();
        let err = engine.update_file(Path::new("notes.txt"), b"x").unwrap_err();
        assert!(matches!(err, IndexError::NoExtractor { .. }));
        assert!(engine.linker().file_ids().is_empty());
    }

    #[test]
    fn test_rebuild_dependency_graph_after_manual_linking() {
        let engine = engine();
        let linker = engine.linker();
        let util = linker
            .index_file(Path::new("util/util.go"), &go_file("util", &[], "func A() {}\n"))
            .unwrap();
        let main = linker
            .index_file(Path::new("main.go"), &go_file("main", &["util"], "func main() {}\n"))
            .unwrap();
        linker.link_symbols();
        assert!(engine.file_dependencies(main).is_empty());

        engine.rebuild_dependency_graph();
        assert_eq!(engine.file_dependencies(main), vec![util]);
        assert_eq!(engine.file_dependents(util), vec![main]);
        assert_eq!(engine.stats().dependency_edges, 1);
    }

    #[test]
    fn test_graph_issue_detection() {
        let mut state = IncrementalState::default();
        let a = FileId::new(1).unwrap();
        let b = FileId::new(2).unwrap();
        state.set_dependencies(a, BTreeSet::from([b]));
        assert_eq!(state.file_dependents[&b], BTreeSet::from([a]));

        state.set_dependencies(a, BTreeSet::new());
        assert!(!state.file_dependents.contains_key(&b));

        state.set_dependencies(a, BTreeSet::from([b]));
        state.purge_file(b);
        assert!(state.import_graph[&a].is_empty());
    }

    #[test]
    fn test_concurrent_writers_and_readers_keep_graph_consistent() {
        let engine = engine();
        engine
            .update_file(Path::new("util/util.go"), &go_file("util", &[], "func A() {}\n"))
            .unwrap();
        let util = id(&engine, "util/util.go");

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    let path = PathBuf::from(format!("svc{writer}/svc.go"));
                    for round in 0..200 {
                        let content = go_file(
                            &format!("svc{writer}"),
                            &["util"],
                            &format!("func Handler{round}() {{ util.A() }}\n"),
                        );
                        engine.update_file(&path, &content).unwrap();
                    }
                });
            }
            for _ in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    for _ in 0..200 {
                        let dependents = engine.file_dependents(util);
                        assert!(!dependents.contains(&util));
                        for file in engine.linker().file_ids() {
                            let _ = engine.linker().import_links(file);
                        }
                        assert!(engine.linker().validate_consistency().is_empty());
                    }
                });
            }
        });

        let mut svc_ids: Vec<FileId> = (0..4)
            .map(|writer| id(&engine, &format!("svc{writer}/svc.go")))
            .collect();
        svc_ids.sort();
        assert_eq!(engine.file_dependents(util), svc_ids);
        for svc in &svc_ids {
            assert_eq!(engine.file_dependencies(*svc), vec![util]);
        }
        assert!(engine.check_graph_symmetry().is_empty());
        assert!(engine.linker().validate_consistency().is_empty());
        assert_eq!(engine.stats().pending_updates, 0);
    }
}
