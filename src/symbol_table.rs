//! Per-file symbol identities and the frozen [`SymbolTable`].

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::scope::{Scope, ScopeId};
use crate::types::{
    CompositeSymbolId, ExportRecord, FileId, ImportRecord, SymbolInfo, SymbolKind, SymbolLocation,
};

/// Immutable snapshot of everything extracted from one file.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub file_id: FileId,
    pub language: String,
    pub symbols: HashMap<u32, SymbolInfo>,
    /// Name to local ids in declaration order. Duplicates are overloads or shadowing.
    pub symbols_by_name: IndexMap<String, Vec<u32>>,
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<ExportRecord>,
    pub scopes: Vec<Scope>,
    pub next_local_id: u32,
}

impl SymbolTable {
    pub fn symbol(&self, local_id: u32) -> Option<&SymbolInfo> {
        self.symbols.get(&local_id)
    }

    pub fn symbols_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a SymbolInfo> + 'a {
        self.symbols_by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.symbols.get(id))
    }

    pub fn exported_symbols(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values().filter(|s| s.is_exported)
    }

    /// All symbol local ids, ascending.
    pub fn symbol_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.symbols.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn composite_ids(&self) -> Vec<CompositeSymbolId> {
        self.symbol_ids()
            .into_iter()
            .map(|local| CompositeSymbolId::new(self.file_id, local))
            .collect()
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    pub fn default_export(&self) -> Option<&ExportRecord> {
        self.exports.iter().find(|e| e.is_default)
    }
}

struct BuilderState {
    next_local_id: u32,
    symbols: HashMap<u32, SymbolInfo>,
    symbols_by_name: IndexMap<String, Vec<u32>>,
    imports: Vec<ImportRecord>,
    exports: Vec<ExportRecord>,
    scopes: Vec<Scope>,
}

impl BuilderState {
    fn allocate(&mut self) -> u32 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }
}

/// Assigns sequential local ids, starting at 1, to symbols, imports and
/// exports of one file.
///
/// Extractors drive a builder from a single thread, but every mutation still
/// goes through an internal lock so interleaved callers cannot hand out the
/// same id twice.
pub struct SymbolTableBuilder {
    file_id: FileId,
    language: String,
    state: Mutex<BuilderState>,
}

impl SymbolTableBuilder {
    pub fn new(file_id: FileId, language: impl Into<String>) -> Self {
        Self {
            file_id,
            language: language.into(),
            state: Mutex::new(BuilderState {
                next_local_id: 1,
                symbols: HashMap::new(),
                symbols_by_name: IndexMap::new(),
                imports: Vec::new(),
                exports: Vec::new(),
                scopes: Vec::new(),
            }),
        }
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    pub fn add_symbol(
        &self,
        name: impl Into<String>,
        kind: SymbolKind,
        location: SymbolLocation,
        scope: ScopeId,
        is_exported: bool,
    ) -> u32 {
        let name = name.into();
        let mut state = self.state.lock();
        let local_id = state.allocate();

        state
            .symbols_by_name
            .entry(name.clone())
            .or_default()
            .push(local_id);
        state.symbols.insert(
            local_id,
            SymbolInfo {
                local_id,
                name,
                kind,
                location,
                scope,
                is_exported,
                language: self.language.clone(),
                signature: None,
                type_name: None,
                value: None,
                type_parameters: Vec::new(),
                attributes: Vec::new(),
                parent: None,
            },
        );
        local_id
    }

    /// Mutate a symbol after allocation. Returns `false` for unknown ids.
    pub fn update_symbol(&self, local_id: u32, update: impl FnOnce(&mut SymbolInfo)) -> bool {
        let mut state = self.state.lock();
        match state.symbols.get_mut(&local_id) {
            Some(symbol) => {
                update(symbol);
                true
            }
            None => false,
        }
    }

    pub fn add_import(&self, mut import: ImportRecord) -> u32 {
        let mut state = self.state.lock();
        if import.local_id == 0 {
            import.local_id = state.allocate();
        }
        let id = import.local_id;
        state.imports.push(import);
        id
    }

    pub fn add_export(&self, mut export: ExportRecord) -> u32 {
        let mut state = self.state.lock();
        if export.local_id == 0 {
            export.local_id = state.allocate();
        }
        let id = export.local_id;
        state.exports.push(export);
        id
    }

    /// Whether an export with this exported name was already recorded.
    pub fn has_export(&self, exported_name: &str) -> bool {
        self.state
            .lock()
            .exports
            .iter()
            .any(|e| e.exported_name == exported_name)
    }

    pub fn symbol_ids_named(&self, name: &str) -> Vec<u32> {
        self.state
            .lock()
            .symbols_by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn mark_exported(&self, name: &str) {
        let mut state = self.state.lock();
        let ids = state.symbols_by_name.get(name).cloned().unwrap_or_default();
        for id in ids {
            if let Some(symbol) = state.symbols.get_mut(&id) {
                symbol.is_exported = true;
            }
        }
    }

    pub fn set_scopes(&self, scopes: Vec<Scope>) {
        self.state.lock().scopes = scopes;
    }

    pub fn symbol_count(&self) -> usize {
        self.state.lock().symbols.len()
    }

    pub fn build(self) -> SymbolTable {
        let state = self.state.into_inner();
        SymbolTable {
            file_id: self.file_id,
            language: self.language,
            symbols: state.symbols,
            symbols_by_name: state.symbols_by_name,
            imports: state.imports,
            exports: state.exports,
            scopes: state.scopes,
            next_local_id: state.next_local_id,
        }
    }
}
