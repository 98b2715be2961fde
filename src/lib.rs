//! Cross-file symbol linking with incremental dependency tracking.
//!
//! Files are parsed with tree-sitter, reduced to per-file [`SymbolTable`]s,
//! and linked through per-ecosystem import resolvers. The
//! [`IncrementalEngine`] keeps the result current as files change.

pub mod cli;
pub mod config;
pub mod debug;
pub mod error;
pub mod extractor;
pub mod incremental;
pub mod linker;
pub mod logging;
pub mod paths;
pub mod resolver;
pub mod scope;
pub mod symbol_table;
pub mod types;
pub mod walker;

pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use extractor::{ExtractError, ExtractorRegistry, SymbolExtractor};
pub use incremental::{IncrementalEngine, UpdateKind, UpdateResult};
pub use linker::{ImportLink, LinkerEngine, SymbolLink, SymbolReference};
pub use resolver::{FileSystem, MemoryFileSystem, ModuleResolver, OsFileSystem};
pub use scope::{Scope, ScopeId, ScopeTracker};
pub use symbol_table::{SymbolTable, SymbolTableBuilder};
pub use types::{
    CompositeSymbolId, FileId, ModuleResolution, ResolutionKind, SymbolInfo, SymbolKind,
};
