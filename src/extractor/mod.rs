//! Symbol extraction contract and the extension-keyed extractor registry.
//!
//! An extractor turns one parsed file into a frozen [`SymbolTable`]. The linker
//! picks the extractor by file extension, parses the content with the
//! extractor's grammar, and hands over the tree.

mod csharp;
mod go;
mod javascript;
mod php;
mod python;

pub use csharp::CSharpExtractor;
pub use go::GoExtractor;
pub use javascript::JavaScriptExtractor;
pub use php::PhpExtractor;
pub use python::PythonExtractor;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tree_sitter::{Language, Node, Tree};

use crate::paths::{file_extension, has_extension};
use crate::symbol_table::SymbolTable;
use crate::types::{FileId, SymbolLocation};

/// Deepest AST nesting the extractors descend into.
pub const MAX_AST_DEPTH: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid tree: tree or root node is absent")]
    InvalidTree,
}

/// Common interface for all language extractors
pub trait SymbolExtractor: Send + Sync {
    /// Language tag stored on every table this extractor builds
    fn language(&self) -> &'static str;

    /// File extensions WITHOUT dots
    fn extensions(&self) -> &'static [&'static str];

    fn can_handle(&self, path: &Path) -> bool {
        has_extension(path, self.extensions())
    }

    /// Grammar used to parse `path`. Dialects such as TSX pick by extension.
    fn grammar(&self, path: &Path) -> Language;

    fn extract_symbols(
        &self,
        file_id: FileId,
        content: &[u8],
        tree: Option<&Tree>,
    ) -> Result<SymbolTable, ExtractError>;
}

#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: IndexMap<&'static str, Arc<dyn SymbolExtractor>>,
    by_extension: HashMap<String, &'static str>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor. A later registration for the same language or
    /// extension replaces the earlier one.
    pub fn register(&mut self, extractor: Arc<dyn SymbolExtractor>) {
        let language = extractor.language();
        for ext in extractor.extensions() {
            self.by_extension.insert(ext.to_ascii_lowercase(), language);
        }
        tracing::debug!(
            "[extractor] registered {language} for {:?}",
            extractor.extensions()
        );
        self.extractors.insert(language, extractor);
    }

    /// Route an extra extension (without dot) to an already registered language.
    /// Returns false when no extractor serves `language`.
    pub fn map_extension(&mut self, extension: &str, language: &str) -> bool {
        let Some((&tag, _)) = self.extractors.get_key_value(language) else {
            return false;
        };
        self.by_extension
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), tag);
        true
    }

    pub fn extractor_for_file(&self, path: &Path) -> Option<Arc<dyn SymbolExtractor>> {
        let by_ext = file_extension(path)
            .and_then(|ext| self.by_extension.get(&ext))
            .and_then(|lang| self.extractors.get(lang));
        match by_ext {
            Some(extractor) => Some(extractor.clone()),
            None => self
                .extractors
                .values()
                .find(|e| e.can_handle(path))
                .cloned(),
        }
    }

    pub fn extractor_for_language(&self, language: &str) -> Option<Arc<dyn SymbolExtractor>> {
        self.extractors.get(language).cloned()
    }

    pub fn supported_languages(&self) -> Vec<&'static str> {
        self.extractors.keys().copied().collect()
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

/// Source text of `node`; empty when the bytes are not valid UTF-8.
pub fn node_text<'a>(node: Node, content: &'a [u8]) -> &'a str {
    node.utf8_text(content).unwrap_or("")
}

/// 1-based line/column of the node start; `offset` is the start byte.
pub fn node_location(node: Node, file_id: FileId) -> SymbolLocation {
    let point = node.start_position();
    SymbolLocation::new(
        file_id,
        point.row as u32 + 1,
        point.column as u32 + 1,
        node.start_byte() as u32,
    )
}

pub fn find_child_by_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).find(|c| c.kind() == kind)
}

pub fn has_child_kind(node: Node, kind: &str) -> bool {
    find_child_by_kind(node, kind).is_some()
}

/// Text between two byte offsets, trimmed. Used for signatures that stop at a body.
pub fn text_between(content: &[u8], start: usize, end: usize) -> String {
    let end = end.min(content.len());
    let start = start.min(end);
    String::from_utf8_lossy(&content[start..end]).trim().to_string()
}

/// Strip one layer of matching string quotes.
pub fn unquote(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|t| t.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

/// Short single-line rendering of an initializer for `SymbolInfo::value`.
pub fn summarize_value(text: &str) -> String {
    const MAX: usize = 80;
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

/// Visibility rules per language family.
pub mod visibility {
    /// Go exports identifiers that start with an uppercase letter.
    pub fn go_exported(name: &str) -> bool {
        name.chars().next().is_some_and(char::is_uppercase)
    }

    /// Python treats leading-underscore names as private, except dunders.
    pub fn python_public(name: &str) -> bool {
        !name.starts_with('_') || (name.len() > 4 && name.starts_with("__") && name.ends_with("__"))
    }
}
