use serde::{Deserialize, Serialize};
use std::fmt;

use super::FileId;
use crate::scope::ScopeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Unknown,
    Package,
    Import,
    Type,
    Interface,
    Struct,
    Class,
    Function,
    Method,
    Constructor,
    Variable,
    Constant,
    Field,
    Property,
    Parameter,
    Label,
    Module,
    Namespace,
    Enum,
    EnumMember,
    Trait,
    Event,
    Delegate,
    Record,
    Attribute,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Package => "package",
            Self::Import => "import",
            Self::Type => "type",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Field => "field",
            Self::Property => "property",
            Self::Parameter => "parameter",
            Self::Label => "label",
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Enum => "enum",
            Self::EnumMember => "enum_member",
            Self::Trait => "trait",
            Self::Event => "event",
            Self::Delegate => "delegate",
            Self::Record => "record",
            Self::Attribute => "attribute",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Module,
    Package,
    Class,
    Function,
    Method,
    Block,
    Namespace,
    Interface,
}

/// Source position of a symbol. `line` and `column` are 1-based, `offset` is
/// the starting byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SymbolLocation {
    pub fn new(file_id: FileId, line: u32, column: u32, offset: u32) -> Self {
        Self {
            file_id,
            line,
            column,
            offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Decorator,
    Annotation,
    Deprecated,
    Async,
    Generator,
    Static,
    Abstract,
    Export,
    Other,
}

/// Language-neutral decorator/annotation/modifier record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub kind: AttributeKind,
    /// Literal source text, e.g. `@dataclass` or `async`.
    pub value: String,
    pub line: u32,
}

impl Attribute {
    pub fn new(kind: AttributeKind, value: impl Into<String>, line: u32) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParameter {
    pub name: String,
    pub constraint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub local_id: u32,
    pub name: String,
    pub kind: SymbolKind,
    pub location: SymbolLocation,
    pub scope: ScopeId,
    pub is_exported: bool,
    pub language: String,
    pub signature: Option<String>,
    pub type_name: Option<String>,
    pub value: Option<String>,
    pub type_parameters: Vec<TypeParameter>,
    pub attributes: Vec<Attribute>,
    /// Local id of the enclosing type (method receiver, class, interface).
    pub parent: Option<u32>,
}

impl SymbolInfo {
    pub fn has_attribute(&self, kind: AttributeKind) -> bool {
        self.attributes.iter().any(|a| a.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Zero until the builder assigns one.
    pub local_id: u32,
    pub path: String,
    pub alias: Option<String>,
    pub imported_names: Vec<String>,
    pub is_default: bool,
    pub is_namespace: bool,
    pub is_type_only: bool,
    pub location: SymbolLocation,
}

impl ImportRecord {
    pub fn new(path: impl Into<String>, location: SymbolLocation) -> Self {
        Self {
            local_id: 0,
            path: path.into(),
            alias: None,
            imported_names: Vec::new(),
            is_default: false,
            is_namespace: false,
            is_type_only: false,
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Zero until the builder assigns one.
    pub local_id: u32,
    pub exported_name: String,
    pub local_name: String,
    pub is_default: bool,
    pub is_type_only: bool,
    pub is_reexport: bool,
    pub source_path: Option<String>,
    pub location: SymbolLocation,
}

impl ExportRecord {
    /// Plain `export name` of a local declaration.
    pub fn local(name: impl Into<String>, location: SymbolLocation) -> Self {
        let name = name.into();
        Self {
            local_id: 0,
            exported_name: name.clone(),
            local_name: name,
            is_default: false,
            is_type_only: false,
            is_reexport: false,
            source_path: None,
            location,
        }
    }
}
