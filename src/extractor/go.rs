//! Go symbol extraction.
//!
//! Every exported top-level declaration is also recorded as an export so a
//! package import can link to it. Go imports are namespace imports: the
//! importer sees everything the package exports.

use tree_sitter::{Language, Node, Tree};

use super::{
    ExtractError, MAX_AST_DEPTH, SymbolExtractor, node_location, node_text, summarize_value,
    text_between, unquote, visibility,
};
use crate::scope::{ScopeId, ScopeTracker};
use crate::symbol_table::{SymbolTable, SymbolTableBuilder};
use crate::types::{ExportRecord, FileId, ImportRecord, ScopeKind, SymbolKind, TypeParameter};

#[derive(Debug, Default)]
pub struct GoExtractor;

impl GoExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for GoExtractor {
    fn language(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn grammar(&self, _path: &std::path::Path) -> Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn extract_symbols(
        &self,
        file_id: FileId,
        content: &[u8],
        tree: Option<&Tree>,
    ) -> Result<SymbolTable, ExtractError> {
        let tree = tree.ok_or(ExtractError::InvalidTree)?;
        let root = tree.root_node();

        let mut walker = GoWalker {
            file_id,
            content,
            builder: SymbolTableBuilder::new(file_id, "go"),
            scopes: ScopeTracker::new(),
            receivers: Vec::new(),
        };
        walker.collect_imports(root);
        walker.visit(root, 0);
        Ok(walker.finish())
    }
}

struct GoWalker<'a> {
    file_id: FileId,
    content: &'a [u8],
    builder: SymbolTableBuilder,
    scopes: ScopeTracker,
    /// (method local id, receiver type name), resolved to parents at the end
    receivers: Vec<(u32, String)>,
}

impl<'a> GoWalker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.content)
    }

    fn at_top_level(&self) -> bool {
        self.scopes.current_scope() == ScopeId::GLOBAL
    }

    fn collect_imports(&mut self, root: Node) {
        let mut cursor = root.walk();
        for decl in root.children(&mut cursor) {
            if decl.kind() != "import_declaration" {
                continue;
            }
            let mut decl_cursor = decl.walk();
            for child in decl.children(&mut decl_cursor) {
                match child.kind() {
                    "import_spec" => self.import_spec(child),
                    "import_spec_list" => {
                        let mut list_cursor = child.walk();
                        for spec in child.children(&mut list_cursor) {
                            if spec.kind() == "import_spec" {
                                self.import_spec(spec);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn import_spec(&mut self, spec: Node) {
        let Some(path_node) = spec.child_by_field_name("path") else {
            return;
        };
        let path = unquote(self.text(path_node));
        if path.is_empty() {
            return;
        }

        let mut import = ImportRecord::new(path, node_location(spec, self.file_id));
        let alias = spec.child_by_field_name("name").map(|n| match n.kind() {
            "dot" => ".".to_string(),
            _ => self.text(n).to_string(),
        });
        // Blank imports only run package init
        import.is_namespace = alias.as_deref() != Some("_");
        import.alias = alias.or_else(|| path.rsplit('/').next().map(str::to_string));
        self.builder.add_import(import);
    }

    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::warn!(
                "[go] maximum AST depth reached at line {}",
                node.start_position().row + 1
            );
            return;
        }

        match node.kind() {
            "import_declaration" => {}
            "function_declaration" => self.function(node, depth),
            "method_declaration" => self.method(node, depth),
            "type_declaration" => self.type_declaration(node),
            "var_declaration" => self.var_declaration(node, false),
            "const_declaration" => self.var_declaration(node, true),
            "short_var_declaration" => {
                self.short_var_declaration(node);
                self.visit_children(node, depth);
            }
            "go_statement" => self.goroutine(node, depth),
            "block" => self.scoped(node, depth, ""),
            kind @ ("if_statement"
            | "for_statement"
            | "expression_switch_statement"
            | "type_switch_statement"
            | "select_statement") => self.scoped(node, depth, kind),
            _ => self.visit_children(node, depth),
        }
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, depth + 1);
        }
    }

    fn scoped(&mut self, node: Node, depth: usize, name: &str) {
        self.scopes
            .push_scope(ScopeKind::Block, name, node.start_byte(), node.end_byte());
        self.visit_children(node, depth);
        self.scopes.pop_scope();
    }

    fn export_if_public(&self, name: &str, node: Node, exported: bool) {
        if exported && self.at_top_level() {
            self.builder
                .add_export(ExportRecord::local(name, node_location(node, self.file_id)));
        }
    }

    fn signature(&self, node: Node) -> String {
        let end = node
            .child_by_field_name("body")
            .map_or(node.end_byte(), |b| b.start_byte());
        text_between(self.content, node.start_byte(), end)
    }

    fn function(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let exported = visibility::go_exported(name);

        let id = self.builder.add_symbol(
            name,
            SymbolKind::Function,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let signature = self.signature(node);
        let type_params = self.type_parameters(node);
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.type_parameters = type_params;
        });
        self.export_if_public(name, name_node, exported);

        self.scopes
            .push_scope(ScopeKind::Function, name, node.start_byte(), node.end_byte());
        if let Some(params) = node.child_by_field_name("parameters") {
            self.parameters(params);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth + 1);
        }
        self.scopes.pop_scope();
    }

    fn method(&mut self, node: Node, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| self.receiver_type(r));

        let id = self.builder.add_symbol(
            name,
            SymbolKind::Method,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            visibility::go_exported(name),
        );
        let signature = self.signature(node);
        let receiver_type = receiver.clone();
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.type_name = receiver_type;
        });
        if let Some(receiver) = receiver {
            self.receivers.push((id, receiver));
        }

        self.scopes
            .push_scope(ScopeKind::Method, name, node.start_byte(), node.end_byte());
        if let Some(receiver) = node.child_by_field_name("receiver") {
            self.parameters(receiver);
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            self.parameters(params);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, depth + 1);
        }
        self.scopes.pop_scope();
    }

    /// Receiver base type: `(s *Server)` and `(l List[T])` both give the bare name.
    fn receiver_type(&self, receiver: Node) -> Option<String> {
        let mut cursor = receiver.walk();
        let param = receiver
            .children(&mut cursor)
            .find(|c| c.kind() == "parameter_declaration")?;
        let mut ty = param.child_by_field_name("type")?;
        loop {
            match ty.kind() {
                "pointer_type" => ty = ty.named_child(0)?,
                "generic_type" => ty = ty.child_by_field_name("type")?,
                _ => break,
            }
        }
        Some(self.text(ty).to_string())
    }

    fn goroutine(&mut self, node: Node, depth: usize) {
        self.scopes
            .push_scope(ScopeKind::Block, "go", node.start_byte(), node.end_byte());
        self.visit_children(node, depth);
        self.scopes.pop_scope();
    }

    fn type_declaration(&mut self, node: Node) {
        let mut cursor = node.walk();
        for spec in node.children(&mut cursor) {
            if matches!(spec.kind(), "type_spec" | "type_alias") {
                self.type_spec(spec);
            }
        }
    }

    fn type_spec(&mut self, spec: Node) {
        let Some(name_node) = spec.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let type_node = spec.child_by_field_name("type");
        let kind = match type_node.map(|t| t.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Type,
        };
        let exported = visibility::go_exported(name);

        let id = self.builder.add_symbol(
            name,
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let type_params = self.type_parameters(spec);
        let underlying = type_node
            .filter(|_| kind == SymbolKind::Type)
            .map(|t| self.text(t).to_string());
        self.builder.update_symbol(id, |s| {
            s.type_parameters = type_params;
            s.type_name = underlying;
        });
        self.export_if_public(name, name_node, exported);

        let Some(type_node) = type_node else {
            return;
        };
        match kind {
            SymbolKind::Struct => {
                self.scopes
                    .push_scope(ScopeKind::Class, name, spec.start_byte(), spec.end_byte());
                self.struct_fields(type_node, id);
                self.scopes.pop_scope();
            }
            SymbolKind::Interface => {
                self.scopes
                    .push_scope(ScopeKind::Interface, name, spec.start_byte(), spec.end_byte());
                self.interface_methods(type_node, id);
                self.scopes.pop_scope();
            }
            _ => {}
        }
    }

    fn struct_fields(&mut self, struct_node: Node, parent: u32) {
        let mut cursor = struct_node.walk();
        let Some(list) = struct_node
            .children(&mut cursor)
            .find(|c| c.kind() == "field_declaration_list")
        else {
            return;
        };

        let mut list_cursor = list.walk();
        for field in list.children(&mut list_cursor) {
            if field.kind() != "field_declaration" {
                continue;
            }
            let type_text = field
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());

            let mut name_cursor = field.walk();
            let names: Vec<Node> = field
                .children_by_field_name("name", &mut name_cursor)
                .collect();
            if names.is_empty() {
                // Embedded field: the type name doubles as the field name
                if let Some(ty) = &type_text {
                    let name = ty.trim_start_matches('*').rsplit('.').next().unwrap_or(ty.as_str());
                    self.add_member(name, SymbolKind::Field, field, parent, type_text.clone());
                }
                continue;
            }
            for name_node in names {
                let name = self.text(name_node);
                self.add_member(name, SymbolKind::Field, name_node, parent, type_text.clone());
            }
        }
    }

    fn interface_methods(&mut self, iface: Node, parent: u32) {
        let mut cursor = iface.walk();
        for elem in iface.children(&mut cursor) {
            if !matches!(elem.kind(), "method_elem" | "method_spec") {
                continue;
            }
            let Some(name_node) = elem.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(name_node);
            let id = self.add_member(name, SymbolKind::Method, name_node, parent, None);
            let signature = self.text(elem).to_string();
            self.builder
                .update_symbol(id, |s| s.signature = Some(signature));
        }
    }

    fn add_member(
        &self,
        name: &str,
        kind: SymbolKind,
        node: Node,
        parent: u32,
        type_name: Option<String>,
    ) -> u32 {
        let id = self.builder.add_symbol(
            name,
            kind,
            node_location(node, self.file_id),
            self.scopes.current_scope(),
            visibility::go_exported(name),
        );
        self.builder.update_symbol(id, |s| {
            s.parent = Some(parent);
            s.type_name = type_name;
        });
        id
    }

    fn var_declaration(&mut self, node: Node, is_const: bool) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "var_spec" | "const_spec" => self.var_spec(child, is_const),
                "var_spec_list" | "const_spec_list" => {
                    let mut list_cursor = child.walk();
                    for spec in child.children(&mut list_cursor) {
                        if matches!(spec.kind(), "var_spec" | "const_spec") {
                            self.var_spec(spec, is_const);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn var_spec(&mut self, spec: Node, is_const: bool) {
        let kind = if is_const {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        let type_text = spec
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string());
        let value_text = spec
            .child_by_field_name("value")
            .map(|v| summarize_value(self.text(v)));

        let mut cursor = spec.walk();
        let names: Vec<Node> = spec.children_by_field_name("name", &mut cursor).collect();
        for name_node in names {
            let name = self.text(name_node);
            if name == "_" {
                continue;
            }
            let exported = visibility::go_exported(name);
            let id = self.builder.add_symbol(
                name,
                kind,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                exported,
            );
            let (ty, value) = (type_text.clone(), value_text.clone());
            self.builder.update_symbol(id, |s| {
                s.type_name = ty;
                s.value = value;
            });
            self.export_if_public(name, name_node, exported);
        }
    }

    fn short_var_declaration(&mut self, node: Node) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let mut cursor = left.walk();
        for ident in left.children(&mut cursor) {
            if ident.kind() != "identifier" {
                continue;
            }
            let name = self.text(ident);
            if name == "_" {
                continue;
            }
            self.builder.add_symbol(
                name,
                SymbolKind::Variable,
                node_location(ident, self.file_id),
                self.scopes.current_scope(),
                false,
            );
        }
    }

    fn parameters(&mut self, list: Node) {
        let mut cursor = list.walk();
        for param in list.children(&mut cursor) {
            if !matches!(
                param.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let type_text = param
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());
            let mut name_cursor = param.walk();
            let names: Vec<Node> = param
                .children_by_field_name("name", &mut name_cursor)
                .collect();
            for name_node in names {
                let id = self.builder.add_symbol(
                    self.text(name_node),
                    SymbolKind::Parameter,
                    node_location(name_node, self.file_id),
                    self.scopes.current_scope(),
                    false,
                );
                let ty = type_text.clone();
                self.builder.update_symbol(id, |s| s.type_name = ty);
            }
        }
    }

    fn type_parameters(&self, node: Node) -> Vec<TypeParameter> {
        let Some(list) = node.child_by_field_name("type_parameters") else {
            return Vec::new();
        };
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for decl in list.children(&mut cursor) {
            if decl.kind() != "type_parameter_declaration" {
                continue;
            }
            let constraint = decl
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());
            let mut name_cursor = decl.walk();
            for name_node in decl.children_by_field_name("name", &mut name_cursor) {
                params.push(TypeParameter {
                    name: self.text(name_node).to_string(),
                    constraint: constraint.clone(),
                });
            }
        }
        params
    }

    fn finish(self) -> SymbolTable {
        for (method_id, receiver) in &self.receivers {
            let parent = self
                .builder
                .symbol_ids_named(receiver)
                .into_iter()
                .find(|id| id != method_id);
            if let Some(parent) = parent {
                self.builder.update_symbol(*method_id, |s| s.parent = Some(parent));
            }
        }

        self.builder.set_scopes(self.scopes.into_scopes());
        self.builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(code: &str) -> SymbolTable {
        let extractor = GoExtractor::new();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&extractor.grammar(std::path::Path::new("x.go")))
            .unwrap();
        let tree = parser.parse(code, None).unwrap();
        extractor
            .extract_symbols(FileId::new(1).unwrap(), code.as_bytes(), Some(&tree))
            .unwrap()
    }

    #[test]
    fn test_missing_tree_is_invalid() {
        let result = GoExtractor::new().extract_symbols(FileId::new(1).unwrap(), b"", None);
        assert_eq!(result.unwrap_err(), ExtractError::InvalidTree);
    }

    #[test]
    fn test_imports_with_aliases() {
        let table = extract(
            r#"package main

import (
    "fmt"
    str "strings"
    . "math"
    _ "embed"
    "example.com/app/internal/util"
)
"#,
        );

        let imports: Vec<(&str, Option<&str>, bool)> = table
            .imports
            .iter()
            .map(|i| (i.path.as_str(), i.alias.as_deref(), i.is_namespace))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("fmt", Some("fmt"), true),
                ("strings", Some("str"), true),
                ("math", Some("."), true),
                ("embed", Some("_"), false),
                ("example.com/app/internal/util", Some("util"), true),
            ]
        );
    }

    #[test]
    fn test_functions_types_and_exports() {
        let table = extract(
            r#"package util

type Server struct {
    Addr string
    port int
}

type Store interface {
    Get(key string) (string, error)
}

type ID = string

const Version = "1.0"

var cache map[string]int

func (s *Server) Start() error { return nil }

func Helper[T comparable](v T) T {
    x := v
    return x
}

func internal() {}
"#,
        );

        let server = table.symbols_named("Server").next().unwrap();
        assert_eq!(server.kind, SymbolKind::Struct);
        assert!(server.is_exported);

        let addr = table.symbols_named("Addr").next().unwrap();
        assert_eq!(addr.kind, SymbolKind::Field);
        assert_eq!(addr.parent, Some(server.local_id));
        assert_eq!(addr.type_name.as_deref(), Some("string"));

        let get = table.symbols_named("Get").next().unwrap();
        assert_eq!(get.kind, SymbolKind::Method);

        let start = table.symbols_named("Start").next().unwrap();
        assert_eq!(start.kind, SymbolKind::Method);
        assert_eq!(start.parent, Some(server.local_id));
        assert_eq!(start.type_name.as_deref(), Some("Server"));

        let helper = table.symbols_named("Helper").next().unwrap();
        assert_eq!(helper.type_parameters.len(), 1);
        assert_eq!(helper.type_parameters[0].name, "T");
        assert_eq!(helper.type_parameters[0].constraint.as_deref(), Some("comparable"));
        assert!(helper.signature.as_deref().unwrap().starts_with("func Helper[T comparable]"));

        let x = table.symbols_named("x").next().unwrap();
        assert_ne!(x.scope, ScopeId::GLOBAL);
        assert!(!x.is_exported);

        assert!(!table.symbols_named("internal").next().unwrap().is_exported);
        assert_eq!(
            table.symbols_named("Version").next().unwrap().value.as_deref(),
            Some("\"1.0\"")
        );

        let exported: Vec<&str> = table.exports.iter().map(|e| e.exported_name.as_str()).collect();
        assert_eq!(exported, vec!["Server", "Store", "ID", "Version", "Helper"]);
    }
}
