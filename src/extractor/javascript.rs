//! JavaScript and TypeScript symbol extraction.
//!
//! One type serves both languages; the instance decides the language tag,
//! the extensions it claims, and the grammar (`.tsx` gets the TSX dialect).
//! CommonJS `require` calls bound to a variable are recorded as imports.

use std::path::Path;
use tree_sitter::{Language, Node, Tree};

use super::{
    ExtractError, MAX_AST_DEPTH, SymbolExtractor, find_child_by_kind, has_child_kind,
    node_location, node_text, summarize_value, text_between, unquote,
};
use crate::paths::file_extension;
use crate::scope::{ScopeId, ScopeTracker};
use crate::symbol_table::{SymbolTable, SymbolTableBuilder};
use crate::types::{
    Attribute, AttributeKind, ExportRecord, FileId, ImportRecord, ScopeKind, SymbolKind,
    TypeParameter,
};

#[derive(Debug, Clone)]
pub struct JavaScriptExtractor {
    language: &'static str,
    extensions: &'static [&'static str],
}

impl JavaScriptExtractor {
    pub fn javascript() -> Self {
        Self {
            language: "javascript",
            extensions: &["js", "jsx", "mjs", "cjs"],
        }
    }

    pub fn typescript() -> Self {
        Self {
            language: "typescript",
            extensions: &["ts", "tsx", "mts", "cts"],
        }
    }
}

impl SymbolExtractor for JavaScriptExtractor {
    fn language(&self) -> &'static str {
        self.language
    }

    fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn grammar(&self, path: &Path) -> Language {
        if self.language != "typescript" {
            return tree_sitter_javascript::LANGUAGE.into();
        }
        match file_extension(path).as_deref() {
            Some("tsx") => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }

    fn extract_symbols(
        &self,
        file_id: FileId,
        content: &[u8],
        tree: Option<&Tree>,
    ) -> Result<SymbolTable, ExtractError> {
        let tree = tree.ok_or(ExtractError::InvalidTree)?;

        let mut walker = JsWalker {
            file_id,
            content,
            builder: SymbolTableBuilder::new(file_id, self.language),
            scopes: ScopeTracker::new(),
            local_exports: Vec::new(),
        };
        walker.visit(tree.root_node(), 0);
        Ok(walker.finish())
    }
}

/// A declared name and the node its location comes from.
type Declared<'t> = (String, Node<'t>);

struct JsWalker<'a> {
    file_id: FileId,
    content: &'a [u8],
    builder: SymbolTableBuilder,
    scopes: ScopeTracker,
    /// Names listed in `export { .. }` without a source, marked at the end
    local_exports: Vec<String>,
}

impl<'a> JsWalker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.content)
    }

    fn line(node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn visit(&mut self, node: Node, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::warn!(
                "[javascript] maximum AST depth reached at line {}",
                Self::line(node)
            );
            return;
        }

        match node.kind() {
            "import_statement" => self.import_statement(node),
            "export_statement" => self.export_statement(node, depth),
            "call_expression" => {
                // A bare `require('./x')` that no declarator consumed
                if let Some(path) = self.require_path(node) {
                    let import = ImportRecord::new(path, node_location(node, self.file_id));
                    self.builder.add_import(import);
                } else {
                    self.visit_children(node, depth);
                }
            }
            "statement_block" => {
                self.scopes
                    .push_scope(ScopeKind::Block, "", node.start_byte(), node.end_byte());
                self.visit_children(node, depth);
                self.scopes.pop_scope();
            }
            _ => {
                if self.declaration(node, false, depth).is_none() {
                    self.visit_children(node, depth);
                }
            }
        }
    }

    fn visit_children(&mut self, node: Node, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, depth + 1);
        }
    }

    /// Handle a declaration node. `None` when `node` is not a declaration.
    fn declaration<'t>(
        &mut self,
        node: Node<'t>,
        exported: bool,
        depth: usize,
    ) -> Option<Vec<Declared<'t>>> {
        let declared = match node.kind() {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                vec![self.function(node, exported, depth)]
            }
            "class_declaration" | "abstract_class_declaration" => {
                vec![self.class(node, exported, depth)]
            }
            "lexical_declaration" | "variable_declaration" => {
                self.variables(node, exported, depth)
            }
            "interface_declaration" => vec![self.interface(node, exported)],
            "type_alias_declaration" => vec![self.type_alias(node, exported)],
            "enum_declaration" => vec![self.enumeration(node, exported)],
            _ => return None,
        };
        Some(declared)
    }

    fn import_statement(&mut self, node: Node) {
        let Some(source) = node.child_by_field_name("source") else {
            return;
        };
        let mut import = ImportRecord::new(
            unquote(self.text(source)),
            node_location(node, self.file_id),
        );
        import.is_type_only = has_child_kind(node, "type");

        if let Some(clause) = find_child_by_kind(node, "import_clause") {
            let mut cursor = clause.walk();
            for child in clause.children(&mut cursor) {
                match child.kind() {
                    "identifier" => {
                        import.is_default = true;
                        import.alias = Some(self.text(child).to_string());
                    }
                    "namespace_import" => {
                        import.is_namespace = true;
                        let mut ns_cursor = child.walk();
                        let ident = child
                            .children(&mut ns_cursor)
                            .filter(|c| c.kind() == "identifier")
                            .last();
                        if let Some(ident) = ident {
                            import.alias = Some(self.text(ident).to_string());
                        }
                    }
                    "named_imports" => {
                        let mut named_cursor = child.walk();
                        for spec in child.children(&mut named_cursor) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            if let Some(name) = spec.child_by_field_name("name") {
                                import
                                    .imported_names
                                    .push(unquote(self.text(name)).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self.builder.add_import(import);
    }

    fn export_statement(&mut self, node: Node, depth: usize) {
        let is_default = has_child_kind(node, "default");
        let type_only = has_child_kind(node, "type");
        let source = node
            .child_by_field_name("source")
            .map(|s| unquote(self.text(s)).to_string());

        if let Some(decl) = node.child_by_field_name("declaration") {
            let type_decl = matches!(
                decl.kind(),
                "interface_declaration" | "type_alias_declaration"
            );
            let declared = self.declaration(decl, true, depth).unwrap_or_default();
            for (name, name_node) in declared {
                let mut export = ExportRecord::local(name, node_location(name_node, self.file_id));
                export.is_type_only = type_decl;
                if is_default {
                    export.exported_name = "default".to_string();
                    export.is_default = true;
                }
                self.builder.add_export(export);
            }
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            self.default_value_export(node, value, depth);
            return;
        }

        let location = node_location(node, self.file_id);
        if let Some(clause) = find_child_by_kind(node, "export_clause") {
            let mut names = Vec::new();
            let mut cursor = clause.walk();
            for spec in clause.children(&mut cursor) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let Some(name_node) = spec.child_by_field_name("name") else {
                    continue;
                };
                let local = unquote(self.text(name_node)).to_string();
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|a| unquote(self.text(a)).to_string())
                    .unwrap_or_else(|| local.clone());

                let mut export = ExportRecord::local(local.clone(), node_location(spec, self.file_id));
                export.is_default = exported == "default";
                export.exported_name = exported;
                export.is_type_only = type_only;
                export.is_reexport = source.is_some();
                export.source_path = source.clone();
                self.builder.add_export(export);

                if source.is_none() {
                    self.local_exports.push(local.clone());
                }
                names.push(local);
            }

            // Re-exports make this file depend on the source module
            if let Some(source) = source {
                let mut import = ImportRecord::new(source, location);
                import.imported_names = names;
                import.is_type_only = type_only;
                self.builder.add_import(import);
            }
            return;
        }

        // export * from './x' / export * as ns from './x'
        if let Some(source) = source {
            let namespace = find_child_by_kind(node, "namespace_export").and_then(|ns| {
                let count = ns.named_child_count();
                ns.named_child(u32::try_from(count.checked_sub(1)?).ok()?)
                    .map(|n| unquote(self.text(n)).to_string())
            });

            let mut export = ExportRecord::local("*", location);
            if let Some(ns) = &namespace {
                export.exported_name = ns.clone();
            }
            export.is_reexport = true;
            export.source_path = Some(source.clone());
            self.builder.add_export(export);

            let mut import = ImportRecord::new(source, location);
            import.is_namespace = true;
            import.alias = namespace;
            self.builder.add_import(import);
        }
    }

    /// `export default <expression>`
    fn default_value_export(&mut self, node: Node, value: Node, depth: usize) {
        let location = node_location(node, self.file_id);
        let local_name = match value.kind() {
            "identifier" => {
                let name = self.text(value).to_string();
                self.local_exports.push(name.clone());
                name
            }
            "function_expression" | "function" | "arrow_function" | "generator_function" => {
                self.function(value, true, depth).0
            }
            "class" => self.class(value, true, depth).0,
            _ => {
                self.visit(value, depth + 1);
                "default".to_string()
            }
        };

        let mut export = ExportRecord::local(local_name, location);
        export.exported_name = "default".to_string();
        export.is_default = true;
        self.builder.add_export(export);
    }

    fn decorators(&self, node: Node) -> Vec<Attribute> {
        let mut attributes = Vec::new();
        let mut collect = |owner: Node| {
            let mut cursor = owner.walk();
            for child in owner.children(&mut cursor) {
                if child.kind() == "decorator" {
                    let text = self.text(child).trim();
                    let kind = if text.trim_start_matches('@').starts_with("deprecated") {
                        AttributeKind::Deprecated
                    } else {
                        AttributeKind::Decorator
                    };
                    attributes.push(Attribute::new(kind, text, Self::line(child)));
                }
            }
        };
        collect(node);
        if let Some(parent) = node.parent().filter(|p| p.kind() == "export_statement") {
            collect(parent);
        }
        attributes
    }

    fn modifiers(&self, node: Node) -> Vec<Attribute> {
        let line = Self::line(node);
        let mut attributes = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let kind = match child.kind() {
                "async" => AttributeKind::Async,
                "static" => AttributeKind::Static,
                "abstract" => AttributeKind::Abstract,
                "*" => AttributeKind::Generator,
                _ => continue,
            };
            attributes.push(Attribute::new(kind, child.kind(), line));
        }
        if node.kind().starts_with("generator_function")
            && !attributes.iter().any(|a| a.kind == AttributeKind::Generator)
        {
            attributes.push(Attribute::new(AttributeKind::Generator, "*", line));
        }
        attributes
    }

    fn signature(&self, node: Node) -> String {
        let end = node
            .child_by_field_name("body")
            .map_or(node.end_byte(), |b| b.start_byte());
        text_between(self.content, node.start_byte(), end)
    }

    fn annotation(&self, node: Option<Node>) -> Option<String> {
        node.map(|n| self.text(n).trim_start_matches(':').trim().to_string())
    }

    fn type_parameters(&self, node: Node) -> Vec<TypeParameter> {
        let Some(list) = node.child_by_field_name("type_parameters") else {
            return Vec::new();
        };
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for param in list.children(&mut cursor) {
            if param.kind() != "type_parameter" {
                continue;
            }
            let Some(name) = param.child_by_field_name("name") else {
                continue;
            };
            let constraint = param.child_by_field_name("constraint").map(|c| {
                self.text(c)
                    .trim_start_matches("extends")
                    .trim()
                    .to_string()
            });
            params.push(TypeParameter {
                name: self.text(name).to_string(),
                constraint,
            });
        }
        params
    }

    fn function<'t>(&mut self, node: Node<'t>, exported: bool, depth: usize) -> Declared<'t> {
        let name_node = node.child_by_field_name("name");
        let name = name_node.map_or("default", |n| self.text(n)).to_string();
        let anchor = name_node.unwrap_or(node);

        let id = self.builder.add_symbol(
            name.clone(),
            SymbolKind::Function,
            node_location(anchor, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let signature = self.signature(node);
        let mut attributes = self.modifiers(node);
        attributes.extend(self.decorators(node));
        let type_params = self.type_parameters(node);
        let return_type = self.annotation(node.child_by_field_name("return_type"));
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.attributes = attributes;
            s.type_parameters = type_params;
            s.type_name = return_type;
        });

        self.function_body(node, &name, ScopeKind::Function, depth);
        (name, anchor)
    }

    /// Open a scope over a function-like node, declare its parameters and walk its body.
    fn function_body(&mut self, node: Node, name: &str, kind: ScopeKind, depth: usize) {
        self.scopes
            .push_scope(kind, name, node.start_byte(), node.end_byte());
        if let Some(params) = node.child_by_field_name("parameters") {
            self.parameters(params);
        } else if let Some(param) = node.child_by_field_name("parameter") {
            self.add_parameter(param, None);
        }
        if let Some(body) = node.child_by_field_name("body") {
            match body.kind() {
                "statement_block" | "class_body" => self.visit_children(body, depth + 1),
                _ => self.visit(body, depth + 1),
            }
        }
        self.scopes.pop_scope();
    }

    fn parameters(&mut self, params: Node) {
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            match param.kind() {
                "identifier" => self.add_parameter(param, None),
                "assignment_pattern" => {
                    if let Some(left) = param.child_by_field_name("left") {
                        self.add_parameter(left, None);
                    }
                }
                "rest_pattern" => {
                    if let Some(ident) = find_child_by_kind(param, "identifier") {
                        self.add_parameter(ident, None);
                    }
                }
                "required_parameter" | "optional_parameter" => {
                    let ty = self.annotation(param.child_by_field_name("type"));
                    match param.child_by_field_name("pattern") {
                        Some(p) if p.kind() == "identifier" => self.add_parameter(p, ty),
                        Some(p) if p.kind() == "rest_pattern" => {
                            if let Some(ident) = find_child_by_kind(p, "identifier") {
                                self.add_parameter(ident, ty);
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    fn add_parameter(&mut self, name_node: Node, type_name: Option<String>) {
        if name_node.kind() != "identifier" {
            return;
        }
        let id = self.builder.add_symbol(
            self.text(name_node),
            SymbolKind::Parameter,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            false,
        );
        self.builder.update_symbol(id, |s| s.type_name = type_name);
    }

    fn class<'t>(&mut self, node: Node<'t>, exported: bool, depth: usize) -> Declared<'t> {
        let name_node = node.child_by_field_name("name");
        let name = name_node.map_or("default", |n| self.text(n)).to_string();
        let anchor = name_node.unwrap_or(node);

        let id = self.builder.add_symbol(
            name.clone(),
            SymbolKind::Class,
            node_location(anchor, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let signature = self.signature(node);
        let mut attributes = self.decorators(node);
        if node.kind() == "abstract_class_declaration" {
            attributes.push(Attribute::new(AttributeKind::Abstract, "abstract", Self::line(node)));
        }
        let type_params = self.type_parameters(node);
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.attributes = attributes;
            s.type_parameters = type_params;
        });

        self.scopes
            .push_scope(ScopeKind::Class, name.as_str(), node.start_byte(), node.end_byte());
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                match member.kind() {
                    "method_definition" | "method_signature" | "abstract_method_signature" => {
                        self.method(member, id, depth + 1)
                    }
                    "field_definition" | "public_field_definition" => self.field(member, id),
                    _ => {}
                }
            }
        }
        self.scopes.pop_scope();
        (name, anchor)
    }

    fn method(&mut self, node: Node, class_id: u32, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = unquote(self.text(name_node));
        let kind = if name == "constructor" {
            SymbolKind::Constructor
        } else {
            SymbolKind::Method
        };

        let id = self.builder.add_symbol(
            name,
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            false,
        );
        let signature = self.signature(node);
        let mut attributes = self.decorators(node);
        attributes.extend(self.modifiers(node));
        let return_type = self.annotation(node.child_by_field_name("return_type"));
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.attributes = attributes;
            s.type_name = return_type;
            s.parent = Some(class_id);
        });

        self.function_body(node, name, ScopeKind::Method, depth);
    }

    fn field(&mut self, node: Node, class_id: u32) {
        let Some(name_node) = node
            .child_by_field_name("property")
            .or_else(|| node.child_by_field_name("name"))
        else {
            return;
        };
        let id = self.builder.add_symbol(
            unquote(self.text(name_node)),
            SymbolKind::Field,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            false,
        );
        let type_name = self.annotation(node.child_by_field_name("type"));
        let value = node
            .child_by_field_name("value")
            .map(|v| summarize_value(self.text(v)));
        let mut attributes = self.decorators(node);
        attributes.extend(self.modifiers(node));
        self.builder.update_symbol(id, |s| {
            s.type_name = type_name;
            s.value = value;
            s.attributes = attributes;
            s.parent = Some(class_id);
        });
    }

    fn variables<'t>(&mut self, node: Node<'t>, exported: bool, depth: usize) -> Vec<Declared<'t>> {
        let is_const = has_child_kind(node, "const");
        let mut declared = Vec::new();

        let mut cursor = node.walk();
        let declarators: Vec<Node<'t>> = node
            .children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .collect();

        for declarator in declarators {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let value = declarator.child_by_field_name("value");

            if let Some(path) = value.and_then(|v| self.require_path(v)) {
                self.require_import(path, name_node, declarator);
                continue;
            }

            if name_node.kind() != "identifier" {
                // Destructuring: declare the bound names, then walk the initializer
                let mut pattern_cursor = name_node.walk();
                let bound: Vec<Node<'t>> = name_node
                    .children(&mut pattern_cursor)
                    .filter(|c| {
                        matches!(c.kind(), "identifier" | "shorthand_property_identifier_pattern")
                    })
                    .collect();
                for ident in bound {
                    let name = self.text(ident).to_string();
                    self.builder.add_symbol(
                        name.clone(),
                        SymbolKind::Variable,
                        node_location(ident, self.file_id),
                        self.scopes.current_scope(),
                        exported,
                    );
                    declared.push((name, ident));
                }
                if let Some(value) = value {
                    self.visit(value, depth + 1);
                }
                continue;
            }

            let name = self.text(name_node).to_string();
            match value.map(|v| (v, v.kind())) {
                Some((func, "arrow_function" | "function_expression" | "function" | "generator_function")) => {
                    let id = self.builder.add_symbol(
                        name.clone(),
                        SymbolKind::Function,
                        node_location(name_node, self.file_id),
                        self.scopes.current_scope(),
                        exported,
                    );
                    let signature = text_between(
                        self.content,
                        declarator.start_byte(),
                        func.child_by_field_name("body")
                            .map_or(func.end_byte(), |b| b.start_byte()),
                    );
                    let attributes = self.modifiers(func);
                    let return_type = self.annotation(func.child_by_field_name("return_type"));
                    self.builder.update_symbol(id, |s| {
                        s.signature = Some(signature);
                        s.attributes = attributes;
                        s.type_name = return_type;
                    });
                    self.function_body(func, &name, ScopeKind::Function, depth);
                }
                Some((class, "class")) => {
                    let id = self.builder.add_symbol(
                        name.clone(),
                        SymbolKind::Class,
                        node_location(name_node, self.file_id),
                        self.scopes.current_scope(),
                        exported,
                    );
                    let signature = self.signature(class);
                    self.builder
                        .update_symbol(id, |s| s.signature = Some(signature));
                }
                other => {
                    let kind = if is_const {
                        SymbolKind::Constant
                    } else {
                        SymbolKind::Variable
                    };
                    let id = self.builder.add_symbol(
                        name.clone(),
                        kind,
                        node_location(name_node, self.file_id),
                        self.scopes.current_scope(),
                        exported,
                    );
                    let type_name = self.annotation(declarator.child_by_field_name("type"));
                    let value_text = other.map(|(v, _)| summarize_value(self.text(v)));
                    self.builder.update_symbol(id, |s| {
                        s.type_name = type_name;
                        s.value = value_text;
                    });
                    if let Some((v, _)) = other {
                        self.visit(v, depth + 1);
                    }
                }
            }
            declared.push((name, name_node));
        }
        declared
    }

    /// `require("x")` argument, if `node` is such a call.
    fn require_path(&self, node: Node) -> Option<String> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        if function.kind() != "identifier" || self.text(function) != "require" {
            return None;
        }
        let args = node.child_by_field_name("arguments")?;
        let first = args.named_child(0)?;
        if first.kind() != "string" {
            return None;
        }
        Some(unquote(self.text(first)).to_string())
    }

    fn require_import(&mut self, path: String, name_node: Node, declarator: Node) {
        let mut import = ImportRecord::new(path, node_location(declarator, self.file_id));
        match name_node.kind() {
            "identifier" => {
                import.is_namespace = true;
                import.alias = Some(self.text(name_node).to_string());
            }
            "object_pattern" => {
                let mut cursor = name_node.walk();
                for prop in name_node.children(&mut cursor) {
                    let imported = match prop.kind() {
                        "shorthand_property_identifier_pattern" => Some(prop),
                        "pair_pattern" => prop.child_by_field_name("key"),
                        _ => None,
                    };
                    if let Some(imported) = imported {
                        import
                            .imported_names
                            .push(unquote(self.text(imported)).to_string());
                    }
                }
            }
            _ => {}
        }
        self.builder.add_import(import);
    }

    fn interface<'t>(&mut self, node: Node<'t>, exported: bool) -> Declared<'t> {
        let name_node = node.child_by_field_name("name").unwrap_or(node);
        let name = self.text(name_node).to_string();

        let id = self.builder.add_symbol(
            name.clone(),
            SymbolKind::Interface,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let type_params = self.type_parameters(node);
        let signature = self.signature(node);
        self.builder.update_symbol(id, |s| {
            s.type_parameters = type_params;
            s.signature = Some(signature);
        });

        self.scopes
            .push_scope(ScopeKind::Interface, name.as_str(), node.start_byte(), node.end_byte());
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                let kind = match member.kind() {
                    "property_signature" => SymbolKind::Property,
                    "method_signature" => SymbolKind::Method,
                    _ => continue,
                };
                let Some(member_name) = member.child_by_field_name("name") else {
                    continue;
                };
                let member_id = self.builder.add_symbol(
                    unquote(self.text(member_name)),
                    kind,
                    node_location(member_name, self.file_id),
                    self.scopes.current_scope(),
                    false,
                );
                let type_name = self.annotation(member.child_by_field_name("type"));
                let signature = self.text(member).trim_end_matches([';', ',']).to_string();
                self.builder.update_symbol(member_id, |s| {
                    s.parent = Some(id);
                    s.type_name = type_name;
                    s.signature = Some(signature);
                });
            }
        }
        self.scopes.pop_scope();
        (name, name_node)
    }

    fn type_alias<'t>(&mut self, node: Node<'t>, exported: bool) -> Declared<'t> {
        let name_node = node.child_by_field_name("name").unwrap_or(node);
        let name = self.text(name_node).to_string();
        let id = self.builder.add_symbol(
            name.clone(),
            SymbolKind::Type,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let type_params = self.type_parameters(node);
        let aliased = node
            .child_by_field_name("value")
            .map(|v| summarize_value(self.text(v)));
        self.builder.update_symbol(id, |s| {
            s.type_parameters = type_params;
            s.type_name = aliased;
        });
        (name, name_node)
    }

    fn enumeration<'t>(&mut self, node: Node<'t>, exported: bool) -> Declared<'t> {
        let name_node = node.child_by_field_name("name").unwrap_or(node);
        let name = self.text(name_node).to_string();
        let id = self.builder.add_symbol(
            name.clone(),
            SymbolKind::Enum,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                let member_name = match member.kind() {
                    "property_identifier" | "string" => Some(member),
                    "enum_assignment" => member.child_by_field_name("name"),
                    _ => None,
                };
                let Some(member_name) = member_name else {
                    continue;
                };
                let member_id = self.builder.add_symbol(
                    unquote(self.text(member_name)),
                    SymbolKind::EnumMember,
                    node_location(member_name, self.file_id),
                    self.scopes.current_scope(),
                    false,
                );
                let value = member
                    .child_by_field_name("value")
                    .map(|v| summarize_value(self.text(v)));
                self.builder.update_symbol(member_id, |s| {
                    s.parent = Some(id);
                    s.value = value;
                });
            }
        }
        (name, name_node)
    }

    fn finish(self) -> SymbolTable {
        for name in &self.local_exports {
            self.builder.mark_exported(name);
        }
        debug_assert_eq!(self.scopes.current_scope(), ScopeId::GLOBAL);
        self.builder.set_scopes(self.scopes.into_scopes());
        self.builder.build()
    }
}
