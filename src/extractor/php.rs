//! PHP symbol extraction.
//!
//! `use` clauses import one class, function or constant each; grouped uses
//! expand to one import per member. `include` and `require` import a whole
//! file. Everything declared at file level is exported, and class members
//! default to public.

use tree_sitter::{Language, Node, Tree};

use super::{
    ExtractError, MAX_AST_DEPTH, SymbolExtractor, find_child_by_kind, node_location, node_text,
    summarize_value, text_between, unquote,
};
use crate::scope::{ScopeId, ScopeTracker};
use crate::symbol_table::{SymbolTable, SymbolTableBuilder};
use crate::types::{
    Attribute, AttributeKind, ExportRecord, FileId, ImportRecord, ScopeKind, SymbolKind,
};

#[derive(Debug, Default)]
pub struct PhpExtractor;

impl PhpExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for PhpExtractor {
    fn language(&self) -> &'static str {
        "php"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["php", "phtml"]
    }

    fn grammar(&self, _path: &std::path::Path) -> Language {
        tree_sitter_php::LANGUAGE_PHP.into()
    }

    fn extract_symbols(
        &self,
        file_id: FileId,
        content: &[u8],
        tree: Option<&Tree>,
    ) -> Result<SymbolTable, ExtractError> {
        let tree = tree.ok_or(ExtractError::InvalidTree)?;

        let mut walker = PhpWalker {
            file_id,
            content,
            builder: SymbolTableBuilder::new(file_id, "php"),
            scopes: ScopeTracker::new(),
        };
        walker.visit(tree.root_node(), None, 0);
        walker.builder.set_scopes(walker.scopes.into_scopes());
        Ok(walker.builder.build())
    }
}

struct PhpWalker<'a> {
    file_id: FileId,
    content: &'a [u8],
    builder: SymbolTableBuilder,
    scopes: ScopeTracker,
}

impl<'a> PhpWalker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.content)
    }

    fn line(node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn at_file_level(&self, class_id: Option<u32>) -> bool {
        class_id.is_none() && self.scopes.current_scope() == ScopeId::GLOBAL
    }

    /// `class_id` is set while walking a class-like body.
    fn visit(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::warn!("[php] maximum AST depth reached at line {}", Self::line(node));
            return;
        }

        match node.kind() {
            "namespace_definition" => self.namespace(node, depth),
            "namespace_use_declaration" => self.use_declaration(node),
            "include_expression"
            | "include_once_expression"
            | "require_expression"
            | "require_once_expression" => self.include(node),
            "class_declaration"
            | "interface_declaration"
            | "trait_declaration"
            | "enum_declaration" => self.class_like(node, class_id, depth),
            "function_definition" | "method_declaration" => self.function(node, class_id, depth),
            "property_declaration" => self.property(node, class_id),
            "const_declaration" => self.constants(node, class_id),
            "function_call_expression" => {
                self.define(node);
                self.visit_children(node, class_id, depth);
            }
            "anonymous_function" | "arrow_function" => {}
            _ => self.visit_children(node, class_id, depth),
        }
    }

    fn visit_children(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, class_id, depth + 1);
        }
    }

    fn namespace(&mut self, node: Node, depth: usize) {
        if let Some(name_node) = node.child_by_field_name("name") {
            let id = self.builder.add_symbol(
                self.text(name_node),
                SymbolKind::Namespace,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                true,
            );
            let signature = format!("namespace {}", self.text(name_node));
            self.builder
                .update_symbol(id, |s| s.signature = Some(signature));
        }
        // `namespace A { ... }`; the statement form has no body
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, None, depth + 1);
        }
    }

    fn use_declaration(&mut self, node: Node) {
        let mut prefix = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "namespace_use_clause" => self.use_clause(child, None),
                // `use App\Models\{User, Post}`
                "namespace_name" => prefix = Some(self.text(child)),
                "namespace_use_group" => {
                    let mut inner = child.walk();
                    for clause in child.children(&mut inner) {
                        if matches!(
                            clause.kind(),
                            "namespace_use_clause" | "namespace_use_group_clause"
                        ) {
                            self.use_clause(clause, prefix);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn use_clause(&mut self, clause: Node, prefix: Option<&str>) {
        let mut path = None;
        let mut alias = clause.child_by_field_name("alias").map(|a| self.text(a));
        let mut after_as = false;
        let mut cursor = clause.walk();
        for child in clause.children(&mut cursor) {
            match child.kind() {
                "as" => after_as = true,
                "name" | "qualified_name" | "namespace_name" if after_as => {
                    alias.get_or_insert(self.text(child));
                }
                "name" | "qualified_name" | "namespace_name" if path.is_none() => {
                    path = Some(self.text(child));
                }
                _ => {}
            }
        }
        let Some(path) = path else {
            return;
        };

        let path = match prefix {
            Some(prefix) => format!("{}\\{}", prefix.trim_matches('\\'), path),
            None => path.trim_start_matches('\\').to_string(),
        };
        let name = path.rsplit('\\').next().unwrap_or(&path).to_string();
        let mut import = ImportRecord::new(path.as_str(), node_location(clause, self.file_id));
        import.imported_names.push(name);
        import.alias = alias.map(str::to_string);
        self.builder.add_import(import);
    }

    /// `require 'x.php'` and `require __DIR__ . '/x.php'`.
    fn include(&mut self, node: Node) {
        let Some(target) = node.named_child(0) else {
            return;
        };
        let path = match target.kind() {
            "string" | "encapsed_string" => unquote(self.text(target)).to_string(),
            "binary_expression" => {
                let left = target.child_by_field_name("left").map(|l| self.text(l));
                let right = target.child_by_field_name("right");
                match (left, right) {
                    (Some("__DIR__"), Some(right))
                        if matches!(right.kind(), "string" | "encapsed_string") =>
                    {
                        format!(".{}", unquote(self.text(right)))
                    }
                    _ => return,
                }
            }
            _ => return,
        };
        if path.is_empty() {
            return;
        }
        let mut import = ImportRecord::new(path, node_location(node, self.file_id));
        import.is_namespace = true;
        self.builder.add_import(import);
    }

    /// Text of the `*_modifier` children, e.g. `["public", "static"]`.
    fn modifiers(&self, node: Node) -> Vec<&'a str> {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .filter(|child| child.kind().ends_with("_modifier"))
            .map(|child| self.text(child).trim())
            .collect()
    }

    /// `#[...]` attributes plus the modifiers the attribute kinds can express.
    fn attributes(&self, node: Node, modifiers: &[&str]) -> Vec<Attribute> {
        let mut attributes = Vec::new();
        if let Some(list) = node
            .child_by_field_name("attributes")
            .or_else(|| find_child_by_kind(node, "attribute_list"))
        {
            let mut groups = list.walk();
            for group in list.children(&mut groups) {
                if group.kind() != "attribute_group" {
                    continue;
                }
                let mut cursor = group.walk();
                for attribute in group.children(&mut cursor) {
                    if attribute.kind() != "attribute" {
                        continue;
                    }
                    let text = self.text(attribute).trim();
                    let name = text.split('(').next().unwrap_or(text).trim();
                    let kind = if name.rsplit('\\').next() == Some("Deprecated") {
                        AttributeKind::Deprecated
                    } else {
                        AttributeKind::Annotation
                    };
                    attributes.push(Attribute::new(kind, text, Self::line(attribute)));
                }
            }
        }

        for modifier in modifiers {
            let kind = match *modifier {
                "static" => AttributeKind::Static,
                "abstract" => AttributeKind::Abstract,
                _ => continue,
            };
            attributes.push(Attribute::new(kind, *modifier, Self::line(node)));
        }
        attributes
    }

    /// Declaration text after its attributes, up to `end`.
    fn signature(&self, node: Node, end: usize) -> String {
        let start = node
            .child_by_field_name("attributes")
            .or_else(|| find_child_by_kind(node, "attribute_list"))
            .map_or(node.start_byte(), |list| list.end_byte());
        text_between(self.content, start, end)
    }

    fn body_start(node: Node) -> usize {
        node.child_by_field_name("body")
            .map_or(node.end_byte(), |body| body.start_byte())
    }

    fn is_public(modifiers: &[&str]) -> bool {
        !modifiers.iter().any(|m| matches!(*m, "private" | "protected"))
    }

    fn class_like(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let kind = match node.kind() {
            "interface_declaration" => SymbolKind::Interface,
            "trait_declaration" => SymbolKind::Trait,
            "enum_declaration" => SymbolKind::Enum,
            _ => SymbolKind::Class,
        };
        let top_level = self.at_file_level(class_id);

        let id = self.builder.add_symbol(
            name,
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            top_level,
        );
        let modifiers = self.modifiers(node);
        let signature = self.signature(node, Self::body_start(node));
        let attributes = self.attributes(node, &modifiers);
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.attributes = attributes;
            s.parent = class_id;
        });
        if top_level {
            self.builder
                .add_export(ExportRecord::local(name, node_location(name_node, self.file_id)));
        }

        let scope_kind = if kind == SymbolKind::Interface {
            ScopeKind::Interface
        } else {
            ScopeKind::Class
        };
        self.scopes
            .push_scope(scope_kind, name, node.start_byte(), node.end_byte());
        if let Some(body) = node.child_by_field_name("body") {
            if kind == SymbolKind::Enum {
                self.enum_cases(body, id, depth);
            } else {
                self.visit_children(body, Some(id), depth + 1);
            }
        }
        self.scopes.pop_scope();
    }

    fn enum_cases(&mut self, body: Node, enum_id: u32, depth: usize) {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            if member.kind() != "enum_case" {
                // Enums can carry methods and constants
                self.visit(member, Some(enum_id), depth + 1);
                continue;
            }
            let Some(name_node) = member
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(member, "name"))
            else {
                continue;
            };
            let id = self.builder.add_symbol(
                self.text(name_node),
                SymbolKind::EnumMember,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                true,
            );
            let value = self
                .text(member)
                .split_once('=')
                .map(|(_, v)| summarize_value(v.trim().trim_end_matches(';')));
            self.builder.update_symbol(id, |s| {
                s.value = value;
                s.parent = Some(enum_id);
            });
        }
    }

    fn function(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let top_level = self.at_file_level(class_id);
        let modifiers = self.modifiers(node);
        let kind = match (class_id, name) {
            (Some(_), "__construct") => SymbolKind::Constructor,
            (Some(_), _) => SymbolKind::Method,
            (None, _) => SymbolKind::Function,
        };
        let exported = if class_id.is_some() {
            Self::is_public(&modifiers)
        } else {
            top_level
        };

        let id = self.builder.add_symbol(
            name,
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let signature = self.signature(node, Self::body_start(node));
        let attributes = self.attributes(node, &modifiers);
        let return_type = node
            .child_by_field_name("return_type")
            .map(|t| self.text(t).trim_start_matches(':').trim().to_string());
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature.trim_end_matches(';').trim_end().to_string());
            s.attributes = attributes;
            s.type_name = return_type;
            s.parent = class_id;
        });
        if top_level && kind == SymbolKind::Function {
            self.builder
                .add_export(ExportRecord::local(name, node_location(name_node, self.file_id)));
        }

        let scope_kind = if class_id.is_some() {
            ScopeKind::Method
        } else {
            ScopeKind::Function
        };
        self.scopes
            .push_scope(scope_kind, name, node.start_byte(), node.end_byte());
        if let Some(params) = node.child_by_field_name("parameters") {
            self.parameters(params, class_id);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, None, depth + 1);
        }
        self.scopes.pop_scope();
    }

    /// Promoted constructor parameters also declare a property on `class_id`.
    fn parameters(&mut self, params: Node, class_id: Option<u32>) {
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            if !matches!(
                param.kind(),
                "simple_parameter" | "variadic_parameter" | "property_promotion_parameter"
            ) {
                continue;
            }
            let Some(name_node) = param
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(param, "variable_name"))
            else {
                continue;
            };
            let name = self.text(name_node).trim_start_matches('$');
            let ty = param
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());
            let id = self.builder.add_symbol(
                name,
                SymbolKind::Parameter,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                false,
            );
            let param_ty = ty.clone();
            self.builder.update_symbol(id, |s| s.type_name = param_ty);

            if param.kind() == "property_promotion_parameter"
                && let Some(class_id) = class_id
            {
                let modifiers = self.modifiers(param);
                let class_scope = self
                    .scopes
                    .scope(self.scopes.current_scope())
                    .and_then(|scope| scope.parent)
                    .unwrap_or(ScopeId::GLOBAL);
                let property = self.builder.add_symbol(
                    name,
                    SymbolKind::Property,
                    node_location(name_node, self.file_id),
                    class_scope,
                    Self::is_public(&modifiers),
                );
                self.builder.update_symbol(property, |s| {
                    s.type_name = ty;
                    s.parent = Some(class_id);
                });
            }
        }
    }

    fn property(&mut self, node: Node, class_id: Option<u32>) {
        let modifiers = self.modifiers(node);
        let exported = Self::is_public(&modifiers);
        let attributes = self.attributes(node, &modifiers);
        let ty = node
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string());

        let mut cursor = node.walk();
        for element in node.children(&mut cursor) {
            if element.kind() != "property_element" {
                continue;
            }
            let Some(name_node) = element
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(element, "variable_name"))
            else {
                continue;
            };
            let id = self.builder.add_symbol(
                self.text(name_node).trim_start_matches('$'),
                SymbolKind::Property,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                exported,
            );
            let value = self
                .text(element)
                .split_once('=')
                .map(|(_, v)| summarize_value(v.trim()));
            let (ty, attributes) = (ty.clone(), attributes.clone());
            self.builder.update_symbol(id, |s| {
                s.type_name = ty;
                s.value = value;
                s.attributes = attributes;
                s.parent = class_id;
            });
        }
    }

    fn constants(&mut self, node: Node, class_id: Option<u32>) {
        let top_level = self.at_file_level(class_id);
        let modifiers = self.modifiers(node);
        let exported = if class_id.is_some() {
            Self::is_public(&modifiers)
        } else {
            top_level
        };

        let mut cursor = node.walk();
        for element in node.children(&mut cursor) {
            if element.kind() != "const_element" {
                continue;
            }
            let Some(name_node) = find_child_by_kind(element, "name") else {
                continue;
            };
            let name = self.text(name_node);
            let id = self.builder.add_symbol(
                name,
                SymbolKind::Constant,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                exported,
            );
            let value = self
                .text(element)
                .split_once('=')
                .map(|(_, v)| summarize_value(v.trim()));
            self.builder.update_symbol(id, |s| {
                s.value = value;
                s.parent = class_id;
            });
            if top_level && !self.builder.has_export(name) {
                self.builder
                    .add_export(ExportRecord::local(name, node_location(name_node, self.file_id)));
            }
        }
    }

    /// `define('NAME', value)` at file level declares a global constant.
    fn define(&mut self, node: Node) {
        if !self.at_file_level(None) {
            return;
        }
        let is_define = node
            .child_by_field_name("function")
            .is_some_and(|f| self.text(f).eq_ignore_ascii_case("define"));
        if !is_define {
            return;
        }
        let Some(args) = node.child_by_field_name("arguments") else {
            return;
        };
        let mut cursor = args.walk();
        let mut values = args
            .named_children(&mut cursor)
            .filter(|arg| arg.kind() == "argument");
        let Some(name_arg) = values.next() else {
            return;
        };
        let name = unquote(self.text(name_arg));
        if name.is_empty() || name.contains(char::is_whitespace) {
            return;
        }
        let value = values.next().map(|v| summarize_value(self.text(v)));

        let id = self.builder.add_symbol(
            name,
            SymbolKind::Constant,
            node_location(name_arg, self.file_id),
            self.scopes.current_scope(),
            true,
        );
        self.builder.update_symbol(id, |s| s.value = value);
        if !self.builder.has_export(name) {
            self.builder
                .add_export(ExportRecord::local(name, node_location(name_arg, self.file_id)));
        }
    }
}
