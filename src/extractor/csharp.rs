//! C# symbol extraction.
//!
//! Namespaces become symbols but open no scope, so a type declared inside one
//! is still top-level and links through a `using` of that namespace. Top-level
//! types are exported unless they are `file` or `private`. A plain `using` is a
//! namespace import; `using static` and aliases name one type.

use tree_sitter::{Language, Node, Tree};

use super::{
    ExtractError, MAX_AST_DEPTH, SymbolExtractor, find_child_by_kind, node_location, node_text,
    summarize_value, text_between,
};
use crate::scope::{ScopeId, ScopeTracker};
use crate::symbol_table::{SymbolTable, SymbolTableBuilder};
use crate::types::{
    Attribute, AttributeKind, ExportRecord, FileId, ImportRecord, ScopeKind, SymbolKind,
    TypeParameter,
};

#[derive(Debug, Default)]
pub struct CSharpExtractor;

impl CSharpExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for CSharpExtractor {
    fn language(&self) -> &'static str {
        "csharp"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cs", "csx"]
    }

    fn grammar(&self, _path: &std::path::Path) -> Language {
        tree_sitter_c_sharp::LANGUAGE.into()
    }

    fn extract_symbols(
        &self,
        file_id: FileId,
        content: &[u8],
        tree: Option<&Tree>,
    ) -> Result<SymbolTable, ExtractError> {
        let tree = tree.ok_or(ExtractError::InvalidTree)?;

        let mut walker = CSharpWalker {
            file_id,
            content,
            builder: SymbolTableBuilder::new(file_id, "csharp"),
            scopes: ScopeTracker::new(),
        };
        walker.visit(tree.root_node(), None, 0);
        walker.builder.set_scopes(walker.scopes.into_scopes());
        Ok(walker.builder.build())
    }
}

struct Declarator<'t> {
    name: Node<'t>,
    type_name: Option<String>,
    value: Option<String>,
}

struct CSharpWalker<'a> {
    file_id: FileId,
    content: &'a [u8],
    builder: SymbolTableBuilder,
    scopes: ScopeTracker,
}

impl<'a> CSharpWalker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.content)
    }

    fn line(node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn at_top_level(&self, parent: Option<u32>) -> bool {
        parent.is_none() && self.scopes.current_scope() == ScopeId::GLOBAL
    }

    /// `parent` is the enclosing type while walking a type body.
    fn visit(&mut self, node: Node, parent: Option<u32>, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::warn!(
                "[csharp] maximum AST depth reached at line {}",
                Self::line(node)
            );
            return;
        }

        match node.kind() {
            "using_directive" => self.using(node),
            "namespace_declaration" | "file_scoped_namespace_declaration" => {
                self.namespace(node, depth)
            }
            "class_declaration"
            | "struct_declaration"
            | "interface_declaration"
            | "record_declaration"
            | "record_struct_declaration"
            | "enum_declaration" => self.type_declaration(node, parent, depth),
            "delegate_declaration" => self.delegate(node, parent),
            "method_declaration"
            | "constructor_declaration"
            | "destructor_declaration"
            | "local_function_statement" => self.method(node, parent, depth),
            "property_declaration" | "event_declaration" => self.property(node, parent),
            "field_declaration" | "event_field_declaration" => self.field(node, parent),
            "local_declaration_statement" => {
                self.locals(node);
                self.visit_children(node, None, depth);
            }
            "lambda_expression" | "anonymous_method_expression" => {}
            _ => self.visit_children(node, parent, depth),
        }
    }

    fn visit_children(&mut self, node: Node, parent: Option<u32>, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, parent, depth + 1);
        }
    }

    fn using(&mut self, node: Node) {
        let mut is_static = false;
        let mut alias = None;
        let mut path = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "static" => is_static = true,
                // What came before `=` was the alias
                "=" => alias = path.take(),
                "identifier" | "qualified_name" | "generic_name" | "alias_qualified_name" => {
                    if path.is_none() {
                        path = Some(self.text(child));
                    }
                }
                _ => {}
            }
        }
        let Some(path) = path else {
            return;
        };
        // `List<int>` names the generic type `List`
        let path = path.split('<').next().unwrap_or(path).trim();
        if path.is_empty() {
            return;
        }

        let mut import = ImportRecord::new(path, node_location(node, self.file_id));
        if is_static || alias.is_some() {
            let last = path.rsplit('.').next().unwrap_or(path);
            import.imported_names.push(last.to_string());
            import.alias = alias.map(str::to_string);
        } else {
            import.is_namespace = true;
        }
        self.builder.add_import(import);
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
        match node.child_by_field_name("body") {
            Some(body) => self.visit_children(body, None, depth + 1),
            // File-scoped: the members follow as children
            None => self.visit_children(node, None, depth + 1),
        }
    }

    /// Text of the `modifier` children, e.g. `["public", "static"]`.
    fn modifiers(&self, node: Node) -> Vec<&'a str> {
        let mut cursor = node.walk();
        node.children(&mut cursor)
            .filter(|child| child.kind() == "modifier")
            .map(|child| self.text(child).trim())
            .collect()
    }

    /// `[Attr(...)]` lists as annotations plus the modifiers the attribute
    /// kinds can express.
    fn attributes(&self, node: Node, modifiers: &[&str]) -> Vec<Attribute> {
        let mut attributes = Vec::new();
        let mut cursor = node.walk();
        for list in node.children(&mut cursor) {
            if list.kind() != "attribute_list" {
                continue;
            }
            let mut list_cursor = list.walk();
            for attribute in list.children(&mut list_cursor) {
                if attribute.kind() != "attribute" {
                    continue;
                }
                let text = self.text(attribute).trim();
                let name = attribute
                    .child_by_field_name("name")
                    .map_or_else(|| text.split('(').next().unwrap_or(text), |n| self.text(n));
                let short = name.rsplit('.').next().unwrap_or(name);
                let kind = if short == "Obsolete" || short == "ObsoleteAttribute" {
                    AttributeKind::Deprecated
                } else {
                    AttributeKind::Annotation
                };
                attributes.push(Attribute::new(kind, text, Self::line(attribute)));
            }
        }

        for modifier in modifiers {
            let kind = match *modifier {
                "static" => AttributeKind::Static,
                "abstract" => AttributeKind::Abstract,
                "async" => AttributeKind::Async,
                _ => continue,
            };
            attributes.push(Attribute::new(kind, *modifier, Self::line(node)));
        }
        attributes
    }

    /// Declaration text after its attribute lists, up to `end`.
    fn signature(&self, node: Node, end: usize) -> String {
        let mut cursor = node.walk();
        let start = node
            .children(&mut cursor)
            .filter(|child| child.kind() == "attribute_list")
            .last()
            .map_or(node.start_byte(), |list| list.end_byte());
        text_between(self.content, start, end)
    }

    fn body_start(node: Node) -> usize {
        node.child_by_field_name("body")
            .map_or(node.end_byte(), |body| body.start_byte())
    }

    fn type_parameters(&self, node: Node) -> Vec<TypeParameter> {
        let Some(list) = node
            .child_by_field_name("type_parameters")
            .or_else(|| find_child_by_kind(node, "type_parameter_list"))
        else {
            return Vec::new();
        };

        // `where T : class, new()`
        let mut constraints = Vec::new();
        let mut cursor = node.walk();
        for clause in node.children(&mut cursor) {
            if clause.kind() != "type_parameter_constraints_clause" {
                continue;
            }
            let text = self.text(clause).trim_start_matches("where");
            if let Some((name, constraint)) = text.split_once(':') {
                constraints.push((name.trim(), constraint.trim()));
            }
        }

        let mut params = Vec::new();
        let mut list_cursor = list.walk();
        for param in list.children(&mut list_cursor) {
            if param.kind() != "type_parameter" {
                continue;
            }
            let name = param
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(param, "identifier"))
                .map_or_else(|| self.text(param), |n| self.text(n));
            let constraint = constraints
                .iter()
                .find(|(target, _)| *target == name)
                .map(|(_, c)| c.to_string());
            params.push(TypeParameter {
                name: name.to_string(),
                constraint,
            });
        }
        params
    }

    fn type_declaration(&mut self, node: Node, parent: Option<u32>, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let kind = match node.kind() {
            "struct_declaration" => SymbolKind::Struct,
            "interface_declaration" => SymbolKind::Interface,
            "record_declaration" | "record_struct_declaration" => SymbolKind::Record,
            "enum_declaration" => SymbolKind::Enum,
            _ => SymbolKind::Class,
        };

        let modifiers = self.modifiers(node);
        let top_level = self.at_top_level(parent);
        let exported = if top_level {
            !modifiers.iter().any(|m| matches!(*m, "file" | "private"))
        } else {
            modifiers.contains(&"public")
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
        let type_params = self.type_parameters(node);
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature.trim_end_matches(';').trim_end().to_string());
            s.attributes = attributes;
            s.type_parameters = type_params;
            s.parent = parent;
        });
        if top_level && exported {
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

        // Positional record parameters are properties
        if kind == SymbolKind::Record
            && let Some(params) = find_child_by_kind(node, "parameter_list")
        {
            self.record_properties(params, id);
        }

        if let Some(body) = node.child_by_field_name("body") {
            if kind == SymbolKind::Enum {
                self.enum_members(body, id);
            } else {
                self.visit_children(body, Some(id), depth + 1);
            }
        }
        self.scopes.pop_scope();
    }

    fn record_properties(&mut self, params: Node, record_id: u32) {
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            if param.kind() != "parameter" {
                continue;
            }
            let Some(name_node) = param.child_by_field_name("name") else {
                continue;
            };
            let id = self.builder.add_symbol(
                self.text(name_node),
                SymbolKind::Property,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                true,
            );
            let ty = param
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());
            self.builder.update_symbol(id, |s| {
                s.type_name = ty;
                s.parent = Some(record_id);
            });
        }
    }

    fn enum_members(&mut self, body: Node, enum_id: u32) {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            if member.kind() != "enum_member_declaration" {
                continue;
            }
            let Some(name_node) = member
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(member, "identifier"))
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
                .map(|(_, v)| summarize_value(v.trim()));
            self.builder.update_symbol(id, |s| {
                s.value = value;
                s.parent = Some(enum_id);
            });
        }
    }

    fn delegate(&mut self, node: Node, parent: Option<u32>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let modifiers = self.modifiers(node);
        let top_level = self.at_top_level(parent);
        let exported = if top_level {
            !modifiers.iter().any(|m| matches!(*m, "file" | "private"))
        } else {
            modifiers.contains(&"public")
        };

        let id = self.builder.add_symbol(
            name,
            SymbolKind::Delegate,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let signature = self.signature(node, node.end_byte());
        let attributes = self.attributes(node, &modifiers);
        let return_type = node
            .child_by_field_name("returns")
            .or_else(|| node.child_by_field_name("type"))
            .map(|t| self.text(t).to_string());
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature.trim_end_matches(';').to_string());
            s.attributes = attributes;
            s.type_name = return_type;
            s.parent = parent;
        });
        if top_level && exported {
            self.builder
                .add_export(ExportRecord::local(name, node_location(name_node, self.file_id)));
        }
    }

    fn method(&mut self, node: Node, parent: Option<u32>, depth: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let (name, kind) = match node.kind() {
            "constructor_declaration" => (self.text(name_node).to_string(), SymbolKind::Constructor),
            "destructor_declaration" => (format!("~{}", self.text(name_node)), SymbolKind::Method),
            "local_function_statement" => (self.text(name_node).to_string(), SymbolKind::Function),
            _ if parent.is_some() => (self.text(name_node).to_string(), SymbolKind::Method),
            _ => (self.text(name_node).to_string(), SymbolKind::Function),
        };

        let modifiers = self.modifiers(node);
        let id = self.builder.add_symbol(
            name.as_str(),
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            modifiers.contains(&"public"),
        );
        let signature = self.signature(node, Self::body_start(node));
        let attributes = self.attributes(node, &modifiers);
        let type_params = self.type_parameters(node);
        let return_type = node
            .child_by_field_name("returns")
            .or_else(|| node.child_by_field_name("type"))
            .map(|t| self.text(t).to_string());
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature.trim_end_matches(';').trim_end().to_string());
            s.attributes = attributes;
            s.type_parameters = type_params;
            s.type_name = return_type;
            s.parent = parent;
        });

        let scope_kind = if parent.is_some() {
            ScopeKind::Method
        } else {
            ScopeKind::Function
        };
        self.scopes
            .push_scope(scope_kind, name.as_str(), node.start_byte(), node.end_byte());
        if let Some(params) = node
            .child_by_field_name("parameters")
            .or_else(|| find_child_by_kind(node, "parameter_list"))
        {
            self.parameters(params);
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, None, depth + 1);
        }
        self.scopes.pop_scope();
    }

    fn parameters(&mut self, params: Node) {
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            if param.kind() != "parameter" {
                continue;
            }
            let Some(name_node) = param.child_by_field_name("name") else {
                continue;
            };
            let id = self.builder.add_symbol(
                self.text(name_node),
                SymbolKind::Parameter,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                false,
            );
            let ty = param
                .child_by_field_name("type")
                .map(|t| self.text(t).to_string());
            self.builder.update_symbol(id, |s| s.type_name = ty);
        }
    }

    fn property(&mut self, node: Node, parent: Option<u32>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let kind = if node.kind() == "event_declaration" {
            SymbolKind::Event
        } else {
            SymbolKind::Property
        };
        let modifiers = self.modifiers(node);
        let id = self.builder.add_symbol(
            self.text(name_node),
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            modifiers.contains(&"public"),
        );

        let end = find_child_by_kind(node, "accessor_list")
            .or_else(|| find_child_by_kind(node, "arrow_expression_clause"))
            .map_or(name_node.end_byte(), |n| n.start_byte());
        let signature = self.signature(node, end);
        let attributes = self.attributes(node, &modifiers);
        let ty = node
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string());
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.attributes = attributes;
            s.type_name = ty;
            s.parent = parent;
        });
    }

    fn field(&mut self, node: Node, parent: Option<u32>) {
        let modifiers = self.modifiers(node);
        let kind = if node.kind() == "event_field_declaration" {
            SymbolKind::Event
        } else if modifiers.contains(&"const") {
            SymbolKind::Constant
        } else {
            SymbolKind::Field
        };
        let exported = modifiers.contains(&"public");
        let attributes = self.attributes(node, &modifiers);
        for declarator in self.declarators(node) {
            let id = self.builder.add_symbol(
                self.text(declarator.name),
                kind,
                node_location(declarator.name, self.file_id),
                self.scopes.current_scope(),
                exported,
            );
            let attributes = attributes.clone();
            self.builder.update_symbol(id, |s| {
                s.type_name = declarator.type_name;
                s.value = declarator.value;
                s.attributes = attributes;
                s.parent = parent;
            });
        }
    }

    fn locals(&mut self, node: Node) {
        let kind = if self.modifiers(node).contains(&"const") {
            SymbolKind::Constant
        } else {
            SymbolKind::Variable
        };
        for declarator in self.declarators(node) {
            let id = self.builder.add_symbol(
                self.text(declarator.name),
                kind,
                node_location(declarator.name, self.file_id),
                self.scopes.current_scope(),
                false,
            );
            self.builder.update_symbol(id, |s| {
                s.type_name = declarator.type_name.filter(|t| t != "var");
                s.value = declarator.value;
            });
        }
    }

    /// Declarators of the `variable_declaration` under `node`.
    fn declarators<'t>(&self, node: Node<'t>) -> Vec<Declarator<'t>> {
        let Some(declaration) = find_child_by_kind(node, "variable_declaration") else {
            return Vec::new();
        };
        let ty = declaration
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string());

        let mut found = Vec::new();
        let mut cursor = declaration.walk();
        for declarator in declaration.children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator
                .child_by_field_name("name")
                .or_else(|| find_child_by_kind(declarator, "identifier"))
            else {
                continue;
            };
            let value = self
                .text(declarator)
                .split_once('=')
                .map(|(_, v)| summarize_value(v.trim()));
            found.push(Declarator {
                name: name_node,
                type_name: ty.clone(),
                value,
            });
        }
        found
    }
}
