//! Python symbol extraction.

use tree_sitter::{Language, Node, Tree};

use super::{
    ExtractError, MAX_AST_DEPTH, SymbolExtractor, has_child_kind, node_location, node_text,
    summarize_value, text_between, visibility,
};
use crate::scope::{ScopeId, ScopeTracker};
use crate::symbol_table::{SymbolTable, SymbolTableBuilder};
use crate::types::{
    Attribute, AttributeKind, ExportRecord, FileId, ImportRecord, ScopeKind, SymbolKind,
};

#[derive(Debug, Default)]
pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for PythonExtractor {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn grammar(&self, _path: &std::path::Path) -> Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract_symbols(
        &self,
        file_id: FileId,
        content: &[u8],
        tree: Option<&Tree>,
    ) -> Result<SymbolTable, ExtractError> {
        let tree = tree.ok_or(ExtractError::InvalidTree)?;

        let mut walker = PythonWalker {
            file_id,
            content,
            builder: SymbolTableBuilder::new(file_id, "python"),
            scopes: ScopeTracker::new(),
        };
        walker.visit(tree.root_node(), None, 0);
        walker.builder.set_scopes(walker.scopes.into_scopes());
        Ok(walker.builder.build())
    }
}

struct PythonWalker<'a> {
    file_id: FileId,
    content: &'a [u8],
    builder: SymbolTableBuilder,
    scopes: ScopeTracker,
}

impl<'a> PythonWalker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.content)
    }

    fn at_module_level(&self) -> bool {
        self.scopes.current_scope() == ScopeId::GLOBAL
    }

    /// `class_id` is set while walking a class body.
    fn visit(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        if depth > MAX_AST_DEPTH {
            tracing::warn!(
                "[python] maximum AST depth reached at line {}",
                node.start_position().row + 1
            );
            return;
        }

        match node.kind() {
            "import_statement" => self.import_statement(node),
            "import_from_statement" => self.import_from(node),
            "class_definition" => self.class(node, Vec::new(), class_id, depth),
            "function_definition" => self.function(node, Vec::new(), class_id, depth),
            "decorated_definition" => self.decorated(node, class_id, depth),
            "assignment" => {
                self.assignment(node, class_id);
                self.visit_children(node, None, depth);
            }
            "lambda" => {}
            _ => self.visit_children(node, class_id, depth),
        }
    }

    fn visit_children(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, class_id, depth + 1);
        }
    }

    fn import_statement(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            let (module, alias) = match child.kind() {
                "aliased_import" => (
                    child.child_by_field_name("name").map(|n| self.text(n)),
                    child.child_by_field_name("alias").map(|n| self.text(n)),
                ),
                _ => (Some(self.text(child)), None),
            };
            let Some(module) = module else {
                continue;
            };
            let mut import = ImportRecord::new(module, node_location(child, self.file_id));
            import.alias = Some(alias.unwrap_or(module).to_string());
            import.is_namespace = true;
            self.builder.add_import(import);
        }
    }

    fn import_from(&mut self, node: Node) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let mut import = ImportRecord::new(
            self.text(module_node),
            node_location(node, self.file_id),
        );

        let mut aliases = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            match child.kind() {
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        import.imported_names.push(self.text(name).to_string());
                    }
                    if let Some(alias) = child.child_by_field_name("alias") {
                        aliases.push(self.text(alias).to_string());
                    }
                }
                _ => import.imported_names.push(self.text(child).to_string()),
            }
        }
        if has_child_kind(node, "wildcard_import") {
            import.is_namespace = true;
        }
        if import.imported_names.len() == 1 && aliases.len() == 1 {
            import.alias = aliases.pop();
        }
        self.builder.add_import(import);
    }

    fn decorated(&mut self, node: Node, class_id: Option<u32>, depth: usize) {
        let mut attributes = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "decorator" {
                let text = self.text(child).trim();
                let kind = if text.trim_start_matches('@').starts_with("deprecated") {
                    AttributeKind::Deprecated
                } else {
                    AttributeKind::Decorator
                };
                attributes.push(Attribute::new(
                    kind,
                    text,
                    child.start_position().row as u32 + 1,
                ));
            }
        }

        let Some(definition) = node.child_by_field_name("definition") else {
            return;
        };
        match definition.kind() {
            "class_definition" => self.class(definition, attributes, class_id, depth),
            "function_definition" => self.function(definition, attributes, class_id, depth),
            _ => self.visit(definition, class_id, depth + 1),
        }
    }

    fn class(
        &mut self,
        node: Node,
        attributes: Vec<Attribute>,
        enclosing_class: Option<u32>,
        depth: usize,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let top_level = self.at_module_level();
        let exported = top_level && visibility::python_public(name);

        let id = self.builder.add_symbol(
            name,
            SymbolKind::Class,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let bases = node
            .child_by_field_name("superclasses")
            .map(|b| self.text(b).to_string());
        let signature = match &bases {
            Some(bases) => format!("class {name}{bases}"),
            None => format!("class {name}"),
        };
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.attributes = attributes;
            s.parent = enclosing_class;
        });
        if exported {
            self.builder
                .add_export(ExportRecord::local(name, node_location(name_node, self.file_id)));
        }

        self.scopes
            .push_scope(ScopeKind::Class, name, node.start_byte(), node.end_byte());
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body, Some(id), depth + 1);
        }
        self.scopes.pop_scope();
    }

    fn function(
        &mut self,
        node: Node,
        mut attributes: Vec<Attribute>,
        class_id: Option<u32>,
        depth: usize,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let top_level = self.at_module_level();
        let exported = top_level && visibility::python_public(name);

        let kind = match (class_id, name) {
            (Some(_), "__init__") => SymbolKind::Constructor,
            (Some(_), _) => SymbolKind::Method,
            (None, _) => SymbolKind::Function,
        };
        if has_child_kind(node, "async") {
            attributes.push(Attribute::new(
                AttributeKind::Async,
                "async",
                node.start_position().row as u32 + 1,
            ));
        }

        let id = self.builder.add_symbol(
            name,
            kind,
            node_location(name_node, self.file_id),
            self.scopes.current_scope(),
            exported,
        );
        let body = node.child_by_field_name("body");
        let signature = text_between(
            self.content,
            node.start_byte(),
            body.map_or(node.end_byte(), |b| b.start_byte()),
        )
        .trim_end_matches(':')
        .to_string();
        let return_type = node
            .child_by_field_name("return_type")
            .map(|t| self.text(t).to_string());
        self.builder.update_symbol(id, |s| {
            s.signature = Some(signature);
            s.type_name = return_type;
            s.attributes = attributes;
            s.parent = class_id;
        });
        if exported {
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
            self.parameters(params);
        }
        if let Some(body) = body {
            self.visit_children(body, None, depth + 1);
        }
        self.scopes.pop_scope();
    }

    fn parameters(&mut self, params: Node) {
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            let (name_node, type_node) = match param.kind() {
                "identifier" => (Some(param), None),
                "typed_parameter" => {
                    let mut inner = param.walk();
                    let name = param
                        .children(&mut inner)
                        .find(|c| c.kind() == "identifier" || c.kind().ends_with("splat_pattern"));
                    (name, param.child_by_field_name("type"))
                }
                "default_parameter" | "typed_default_parameter" => (
                    param.child_by_field_name("name"),
                    param.child_by_field_name("type"),
                ),
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let mut inner = param.walk();
                    let name = param
                        .children(&mut inner)
                        .find(|c| c.kind() == "identifier");
                    (name, None)
                }
                _ => (None, None),
            };
            let Some(name_node) = name_node else {
                continue;
            };
            let name = self
                .text(name_node)
                .trim_start_matches('*')
                .to_string();
            let id = self.builder.add_symbol(
                name,
                SymbolKind::Parameter,
                node_location(name_node, self.file_id),
                self.scopes.current_scope(),
                false,
            );
            let ty = type_node.map(|t| self.text(t).to_string());
            self.builder.update_symbol(id, |s| s.type_name = ty);
        }
    }

    fn assignment(&mut self, node: Node, class_id: Option<u32>) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let top_level = self.at_module_level();
        // Only module globals and class attributes are declarations
        if !top_level && class_id.is_none() {
            return;
        }

        let mut targets = Vec::new();
        match left.kind() {
            "identifier" => targets.push(left),
            "pattern_list" | "tuple_pattern" => {
                let mut cursor = left.walk();
                targets.extend(left.children(&mut cursor).filter(|c| c.kind() == "identifier"));
            }
            _ => return,
        }

        let type_text = node
            .child_by_field_name("type")
            .map(|t| self.text(t).to_string());
        let value_text = node
            .child_by_field_name("right")
            .map(|v| summarize_value(self.text(v)));

        for target in targets {
            let name = self.text(target);
            let kind = if class_id.is_some() {
                SymbolKind::Field
            } else if is_constant_name(name) {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            let exported = top_level && visibility::python_public(name);
            let id = self.builder.add_symbol(
                name,
                kind,
                node_location(target, self.file_id),
                self.scopes.current_scope(),
                exported,
            );
            let (ty, value) = (type_text.clone(), value_text.clone());
            self.builder.update_symbol(id, |s| {
                s.type_name = ty;
                s.value = value;
                s.parent = class_id;
            });
            if exported && !self.builder.has_export(name) {
                self.builder
                    .add_export(ExportRecord::local(name, node_location(target, self.file_id)));
            }
        }
    }
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(code: &str) -> SymbolTable {
        let extractor = PythonExtractor::new();
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&extractor.grammar(std::path::Path::new("m.py")))
            .unwrap();
        let tree = parser.parse(code, None).unwrap();
        extractor
            .extract_symbols(FileId::new(2).unwrap(), code.as_bytes(), Some(&tree))
            .unwrap()
    }

    #[test]
    fn test_import_forms() {
        let table = extract(
            "import os\nimport numpy as np\nfrom .util import helper, other as o\nfrom ..pkg import *\n",
        );

        assert_eq!(table.imports.len(), 4);
        assert_eq!(table.imports[0].path, "os");
        assert!(table.imports[0].is_namespace);
        assert_eq!(table.imports[1].alias.as_deref(), Some("np"));
        assert_eq!(table.imports[2].path, ".util");
        assert_eq!(table.imports[2].imported_names, vec!["helper", "other"]);
        assert!(!table.imports[2].is_namespace);
        assert_eq!(table.imports[3].path, "..pkg");
        assert!(table.imports[3].is_namespace);
    }

    #[test]
    fn test_classes_methods_and_decorators() {
        let table = extract(
            r#"
MAX_RETRIES = 3
_cache = {}

@dataclass
class Service(Base):
    name: str = "svc"

    def __init__(self, client):
        self.client = client

    @staticmethod
    async def fetch(url: str, *args, timeout=5) -> bytes:
        data = await get(url)
        return data

def _private():
    pass
"#,
        );

        let service = table.symbols_named("Service").next().unwrap();
        assert_eq!(service.kind, SymbolKind::Class);
        assert!(service.is_exported);
        assert_eq!(service.attributes[0].value, "@dataclass");
        assert_eq!(service.signature.as_deref(), Some("class Service(Base)"));

        let init = table.symbols_named("__init__").next().unwrap();
        assert_eq!(init.kind, SymbolKind::Constructor);
        assert_eq!(init.parent, Some(service.local_id));
        assert!(!init.is_exported);

        let fetch = table.symbols_named("fetch").next().unwrap();
        assert_eq!(fetch.kind, SymbolKind::Method);
        assert!(fetch.has_attribute(AttributeKind::Async));
        assert!(fetch.has_attribute(AttributeKind::Decorator));
        assert_eq!(fetch.type_name.as_deref(), Some("bytes"));

        let field = table.symbols_named("name").next().unwrap();
        assert_eq!(field.kind, SymbolKind::Field);

        for param in ["url", "args", "timeout", "client"] {
            let p = table.symbols_named(param).next();
            assert_eq!(p.map(|s| s.kind), Some(SymbolKind::Parameter), "param {param}");
        }
        // Locals inside functions are not declarations
        assert!(table.symbols_named("data").next().is_none());

        assert_eq!(
            table.symbols_named("MAX_RETRIES").next().unwrap().kind,
            SymbolKind::Constant
        );

        let exported: Vec<&str> = table.exports.iter().map(|e| e.exported_name.as_str()).collect();
        assert_eq!(exported, vec!["MAX_RETRIES", "Service"]);
    }
}
