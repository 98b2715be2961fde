//! Import resolution and symbol linking for JavaScript/TypeScript, Python, C# and PHP projects

use crosslink::cli::commands::index::index_directory;
use crosslink::{CompositeSymbolId, FileId, IncrementalEngine, ResolutionKind, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    for (rel, content) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
    }
    (temp_dir, root)
}

fn file_id(engine: &IncrementalEngine, path: &Path) -> FileId {
    engine.linker().file_id(path).unwrap()
}

fn references_to(engine: &IncrementalEngine, file: FileId, name: &str) -> usize {
    let symbol = engine
        .linker()
        .symbols_in_file(file)
        .into_iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no symbol {name}"));
    engine
        .linker()
        .symbol_references(CompositeSymbolId::new(file, symbol.local_id))
        .len()
}

#[test]
fn test_typescript_relative_and_aliased_imports() {
    let (_temp_dir, root) = project(&[
        (
            "tsconfig.json",
            r#"{
                // path aliases
                "compilerOptions": { "baseUrl": ".", "paths": { "@/*": ["src/*"] } },
            }"#,
        ),
        (
            "src/util.ts",
            "export function helper(): number { return 1; }\nexport default class Widget {}\nfunction hidden() {}\n",
        ),
        ("src/lib/index.ts", "export const VERSION = '1.0';\n"),
        (
            "src/app.ts",
            "import Widget, { helper } from './util';\nimport * as lib from '@/lib';\nimport fs from 'fs';\nimport React from 'react';\n\nnew Widget(helper(), lib.VERSION);\n",
        ),
    ]);

    let (engine, result) = index_directory(&root, &Settings::default()).unwrap();
    assert_eq!(result.updated_files.len(), 3);

    let app = file_id(&engine, &root.join("src/app.ts"));
    let util = file_id(&engine, &root.join("src/util.ts"));
    let lib = file_id(&engine, &root.join("src/lib/index.ts"));

    let links = engine.linker().import_links(app);
    assert_eq!(links.len(), 4);
    assert_eq!(links[0].target_file, Some(util));
    assert_eq!(links[1].target_file, Some(lib));
    assert_eq!(links[2].resolution.kind, ResolutionKind::Builtin);
    assert_eq!(links[3].resolution.kind, ResolutionKind::External);
    assert!(links[3].is_external);

    let mut deps = engine.file_dependencies(app);
    deps.sort();
    let mut expected = vec![util, lib];
    expected.sort();
    assert_eq!(deps, expected);

    assert_eq!(references_to(&engine, util, "helper"), 1);
    assert_eq!(references_to(&engine, util, "Widget"), 1);
    assert_eq!(references_to(&engine, util, "hidden"), 0);
    assert_eq!(references_to(&engine, lib, "VERSION"), 1);
}

#[test]
fn test_javascript_import_of_later_file() {
    let (_temp_dir, root) = project(&[(
        "index.js",
        "const { parse } = require('./parser');\nmodule.exports = parse;\n",
    )]);
    let (engine, _) = index_directory(&root, &Settings::default()).unwrap();
    let index = file_id(&engine, &root.join("index.js"));
    assert!(engine.file_dependencies(index).is_empty());

    let parser_path = root.join("parser.js");
    let source = "export function parse(input) { return input; }\n";
    fs::write(&parser_path, source).unwrap();
    let result = engine.update_file(&parser_path, source.as_bytes()).unwrap();
    let parser = file_id(&engine, &parser_path);

    assert_eq!(result.affected_files, vec![index]);
    assert_eq!(engine.file_dependencies(index), vec![parser]);
    assert_eq!(engine.file_dependents(parser), vec![index]);
    assert_eq!(references_to(&engine, parser, "parse"), 1);
}

#[test]
fn test_python_package_imports() {
    let (_temp_dir, root) = project(&[
        ("requirements.txt", "requests>=2.0\n"),
        ("app/__init__.py", ""),
        (
            "app/util.py",
            "def helper():\n    return 1\n\ndef _private():\n    pass\n",
        ),
        ("app/models.py", "class User:\n    pass\n"),
        (
            "app/main.py",
            "import os\nimport requests\nimport app.models\nfrom .util import helper\n\nhelper()\n",
        ),
    ]);

    let (engine, result) = index_directory(&root, &Settings::default()).unwrap();
    assert_eq!(result.updated_files.len(), 4);
    assert!(result.failed_files.is_empty());

    let main = file_id(&engine, &root.join("app/main.py"));
    let util = file_id(&engine, &root.join("app/util.py"));
    let models = file_id(&engine, &root.join("app/models.py"));

    let links = engine.linker().import_links(main);
    assert_eq!(links.len(), 4);
    assert_eq!(links[0].resolution.kind, ResolutionKind::Builtin);
    assert!(links[1].is_external);
    assert_eq!(links[2].target_file, Some(models));
    assert_eq!(links[2].resolution.kind, ResolutionKind::Internal);
    assert_eq!(links[3].target_file, Some(util));

    let mut deps = engine.file_dependencies(main);
    deps.sort();
    let mut expected = vec![util, models];
    expected.sort();
    assert_eq!(deps, expected);

    assert_eq!(references_to(&engine, util, "helper"), 1);
    assert_eq!(references_to(&engine, util, "_private"), 0);
    assert_eq!(references_to(&engine, models, "User"), 1);

    assert!(engine.check_graph_symmetry().is_empty());
    assert!(engine.linker().validate_consistency().is_empty());
}

#[test]
fn test_csharp_namespace_imports() {
    let (_temp_dir, root) = project(&[
        (
            "App.csproj",
            "<Project Sdk=\"Microsoft.NET.Sdk\">\n  <PropertyGroup>\n    <RootNamespace>Acme.App</RootNamespace>\n  </PropertyGroup>\n</Project>\n",
        ),
        (
            "Models/User.cs",
            "namespace Acme.App.Models;\n\npublic class User\n{\n    public string Name { get; set; }\n}\n\nfile class Hidden { }\n",
        ),
        (
            "Models/Order.cs",
            "namespace Acme.App.Models\n{\n    public record Order(int Id);\n}\n",
        ),
        (
            "Program.cs",
            "using System;\nusing Acme.App.Models;\nusing Newtonsoft.Json;\n\nnamespace Acme.App;\n\npublic static class Program\n{\n    public static void Main() { var user = new User(); }\n}\n",
        ),
    ]);

    let (engine, result) = index_directory(&root, &Settings::default()).unwrap();
    assert_eq!(result.updated_files.len(), 3);
    assert!(result.failed_files.is_empty());

    let program = file_id(&engine, &root.join("Program.cs"));
    let user = file_id(&engine, &root.join("Models/User.cs"));
    let order = file_id(&engine, &root.join("Models/Order.cs"));

    let links = engine.linker().import_links(program);
    assert_eq!(links.len(), 3);
    assert_eq!(links[0].resolution.kind, ResolutionKind::Builtin);
    assert_eq!(links[1].resolution.kind, ResolutionKind::Directory);
    assert_eq!(links[2].resolution.kind, ResolutionKind::External);

    let mut deps = engine.file_dependencies(program);
    deps.sort();
    let mut expected = vec![user, order];
    expected.sort();
    assert_eq!(deps, expected);

    assert_eq!(references_to(&engine, user, "User"), 1);
    assert_eq!(references_to(&engine, user, "Hidden"), 0);
    assert_eq!(references_to(&engine, order, "Order"), 1);
    assert!(engine.check_graph_symmetry().is_empty());
}

#[test]
fn test_php_psr4_and_require() {
    let (_temp_dir, root) = project(&[
        (
            "composer.json",
            r#"{ "autoload": { "psr-4": { "App\\": "src/" } }, "require": { "monolog/monolog": "^3.0" } }"#,
        ),
        (
            "src/Models/User.php",
            "<?php\nnamespace App\\Models;\n\nclass User {}\n\nfunction helper() {}\n",
        ),
        (
            "src/helpers.php",
            "<?php\nfunction format_name($name) { return $name; }\n",
        ),
        (
            "src/Http/Controller.php",
            "<?php\nnamespace App\\Http;\n\nuse App\\Models\\User;\nuse Monolog\\Logger;\nuse Exception;\nrequire_once __DIR__ . '/../helpers.php';\n\nclass Controller {}\n",
        ),
    ]);

    let (engine, result) = index_directory(&root, &Settings::default()).unwrap();
    assert_eq!(result.updated_files.len(), 3);

    let controller = file_id(&engine, &root.join("src/Http/Controller.php"));
    let user = file_id(&engine, &root.join("src/Models/User.php"));
    let helpers = file_id(&engine, &root.join("src/helpers.php"));

    let links = engine.linker().import_links(controller);
    assert_eq!(links.len(), 4);
    assert_eq!(links[0].target_file, Some(user));
    assert_eq!(links[0].resolution.kind, ResolutionKind::File);
    assert!(links[1].is_external);
    assert_eq!(links[2].resolution.kind, ResolutionKind::Builtin);
    assert_eq!(links[3].target_file, Some(helpers));

    assert_eq!(references_to(&engine, user, "User"), 1);
    // Only the named class is imported from its file
    assert_eq!(references_to(&engine, user, "helper"), 0);
    assert_eq!(references_to(&engine, helpers, "format_name"), 1);
    assert!(engine.linker().validate_consistency().is_empty());
}
