//! Read-only commands over a freshly indexed directory: deps, graph, debug, check.

use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::Path;

use super::index::index_directory;
use crate::config::Settings;
use crate::debug::{dump_dependency_graph, export_debug_info_json, write_debug_info};
use crate::incremental::IncrementalEngine;
use crate::paths::display_relative;
use crate::types::FileId;

fn describe(engine: &IncrementalEngine, file_id: FileId) -> String {
    let linker = engine.linker();
    match linker.file_path(file_id) {
        Some(path) => display_relative(&path, linker.root()).display().to_string(),
        None => format!("<file {file_id}>"),
    }
}

pub fn run_deps(dir: &Path, file: &Path, settings: &Settings) -> Result<()> {
    let (engine, _) = index_directory(dir, settings)?;
    let linker = engine.linker();

    let target = if file.is_absolute() {
        file.to_path_buf()
    } else {
        linker.root().join(file)
    };
    let Some(file_id) = linker.file_id(&target) else {
        bail!("{} is not an indexed file", file.display());
    };

    println!("{} (ID: {file_id})", describe(&engine, file_id));

    let dependencies = engine.file_dependencies(file_id);
    println!("Dependencies ({}):", dependencies.len());
    for dep in dependencies {
        println!("  -> {}", describe(&engine, dep));
    }

    let dependents = engine.file_dependents(file_id);
    println!("Dependents ({}):", dependents.len());
    for dep in dependents {
        println!("  <- {}", describe(&engine, dep));
    }

    let unresolved: Vec<_> = linker
        .import_links(file_id)
        .into_iter()
        .filter(|link| link.resolution.kind.is_unresolved())
        .collect();
    if !unresolved.is_empty() {
        println!("Unresolved imports ({}):", unresolved.len());
        for link in unresolved {
            println!(
                "  {} ({})",
                link.import_path,
                link.resolution.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    Ok(())
}

pub fn run_graph(dir: &Path, settings: &Settings) -> Result<()> {
    let (engine, _) = index_directory(dir, settings)?;
    let mut out = std::io::stdout().lock();
    dump_dependency_graph(&engine, &mut out).context("failed to write graph")?;
    out.flush()?;
    Ok(())
}

pub fn run_debug(dir: &Path, json: bool, settings: &Settings) -> Result<()> {
    let (engine, _) = index_directory(dir, settings)?;
    if json {
        println!("{}", export_debug_info_json(&engine)?);
    } else {
        let mut out = std::io::stdout().lock();
        write_debug_info(&engine, &mut out).context("failed to write debug info")?;
        out.flush()?;
    }
    Ok(())
}

pub fn run_check(dir: &Path, settings: &Settings) -> Result<()> {
    let (engine, result) = index_directory(dir, settings)?;

    let registry_issues = engine.linker().validate_consistency();
    let graph_issues = engine.check_graph_symmetry();

    println!("Checked {} files", engine.linker().file_ids().len());
    if registry_issues.is_empty() {
        println!("  Registry: ok");
    } else {
        println!("  Registry: {} issues", registry_issues.len());
        for issue in &registry_issues {
            println!("    {issue}");
        }
    }
    if graph_issues.is_empty() {
        println!("  Dependency graph: symmetric");
    } else {
        println!("  Dependency graph: {} issues", graph_issues.len());
        for issue in &graph_issues {
            println!("    {issue}");
        }
    }
    if !result.failed_files.is_empty() {
        println!("  Extraction failures: {}", result.failed_files.len());
    }

    let total = registry_issues.len() + graph_issues.len();
    if total > 0 {
        bail!("{total} consistency issues found");
    }
    Ok(())
}
