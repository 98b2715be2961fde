//! Index command - link every supported file under a directory.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Settings;
use crate::error::IndexError;
use crate::incremental::{IncrementalEngine, UpdateResult};
use crate::paths::display_relative;
use crate::walker::{FileWalker, read_sources};

/// Walk `dir`, batch-index every supported file and return the engine.
///
/// A cascade overflow during the initial batch is reported and the partial
/// result is kept; any other engine error aborts.
pub fn index_directory(dir: &Path, settings: &Settings) -> Result<(IncrementalEngine, UpdateResult)> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("cannot access {}", dir.display()))?;
    let engine = IncrementalEngine::from_settings(&root, settings);

    let files = FileWalker::new(settings).walk(&root);
    tracing::debug!("[index] found {} candidate files under {}", files.len(), root.display());

    let (batch, unreadable) = read_sources(files);
    for error in &unreadable {
        tracing::warn!("[index] {error}");
    }

    let result = match engine.batch_update(&batch) {
        Ok(result) => result,
        Err(IndexError::CascadeOverflow { limit, partial }) => {
            eprintln!("Warning: cascade stopped after {limit} waves; results are partial");
            *partial
        }
        Err(e) => return Err(e.into()),
    };

    Ok((engine, result))
}

pub fn run(dir: &Path, show_failures: bool, settings: &Settings) -> Result<()> {
    let (engine, result) = index_directory(dir, settings)?;
    let linker = engine.linker();
    let stats = linker.stats();

    println!(
        "Indexed {} files in {:.2?}",
        result.updated_files.len(),
        result.duration
    );
    println!("  Symbols:            {}", stats.symbols);
    println!("  Imports:            {}", stats.imports);
    println!("  Exports:            {}", stats.exports);
    println!("  Unresolved imports: {}", stats.unresolved_imports);
    println!("  Symbol links:       {}", stats.symbol_links);
    println!("  Dependency edges:   {}", engine.stats().dependency_edges);

    let mut kinds: Vec<_> = linker.resolution_summary().into_iter().collect();
    kinds.sort_by_key(|(kind, _)| kind.as_str());
    if !kinds.is_empty() {
        println!("  Resolutions:");
        for (kind, count) in kinds {
            println!("    {:<10} {count}", kind.as_str());
        }
    }

    if !result.failed_files.is_empty() {
        println!("  Failed files:       {}", result.failed_files.len());
        if show_failures {
            for (file_id, reason) in &result.failed_files {
                let path = linker.file_path(*file_id).unwrap_or_default();
                println!("    {}: {reason}", display_relative(&path, linker.root()).display());
            }
        }
    }

    Ok(())
}
