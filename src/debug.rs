//! Diagnostic snapshots of an [`IncrementalEngine`]: a text dump, JSON, and a
//! DOT rendering of the import graph.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};

use crate::incremental::{IncrementalEngine, IncrementalStats};
use crate::linker::{ExtractorStats, LinkerStats};
use crate::paths::display_relative;
use crate::resolver::ResolverStats;
use crate::types::FileId;

#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub summary: LinkerStats,
    pub incremental: IncrementalStats,
    /// File count per language tag
    pub languages: BTreeMap<String, usize>,
    pub files: Vec<FileDebugInfo>,
    pub extractors: Vec<ExtractorStats>,
    pub resolvers: Vec<ResolverStats>,
    pub dependencies: DependencyReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDebugInfo {
    pub file_id: FileId,
    pub path: String,
    pub language: String,
    pub symbols: usize,
    pub imports: usize,
    pub exports: usize,
    pub unresolved_imports: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub dependencies: Vec<FileId>,
    pub dependents: Vec<FileId>,
    /// Longest import chain below this file
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyReport {
    pub total_files: usize,
    pub total_edges: usize,
    pub max_depth: usize,
    pub max_dependencies: usize,
    pub max_dependents: usize,
    /// Files that can reach themselves through imports
    pub circular_dependencies: usize,
    pub average_dependencies: f64,
}

/// Longest import chain below each file.
///
/// Files in one import cycle share a depth: the cycle contributes its length
/// minus one (the closing edge counts 0), plus the deepest chain leaving it.
/// Components are found with Tarjan's algorithm, which emits them sinks
/// first, so every component's dependencies are already measured.
struct DepthCalculator {
    depths: HashMap<FileId, usize>,
}

struct Tarjan<'a> {
    edges: &'a [Vec<usize>],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for &w in &edges[v] {
            match self.index[w] {
                None => {
                    self.visit(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(index) if self.on_stack[w] => self.low[v] = self.low[v].min(index),
                Some(_) => {}
            }
        }

        if Some(self.low[v]) == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

impl DepthCalculator {
    fn new(graph: &BTreeMap<FileId, Vec<FileId>>) -> Self {
        let nodes: Vec<FileId> = graph
            .iter()
            .flat_map(|(file, deps)| std::iter::once(file).chain(deps))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let position: HashMap<FileId, usize> =
            nodes.iter().enumerate().map(|(i, f)| (*f, i)).collect();
        let edges: Vec<Vec<usize>> = nodes
            .iter()
            .map(|file| {
                graph
                    .get(file)
                    .into_iter()
                    .flatten()
                    .filter_map(|dep| position.get(dep).copied())
                    .collect()
            })
            .collect();

        let mut tarjan = Tarjan {
            edges: &edges,
            index: vec![None; nodes.len()],
            low: vec![0; nodes.len()],
            stack: Vec::new(),
            on_stack: vec![false; nodes.len()],
            next: 0,
            components: Vec::new(),
        };
        for v in 0..nodes.len() {
            if tarjan.index[v].is_none() {
                tarjan.visit(v);
            }
        }

        let mut component_of = vec![0; nodes.len()];
        for (c, members) in tarjan.components.iter().enumerate() {
            for &v in members {
                component_of[v] = c;
            }
        }
        let mut component_depth = vec![0usize; tarjan.components.len()];
        for (c, members) in tarjan.components.iter().enumerate() {
            let below = members
                .iter()
                .flat_map(|&v| &edges[v])
                .map(|&w| component_of[w])
                .filter(|&d| d != c)
                .map(|d| 1 + component_depth[d])
                .max()
                .unwrap_or(0);
            component_depth[c] = members.len() - 1 + below;
        }

        let depths = nodes
            .iter()
            .enumerate()
            .map(|(v, file)| (*file, component_depth[component_of[v]]))
            .collect();
        Self { depths }
    }

    fn depth(&self, file: FileId) -> usize {
        self.depths.get(&file).copied().unwrap_or(0)
    }
}

fn on_cycle(graph: &BTreeMap<FileId, Vec<FileId>>, start: FileId) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<FileId> = graph.get(&start).cloned().unwrap_or_default();
    while let Some(file) = stack.pop() {
        if file == start {
            return true;
        }
        if seen.insert(file) {
            stack.extend(graph.get(&file).into_iter().flatten().copied());
        }
    }
    false
}

/// Summarize the shape of the import graph.
pub fn analyze_dependency_complexity(engine: &IncrementalEngine) -> DependencyReport {
    let graph = engine.dependency_graph();
    let files = engine.linker().file_ids();

    let total_edges: usize = graph.values().map(Vec::len).sum();
    let calculator = DepthCalculator::new(&graph);
    let max_depth = files
        .iter()
        .map(|f| calculator.depth(*f))
        .max()
        .unwrap_or(0);
    let max_dependencies = graph.values().map(Vec::len).max().unwrap_or(0);
    let max_dependents = files
        .iter()
        .map(|f| engine.file_dependents(*f).len())
        .max()
        .unwrap_or(0);
    let circular_dependencies = files.iter().filter(|f| on_cycle(&graph, **f)).count();

    let average_dependencies = if files.is_empty() {
        0.0
    } else {
        total_edges as f64 / files.len() as f64
    };

    DependencyReport {
        total_files: files.len(),
        total_edges,
        max_depth,
        max_dependencies,
        max_dependents,
        circular_dependencies,
        average_dependencies,
    }
}

pub fn collect_debug_info(engine: &IncrementalEngine) -> DebugInfo {
    let linker = engine.linker();
    let graph = engine.dependency_graph();
    let calculator = DepthCalculator::new(&graph);
    let mut languages: BTreeMap<String, usize> = BTreeMap::new();

    let mut files: Vec<FileDebugInfo> = linker
        .files()
        .into_iter()
        .map(|(file_id, path)| {
            let table = linker.symbol_table(file_id);
            let language = table
                .as_ref()
                .map(|t| t.language.clone())
                .unwrap_or_else(|| "unknown".to_string());
            *languages.entry(language.clone()).or_default() += 1;

            let unresolved_imports = linker
                .import_links(file_id)
                .iter()
                .filter(|l| l.resolution.kind.is_unresolved())
                .count();

            FileDebugInfo {
                file_id,
                path: display_relative(&path, linker.root()).display().to_string(),
                language,
                symbols: table.as_ref().map_or(0, |t| t.symbols.len()),
                imports: table.as_ref().map_or(0, |t| t.imports.len()),
                exports: table.as_ref().map_or(0, |t| t.exports.len()),
                unresolved_imports,
                hash: engine.file_hash(file_id),
                dependencies: engine.file_dependencies(file_id),
                dependents: engine.file_dependents(file_id),
                depth: calculator.depth(file_id),
            }
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    DebugInfo {
        summary: linker.stats(),
        incremental: engine.stats(),
        languages,
        files,
        extractors: linker.extractor_stats(),
        resolvers: linker.resolver_stats(),
        dependencies: analyze_dependency_complexity(engine),
    }
}

/// Human-readable dump.
pub fn write_debug_info(engine: &IncrementalEngine, w: &mut impl Write) -> io::Result<()> {
    let info = collect_debug_info(engine);

    writeln!(w, "=== Symbol Linking System Debug Info ===")?;
    writeln!(w)?;

    writeln!(w, "Summary:")?;
    writeln!(w, "  Total Files: {}", info.summary.files)?;
    writeln!(w, "  Total Symbols: {}", info.summary.symbols)?;
    writeln!(w, "  Total Imports: {}", info.summary.imports)?;
    writeln!(w, "  Unresolved Imports: {}", info.summary.unresolved_imports)?;
    writeln!(w, "  Symbol Links: {}", info.summary.symbol_links)?;
    let languages: Vec<String> = info
        .languages
        .iter()
        .map(|(lang, count)| format!("{lang}={count}"))
        .collect();
    writeln!(w, "  Languages: {}", languages.join(", "))?;
    writeln!(w)?;

    writeln!(w, "Files ({}):", info.files.len())?;
    for file in &info.files {
        writeln!(
            w,
            "  {} (ID: {}, Language: {}, Symbols: {}, Imports: {}, Exports: {})",
            file.path, file.file_id, file.language, file.symbols, file.imports, file.exports
        )?;
    }
    writeln!(w)?;

    writeln!(w, "Extractors ({}):", info.extractors.len())?;
    for extractor in &info.extractors {
        writeln!(
            w,
            "  {}: {} files processed, {} symbols extracted, {} failures",
            extractor.language,
            extractor.files_parsed,
            extractor.symbols_extracted,
            extractor.parse_failures
        )?;
    }
    writeln!(w)?;

    writeln!(w, "Resolvers ({}):", info.resolvers.len())?;
    for resolver in &info.resolvers {
        writeln!(
            w,
            "  {}: {} imports resolved, {} files registered",
            resolver.name, resolver.resolutions, resolver.registered_files
        )?;
        if !resolver.by_kind.is_empty() {
            let kinds: Vec<String> = resolver
                .by_kind
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            writeln!(w, "    Resolution stats: {}", kinds.join(", "))?;
        }
    }
    writeln!(w)?;

    let with_edges: Vec<&FileDebugInfo> = info
        .files
        .iter()
        .filter(|f| !f.dependencies.is_empty() || !f.dependents.is_empty())
        .collect();
    if !with_edges.is_empty() {
        writeln!(w, "Dependencies ({}):", with_edges.len())?;
        for file in with_edges {
            writeln!(
                w,
                "  {}: {} dependencies, {} dependents, depth {}",
                file.path,
                file.dependencies.len(),
                file.dependents.len(),
                file.depth
            )?;
        }
        writeln!(w)?;
    }

    let report = &info.dependencies;
    writeln!(w, "Dependency Analysis:")?;
    writeln!(w, "  Edges: {}", report.total_edges)?;
    writeln!(w, "  Max Depth: {}", report.max_depth)?;
    writeln!(w, "  Max Dependencies: {}", report.max_dependencies)?;
    writeln!(w, "  Max Dependents: {}", report.max_dependents)?;
    writeln!(w, "  Files On Cycles: {}", report.circular_dependencies)?;
    writeln!(w, "  Average Dependencies: {:.2}", report.average_dependencies)?;

    Ok(())
}

pub fn export_debug_info_json(engine: &IncrementalEngine) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&collect_debug_info(engine))
}

/// Import graph in Graphviz DOT format. Nodes are labeled with file names.
pub fn dump_dependency_graph(engine: &IncrementalEngine, w: &mut impl Write) -> io::Result<()> {
    writeln!(w, "digraph dependencies {{")?;
    writeln!(w, "  rankdir=TB;")?;
    writeln!(w, "  node [shape=box];")?;
    writeln!(w)?;

    for (file_id, path) in engine.linker().files() {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        writeln!(w, "  \"{file_id}\" [label=\"{}\"];", label.replace('"', "\\\""))?;
    }
    writeln!(w)?;

    for (file_id, dependencies) in engine.dependency_graph() {
        for dependency in dependencies {
            writeln!(w, "  \"{file_id}\" -> \"{dependency}\";")?;
        }
    }

    writeln!(w, "}}")
}
