//! Query result variants: one closed tagged union, each variant carrying
//! only what it needs, with a human renderer and a serde serialization.

use crate::index::IndexStats;
use crate::model::{SymbolId, SymbolInfo};
use crate::registry::{AnnotatedOccurrence, PackageGrep, PackageReferences, SymbolHit};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Callers,
    Calls,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode {
    pub symbol: SymbolInfo,
    pub package: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

#[derive(Serialize, Debug, Clone)]
pub struct IndexStatsEntry {
    pub name: String,
    pub stats: IndexStats,
}

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueryResult {
    Definition {
        symbol: SymbolInfo,
        package: String,
        path: PathBuf,
        line: usize,
        col: usize,
    },
    References {
        symbols: Vec<SymbolId>,
        references: Vec<AnnotatedOccurrence>,
    },
    AggregatedReferences {
        name: String,
        packages: Vec<PackageReferences>,
    },
    Members {
        members: Vec<SymbolHit>,
    },
    Hierarchy {
        root: SymbolInfo,
        supertypes: Vec<HierarchyNode>,
        subtypes: Vec<HierarchyNode>,
    },
    Source {
        symbol: SymbolId,
        path: PathBuf,
        start_line: usize,
        text: String,
    },
    Search {
        symbols: Vec<SymbolHit>,
    },
    Grep {
        pattern: String,
        packages: Vec<PackageGrep>,
    },
    CallGraph {
        direction: CallDirection,
        symbols: Vec<SymbolHit>,
    },
    Stats {
        indexes: Vec<IndexStatsEntry>,
    },
    Files {
        files: Vec<String>,
    },
    Pipeline {
        stages: Vec<QueryResult>,
    },
    NotFound {
        query: String,
    },
    Error {
        message: String,
    },
}

impl QueryResult {
    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error { .. })
    }

    /// The SymbolIds this result feeds into the next pipeline stage.
    pub fn symbol_ids(&self) -> Vec<SymbolId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |id: &SymbolId| {
            if seen.insert(id.clone()) {
                out.push(id.clone());
            }
        };
        match self {
            QueryResult::Definition { symbol, .. } => push(&symbol.symbol),
            QueryResult::References { symbols, .. } => symbols.iter().for_each(&mut push),
            QueryResult::AggregatedReferences { packages, .. } => {
                for package in packages {
                    for occ in &package.references {
                        push(&occ.symbol);
                    }
                }
            }
            QueryResult::Members { members } => {
                members.iter().for_each(|hit| push(&hit.info.symbol))
            }
            QueryResult::Hierarchy {
                root,
                supertypes,
                subtypes,
            } => {
                push(&root.symbol);
                flatten_ids(supertypes, &mut push);
                flatten_ids(subtypes, &mut push);
            }
            QueryResult::Search { symbols } | QueryResult::CallGraph { symbols, .. } => {
                symbols.iter().for_each(|hit| push(&hit.info.symbol))
            }
            QueryResult::Source { symbol, .. } => push(symbol),
            QueryResult::Pipeline { stages } => {
                return stages.last().map(QueryResult::symbol_ids).unwrap_or_default();
            }
            QueryResult::Grep { .. }
            | QueryResult::Stats { .. }
            | QueryResult::Files { .. }
            | QueryResult::NotFound { .. }
            | QueryResult::Error { .. } => {}
        }
        out
    }

    /// Human-readable rendering; dispatches on the variant tag.
    pub fn render(&self) -> String {
        match self {
            QueryResult::Definition {
                symbol,
                package,
                path,
                line,
                col,
            } => format!(
                "{} ({}) [{}]\n  {}:{}:{}",
                symbol.display_name,
                symbol.kind,
                package,
                path.display(),
                line + 1,
                col + 1
            ),
            QueryResult::References { references, .. } => {
                if references.is_empty() {
                    return "no references".to_string();
                }
                let mut out = String::new();
                for annotated in references {
                    let occ = &annotated.occurrence;
                    let _ = writeln!(
                        out,
                        "{}:{}:{} [{}]",
                        occ.file,
                        occ.range.start_line + 1,
                        occ.range.start_col + 1,
                        annotated.package
                    );
                }
                out.trim_end().to_string()
            }
            QueryResult::AggregatedReferences { name, packages } => {
                let mut out = format!("references to `{}`:\n", name);
                for slice in packages {
                    let _ = writeln!(out, "  package {}:", slice.package);
                    for occ in &slice.references {
                        let _ = writeln!(
                            out,
                            "    {}:{}:{}",
                            occ.file,
                            occ.range.start_line + 1,
                            occ.range.start_col + 1
                        );
                    }
                }
                out.trim_end().to_string()
            }
            QueryResult::Members { members } => render_hits(members, "no members"),
            QueryResult::Hierarchy {
                root,
                supertypes,
                subtypes,
            } => {
                let mut out = format!("{} ({})\n", root.display_name, root.kind);
                if !supertypes.is_empty() {
                    out.push_str("supertypes:\n");
                    render_tree(supertypes, 1, &mut out);
                }
                if !subtypes.is_empty() {
                    out.push_str("subtypes:\n");
                    render_tree(subtypes, 1, &mut out);
                }
                out.trim_end().to_string()
            }
            QueryResult::Source {
                path, start_line, text, ..
            } => format!("{}:{}\n{}", path.display(), start_line + 1, text),
            QueryResult::Search { symbols } => render_hits(symbols, "no matches"),
            QueryResult::Grep { packages, .. } => {
                if packages.is_empty() {
                    return "no matches".to_string();
                }
                let mut out = String::new();
                for package in packages {
                    for m in &package.matches {
                        for line in &m.before {
                            let _ = writeln!(out, "{}-  {}", m.file, line);
                        }
                        let _ = writeln!(out, "{}:{}: {}", m.file, m.line + 1, m.text);
                        for line in &m.after {
                            let _ = writeln!(out, "{}-  {}", m.file, line);
                        }
                    }
                }
                out.trim_end().to_string()
            }
            QueryResult::CallGraph { direction, symbols } => {
                let label = match direction {
                    CallDirection::Callers => "no callers",
                    CallDirection::Calls => "no outgoing calls",
                };
                render_hits(symbols, label)
            }
            QueryResult::Stats { indexes } => {
                let mut out = String::new();
                for entry in indexes {
                    let _ = writeln!(
                        out,
                        "{}: {} files, {} symbols, {} definitions, {} references",
                        entry.name,
                        entry.stats.files,
                        entry.stats.symbols,
                        entry.stats.definitions,
                        entry.stats.references
                    );
                }
                out.trim_end().to_string()
            }
            QueryResult::Files { files } => {
                if files.is_empty() {
                    "no files".to_string()
                } else {
                    files.join("\n")
                }
            }
            QueryResult::Pipeline { stages } => stages
                .last()
                .map(QueryResult::render)
                .unwrap_or_else(|| "empty pipeline".to_string()),
            QueryResult::NotFound { query } => format!("not found: {}", query),
            QueryResult::Error { message } => format!("error: {}", message),
        }
    }
}

fn flatten_ids(nodes: &[HierarchyNode], push: &mut impl FnMut(&SymbolId)) {
    for node in nodes {
        push(&node.symbol.symbol);
        flatten_ids(&node.children, push);
    }
}

fn render_hits(hits: &[SymbolHit], empty: &str) -> String {
    if hits.is_empty() {
        return empty.to_string();
    }
    let mut out = String::new();
    for hit in hits {
        let _ = match &hit.info.signature_hint {
            Some(sig) => writeln!(
                out,
                "{}  {} ({}) [{}]",
                hit.info.display_name, sig, hit.info.kind, hit.package
            ),
            None => writeln!(
                out,
                "{} ({}) [{}]",
                hit.info.display_name, hit.info.kind, hit.package
            ),
        };
    }
    out.trim_end().to_string()
}

fn render_tree(nodes: &[HierarchyNode], depth: usize, out: &mut String) {
    for node in nodes {
        let _ = writeln!(
            out,
            "{}{} ({}) [{}]",
            "  ".repeat(depth),
            node.symbol.display_name,
            node.symbol.kind,
            node.package
        );
        render_tree(&node.children, depth + 1, out);
    }
}
