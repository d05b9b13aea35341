//! Executes parsed queries against the federation registry.
//!
//! Pipelining: a stage's SymbolId output becomes the next stage's implicit
//! argument list. A stage with an explicit argument ignores the implicit
//! input. When the previous stage yielded no symbols, the pipeline ends
//! early with the results accumulated so far rather than an error.

use super::model::{CallDirection, HierarchyNode, IndexStatsEntry, QueryResult};
use super::parser::{self, Query, Stage, Verb};
use crate::index::GrepOptions;
use crate::model::SymbolId;
use crate::registry::{IndexRegistry, SymbolHit};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

pub struct QueryExecutor<'a> {
    registry: &'a IndexRegistry,
    include_external_grep: bool,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(registry: &'a IndexRegistry) -> Self {
        Self {
            registry,
            include_external_grep: false,
        }
    }

    pub fn include_external_grep(mut self, include: bool) -> Self {
        self.include_external_grep = include;
        self
    }

    pub async fn execute(&self, text: &str) -> QueryResult {
        let query = match parser::parse(text) {
            Ok(query) => query,
            Err(e) => {
                return QueryResult::Error {
                    message: e.to_string(),
                }
            }
        };
        self.run(&query).await
    }

    pub async fn run(&self, query: &Query) -> QueryResult {
        let mut results: Vec<QueryResult> = Vec::new();
        let mut implicit: Option<Vec<SymbolId>> = None;

        for stage in &query.stages {
            let input = match (&stage.arg, &implicit) {
                (Some(_), _) => StageInput::Explicit,
                (None, None) => {
                    if stage_needs_input(stage.verb) {
                        return QueryResult::Error {
                            message: format!("{:?} requires an argument", stage.verb)
                                .to_lowercase(),
                        };
                    }
                    StageInput::Explicit
                }
                (None, Some(ids)) if ids.is_empty() => StageInput::Empty,
                (None, Some(ids)) => StageInput::Implicit(ids.clone()),
            };

            // Empty propagation: the upstream result stands, nothing runs.
            if matches!(input, StageInput::Empty) && stage_needs_input(stage.verb) {
                break;
            }

            let result = self.run_stage(stage, &input).await;
            let failed = result.is_error();
            implicit = Some(result.symbol_ids());
            results.push(result);
            if failed {
                // Errors abort the pipeline and surface directly.
                return results.pop().expect("just pushed");
            }
        }

        if results.len() == 1 {
            results.pop().expect("just checked")
        } else {
            QueryResult::Pipeline { stages: results }
        }
    }

    async fn run_stage(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        match stage.verb {
            Verb::Def => self.run_def(stage, input).await,
            Verb::Refs => self.run_refs(stage, input).await,
            Verb::Members => self.run_members(stage, input).await,
            Verb::Impls => {
                let ids = self.stage_targets(stage, input).await;
                let mut hits = Vec::new();
                for id in &ids {
                    hits.extend(self.registry.implementations_of(id).await);
                }
                QueryResult::Search {
                    symbols: self.filter_hits(dedup(hits), stage).await,
                }
            }
            Verb::Supertypes => {
                let ids = self.stage_targets(stage, input).await;
                let mut hits = Vec::new();
                for id in &ids {
                    hits.extend(self.registry.supertypes_of(id).await);
                }
                QueryResult::Search {
                    symbols: self.filter_hits(dedup(hits), stage).await,
                }
            }
            Verb::Subtypes => {
                let ids = self.stage_targets(stage, input).await;
                let mut hits = Vec::new();
                for id in &ids {
                    hits.extend(self.registry.subtypes_of(id).await);
                }
                QueryResult::Search {
                    symbols: self.filter_hits(dedup(hits), stage).await,
                }
            }
            Verb::Hierarchy => self.run_hierarchy(stage, input).await,
            Verb::Source => self.run_source(stage, input).await,
            Verb::Sig => self.run_sig(stage, input).await,
            Verb::Callers => {
                let ids = self.stage_targets(stage, input).await;
                let mut hits = Vec::new();
                for id in &ids {
                    hits.extend(self.registry.get_callers(id).await);
                }
                QueryResult::CallGraph {
                    direction: CallDirection::Callers,
                    symbols: self.filter_hits(dedup(hits), stage).await,
                }
            }
            Verb::Calls => {
                let ids = self.stage_targets(stage, input).await;
                let mut hits = Vec::new();
                for id in &ids {
                    hits.extend(self.registry.get_calls(id).await);
                }
                QueryResult::CallGraph {
                    direction: CallDirection::Calls,
                    symbols: self.filter_hits(dedup(hits), stage).await,
                }
            }
            Verb::Find => self.run_find(stage).await,
            Verb::Grep => self.run_grep(stage).await,
            Verb::Files => {
                let mut files = self.registry.project_files().await;
                if let Some(prefix) = &stage.path_prefix {
                    files.retain(|file| file.starts_with(prefix.as_str()));
                }
                QueryResult::Files { files }
            }
            Verb::Stats => {
                let indexes = self
                    .registry
                    .stats()
                    .await
                    .into_iter()
                    .map(|(name, stats)| IndexStatsEntry { name, stats })
                    .collect();
                QueryResult::Stats { indexes }
            }
        }
    }

    async fn run_def(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        let ids = self.stage_targets(stage, input).await;
        for id in &ids {
            if let Some(annotated) = self.registry.find_definition(id).await {
                let Some(hit) = self.registry.get_symbol(id).await else {
                    continue;
                };
                let occ = annotated.occurrence;
                return QueryResult::Definition {
                    symbol: hit.info,
                    package: annotated.package,
                    path: annotated.source_root.join(&occ.file),
                    line: occ.range.start_line,
                    col: occ.range.start_col,
                };
            }
        }
        QueryResult::NotFound {
            query: stage.arg.clone().unwrap_or_else(|| "definition".to_string()),
        }
    }

    async fn run_refs(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        // An explicit bare name fans out to every index so packages with
        // differing SymbolIds for the same name all report.
        if let Some(arg) = &stage.arg {
            let exact = SymbolId::from(arg.as_str());
            if self.registry.get_symbol(&exact).await.is_none() {
                let packages = self.registry.find_all_references_by_name(arg).await;
                if packages.is_empty() {
                    return QueryResult::NotFound { query: arg.clone() };
                }
                return QueryResult::AggregatedReferences {
                    name: arg.clone(),
                    packages,
                };
            }
        }

        let ids = self.stage_targets(stage, input).await;
        let mut references = Vec::new();
        for id in &ids {
            references.extend(self.registry.find_references(id).await);
        }
        QueryResult::References {
            symbols: ids,
            references,
        }
    }

    async fn run_members(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        let ids = self.stage_targets(stage, input).await;
        let mut members = Vec::new();
        for id in &ids {
            members.extend(self.registry.members_of(id).await);
        }
        QueryResult::Members {
            members: self.filter_hits(dedup(members), stage).await,
        }
    }

    async fn run_hierarchy(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        let ids = self.stage_targets(stage, input).await;
        let Some(root_id) = ids.first() else {
            return QueryResult::NotFound {
                query: stage.arg.clone().unwrap_or_else(|| "hierarchy".to_string()),
            };
        };
        let Some(root) = self.registry.get_symbol(root_id).await else {
            return QueryResult::NotFound {
                query: root_id.to_string(),
            };
        };

        let mut visited_up = HashSet::new();
        visited_up.insert(root_id.clone());
        let supertypes = self.build_tree(root_id, true, &mut visited_up).await;

        let mut visited_down = HashSet::new();
        visited_down.insert(root_id.clone());
        let subtypes = self.build_tree(root_id, false, &mut visited_down).await;

        QueryResult::Hierarchy {
            root: root.info,
            supertypes,
            subtypes,
        }
    }

    /// Transitive walk with a visited set so cyclic inputs terminate and
    /// every symbol is reported at most once.
    fn build_tree<'b>(
        &'b self,
        id: &'b SymbolId,
        up: bool,
        visited: &'b mut HashSet<SymbolId>,
    ) -> Pin<Box<dyn Future<Output = Vec<HierarchyNode>> + Send + 'b>> {
        Box::pin(async move {
            let hits = if up {
                self.registry.supertypes_of(id).await
            } else {
                self.registry.subtypes_of(id).await
            };
            let mut nodes = Vec::new();
            for hit in hits {
                if !visited.insert(hit.info.symbol.clone()) {
                    continue;
                }
                let children = self.build_tree(&hit.info.symbol, up, visited).await;
                nodes.push(HierarchyNode {
                    symbol: hit.info,
                    package: hit.package,
                    children,
                });
            }
            nodes
        })
    }

    async fn run_source(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        let ids = self.stage_targets(stage, input).await;
        for id in &ids {
            let Some(annotated) = self.registry.find_definition(id).await else {
                continue;
            };
            let occ = &annotated.occurrence;
            let path = annotated.source_root.join(&occ.file);
            let span = occ.enclosing_range.unwrap_or(occ.range);
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            let end = span.end_line.min(lines.len().saturating_sub(1));
            let text = lines[span.start_line.min(end)..=end].join("\n");
            return QueryResult::Source {
                symbol: id.clone(),
                path,
                start_line: span.start_line,
                text,
            };
        }
        QueryResult::NotFound {
            query: stage.arg.clone().unwrap_or_else(|| "source".to_string()),
        }
    }

    async fn run_sig(&self, stage: &Stage, input: &StageInput) -> QueryResult {
        let ids = self.stage_targets(stage, input).await;
        for id in &ids {
            let Some(hit) = self.registry.get_symbol(id).await else {
                continue;
            };
            if let Some(signature) = hit.info.signature_hint.clone() {
                let location = self.registry.find_definition(id).await;
                let (path, line) = location
                    .map(|annotated| {
                        (
                            annotated.source_root.join(&annotated.occurrence.file),
                            annotated.occurrence.range.start_line,
                        )
                    })
                    .unwrap_or_default();
                return QueryResult::Source {
                    symbol: id.clone(),
                    path,
                    start_line: line,
                    text: signature,
                };
            }
        }
        QueryResult::NotFound {
            query: stage.arg.clone().unwrap_or_else(|| "signature".to_string()),
        }
    }

    async fn run_find(&self, stage: &Stage) -> QueryResult {
        let Some(pattern) = &stage.arg else {
            return QueryResult::Error {
                message: "find requires a pattern".to_string(),
            };
        };
        let symbols = self.registry.find_symbols(pattern).await;
        QueryResult::Search {
            symbols: self.filter_hits(symbols, stage).await,
        }
    }

    async fn run_grep(&self, stage: &Stage) -> QueryResult {
        let Some(pattern) = &stage.arg else {
            return QueryResult::Error {
                message: "grep requires a pattern".to_string(),
            };
        };
        let options = GrepOptions {
            path_filter: stage.path_prefix.clone(),
            lines_before: 0,
            lines_after: 0,
            ..GrepOptions::default()
        };
        match self
            .registry
            .grep(pattern, &options, self.include_external_grep)
            .await
        {
            Ok(packages) => QueryResult::Grep {
                pattern: pattern.clone(),
                packages,
            },
            Err(e) => QueryResult::Error {
                message: e.to_string(),
            },
        }
    }

    /// Targets for a symbol-taking stage: the explicit argument resolved, or
    /// the implicit ids from the previous stage.
    async fn stage_targets(&self, stage: &Stage, input: &StageInput) -> Vec<SymbolId> {
        match input {
            StageInput::Implicit(ids) => ids.clone(),
            StageInput::Empty => Vec::new(),
            StageInput::Explicit => match &stage.arg {
                Some(arg) => self.resolve_name(arg).await,
                None => Vec::new(),
            },
        }
    }

    /// Resolution order: exact SymbolId, qualified `Container.member`, then
    /// display-name lookup.
    async fn resolve_name(&self, arg: &str) -> Vec<SymbolId> {
        let exact = SymbolId::from(arg);
        if self.registry.get_symbol(&exact).await.is_some() {
            return vec![exact];
        }
        if let Some((container, member)) = arg.rsplit_once('.') {
            let qualified = self.registry.find_qualified(container, member).await;
            if !qualified.is_empty() {
                return qualified.into_iter().map(|hit| hit.info.symbol).collect();
            }
        }
        self.registry
            .find_symbols(arg)
            .await
            .into_iter()
            .map(|hit| hit.info.symbol)
            .collect()
    }

    async fn filter_hits(&self, hits: Vec<SymbolHit>, stage: &Stage) -> Vec<SymbolHit> {
        let mut out = Vec::new();
        for hit in hits {
            if !stage.kinds.is_empty() && !stage.kinds.contains(&hit.info.kind) {
                continue;
            }
            if let Some(prefix) = &stage.path_prefix {
                let definition = self.registry.find_definition(&hit.info.symbol).await;
                let in_prefix = definition
                    .map(|annotated| annotated.occurrence.file.starts_with(prefix.as_str()))
                    .unwrap_or(false);
                if !in_prefix {
                    continue;
                }
            }
            out.push(hit);
        }
        out
    }
}

enum StageInput {
    /// Use the stage's own argument (or none needed).
    Explicit,
    Implicit(Vec<SymbolId>),
    Empty,
}

fn stage_needs_input(verb: Verb) -> bool {
    !matches!(verb, Verb::Find | Verb::Grep | Verb::Files | Verb::Stats)
}

fn dedup(hits: Vec<SymbolHit>) -> Vec<SymbolHit> {
    let mut seen: HashSet<SymbolId> = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.info.symbol.clone()))
        .collect()
}
