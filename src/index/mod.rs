//! Per-package symbol store.
//!
//! `documents` is the authoritative state; every lookup map is a derivation
//! and is re-derived atomically whenever a document is replaced or removed.

pub mod grep;
pub mod persist;

use crate::error::{Result, SymdexError};
use crate::model::{
    DocumentRecord, OccurrenceInfo, RelationKind, Relationship, RoleSet, SymbolId, SymbolInfo,
    SymbolKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

pub use grep::{GrepMatch, GrepOptions};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub symbols: usize,
    pub references: usize,
    pub definitions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SymbolIndex {
    project_root: PathBuf,
    /// Where the indexed sources live. Differs from `project_root` when the
    /// index describes a dependency under a cache directory.
    source_root: PathBuf,
    documents: BTreeMap<String, DocumentRecord>,
    by_symbol: HashMap<SymbolId, SymbolInfo>,
    definitions: HashMap<SymbolId, OccurrenceInfo>,
    occurrences: HashMap<SymbolId, Vec<OccurrenceInfo>>,
    by_name: BTreeMap<String, Vec<SymbolId>>,
    by_kind: HashMap<SymbolKind, HashSet<SymbolId>>,
    children: HashMap<SymbolId, Vec<SymbolId>>,
    last_indexed_at: Option<DateTime<Utc>>,
}

impl SymbolIndex {
    pub fn new(project_root: PathBuf, source_root: Option<PathBuf>) -> Self {
        let source_root = source_root.unwrap_or_else(|| project_root.clone());
        Self {
            project_root,
            source_root,
            documents: BTreeMap::new(),
            by_symbol: HashMap::new(),
            definitions: HashMap::new(),
            occurrences: HashMap::new(),
            by_name: BTreeMap::new(),
            by_kind: HashMap::new(),
            children: HashMap::new(),
            last_indexed_at: None,
        }
    }

    /// Rebuild an index from its authoritative document map, re-deriving every
    /// lookup table. Used by persistence when loading an artifact.
    pub fn from_documents(
        project_root: PathBuf,
        source_root: Option<PathBuf>,
        documents: BTreeMap<String, DocumentRecord>,
    ) -> Self {
        let mut index = Self::new(project_root, source_root);
        for (path, record) in documents {
            index.last_indexed_at = index.last_indexed_at.max(record.last_indexed_at);
            index.insert_derived(&record);
            index.documents.insert(path, record);
        }
        index
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    // ---- Mutation ----

    /// Atomically replaces any prior record for `path`.
    pub fn update_document(&mut self, path: &str, mut record: DocumentRecord) -> Result<()> {
        if record.relative_path != path {
            return Err(SymdexError::InvalidDocument {
                path: path.to_string(),
                reason: format!("record claims path {}", record.relative_path),
            });
        }
        if let Some(occ) = record.occurrences.iter().find(|o| o.file != path) {
            return Err(SymdexError::InvalidDocument {
                path: path.to_string(),
                reason: format!("occurrence of {} points at {}", occ.symbol, occ.file),
            });
        }
        // A definition site must have an owning symbol in the same record;
        // only non-definition occurrences may reference foreign symbols.
        if let Some(occ) = record.occurrences.iter().find(|o| {
            o.roles.contains(RoleSet::DEFINITION)
                && !record.symbols.iter().any(|info| info.symbol == o.symbol)
        }) {
            return Err(SymdexError::InvalidDocument {
                path: path.to_string(),
                reason: format!("definition of undeclared symbol {}", occ.symbol),
            });
        }

        if record.last_indexed_at.is_none() {
            record.last_indexed_at = Some(Utc::now());
        }
        if let Some(old) = self.documents.remove(path) {
            self.prune_derived(&old);
        }
        self.insert_derived(&record);
        self.last_indexed_at = record.last_indexed_at;
        self.documents.insert(path.to_string(), record);
        Ok(())
    }

    /// Removes the record and prunes every derived entry pointing at it.
    pub fn remove_document(&mut self, path: &str) -> bool {
        match self.documents.remove(path) {
            Some(old) => {
                self.prune_derived(&old);
                self.last_indexed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    fn insert_derived(&mut self, record: &DocumentRecord) {
        for info in &record.symbols {
            let id = info.symbol.clone();
            self.by_name
                .entry(info.display_name.clone())
                .or_default()
                .push(id.clone());
            self.by_kind.entry(info.kind).or_default().insert(id.clone());
            if let Some(parent) = &info.enclosing_symbol {
                let siblings = self.children.entry(parent.clone()).or_default();
                if !siblings.contains(&id) {
                    siblings.push(id.clone());
                }
            }
            self.by_symbol.insert(id, info.clone());
        }
        for occ in &record.occurrences {
            if occ.roles.contains(RoleSet::DEFINITION) {
                self.definitions.insert(occ.symbol.clone(), occ.clone());
            }
            self.occurrences
                .entry(occ.symbol.clone())
                .or_default()
                .push(occ.clone());
        }
    }

    fn prune_derived(&mut self, record: &DocumentRecord) {
        for info in &record.symbols {
            let id = &info.symbol;
            self.by_symbol.remove(id);
            if let Some(ids) = self.by_name.get_mut(&info.display_name) {
                ids.retain(|other| other != id);
                if ids.is_empty() {
                    self.by_name.remove(&info.display_name);
                }
            }
            if let Some(ids) = self.by_kind.get_mut(&info.kind) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_kind.remove(&info.kind);
                }
            }
            if let Some(parent) = &info.enclosing_symbol {
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.retain(|other| other != id);
                    if siblings.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
            self.children.remove(id);
        }
        for occ in &record.occurrences {
            if let Some(def) = self.definitions.get(&occ.symbol) {
                if def.file == record.relative_path {
                    self.definitions.remove(&occ.symbol);
                }
            }
            if let Some(list) = self.occurrences.get_mut(&occ.symbol) {
                list.retain(|other| other.file != record.relative_path);
                if list.is_empty() {
                    self.occurrences.remove(&occ.symbol);
                }
            }
        }
    }

    // ---- Lookups ----

    pub fn get_symbol(&self, id: &SymbolId) -> Option<&SymbolInfo> {
        self.by_symbol.get(id)
    }

    pub fn defines(&self, id: &SymbolId) -> bool {
        self.by_symbol.contains_key(id)
    }

    pub fn find_definition(&self, id: &SymbolId) -> Option<&OccurrenceInfo> {
        self.definitions.get(id)
    }

    /// All occurrences of `id`, definition sites included, ordered by file
    /// path then start position.
    pub fn find_references(&self, id: &SymbolId) -> Vec<OccurrenceInfo> {
        let mut refs: Vec<OccurrenceInfo> =
            self.occurrences.get(id).cloned().unwrap_or_default();
        refs.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then_with(|| a.range.start().cmp(&b.range.start()))
        });
        refs
    }

    /// Glob search over display names (`*` and `?`). An all-lowercase pattern
    /// matches case-insensitively.
    pub fn find_symbols(&self, pattern: &str) -> Vec<SymbolInfo> {
        let matcher = NameGlob::compile(pattern);
        let mut out = Vec::new();
        if !matcher.has_wildcards && !matcher.fold_case {
            // Literal pattern, exact case: one map probe.
            if let Some(ids) = self.by_name.get(pattern) {
                out.extend(ids.iter().filter_map(|id| self.by_symbol.get(id)).cloned());
            }
            return out;
        }
        for (name, ids) in &self.by_name {
            if matcher.matches(name) {
                out.extend(ids.iter().filter_map(|id| self.by_symbol.get(id)).cloned());
            }
        }
        out
    }

    /// Members of `container` (a display name or exact SymbolId) whose display
    /// name equals `member`.
    pub fn find_qualified(&self, container: &str, member: &str) -> Vec<SymbolInfo> {
        let mut containers: Vec<SymbolId> = Vec::new();
        let as_id = SymbolId::from(container);
        if self.by_symbol.contains_key(&as_id) {
            containers.push(as_id);
        } else if let Some(ids) = self.by_name.get(container) {
            containers.extend(ids.iter().cloned());
        }

        let mut out = Vec::new();
        for container_id in containers {
            out.extend(
                self.members_of(&container_id)
                    .into_iter()
                    .filter(|info| info.display_name == member),
            );
        }
        out
    }

    /// Direct children only, in source order.
    pub fn members_of(&self, id: &SymbolId) -> Vec<SymbolInfo> {
        self.children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|child| self.by_symbol.get(child))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn symbols_of_kind(&self, kind: SymbolKind) -> Vec<SymbolInfo> {
        let mut out: Vec<SymbolInfo> = self
            .by_kind
            .get(&kind)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.by_symbol.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    // ---- Type hierarchy ----

    fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.documents.values().flat_map(|doc| doc.relationships.iter())
    }

    pub fn supertype_ids(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut seen = HashSet::new();
        self.relationships()
            .filter(|rel| {
                rel.from == *id
                    && matches!(rel.kind, RelationKind::Extends | RelationKind::Implements)
            })
            .map(|rel| rel.to.clone())
            .filter(|target| seen.insert(target.clone()))
            .collect()
    }

    pub fn subtype_ids(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut seen = HashSet::new();
        self.relationships()
            .filter(|rel| {
                rel.to == *id
                    && matches!(rel.kind, RelationKind::Extends | RelationKind::Implements)
            })
            .map(|rel| rel.from.clone())
            .filter(|source| seen.insert(source.clone()))
            .collect()
    }

    pub fn implementation_ids(&self, id: &SymbolId) -> Vec<SymbolId> {
        let mut seen = HashSet::new();
        self.relationships()
            .filter(|rel| rel.to == *id && rel.kind == RelationKind::Implements)
            .map(|rel| rel.from.clone())
            .filter(|source| seen.insert(source.clone()))
            .collect()
    }

    pub fn supertypes_of(&self, id: &SymbolId) -> Vec<SymbolInfo> {
        self.resolve_ids(self.supertype_ids(id))
    }

    pub fn subtypes_of(&self, id: &SymbolId) -> Vec<SymbolInfo> {
        self.resolve_ids(self.subtype_ids(id))
    }

    fn resolve_ids(&self, ids: Vec<SymbolId>) -> Vec<SymbolInfo> {
        ids.iter()
            .filter_map(|id| self.by_symbol.get(id))
            .cloned()
            .collect()
    }

    // ---- Call graph ----

    /// Symbols called from inside `id`'s definition body, unique, in source
    /// order of the call sites.
    pub fn call_target_ids(&self, id: &SymbolId) -> Vec<SymbolId> {
        let Some(def) = self.definitions.get(id) else {
            return Vec::new();
        };
        let Some(body) = def.enclosing_range else {
            return Vec::new();
        };
        let Some(doc) = self.documents.get(&def.file) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for occ in &doc.occurrences {
            if !occ.roles.contains(RoleSet::CALL) {
                continue;
            }
            let (line, col) = occ.range.start();
            if !body.contains(line, col) {
                continue;
            }
            // Calls inside a nested declaration belong to that declaration.
            if self.enclosing_definition(&def.file, line, col).as_ref() != Some(id) {
                continue;
            }
            if seen.insert(occ.symbol.clone()) {
                out.push(occ.symbol.clone());
            }
        }
        out
    }

    /// Symbols whose definition bodies contain a call-role occurrence of `id`.
    pub fn caller_ids(&self, id: &SymbolId) -> Vec<SymbolId> {
        let Some(occs) = self.occurrences.get(id) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for occ in occs {
            if !occ.roles.contains(RoleSet::CALL) {
                continue;
            }
            let (line, col) = occ.range.start();
            if let Some(caller) = self.enclosing_definition(&occ.file, line, col) {
                if seen.insert(caller.clone()) {
                    out.push(caller);
                }
            }
        }
        out
    }

    pub fn get_calls(&self, id: &SymbolId) -> Vec<SymbolInfo> {
        self.resolve_ids(self.call_target_ids(id))
    }

    pub fn get_callers(&self, id: &SymbolId) -> Vec<SymbolInfo> {
        self.resolve_ids(self.caller_ids(id))
    }

    /// Innermost definition whose enclosing range contains the position.
    fn enclosing_definition(&self, file: &str, line: usize, col: usize) -> Option<SymbolId> {
        let doc = self.documents.get(file)?;
        doc.occurrences
            .iter()
            .filter(|occ| occ.roles.contains(RoleSet::DEFINITION))
            .filter_map(|occ| occ.enclosing_range.map(|range| (occ, range)))
            .filter(|(_, range)| range.contains(line, col))
            .min_by_key(|(_, range)| range.line_span())
            .map(|(occ, _)| occ.symbol.clone())
    }

    // ---- Introspection ----

    pub fn files(&self) -> Vec<&str> {
        self.documents.keys().map(String::as_str).collect()
    }

    pub fn document(&self, path: &str) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    pub fn documents(&self) -> &BTreeMap<String, DocumentRecord> {
        &self.documents
    }

    pub fn symbol_count(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.documents.len(),
            symbols: self.by_symbol.len(),
            references: self.occurrences.values().map(Vec::len).sum(),
            definitions: self.definitions.len(),
            last_indexed_at: self.last_indexed_at,
        }
    }
}

/// Char-level glob matcher compiled once per `find_symbols` call.
struct NameGlob {
    pattern: Vec<char>,
    has_wildcards: bool,
    /// Smart case: an all-lowercase pattern matches case-insensitively.
    fold_case: bool,
}

impl NameGlob {
    fn compile(pattern: &str) -> Self {
        let fold_case = !pattern.chars().any(|c| c.is_uppercase());
        let has_wildcards = pattern.contains(['*', '?']);
        let pattern = if fold_case {
            pattern.to_lowercase().chars().collect()
        } else {
            pattern.chars().collect()
        };
        Self {
            pattern,
            has_wildcards,
            fold_case,
        }
    }

    fn matches(&self, name: &str) -> bool {
        let text: Vec<char> = if self.fold_case {
            name.to_lowercase().chars().collect()
        } else {
            name.chars().collect()
        };
        glob_match(&self.pattern, &text)
    }
}

/// Iterative glob match with single-star backtracking.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
