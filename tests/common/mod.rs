//! Shared fixtures: record builders for direct index tests and a small
//! line-oriented analyzer for a toy `.ax` language, used wherever a test
//! needs the full adapter-driven flow.
//!
//! Toy syntax, one directive per line:
//! ```text
//! class AuthRepository extends Base implements Cache
//!   method login
//!   field token
//! end
//! fn helper
//!   call AuthRepository.login
//! end
//! use AuthRepository
//! ```
//! SymbolIds are minted as `ax <package> <descriptor>`, so a name alone
//! resolves to the same id from any file in the package, and
//! `other::Name` calls cross the package boundary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use symdex::analyzer::{AnalyzerAdapter, AnalyzerFactory, LanguageBinding};
use symdex::error::Result;
use symdex::model::{
    DocumentRecord, OccurrenceInfo, Range, RelationKind, Relationship, RoleSet, SymbolId,
    SymbolInfo, SymbolKind,
};
use xxhash_rust::xxh3::xxh3_64;

// ---- Record builders ----

pub fn range(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Range {
    Range::new(start_line, start_col, end_line, end_col)
}

pub fn sym(id: &str, name: &str, kind: SymbolKind) -> SymbolInfo {
    SymbolInfo {
        symbol: SymbolId::from(id),
        display_name: name.to_string(),
        kind,
        documentation: Vec::new(),
        signature_hint: None,
        enclosing_symbol: None,
    }
}

pub fn sym_in(id: &str, name: &str, kind: SymbolKind, parent: &str) -> SymbolInfo {
    SymbolInfo {
        enclosing_symbol: Some(SymbolId::from(parent)),
        ..sym(id, name, kind)
    }
}

pub fn occ(id: &str, file: &str, range: Range, roles: RoleSet) -> OccurrenceInfo {
    OccurrenceInfo {
        symbol: SymbolId::from(id),
        file: file.to_string(),
        range,
        roles,
        enclosing_range: None,
    }
}

pub fn def_occ(id: &str, file: &str, range: Range, body: Option<Range>) -> OccurrenceInfo {
    OccurrenceInfo {
        symbol: SymbolId::from(id),
        file: file.to_string(),
        range,
        roles: RoleSet::DEFINITION,
        enclosing_range: body,
    }
}

pub fn rel(from: &str, to: &str, kind: RelationKind) -> Relationship {
    Relationship {
        from: SymbolId::from(from),
        to: SymbolId::from(to),
        kind,
    }
}

pub fn record(
    path: &str,
    symbols: Vec<SymbolInfo>,
    occurrences: Vec<OccurrenceInfo>,
    relationships: Vec<Relationship>,
) -> DocumentRecord {
    DocumentRecord {
        relative_path: path.to_string(),
        language: "ax".to_string(),
        symbols,
        occurrences,
        relationships,
        content_hash: 0,
        last_indexed_at: None,
    }
}

// ---- Toy analyzer ----

pub fn ax_id(package: &str, descriptor: &str) -> String {
    format!("ax {} {}", package, descriptor)
}

pub struct AxAnalyzer {
    package_root: PathBuf,
    package: String,
    binding: LanguageBinding,
}

impl AxAnalyzer {
    pub fn new(package_root: &Path) -> Self {
        let package = package_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "pkg".to_string());
        Self {
            package_root: package_root.to_path_buf(),
            package,
            binding: LanguageBinding::default(),
        }
    }

    pub fn with_package(package_root: &Path, package: &str) -> Self {
        Self {
            package: package.to_string(),
            ..Self::new(package_root)
        }
    }
}

impl AnalyzerAdapter for AxAnalyzer {
    fn binding(&self) -> &LanguageBinding {
        &self.binding
    }

    fn resolve_unit(&self, path: &Path) -> Result<Option<DocumentRecord>> {
        if !self.binding.is_indexable(path) || !path.starts_with(&self.package_root) {
            return Ok(None);
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            // Deleted or unreadable: no longer part of the package.
            return Ok(None);
        };
        let relative = path
            .strip_prefix(&self.package_root)
            .expect("checked prefix")
            .to_string_lossy()
            .replace('\\', "/");
        Ok(Some(parse_ax(&self.package, &relative, &content)))
    }

    fn list_source_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_ax_files(&self.package_root, &self.binding, &mut files);
        files
    }
}

fn collect_ax_files(dir: &Path, binding: &LanguageBinding, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if !binding.in_ignored_dir(&path) {
                collect_ax_files(&path, binding, out);
            }
        } else if binding.is_indexable(&path) {
            out.push(path);
        }
    }
}

pub struct AxFactory {
    binding: LanguageBinding,
}

impl AxFactory {
    pub fn new() -> Self {
        Self {
            binding: LanguageBinding::default(),
        }
    }
}

impl AnalyzerFactory for AxFactory {
    fn binding(&self) -> &LanguageBinding {
        &self.binding
    }

    fn create(&self, package_root: &Path) -> Result<Arc<dyn AnalyzerAdapter>> {
        Ok(Arc::new(AxAnalyzer::new(package_root)))
    }
}

pub fn parse_ax(package: &str, relative_path: &str, content: &str) -> DocumentRecord {
    let mut record = DocumentRecord::new(relative_path, "ax");
    record.content_hash = xxh3_64(content.as_bytes());

    // Stack of open declarations: (symbol index in record, start line).
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut container: Option<String> = None;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim();
        let Some((keyword, rest)) = line.split_once(' ').or(if line == "end" {
            Some(("end", ""))
        } else {
            None
        }) else {
            continue;
        };

        match keyword {
            "class" | "interface" | "mixin" | "enum" | "fn" => {
                let mut tokens = rest.split_whitespace();
                let Some(name) = tokens.next() else { continue };
                let kind = match keyword {
                    "class" => SymbolKind::Class,
                    "interface" => SymbolKind::Interface,
                    "mixin" => SymbolKind::Mixin,
                    "enum" => SymbolKind::Enum,
                    _ => SymbolKind::Function,
                };
                let id = ax_id(package, name);
                record.symbols.push(sym(&id, name, kind));
                let col = raw_line.find(name).unwrap_or(0);
                record.occurrences.push(def_occ(
                    &id,
                    relative_path,
                    range(line_no, col, line_no, col + name.len()),
                    None,
                ));
                open.push((record.occurrences.len() - 1, line_no));
                if keyword != "fn" {
                    container = Some(name.to_string());
                }

                // extends/implements clauses become relationships.
                let mut mode: Option<RelationKind> = None;
                for token in tokens {
                    match token {
                        "extends" => mode = Some(RelationKind::Extends),
                        "implements" => mode = Some(RelationKind::Implements),
                        target => {
                            if let Some(kind) = mode {
                                record.relationships.push(rel(
                                    &id,
                                    &target_id(package, target),
                                    kind,
                                ));
                            }
                        }
                    }
                }
            }
            "method" | "field" | "getter" | "constant" => {
                let Some(name) = rest.split_whitespace().next() else {
                    continue;
                };
                let Some(owner) = &container else { continue };
                let kind = match keyword {
                    "method" => SymbolKind::Method,
                    "field" => SymbolKind::Field,
                    "getter" => SymbolKind::Getter,
                    _ => SymbolKind::Constant,
                };
                let id = ax_id(package, &format!("{}.{}", owner, name));
                let mut info = sym_in(&id, name, kind, &ax_id(package, owner));
                if kind == SymbolKind::Method {
                    info.signature_hint = Some(format!("{}()", name));
                }
                record.symbols.push(info);
                let col = raw_line.find(name).unwrap_or(0);
                record.occurrences.push(def_occ(
                    &id,
                    relative_path,
                    range(line_no, col, line_no, col + name.len()),
                    Some(range(line_no, 0, line_no, raw_line.len())),
                ));
            }
            "call" | "use" | "read" | "write" => {
                let Some(target) = rest.split_whitespace().next() else {
                    continue;
                };
                let roles = match keyword {
                    "call" => RoleSet::CALL,
                    "use" => RoleSet::IMPORT,
                    "read" => RoleSet::READ_ACCESS,
                    _ => RoleSet::WRITE_ACCESS,
                };
                let col = raw_line.find(target).unwrap_or(0);
                record.occurrences.push(occ(
                    &target_id(package, target),
                    relative_path,
                    range(line_no, col, line_no, col + target.len()),
                    roles,
                ));
            }
            "end" => {
                if let Some((occ_index, _)) = open.pop() {
                    let start = record.occurrences[occ_index].range.start_line;
                    record.occurrences[occ_index].enclosing_range =
                        Some(range(start, 0, line_no, raw_line.len() + 1));
                    if open.is_empty() {
                        container = None;
                    }
                }
            }
            _ => {}
        }
    }
    record
}

fn target_id(package: &str, target: &str) -> String {
    match target.split_once("::") {
        Some((other_package, descriptor)) => ax_id(other_package, descriptor),
        None => ax_id(package, target),
    }
}

// ---- Filesystem fixtures ----

pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn write_module_manifest(root: &Path, name: &str) {
    write_file(
        root,
        "module.json",
        &format!(r#"{{"name": "{}", "version": "0.1.0"}}"#, name),
    );
}
