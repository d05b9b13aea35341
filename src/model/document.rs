use super::symbol::{OccurrenceInfo, RelationKind, SymbolId, SymbolInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A typed edge between two symbols, e.g. `from extends to`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub from: SymbolId,
    pub to: SymbolId,
    pub kind: RelationKind,
}

/// Everything the analyzer observed in one file.
///
/// Records are the authoritative state of a `SymbolIndex`; every lookup map
/// is a derivation over them. Relationships ride along with the record that
/// produced them so removing a document also removes its edges.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub relative_path: String,
    pub language: String,
    pub symbols: Vec<SymbolInfo>,
    pub occurrences: Vec<OccurrenceInfo>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub content_hash: u64,
    #[serde(default)]
    pub last_indexed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(relative_path: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            language: language.into(),
            symbols: Vec::new(),
            occurrences: Vec::new(),
            relationships: Vec::new(),
            content_hash: 0,
            last_indexed_at: None,
        }
    }
}
