pub mod document;
pub mod symbol;

pub use document::{DocumentRecord, Relationship};
pub use symbol::{OccurrenceInfo, Range, RelationKind, RoleSet, SymbolId, SymbolInfo, SymbolKind};
