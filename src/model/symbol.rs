use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Opaque stable identifier for a definition, unique across packages.
///
/// The analyzer mints these (typically `<scheme> <package> <descriptor-chain>`);
/// the core only ever compares and hashes them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SymbolId(pub String);

impl SymbolId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SymbolId {
    fn from(s: &str) -> Self {
        SymbolId(s.to_string())
    }
}

impl From<String> for SymbolId {
    fn from(s: String) -> Self {
        SymbolId(s)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Class,
    Mixin,
    Interface,
    Enum,
    Method,
    Function,
    Field,
    Parameter,
    TypeParameter,
    Constructor,
    Extension,
    Getter,
    Setter,
    Constant,
    Variable,
    Other,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Mixin => "mixin",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Method => "method",
            SymbolKind::Function => "function",
            SymbolKind::Field => "field",
            SymbolKind::Parameter => "parameter",
            SymbolKind::TypeParameter => "typeParameter",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Extension => "extension",
            SymbolKind::Getter => "getter",
            SymbolKind::Setter => "setter",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::Other => "other",
        }
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "class" => Ok(SymbolKind::Class),
            "mixin" => Ok(SymbolKind::Mixin),
            "interface" => Ok(SymbolKind::Interface),
            "enum" => Ok(SymbolKind::Enum),
            "method" => Ok(SymbolKind::Method),
            "function" => Ok(SymbolKind::Function),
            "field" => Ok(SymbolKind::Field),
            "parameter" => Ok(SymbolKind::Parameter),
            "typeParameter" | "type_parameter" => Ok(SymbolKind::TypeParameter),
            "constructor" => Ok(SymbolKind::Constructor),
            "extension" => Ok(SymbolKind::Extension),
            "getter" => Ok(SymbolKind::Getter),
            "setter" => Ok(SymbolKind::Setter),
            "constant" => Ok(SymbolKind::Constant),
            "variable" => Ok(SymbolKind::Variable),
            "other" => Ok(SymbolKind::Other),
            _ => Err(format!("unknown symbol kind: {}", s)),
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bitset of roles an occurrence plays at its position.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[serde(transparent)]
pub struct RoleSet(pub u8);

impl RoleSet {
    pub const DEFINITION: RoleSet = RoleSet(1);
    pub const READ_ACCESS: RoleSet = RoleSet(1 << 1);
    pub const WRITE_ACCESS: RoleSet = RoleSet(1 << 2);
    pub const IMPORT: RoleSet = RoleSet(1 << 3);
    pub const CALL: RoleSet = RoleSet(1 << 4);

    pub fn contains(self, other: RoleSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for RoleSet {
    type Output = RoleSet;

    fn bitor(self, rhs: RoleSet) -> RoleSet {
        RoleSet(self.0 | rhs.0)
    }
}

/// Zero-based source range with a half-open end column.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl Range {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn contains(&self, line: usize, col: usize) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        if line == self.start_line && col < self.start_col {
            return false;
        }
        if line == self.end_line && col >= self.end_col {
            return false;
        }
        true
    }

    /// Ordering key for path-then-position sorting.
    pub fn start(&self) -> (usize, usize) {
        (self.start_line, self.start_col)
    }

    /// Number of lines spanned; used to pick the innermost enclosing range.
    pub fn line_span(&self) -> usize {
        self.end_line - self.start_line
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub symbol: SymbolId,
    pub display_name: String,
    pub kind: SymbolKind,
    #[serde(default)]
    pub documentation: Vec<String>,
    #[serde(default)]
    pub signature_hint: Option<String>,
    #[serde(default)]
    pub enclosing_symbol: Option<SymbolId>,
}

/// A positioned mention of a symbol inside one file.
///
/// `file` is relative to the owning index's source root. `enclosing_range`
/// covers the whole declaration body for definitions, and localizes call
/// sites inside their enclosing declaration for call-role occurrences.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceInfo {
    pub symbol: SymbolId,
    pub file: String,
    pub range: Range,
    pub roles: RoleSet,
    #[serde(default)]
    pub enclosing_range: Option<Range>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    Implements,
    Extends,
    TypeDefinition,
    Reference,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_set_combines_and_queries() {
        let roles = RoleSet::DEFINITION | RoleSet::CALL;
        assert!(roles.contains(RoleSet::DEFINITION));
        assert!(roles.contains(RoleSet::CALL));
        assert!(!roles.contains(RoleSet::IMPORT));
        assert!(RoleSet::default().is_empty());
    }

    #[test]
    fn range_end_is_half_open() {
        let range = Range::new(2, 4, 2, 10);
        assert!(range.contains(2, 4));
        assert!(range.contains(2, 9));
        assert!(!range.contains(2, 10));
        assert!(!range.contains(1, 5));
    }

    #[test]
    fn multi_line_range_contains_inner_lines() {
        let range = Range::new(1, 0, 5, 1);
        assert!(range.contains(3, 42));
        assert!(!range.contains(5, 1));
    }
}
