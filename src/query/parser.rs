//! Text query parser.
//!
//! Grammar:
//! ```text
//! query    := stage ('|' stage)*
//! stage    := verb args? filter*
//! verb     := def | refs | members | impls | supertypes | subtypes
//!           | hierarchy | source | sig | callers | calls | find | grep
//!           | files | stats
//! filter   := 'kind:' KIND[,KIND...] | 'in:' PATH_PREFIX
//! ```
//! Arguments may be quoted (single or double) to carry spaces or pipes.

use crate::error::{Result, SymdexError};
use crate::model::SymbolKind;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Def,
    Refs,
    Members,
    Impls,
    Supertypes,
    Subtypes,
    Hierarchy,
    Source,
    Sig,
    Callers,
    Calls,
    Find,
    Grep,
    Files,
    Stats,
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "def" => Ok(Verb::Def),
            "refs" => Ok(Verb::Refs),
            "members" => Ok(Verb::Members),
            "impls" => Ok(Verb::Impls),
            "supertypes" => Ok(Verb::Supertypes),
            "subtypes" => Ok(Verb::Subtypes),
            "hierarchy" => Ok(Verb::Hierarchy),
            "source" => Ok(Verb::Source),
            "sig" => Ok(Verb::Sig),
            "callers" => Ok(Verb::Callers),
            "calls" => Ok(Verb::Calls),
            "find" => Ok(Verb::Find),
            "grep" => Ok(Verb::Grep),
            "files" => Ok(Verb::Files),
            "stats" => Ok(Verb::Stats),
            other => Err(format!("unknown verb: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub verb: Verb,
    pub arg: Option<String>,
    pub kinds: Vec<SymbolKind>,
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub stages: Vec<Stage>,
}

pub fn parse(input: &str) -> Result<Query> {
    let mut stages = Vec::new();
    for raw_stage in split_pipeline(input)? {
        let tokens = tokenize(&raw_stage)?;
        if tokens.is_empty() {
            return Err(SymdexError::MalformedQuery("empty stage".to_string()));
        }
        let verb = Verb::from_str(&tokens[0]).map_err(SymdexError::MalformedQuery)?;

        let mut arg = None;
        let mut kinds = Vec::new();
        let mut path_prefix = None;
        for token in &tokens[1..] {
            if let Some(value) = token.strip_prefix("kind:") {
                for kind in value.split(',') {
                    kinds.push(
                        SymbolKind::from_str(kind).map_err(SymdexError::MalformedQuery)?,
                    );
                }
            } else if let Some(value) = token.strip_prefix("in:") {
                path_prefix = Some(value.to_string());
            } else if arg.is_none() {
                arg = Some(token.clone());
            } else {
                return Err(SymdexError::MalformedQuery(format!(
                    "unexpected extra argument: {}",
                    token
                )));
            }
        }
        stages.push(Stage {
            verb,
            arg,
            kinds,
            path_prefix,
        });
    }
    if stages.is_empty() {
        return Err(SymdexError::MalformedQuery("empty query".to_string()));
    }
    Ok(Query { stages })
}

/// Splits on `|` outside quotes.
fn split_pipeline(input: &str) -> Result<Vec<String>> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), _) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '|') => {
                stages.push(std::mem::take(&mut current));
                current = String::new();
            }
            (None, _) => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(SymdexError::MalformedQuery("unterminated quote".to_string()));
    }
    stages.push(current);
    Ok(stages)
}

/// Whitespace tokenizer that keeps quoted spans intact (quotes stripped).
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in input.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(SymdexError::MalformedQuery("unterminated quote".to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
