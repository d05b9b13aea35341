//! Textual search over the files under an index's source root.
//!
//! Grep deliberately reads from disk rather than from indexed facts: it is
//! the one query that sees the file exactly as it is right now.

use super::SymbolIndex;
use crate::error::{Result, SymdexError};
use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct GrepOptions {
    /// Restrict to files whose relative path starts with this prefix.
    pub path_filter: Option<String>,
    pub include: Option<String>,
    /// Exclude takes precedence over include.
    pub exclude: Option<String>,
    pub lines_before: usize,
    pub lines_after: usize,
    /// Line mode only; ignored when `multiline` is set.
    pub invert_match: bool,
    /// Caps recorded matches per file. The file is still scanned to the end.
    pub max_per_file: Option<usize>,
    pub multiline: bool,
    pub only_matching: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GrepMatch {
    pub file: String,
    /// Zero-based line of the match start.
    pub line: usize,
    pub col: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

impl SymbolIndex {
    pub fn grep(&self, pattern: &str, options: &GrepOptions) -> Result<Vec<GrepMatch>> {
        let regex = RegexBuilder::new(pattern)
            .multi_line(options.multiline)
            .dot_matches_new_line(options.multiline)
            .build()
            .map_err(|e| SymdexError::MalformedQuery(format!("invalid regex: {}", e)))?;

        let include = compile_glob(options.include.as_deref())?;
        let exclude = compile_glob(options.exclude.as_deref())?;

        let mut files: Vec<(PathBuf, String)> = Vec::new();
        let walker = WalkBuilder::new(self.source_root()).git_ignore(true).build();
        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.into_path();
            let Ok(relative) = path.strip_prefix(self.source_root()) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if let Some(prefix) = &options.path_filter {
                if !relative.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if let Some(glob) = &exclude {
                if glob.is_match(&relative) {
                    continue;
                }
            }
            if let Some(glob) = &include {
                if !glob.is_match(&relative) {
                    continue;
                }
            }
            files.push((path, relative));
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let mut matches = Vec::new();
        for (path, relative) in files {
            // Unreadable or non-UTF-8 files are silently skipped.
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            if options.multiline {
                scan_multiline(&regex, &content, &relative, options, &mut matches);
            } else {
                scan_lines(&regex, &content, &relative, options, &mut matches);
            }
        }
        Ok(matches)
    }
}

fn compile_glob(pattern: Option<&str>) -> Result<Option<GlobMatcher>> {
    match pattern {
        None => Ok(None),
        Some(p) => Glob::new(p)
            .map(|g| Some(g.compile_matcher()))
            .map_err(|e| SymdexError::MalformedQuery(format!("invalid glob {}: {}", p, e))),
    }
}

fn scan_lines(
    regex: &Regex,
    content: &str,
    relative: &str,
    options: &GrepOptions,
    out: &mut Vec<GrepMatch>,
) {
    let lines: Vec<&str> = content.lines().collect();
    let mut recorded = 0usize;
    for (line_no, line) in lines.iter().enumerate() {
        let hit = regex.find(line);
        let matched = hit.is_some() != options.invert_match;
        if !matched {
            continue;
        }
        if options
            .max_per_file
            .is_some_and(|max| recorded >= max)
        {
            // Keep scanning so per-file behavior stays O(file) regardless of
            // the cap, but record nothing further.
            continue;
        }
        recorded += 1;

        let (col, text) = match (&hit, options.only_matching) {
            (Some(m), true) => (m.start(), m.as_str().to_string()),
            (Some(m), false) => (m.start(), line.to_string()),
            (None, _) => (0, line.to_string()),
        };
        out.push(GrepMatch {
            file: relative.to_string(),
            line: line_no,
            col,
            text,
            before: context(&lines, line_no, options.lines_before, true),
            after: context(&lines, line_no, options.lines_after, false),
        });
    }
}

fn scan_multiline(
    regex: &Regex,
    content: &str,
    relative: &str,
    options: &GrepOptions,
    out: &mut Vec<GrepMatch>,
) {
    let lines: Vec<&str> = content.lines().collect();
    let line_starts = line_start_offsets(content);
    let mut recorded = 0usize;
    for m in regex.find_iter(content) {
        if options
            .max_per_file
            .is_some_and(|max| recorded >= max)
        {
            break;
        }
        recorded += 1;

        let (start_line, col) = offset_to_position(&line_starts, m.start());
        let (end_line, _) = offset_to_position(&line_starts, m.end().saturating_sub(1).max(m.start()));
        let text = if options.only_matching {
            m.as_str().to_string()
        } else {
            lines[start_line..=end_line.min(lines.len().saturating_sub(1))].join("\n")
        };
        out.push(GrepMatch {
            file: relative.to_string(),
            line: start_line,
            col,
            text,
            before: context(&lines, start_line, options.lines_before, true),
            after: context(&lines, end_line, options.lines_after, false),
        });
    }
}

fn context(lines: &[&str], line_no: usize, count: usize, before: bool) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    if before {
        let start = line_no.saturating_sub(count);
        lines[start..line_no].iter().map(|l| l.to_string()).collect()
    } else {
        let end = (line_no + 1 + count).min(lines.len());
        lines[(line_no + 1).min(lines.len())..end]
            .iter()
            .map(|l| l.to_string())
            .collect()
    }
}

fn line_start_offsets(content: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn offset_to_position(line_starts: &[usize], offset: usize) -> (usize, usize) {
    let line = match line_starts.binary_search(&offset) {
        Ok(exact) => exact,
        Err(next) => next - 1,
    };
    (line, offset - line_starts[line])
}
