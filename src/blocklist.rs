//! Regex blocklist loading and matching.
//!
//! File format, one pattern per line:
//! ```text
//! # trackers
//! ^ads\.
//! (^|\.)doubleclick\.net$
//!
//! telemetry
//! ```
//! Blank lines and lines starting with `#` are ignored. Patterns use search
//! semantics, so an unanchored pattern matches anywhere in the name.
//!
//! A pattern that fails to compile is rejected and reported; the remaining
//! patterns still load. Matching walks the patterns in file order and the
//! first hit wins.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{AnalyzerError, IoResultExt, Result};
use crate::record::{AnnotatedRecord, LogRecord};

/// Which record field is tested against the blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchTarget {
    /// The full queried name (`ads.tracker.example.com`).
    #[default]
    QueryDomain,
    /// The reduced base domain (`example.com`).
    BaseDomain,
}

impl MatchTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchTarget::QueryDomain => "query",
            MatchTarget::BaseDomain => "base",
        }
    }

    /// The field of `record` this target selects.
    pub fn select(self, record: &LogRecord) -> &str {
        match self {
            MatchTarget::QueryDomain => &record.query_domain,
            MatchTarget::BaseDomain => &record.base_domain,
        }
    }
}

impl FromStr for MatchTarget {
    type Err = AnalyzerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" | "query_domain" | "full" => Ok(MatchTarget::QueryDomain),
            "base" | "base_domain" => Ok(MatchTarget::BaseDomain),
            other => Err(AnalyzerError::configuration(format!(
                "unknown match target `{other}`; expected one of: query, base"
            ))),
        }
    }
}

impl fmt::Display for MatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled pattern and the text it was compiled from.
#[derive(Debug, Clone)]
pub struct BlocklistPattern {
    regex: Regex,
    source: String,
}

impl BlocklistPattern {
    pub fn compile(source: &str) -> Result<Self> {
        let regex = Regex::new(source)
            .map_err(|e| AnalyzerError::invalid_pattern(source, e.to_string()))?;
        Ok(Self {
            regex,
            source: source.to_string(),
        })
    }

    /// Original pattern text, used for attribution in the output.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, domain: &str) -> bool {
        self.regex.is_match(domain)
    }
}

/// A pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPattern {
    /// 1-based position among the non-comment entries (or file line number).
    pub line: usize,
    pub pattern: String,
    pub reason: String,
}

/// Ordered, immutable set of compiled patterns.
#[derive(Debug, Clone, Default)]
pub struct CompiledBlocklist {
    patterns: Vec<BlocklistPattern>,
}

impl CompiledBlocklist {
    /// An empty blocklist; nothing is ever suspicious.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile patterns in order, collecting the ones that fail.
    pub fn load<I, S>(patterns: I) -> (Self, Vec<RejectedPattern>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = patterns
            .into_iter()
            .enumerate()
            .map(|(i, p)| (i + 1, p.as_ref().to_string()))
            .collect::<Vec<_>>();
        Self::compile_entries(entries)
    }

    /// Parse blocklist file contents (blank lines and `#` comments skipped).
    pub fn parse_file_contents(content: &str) -> (Self, Vec<RejectedPattern>) {
        let entries = content
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some((i + 1, line.to_string()))
                }
            })
            .collect::<Vec<_>>();
        Self::compile_entries(entries)
    }

    /// Read and parse a blocklist file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<RejectedPattern>)> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_path(path.display().to_string(), "read")?;
        let (list, rejected) = Self::parse_file_contents(&content);
        debug!(
            path = %path.display(),
            loaded = list.len(),
            rejected = rejected.len(),
            "blocklist loaded"
        );
        Ok((list, rejected))
    }

    fn compile_entries(entries: Vec<(usize, String)>) -> (Self, Vec<RejectedPattern>) {
        let mut patterns = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();

        for (line, text) in entries {
            match BlocklistPattern::compile(&text) {
                Ok(p) => patterns.push(p),
                Err(e) => {
                    warn!(line, pattern = %text, "discarding blocklist pattern: {e}");
                    let reason = match e {
                        AnalyzerError::InvalidPattern { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    rejected.push(RejectedPattern {
                        line,
                        pattern: text,
                        reason,
                    });
                }
            }
        }

        (Self { patterns }, rejected)
    }

    /// First pattern (in load order) matching `domain`.
    pub fn matches(&self, domain: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.is_match(domain))
            .map(BlocklistPattern::source)
    }

    /// Attach the first matching pattern for the selected field.
    pub fn annotate(&self, record: LogRecord, target: MatchTarget) -> AnnotatedRecord {
        let matched_pattern = self
            .matches(target.select(&record))
            .map(str::to_string);
        AnnotatedRecord {
            record,
            matched_pattern,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(BlocklistPattern::source)
    }
}
