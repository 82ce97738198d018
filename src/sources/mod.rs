//! Log source parsers.
//!
//! Every source implements [`LogParser`]: given the raw content of one file
//! it yields a lazy sequence of per-line [`LineOutcome`]s. Calling
//! [`LogParser::outcomes`] again restarts from the first line. The provided
//! [`LogParser::parse`] folds that sequence into a [`ParseOutcome`]: the
//! records plus the number of skipped (unparseable) and dropped (missing a
//! required field) lines.
//!
//! A malformed line never aborts a file. Only problems that make the whole
//! file unusable (e.g. a CSV header without a domain column) are returned as
//! errors, and those are fatal for that source alone.
//!
//! Sources:
//!   - [`routeros::RouterOsParser`]: free-text router log, ordered regex matchers
//!   - [`nextdns::NextDnsParser`]: CSV export with a header row

pub mod nextdns;
pub mod routeros;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::debug;

use crate::errors::Result;
use crate::record::{LogRecord, LogSource};

pub use nextdns::NextDnsParser;
pub use routeros::{RouterOsOptions, RouterOsParser};

/// What a single input line (or CSV row) turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Record(LogRecord),
    /// The line could not be parsed at all.
    Skipped { line: usize, reason: String },
    /// The line parsed but lacks the domain or the client address.
    Dropped { line: usize, reason: String },
    /// Empty line; not counted anywhere.
    Blank,
}

/// Folded result of parsing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub source: LogSource,
    pub records: Vec<LogRecord>,
    pub skipped: usize,
    pub dropped: usize,
}

impl ParseOutcome {
    pub fn new(source: LogSource) -> Self {
        Self {
            source,
            records: Vec::new(),
            skipped: 0,
            dropped: 0,
        }
    }
}

/// Shared contract of the source parsers.
pub trait LogParser {
    fn source(&self) -> LogSource;

    /// Lazily parse `content`, one outcome per line or row.
    fn outcomes<'a>(&'a self, content: &'a str)
    -> Result<Box<dyn Iterator<Item = LineOutcome> + 'a>>;

    /// Parse `content` to completion.
    fn parse(&self, content: &str) -> Result<ParseOutcome> {
        let source = self.source();
        let mut outcome = ParseOutcome::new(source);

        for item in self.outcomes(content)? {
            match item {
                LineOutcome::Record(record) => outcome.records.push(record),
                LineOutcome::Skipped { line, reason } => {
                    debug!(%source, line, "skipped line: {reason}");
                    outcome.skipped += 1;
                }
                LineOutcome::Dropped { line, reason } => {
                    debug!(%source, line, "dropped line: {reason}");
                    outcome.dropped += 1;
                }
                LineOutcome::Blank => {}
            }
        }

        debug!(
            %source,
            records = outcome.records.len(),
            skipped = outcome.skipped,
            dropped = outcome.dropped,
            "source parsed"
        );
        Ok(outcome)
    }
}

/// Parse an ISO-8601 style timestamp.
///
/// Values carrying an offset (or `Z`) are converted to UTC; naive values are
/// read in `local_offset`. Fractional seconds are optional.
pub(crate) fn parse_iso_timestamp(raw: &str, local_offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    if let Some(naive_utc) = raw.strip_suffix(['Z', 'z']) {
        return parse_naive(naive_utc).map(|n| Utc.from_utc_datetime(&n));
    }

    parse_naive(raw).and_then(|n| local_to_utc(n, local_offset))
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Interpret a wall-clock time in a fixed offset and convert it to UTC.
pub(crate) fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
