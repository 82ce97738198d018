//! NextDNS query log export parser.
//!
//! The export is CSV with a header row, e.g.
//!
//! ```text
//! timestamp,domain,query_type,dnssec,protocol,client_ip,status,reasons,...
//! 2024-01-15T10:23:45.123Z,ads.example.com,A,false,DNS-over-HTTPS,192.168.1.20,blocked,"Ads, Trackers",...
//! ```
//!
//! Fields may be quoted and contain commas, so rows go through the `csv`
//! reader rather than being split by hand. Columns are located by header
//! name (case-insensitive, with a few aliases), not by position.
//!
//! The status column is folded into [`QueryStatus`] here, before anything is
//! counted downstream.

use chrono::{DateTime, FixedOffset, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};

use super::{LineOutcome, LogParser, parse_iso_timestamp};
use crate::errors::{AnalyzerError, Result};
use crate::record::{LogRecord, LogSource, QueryStatus, QueryType};

const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "time", "date", "datetime"];
const DOMAIN_COLUMNS: &[&str] = &["domain", "query", "name", "query_name"];
const CLIENT_COLUMNS: &[&str] = &["client_ip", "client", "ip", "device_local_ip"];
const TYPE_COLUMNS: &[&str] = &["query_type", "type", "qtype"];
const STATUS_COLUMNS: &[&str] = &["status", "blocked", "action"];

/// Column indexes resolved from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Columns {
    timestamp: usize,
    domain: usize,
    client: usize,
    query_type: Option<usize>,
    status: Option<usize>,
}

impl Columns {
    fn resolve(header: &StringRecord) -> Result<Self> {
        let names: Vec<String> = header
            .iter()
            .map(|h| h.trim().to_ascii_lowercase().replace([' ', '-'], "_"))
            .collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| names.iter().position(|n| n == alias))
        };
        let require = |aliases: &[&str], column: &str| {
            find(aliases).ok_or_else(|| {
                AnalyzerError::missing_column(
                    LogSource::Nextdns.display_name(),
                    column,
                    header.iter().collect::<Vec<_>>().join(","),
                )
            })
        };

        Ok(Self {
            timestamp: require(TIMESTAMP_COLUMNS, "timestamp")?,
            domain: require(DOMAIN_COLUMNS, "domain")?,
            client: require(CLIENT_COLUMNS, "client_ip")?,
            query_type: find(TYPE_COLUMNS),
            status: find(STATUS_COLUMNS),
        })
    }
}

/// Parser for NextDNS CSV exports.
#[derive(Debug, Clone)]
pub struct NextDnsParser {
    /// Offset applied to timestamps written without one.
    naive_offset: FixedOffset,
}

impl Default for NextDnsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NextDnsParser {
    pub fn new() -> Self {
        Self {
            naive_offset: chrono::Offset::fix(&Utc),
        }
    }

    fn parse_row(&self, columns: &Columns, line: usize, row: &StringRecord) -> LineOutcome {
        if row.iter().all(|f| f.trim().is_empty()) {
            return LineOutcome::Blank;
        }

        let raw_ts = row.get(columns.timestamp).unwrap_or("");
        let Some(timestamp) = parse_timestamp(raw_ts, self.naive_offset) else {
            return LineOutcome::Skipped {
                line,
                reason: format!("unparseable timestamp `{raw_ts}`"),
            };
        };

        let field = |idx: Option<usize>| idx.and_then(|i| row.get(i)).unwrap_or("");
        let status = QueryStatus::fold(field(columns.status));
        let query_type = QueryType::parse(field(columns.query_type));

        match LogRecord::build(
            timestamp,
            field(Some(columns.domain)),
            field(Some(columns.client)),
            query_type,
            status,
            LogSource::Nextdns,
        ) {
            Ok(record) => LineOutcome::Record(record),
            Err(missing) => LineOutcome::Dropped {
                line,
                reason: missing.to_string(),
            },
        }
    }
}

impl LogParser for NextDnsParser {
    fn source(&self) -> LogSource {
        LogSource::Nextdns
    }

    fn outcomes<'a>(
        &'a self,
        content: &'a str,
    ) -> Result<Box<dyn Iterator<Item = LineOutcome> + 'a>> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let header = reader
            .headers()
            .map_err(|e| AnalyzerError::csv(LogSource::Nextdns.display_name(), e))?
            .clone();
        let columns = Columns::resolve(&header)?;

        Ok(Box::new(reader.into_records().enumerate().map(
            move |(i, row)| {
                // header is line 1
                let fallback_line = i + 2;
                match row {
                    Ok(row) => {
                        let line = row
                            .position()
                            .map(|p| p.line() as usize)
                            .unwrap_or(fallback_line);
                        self.parse_row(&columns, line, &row)
                    }
                    Err(e) => LineOutcome::Skipped {
                        line: e
                            .position()
                            .map(|p| p.line() as usize)
                            .unwrap_or(fallback_line),
                        reason: e.to_string(),
                    },
                }
            },
        )))
    }
}

/// ISO-8601 / RFC 3339, or Unix epoch seconds / milliseconds.
fn parse_timestamp(raw: &str, naive_offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        let value: i64 = raw.parse().ok()?;
        return if raw.len() > 11 {
            let nanos = (value % 1000) as u32 * 1_000_000;
            DateTime::<Utc>::from_timestamp(value / 1000, nanos)
        } else {
            DateTime::<Utc>::from_timestamp(value, 0)
        };
    }
    parse_iso_timestamp(raw, naive_offset)
}
