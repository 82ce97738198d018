//! MikroTik RouterOS DNS log parser.
//!
//! RouterOS writes DNS activity as free text. The body is stable:
//!
//! ```text
//! query from 192.168.88.10:53211: #1234 www.example.com. AAAA
//! ```
//!
//! but the timestamp prefix depends on where the log was captured:
//!
//! 1. remote syslog / disk action: `2024-01-15T10:23:45+01:00 ...`
//! 2. console export:              `jan/15/2024 10:23:45 ...`
//! 3. BSD syslog:                  `Jan 15 10:23:45 MikroTik ...`
//! 4. today's entries in `/log print`: `10:23:45 ...`
//!
//! Each format is a separate matcher function; they are tried in that order
//! and the first one that recognises the line wins. A line no matcher
//! recognises is counted as skipped.
//!
//! Limitations:
//! - RouterOS does not log the resolver decision, so every record carries
//!   `QueryStatus::Unknown`.
//! - Multi-line `dns,packet` dumps are not reassembled; their lines are
//!   skipped.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{LineOutcome, LogParser, local_to_utc, parse_iso_timestamp};
use crate::errors::Result;
use crate::record::{LogRecord, LogSource, QueryStatus, QueryType};

/// Query body shared by every timestamp layout. The transaction id is
/// optional because older firmware omits it.
const QUERY_BODY: &str = r"query from (?P<ip>\[[0-9A-Fa-f:.]+\](?::\d+)?|[0-9A-Fa-f:.]*[0-9A-Fa-f]):?\s+(?:#\d+\s+)?(?P<name>\S+?)\.?\s+(?P<qtype>[A-Za-z0-9]+)\s*$";

static ISO_LINE: Lazy<Regex> = Lazy::new(|| {
    line_regex(r"(?P<ts>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:[Zz]|[+-]\d{2}:?\d{2})?)")
});

static CONSOLE_LINE: Lazy<Regex> =
    Lazy::new(|| line_regex(r"(?P<ts>[A-Za-z]{3}/\d{1,2}/\d{4}\s+\d{2}:\d{2}:\d{2})"));

static SYSLOG_LINE: Lazy<Regex> =
    Lazy::new(|| line_regex(r"(?P<ts>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})"));

static TIME_ONLY_LINE: Lazy<Regex> = Lazy::new(|| line_regex(r"(?P<ts>\d{2}:\d{2}:\d{2})"));

fn line_regex(timestamp: &str) -> Regex {
    Regex::new(&format!(r"^\s*{timestamp}\s.*?{QUERY_BODY}"))
        .expect("valid RouterOS line regex")
}

/// Timestamp interpretation for a RouterOS log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterOsOptions {
    /// Offset of the router clock; naive timestamps are read in it.
    pub utc_offset: FixedOffset,
    /// Date used for time-only entries, and the year for BSD syslog lines.
    pub reference_date: NaiveDate,
}

impl Default for RouterOsOptions {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            reference_date: Local::now().date_naive(),
        }
    }
}

/// A recognised query line before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuery<'a> {
    pub timestamp: DateTime<Utc>,
    pub client: &'a str,
    pub name: &'a str,
    pub qtype: &'a str,
}

/// One timestamp layout; `None` means "not mine, try the next one".
pub type LineMatcher = for<'a> fn(&'a str, &RouterOsOptions) -> Option<RawQuery<'a>>;

/// Matchers in priority order.
pub const MATCHERS: &[(&str, LineMatcher)] = &[
    ("iso", match_iso),
    ("console", match_console),
    ("syslog", match_syslog),
    ("time-only", match_time_only),
];

fn raw_query<'a>(caps: &Captures<'a>, timestamp: DateTime<Utc>) -> Option<RawQuery<'a>> {
    Some(RawQuery {
        timestamp,
        client: caps.name("ip")?.as_str(),
        name: caps.name("name")?.as_str(),
        qtype: caps.name("qtype")?.as_str(),
    })
}

fn match_iso<'a>(line: &'a str, opts: &RouterOsOptions) -> Option<RawQuery<'a>> {
    let caps = ISO_LINE.captures(line)?;
    let timestamp = parse_iso_timestamp(caps.name("ts")?.as_str(), opts.utc_offset)?;
    raw_query(&caps, timestamp)
}

fn match_console<'a>(line: &'a str, opts: &RouterOsOptions) -> Option<RawQuery<'a>> {
    let caps = CONSOLE_LINE.captures(line)?;
    let ts = collapse_whitespace(caps.name("ts")?.as_str());
    let naive = NaiveDateTime::parse_from_str(&ts, "%b/%d/%Y %H:%M:%S").ok()?;
    raw_query(&caps, local_to_utc(naive, opts.utc_offset)?)
}

fn match_syslog<'a>(line: &'a str, opts: &RouterOsOptions) -> Option<RawQuery<'a>> {
    use chrono::Datelike;

    let caps = SYSLOG_LINE.captures(line)?;
    let ts = format!(
        "{} {}",
        opts.reference_date.year(),
        collapse_whitespace(caps.name("ts")?.as_str())
    );
    let naive = NaiveDateTime::parse_from_str(&ts, "%Y %b %d %H:%M:%S").ok()?;
    raw_query(&caps, local_to_utc(naive, opts.utc_offset)?)
}

fn match_time_only<'a>(line: &'a str, opts: &RouterOsOptions) -> Option<RawQuery<'a>> {
    let caps = TIME_ONLY_LINE.captures(line)?;
    let time = NaiveTime::parse_from_str(caps.name("ts")?.as_str(), "%H:%M:%S").ok()?;
    let naive = opts.reference_date.and_time(time);
    raw_query(&caps, local_to_utc(naive, opts.utc_offset)?)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parser for RouterOS text logs.
#[derive(Debug, Clone, Default)]
pub struct RouterOsParser {
    options: RouterOsOptions,
}

impl RouterOsParser {
    pub fn new(options: RouterOsOptions) -> Self {
        Self { options }
    }

    /// Run the matchers over one line; returns the matcher name too.
    pub fn match_line<'a>(&self, line: &'a str) -> Option<(&'static str, RawQuery<'a>)> {
        MATCHERS
            .iter()
            .find_map(|(name, matcher)| matcher(line, &self.options).map(|q| (*name, q)))
    }

    fn parse_line(&self, line_no: usize, line: &str) -> LineOutcome {
        if line.trim().is_empty() {
            return LineOutcome::Blank;
        }

        let Some((_, query)) = self.match_line(line) else {
            return LineOutcome::Skipped {
                line: line_no,
                reason: "no RouterOS query pattern matched".to_string(),
            };
        };

        match LogRecord::build(
            query.timestamp,
            query.name,
            query.client,
            QueryType::parse(query.qtype),
            QueryStatus::Unknown,
            LogSource::Routeros,
        ) {
            Ok(record) => LineOutcome::Record(record),
            Err(missing) => LineOutcome::Dropped {
                line: line_no,
                reason: missing.to_string(),
            },
        }
    }
}

impl LogParser for RouterOsParser {
    fn source(&self) -> LogSource {
        LogSource::Routeros
    }

    fn outcomes<'a>(
        &'a self,
        content: &'a str,
    ) -> Result<Box<dyn Iterator<Item = LineOutcome> + 'a>> {
        Ok(Box::new(
            content
                .lines()
                .enumerate()
                .map(move |(i, line)| self.parse_line(i + 1, line)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> RouterOsParser {
        RouterOsParser::new(RouterOsOptions {
            utc_offset: FixedOffset::east_opt(0).unwrap(),
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        })
    }

    #[test]
    fn test_iso_line() {
        let line = "2024-01-15T10:23:45+01:00 MikroTik dns: query from 192.168.88.10:53211: #1234 www.example.com. AAAA";
        let (matcher, q) = parser().match_line(line).unwrap();
        assert_eq!(matcher, "iso");
        assert_eq!(q.timestamp.to_rfc3339(), "2024-01-15T09:23:45+00:00");
        assert_eq!(q.client, "192.168.88.10:53211");
        assert_eq!(q.name, "www.example.com");
        assert_eq!(q.qtype, "AAAA");
    }

    #[test]
    fn test_console_line() {
        let line = "jan/15/2024 10:23:45 dns query from 192.168.88.20: #77 ads.example.net. A";
        let (matcher, q) = parser().match_line(line).unwrap();
        assert_eq!(matcher, "console");
        assert_eq!(q.timestamp.to_rfc3339(), "2024-01-15T10:23:45+00:00");
        assert_eq!(q.name, "ads.example.net");
    }

    #[test]
    fn test_syslog_line_takes_reference_year() {
        let line = "Feb  3 08:00:01 router dns query from 10.0.0.7: #9 mail.example.org. MX";
        let (matcher, q) = parser().match_line(line).unwrap();
        assert_eq!(matcher, "syslog");
        assert_eq!(q.timestamp.to_rfc3339(), "2024-02-03T08:00:01+00:00");
        assert_eq!(q.qtype, "MX");
    }

    #[test]
    fn test_time_only_line_takes_reference_date() {
        let line = "10:23:45 dns query from 192.168.88.10: #5 44.8.0.10.in-addr.arpa. PTR";
        let (matcher, q) = parser().match_line(line).unwrap();
        assert_eq!(matcher, "time-only");
        assert_eq!(q.timestamp.to_rfc3339(), "2024-03-09T10:23:45+00:00");
        assert_eq!(q.name, "44.8.0.10.in-addr.arpa");
    }

    #[test]
    fn test_body_without_transaction_id() {
        let line = "2024-01-15 10:00:00 dns query from 10.0.0.2: example.com A";
        let (_, q) = parser().match_line(line).unwrap();
        assert_eq!(q.name, "example.com");
        assert_eq!(q.qtype, "A");
    }

    #[test]
    fn test_utc_offset_applied_to_naive_times() {
        let p = RouterOsParser::new(RouterOsOptions {
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        });
        let line = "jan/15/2024 10:00:00 dns query from 10.0.0.2: #1 example.com. A";
        let (_, q) = p.match_line(line).unwrap();
        assert_eq!(q.timestamp.to_rfc3339(), "2024-01-15T08:00:00+00:00");
    }

    #[test]
    fn test_parse_counts_skipped_and_blank() {
        let content = "\
2024-01-15 10:00:00 dns query from 10.0.0.2: #1 www.example.com. A

2024-01-15 10:00:05 system,info,account user admin logged in from 10.0.0.9 via winbox
garbage line
2024-01-15 10:00:09 dns query from 10.0.0.3: #2 Tracker.Example.NET. AAAA
";
        let outcome = parser().parse(content).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.dropped, 0);

        let second = &outcome.records[1];
        assert_eq!(second.query_domain, "tracker.example.net");
        assert_eq!(second.base_domain, "example.net");
        assert_eq!(second.client_ip, "10.0.0.3");
        assert_eq!(second.query_type, QueryType::Aaaa);
        assert_eq!(second.status, QueryStatus::Unknown);
        assert_eq!(second.source, LogSource::Routeros);
    }

    #[test]
    fn test_root_name_is_dropped() {
        let content = "2024-01-15 10:00:00 dns query from 10.0.0.2: #1 . NS\n";
        let outcome = parser().parse(content).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn test_invalid_timestamp_falls_through_to_skip() {
        let content = "2024-01-15 99:99:99 dns query from 10.0.0.2: #1 example.com. A\n";
        let outcome = parser().parse(content).unwrap();
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_outcomes_restart() {
        let p = parser();
        let content = "10:00:00 dns query from 10.0.0.2: #1 example.com. A\n";
        let first: Vec<_> = p.outcomes(content).unwrap().collect();
        let second: Vec<_> = p.outcomes(content).unwrap().collect();
        assert_eq!(first, second);
    }
}
