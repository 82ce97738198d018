//! Canonical record shape shared by every log source.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain;

/// Provenance tag of a record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Routeros,
    Nextdns,
}

impl LogSource {
    pub const ALL: [LogSource; 2] = [LogSource::Routeros, LogSource::Nextdns];

    pub fn as_str(self) -> &'static str {
        match self {
            LogSource::Routeros => "routeros",
            LogSource::Nextdns => "nextdns",
        }
    }

    /// Name used in user-facing messages.
    pub fn display_name(self) -> &'static str {
        match self {
            LogSource::Routeros => "RouterOS",
            LogSource::Nextdns => "NextDNS",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized resolution outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Allowed,
    Blocked,
    Unknown,
}

impl QueryStatus {
    /// Fold a source-specific status value into the canonical enum.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Anything unrecognised, including an empty value, is `Unknown`.
    pub fn fold(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "blocked" | "block" | "denied" | "deny" | "true" | "1" | "yes" => QueryStatus::Blocked,
            "allowed" | "allow" | "default" | "ok" | "false" | "0" | "no" | "relayed"
            | "whitelisted" | "allowlisted" => QueryStatus::Allowed,
            _ => QueryStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Allowed => "allowed",
            QueryStatus::Blocked => "blocked",
            QueryStatus::Unknown => "unknown",
        }
    }

    pub fn is_blocked(self) -> bool {
        self == QueryStatus::Blocked
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DNS record type as written in the logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryType {
    /// A record: IPv4 address
    A,
    /// AAAA record: IPv6 address
    Aaaa,
    Cname,
    Mx,
    Ns,
    /// PTR record: reverse lookup
    Ptr,
    Soa,
    Srv,
    Txt,
    /// HTTPS binding (RFC 9460)
    Https,
    Svcb,
    Any,
    /// Well-formed mnemonic this crate has no variant for, upper-cased.
    Other(String),
    Unknown,
}

impl QueryType {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return QueryType::Unknown;
        }
        match raw.to_ascii_uppercase().as_str() {
            "A" => QueryType::A,
            "AAAA" => QueryType::Aaaa,
            "CNAME" => QueryType::Cname,
            "MX" => QueryType::Mx,
            "NS" => QueryType::Ns,
            "PTR" => QueryType::Ptr,
            "SOA" => QueryType::Soa,
            "SRV" => QueryType::Srv,
            "TXT" => QueryType::Txt,
            "HTTPS" | "TYPE65" => QueryType::Https,
            "SVCB" | "TYPE64" => QueryType::Svcb,
            "ANY" => QueryType::Any,
            "UNKNOWN" => QueryType::Unknown,
            other if other.chars().all(|c| c.is_ascii_alphanumeric()) => {
                QueryType::Other(other.to_string())
            }
            _ => QueryType::Unknown,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            QueryType::A => "A",
            QueryType::Aaaa => "AAAA",
            QueryType::Cname => "CNAME",
            QueryType::Mx => "MX",
            QueryType::Ns => "NS",
            QueryType::Ptr => "PTR",
            QueryType::Soa => "SOA",
            QueryType::Srv => "SRV",
            QueryType::Txt => "TXT",
            QueryType::Https => "HTTPS",
            QueryType::Svcb => "SVCB",
            QueryType::Any => "ANY",
            QueryType::Other(name) => name,
            QueryType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One DNS query after parsing and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub query_domain: String,
    pub base_domain: String,
    pub client_ip: String,
    pub query_type: QueryType,
    pub status: QueryStatus,
    pub source: LogSource,
}

/// Why a parsed line could not become a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    QueryDomain,
    ClientIp,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingField::QueryDomain => f.write_str("missing query domain"),
            MissingField::ClientIp => f.write_str("missing client ip"),
        }
    }
}

impl LogRecord {
    /// Build a record from raw field values, normalizing the domain.
    ///
    /// Returns the missing field when the domain or the client address is
    /// empty; such lines never reach the aggregator.
    pub fn build(
        timestamp: DateTime<Utc>,
        raw_domain: &str,
        raw_client_ip: &str,
        query_type: QueryType,
        status: QueryStatus,
        source: LogSource,
    ) -> Result<Self, MissingField> {
        let query_domain =
            domain::clean_query_domain(raw_domain).ok_or(MissingField::QueryDomain)?;
        let base_domain = domain::normalize(&query_domain).ok_or(MissingField::QueryDomain)?;
        let client_ip = clean_client_ip(raw_client_ip).ok_or(MissingField::ClientIp)?;

        Ok(Self {
            timestamp,
            query_domain,
            base_domain,
            client_ip,
            query_type,
            status,
            source,
        })
    }
}

/// A record together with the blocklist pattern it matched, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedRecord {
    pub record: LogRecord,
    pub matched_pattern: Option<String>,
}

impl AnnotatedRecord {
    pub fn unmatched(record: LogRecord) -> Self {
        Self {
            record,
            matched_pattern: None,
        }
    }

    pub fn is_suspicious(&self) -> bool {
        self.matched_pattern.is_some()
    }
}

/// Trim a client address and drop an IPv4 `:port` suffix or IPv6 brackets.
fn clean_client_ip(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // [2001:db8::1]:5353
    if let Some(rest) = trimmed.strip_prefix('[') {
        let inner = rest.split(']').next().unwrap_or(rest).trim();
        return (!inner.is_empty()).then(|| inner.to_ascii_lowercase());
    }

    // 192.168.88.10:53211 (a single colon can only be a port)
    if trimmed.matches(':').count() == 1
        && let Some((host, port)) = trimmed.split_once(':')
        && port.chars().all(|c| c.is_ascii_digit())
    {
        let host = host.trim();
        return (!host.is_empty()).then(|| host.to_string());
    }

    Some(trimmed.to_ascii_lowercase())
}
