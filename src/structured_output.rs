//! Structured output for JSON and YAML serialization.
//!
//! These types are the artifact handed to the dashboard. The top-level shape
//! is fixed:
//!
//! ```text
//! { stats, devices: { devices: [...] }, time_series, suspicious_domains: [...],
//!   relationships: { ip_to_domains: [...], domain_to_ips: [...] } }
//! ```
//!
//! Conversion from [`AggregationResult`] only reshapes and renames; nothing
//! is recomputed here.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, AggregationResult, RankedCount};
use crate::record::{LogSource, QueryStatus};

/// Root of the analysis artifact
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisOutput {
    /// Totals, distributions and time range
    pub stats: StatsOverview,

    /// Per-client table
    pub devices: DeviceTable,

    /// Hourly buckets and run-wide distributions
    pub time_series: TimeSeriesData,

    /// Blocklist-matched queries in chronological order
    pub suspicious_domains: Vec<SuspiciousDomain>,

    /// Client and base domain cross views
    pub relationships: Relationships,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct StatsOverview {
    pub total_queries: usize,

    /// Distinct full query names
    pub unique_domains: usize,

    pub unique_base_domains: usize,

    pub unique_clients: usize,

    /// Records per source (`routeros`, `nextdns`)
    pub source_distribution: BTreeMap<String, usize>,

    /// Records per normalized status (`allowed`, `blocked`, `unknown`)
    pub status_distribution: BTreeMap<String, usize>,

    /// Records per DNS record type
    pub query_type_distribution: BTreeMap<String, usize>,

    pub time_range: TimeRange,

    pub top_domains: Vec<DomainCount>,

    pub top_base_domains: Vec<DomainCount>,

    pub top_clients: Vec<IpCount>,

    /// Number of blocklist-matched queries
    pub suspicious_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct TimeRange {
    /// Earliest record timestamp (absent when there are no records)
    pub start: Option<DateTime<Utc>>,

    /// Latest record timestamp
    pub end: Option<DateTime<Utc>>,

    pub duration_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct IpCount {
    pub ip: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DeviceTable {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Device {
    pub ip: String,

    pub query_count: usize,

    /// Distinct base domains queried by this client
    pub unique_domains: usize,

    pub blocked_count: usize,

    /// `blocked_count / query_count * 100`, two decimals
    pub blocked_percentage: f64,

    pub first_seen: DateTime<Utc>,

    pub last_seen: DateTime<Utc>,

    pub sources: Vec<LogSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct TimeSeriesData {
    pub hourly: Vec<HourlyBucket>,

    pub query_types: BTreeMap<String, usize>,

    pub statuses: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct HourlyBucket {
    /// Start of the hour
    pub hour: DateTime<Utc>,

    pub total: usize,

    pub query_types: BTreeMap<String, usize>,

    pub statuses: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct SuspiciousDomain {
    pub timestamp: DateTime<Utc>,

    pub client_ip: String,

    /// Full query name
    pub domain: String,

    pub base_domain: String,

    pub query_type: String,

    pub status: QueryStatus,

    pub source: LogSource,

    /// Text of the first blocklist pattern that matched
    pub matched_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct Relationships {
    pub ip_to_domains: Vec<IpToDomains>,
    pub domain_to_ips: Vec<DomainToIps>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct IpToDomains {
    pub ip: String,
    pub total_queries: usize,
    pub unique_domains: usize,
    pub domains: Vec<DomainCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub struct DomainToIps {
    pub domain: String,
    pub total_queries: usize,
    pub unique_ips: usize,
    pub ips: Vec<IpCount>,
}

fn domain_counts(items: &[RankedCount]) -> Vec<DomainCount> {
    items
        .iter()
        .map(|r| DomainCount {
            domain: r.key.clone(),
            count: r.count,
        })
        .collect()
}

fn ip_counts(items: &[RankedCount]) -> Vec<IpCount> {
    items
        .iter()
        .map(|r| IpCount {
            ip: r.key.clone(),
            count: r.count,
        })
        .collect()
}

fn status_map(statuses: &BTreeMap<QueryStatus, usize>) -> BTreeMap<String, usize> {
    statuses
        .iter()
        .map(|(status, count)| (status.as_str().to_string(), *count))
        .collect()
}

impl From<&AggregationResult> for AnalysisOutput {
    fn from(result: &AggregationResult) -> Self {
        let s = &result.stats;
        let stats = StatsOverview {
            total_queries: s.total_queries,
            unique_domains: s.unique_domains,
            unique_base_domains: s.unique_base_domains,
            unique_clients: s.unique_clients,
            source_distribution: s
                .source_distribution
                .iter()
                .map(|(source, count)| (source.as_str().to_string(), *count))
                .collect(),
            status_distribution: status_map(&s.status_distribution),
            query_type_distribution: s.query_type_distribution.clone(),
            time_range: TimeRange {
                start: s.time_range.start,
                end: s.time_range.end,
                duration_hours: s.time_range.duration_hours,
            },
            top_domains: domain_counts(&s.top_domains),
            top_base_domains: domain_counts(&s.top_base_domains),
            top_clients: ip_counts(&s.top_clients),
            suspicious_count: s.suspicious_count,
        };

        let devices = DeviceTable {
            devices: result
                .devices
                .iter()
                .map(|d| Device {
                    ip: d.ip.clone(),
                    query_count: d.query_count,
                    unique_domains: d.unique_domains,
                    blocked_count: d.blocked_count,
                    blocked_percentage: d.blocked_percentage,
                    first_seen: d.first_seen,
                    last_seen: d.last_seen,
                    sources: d.sources.clone(),
                })
                .collect(),
        };

        let ts = &result.time_series;
        let time_series = TimeSeriesData {
            hourly: ts
                .hourly
                .iter()
                .map(|b| HourlyBucket {
                    hour: b.hour,
                    total: b.total,
                    query_types: b.query_types.clone(),
                    statuses: status_map(&b.statuses),
                })
                .collect(),
            query_types: ts.query_types.clone(),
            statuses: status_map(&ts.statuses),
        };

        let suspicious_domains = result
            .suspicious_domains
            .iter()
            .map(|sd: &aggregate::SuspiciousDomain| SuspiciousDomain {
                timestamp: sd.timestamp,
                client_ip: sd.client_ip.clone(),
                domain: sd.domain.clone(),
                base_domain: sd.base_domain.clone(),
                query_type: sd.query_type.clone(),
                status: sd.status,
                source: sd.source,
                matched_pattern: sd.matched_pattern.clone(),
            })
            .collect();

        let rel = &result.relationships;
        let relationships = Relationships {
            ip_to_domains: rel
                .ip_to_domains
                .iter()
                .map(|e| IpToDomains {
                    ip: e.ip.clone(),
                    total_queries: e.total_queries,
                    unique_domains: e.unique_domains,
                    domains: domain_counts(&e.domains),
                })
                .collect(),
            domain_to_ips: rel
                .domain_to_ips
                .iter()
                .map(|e| DomainToIps {
                    domain: e.domain.clone(),
                    total_queries: e.total_queries,
                    unique_ips: e.unique_ips,
                    ips: ip_counts(&e.ips),
                })
                .collect(),
        };

        Self {
            stats,
            devices,
            time_series,
            suspicious_domains,
            relationships,
        }
    }
}

/// Serialization format of the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }
}

impl AnalysisOutput {
    /// Generate JSON schema for this output format
    pub fn generate_json_schema() -> Result<String> {
        let schema = schemars::schema_for!(AnalysisOutput);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json_compact(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Render in `format`; `pretty` only affects JSON.
    pub fn render(&self, format: OutputFormat, pretty: bool) -> Result<String> {
        match (format, pretty) {
            (OutputFormat::Json, true) => self.to_json(),
            (OutputFormat::Json, false) => self.to_json_compact(),
            (OutputFormat::Yaml, _) => self.to_yaml(),
        }
    }
}
