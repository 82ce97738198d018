//! Aggregation of annotated records into the analysis views.
//!
//! [`Aggregator`] is a plain accumulator value: feed it records with
//! [`Aggregator::push`], combine partial accumulators with
//! [`Aggregator::merge`], then call [`Aggregator::finish`] once. Every
//! number in the resulting [`AggregationResult`] is derived from the pushed
//! records; nothing is counted on the side.
//!
//! All internal maps are ordered, and every ranking sorts by count
//! descending with the key ascending as tie-break, so the result does not
//! depend on the order records arrive in.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Timelike, Utc};

use crate::record::{AnnotatedRecord, LogSource, QueryStatus};

/// Default length of the top-N lists in the overview.
pub const DEFAULT_TOP_N: usize = 10;

/// Knobs that shape the aggregation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub top_n: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// A key with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCount {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsOverview {
    pub total_queries: usize,
    pub unique_domains: usize,
    pub unique_base_domains: usize,
    pub unique_clients: usize,
    pub source_distribution: BTreeMap<LogSource, usize>,
    pub status_distribution: BTreeMap<QueryStatus, usize>,
    pub query_type_distribution: BTreeMap<String, usize>,
    pub time_range: TimeRange,
    pub top_domains: Vec<RankedCount>,
    pub top_base_domains: Vec<RankedCount>,
    pub top_clients: Vec<RankedCount>,
    pub suspicious_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub ip: String,
    pub query_count: usize,
    /// Distinct base domains queried.
    pub unique_domains: usize,
    pub blocked_count: usize,
    pub blocked_percentage: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sources: Vec<LogSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpDomains {
    pub ip: String,
    pub total_queries: usize,
    pub unique_domains: usize,
    pub domains: Vec<RankedCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainIps {
    pub domain: String,
    pub total_queries: usize,
    pub unique_ips: usize,
    pub ips: Vec<RankedCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationships {
    pub ip_to_domains: Vec<IpDomains>,
    pub domain_to_ips: Vec<DomainIps>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourBucket {
    pub hour: DateTime<Utc>,
    pub total: usize,
    pub query_types: BTreeMap<String, usize>,
    pub statuses: BTreeMap<QueryStatus, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeries {
    pub hourly: Vec<HourBucket>,
    pub query_types: BTreeMap<String, usize>,
    pub statuses: BTreeMap<QueryStatus, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspiciousDomain {
    pub timestamp: DateTime<Utc>,
    pub client_ip: String,
    pub domain: String,
    pub base_domain: String,
    pub query_type: String,
    pub status: QueryStatus,
    pub source: LogSource,
    pub matched_pattern: String,
}

impl SuspiciousDomain {
    /// Covers every field, so equal keys mean identical entries.
    fn sort_key(
        &self,
    ) -> (&DateTime<Utc>, &str, &str, &str, LogSource, &str, QueryStatus, &str) {
        (
            &self.timestamp,
            &self.client_ip,
            &self.domain,
            &self.matched_pattern,
            self.source,
            &self.query_type,
            self.status,
            &self.base_domain,
        )
    }
}

/// Terminal result of an aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    pub stats: StatsOverview,
    pub devices: Vec<Device>,
    pub relationships: Relationships,
    pub time_series: TimeSeries,
    pub suspicious_domains: Vec<SuspiciousDomain>,
}

#[derive(Debug, Clone)]
struct DeviceAcc {
    query_count: usize,
    blocked_count: usize,
    /// base domain -> count; also feeds `ip_to_domains`
    domains: BTreeMap<String, usize>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    sources: BTreeSet<LogSource>,
}

impl DeviceAcc {
    fn new(ts: DateTime<Utc>) -> Self {
        Self {
            query_count: 0,
            blocked_count: 0,
            domains: BTreeMap::new(),
            first_seen: ts,
            last_seen: ts,
            sources: BTreeSet::new(),
        }
    }

    fn merge(&mut self, other: DeviceAcc) {
        self.query_count += other.query_count;
        self.blocked_count += other.blocked_count;
        merge_counts(&mut self.domains, other.domains);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
        self.sources.extend(other.sources);
    }
}

#[derive(Debug, Clone, Default)]
struct HourAcc {
    total: usize,
    query_types: BTreeMap<String, usize>,
    statuses: BTreeMap<QueryStatus, usize>,
}

/// Accumulator over annotated records.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    options: AggregateOptions,
    total: usize,
    query_domains: BTreeMap<String, usize>,
    base_domains: BTreeMap<String, usize>,
    sources: BTreeMap<LogSource, usize>,
    statuses: BTreeMap<QueryStatus, usize>,
    query_types: BTreeMap<String, usize>,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    devices: BTreeMap<String, DeviceAcc>,
    /// base domain -> client ip -> count
    domain_clients: BTreeMap<String, BTreeMap<String, usize>>,
    hours: BTreeMap<DateTime<Utc>, HourAcc>,
    suspicious: Vec<SuspiciousDomain>,
}

impl Aggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Make `source` appear in the source distribution even with no records.
    pub fn register_source(&mut self, source: LogSource) {
        self.sources.entry(source).or_insert(0);
    }

    pub fn push(&mut self, annotated: AnnotatedRecord) {
        let AnnotatedRecord {
            record,
            matched_pattern,
        } = annotated;
        let ts = record.timestamp;
        let qtype = record.query_type.name().to_string();

        self.total += 1;
        *self.query_domains.entry(record.query_domain.clone()).or_insert(0) += 1;
        *self.base_domains.entry(record.base_domain.clone()).or_insert(0) += 1;
        *self.sources.entry(record.source).or_insert(0) += 1;
        *self.statuses.entry(record.status).or_insert(0) += 1;
        *self.query_types.entry(qtype.clone()).or_insert(0) += 1;
        self.first = Some(self.first.map_or(ts, |f| f.min(ts)));
        self.last = Some(self.last.map_or(ts, |l| l.max(ts)));

        let device = self
            .devices
            .entry(record.client_ip.clone())
            .or_insert_with(|| DeviceAcc::new(ts));
        device.query_count += 1;
        if record.status.is_blocked() {
            device.blocked_count += 1;
        }
        *device.domains.entry(record.base_domain.clone()).or_insert(0) += 1;
        device.first_seen = device.first_seen.min(ts);
        device.last_seen = device.last_seen.max(ts);
        device.sources.insert(record.source);

        *self
            .domain_clients
            .entry(record.base_domain.clone())
            .or_default()
            .entry(record.client_ip.clone())
            .or_insert(0) += 1;

        let hour = self.hours.entry(truncate_to_hour(ts)).or_default();
        hour.total += 1;
        *hour.query_types.entry(qtype.clone()).or_insert(0) += 1;
        *hour.statuses.entry(record.status).or_insert(0) += 1;

        if let Some(matched_pattern) = matched_pattern {
            self.suspicious.push(SuspiciousDomain {
                timestamp: ts,
                client_ip: record.client_ip,
                domain: record.query_domain,
                base_domain: record.base_domain,
                query_type: qtype,
                status: record.status,
                source: record.source,
                matched_pattern,
            });
        }
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: Aggregator) {
        self.total += other.total;
        merge_counts(&mut self.query_domains, other.query_domains);
        merge_counts(&mut self.base_domains, other.base_domains);
        merge_counts(&mut self.sources, other.sources);
        merge_counts(&mut self.statuses, other.statuses);
        merge_counts(&mut self.query_types, other.query_types);
        self.first = min_opt(self.first, other.first);
        self.last = max_opt(self.last, other.last);

        for (ip, acc) in other.devices {
            match self.devices.get_mut(&ip) {
                Some(existing) => existing.merge(acc),
                None => {
                    self.devices.insert(ip, acc);
                }
            }
        }
        for (domain, clients) in other.domain_clients {
            merge_counts(self.domain_clients.entry(domain).or_default(), clients);
        }
        for (hour, acc) in other.hours {
            let mine = self.hours.entry(hour).or_default();
            mine.total += acc.total;
            merge_counts(&mut mine.query_types, acc.query_types);
            merge_counts(&mut mine.statuses, acc.statuses);
        }
        self.suspicious.extend(other.suspicious);
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn finish(self) -> AggregationResult {
        let top_n = self.options.top_n;

        let client_totals: BTreeMap<String, usize> = self
            .devices
            .iter()
            .map(|(ip, d)| (ip.clone(), d.query_count))
            .collect();

        let mut suspicious = self.suspicious;
        suspicious.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let stats = StatsOverview {
            total_queries: self.total,
            unique_domains: self.query_domains.len(),
            unique_base_domains: self.base_domains.len(),
            unique_clients: self.devices.len(),
            source_distribution: self.sources,
            status_distribution: self.statuses.clone(),
            query_type_distribution: self.query_types.clone(),
            time_range: time_range(self.first, self.last),
            top_domains: ranked(&self.query_domains, Some(top_n)),
            top_base_domains: ranked(&self.base_domains, Some(top_n)),
            top_clients: ranked(&client_totals, Some(top_n)),
            suspicious_count: suspicious.len(),
        };

        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .map(|(ip, d)| Device {
                ip: ip.clone(),
                query_count: d.query_count,
                unique_domains: d.domains.len(),
                blocked_count: d.blocked_count,
                blocked_percentage: percentage(d.blocked_count, d.query_count),
                first_seen: d.first_seen,
                last_seen: d.last_seen,
                sources: d.sources.iter().copied().collect(),
            })
            .collect();
        devices.sort_by(|a, b| by_count_then_key(a.query_count, &a.ip, b.query_count, &b.ip));

        let mut ip_to_domains: Vec<IpDomains> = self
            .devices
            .into_iter()
            .map(|(ip, d)| IpDomains {
                ip,
                total_queries: d.query_count,
                unique_domains: d.domains.len(),
                domains: ranked(&d.domains, None),
            })
            .collect();
        ip_to_domains
            .sort_by(|a, b| by_count_then_key(a.total_queries, &a.ip, b.total_queries, &b.ip));

        let mut domain_to_ips: Vec<DomainIps> = self
            .domain_clients
            .into_iter()
            .map(|(domain, clients)| DomainIps {
                domain,
                total_queries: clients.values().sum(),
                unique_ips: clients.len(),
                ips: ranked(&clients, None),
            })
            .collect();
        domain_to_ips.sort_by(|a, b| {
            by_count_then_key(a.total_queries, &a.domain, b.total_queries, &b.domain)
        });

        let time_series = TimeSeries {
            hourly: self
                .hours
                .into_iter()
                .map(|(hour, acc)| HourBucket {
                    hour,
                    total: acc.total,
                    query_types: acc.query_types,
                    statuses: acc.statuses,
                })
                .collect(),
            query_types: self.query_types,
            statuses: self.statuses,
        };

        AggregationResult {
            stats,
            devices,
            relationships: Relationships {
                ip_to_domains,
                domain_to_ips,
            },
            time_series,
            suspicious_domains: suspicious,
        }
    }
}

impl Extend<AnnotatedRecord> for Aggregator {
    fn extend<T: IntoIterator<Item = AnnotatedRecord>>(&mut self, iter: T) {
        for record in iter {
            self.push(record);
        }
    }
}

/// Aggregate a finite record set in one call.
pub fn aggregate<I>(records: I, options: AggregateOptions) -> AggregationResult
where
    I: IntoIterator<Item = AnnotatedRecord>,
{
    let mut acc = Aggregator::new(options);
    acc.extend(records);
    acc.finish()
}

/// `part / whole * 100` rounded to two decimals; 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Count descending, then key ascending.
fn by_count_then_key(a_count: usize, a_key: &str, b_count: usize, b_key: &str) -> Ordering {
    b_count.cmp(&a_count).then_with(|| a_key.cmp(b_key))
}

fn ranked(counts: &BTreeMap<String, usize>, limit: Option<usize>) -> Vec<RankedCount> {
    let mut items: Vec<RankedCount> = counts
        .iter()
        .map(|(key, count)| RankedCount {
            key: key.clone(),
            count: *count,
        })
        .collect();
    items.sort_by(|a, b| by_count_then_key(a.count, &a.key, b.count, &b.key));
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

fn merge_counts<K: Ord>(into: &mut BTreeMap<K, usize>, from: BTreeMap<K, usize>) {
    for (key, count) in from {
        *into.entry(key).or_insert(0) += count;
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn time_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> TimeRange {
    let duration_hours = match (start, end) {
        (Some(s), Some(e)) => round2((e - s).num_seconds() as f64 / 3600.0),
        _ => 0.0,
    };
    TimeRange {
        start,
        end,
        duration_hours,
    }
}

/// Bucket key: the timestamp with minutes and below zeroed.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LogRecord, QueryType};

    fn rec(
        minute_offset: i64,
        domain: &str,
        ip: &str,
        status: QueryStatus,
        pattern: Option<&str>,
    ) -> AnnotatedRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let record = LogRecord::build(
            base + chrono::Duration::minutes(minute_offset),
            domain,
            ip,
            QueryType::A,
            status,
            LogSource::Nextdns,
        )
        .unwrap();
        AnnotatedRecord {
            record,
            matched_pattern: pattern.map(str::to_string),
        }
    }

    fn sample() -> Vec<AnnotatedRecord> {
        vec![
            rec(0, "www.example.com", "10.0.0.1", QueryStatus::Allowed, None),
            rec(5, "ads.example.com", "10.0.0.1", QueryStatus::Blocked, Some("^ads")),
            rec(10, "cdn.other.net", "10.0.0.2", QueryStatus::Allowed, None),
            rec(70, "ads.example.com", "10.0.0.2", QueryStatus::Blocked, Some("^ads")),
            rec(75, "api.other.net", "10.0.0.1", QueryStatus::Unknown, None),
        ]
    }

    #[test]
    fn test_overview_counts() {
        let result = aggregate(sample(), AggregateOptions::default());
        let stats = &result.stats;
        assert_eq!(stats.total_queries, 5);
        assert_eq!(stats.unique_domains, 4);
        assert_eq!(stats.unique_base_domains, 2);
        assert_eq!(stats.unique_clients, 2);
        assert_eq!(stats.status_distribution[&QueryStatus::Blocked], 2);
        assert_eq!(stats.source_distribution[&LogSource::Nextdns], 5);
        assert_eq!(stats.query_type_distribution["A"], 5);
        assert_eq!(stats.time_range.duration_hours, 1.25);
        assert_eq!(stats.suspicious_count, 2);
        assert_eq!(stats.top_domains[0].key, "ads.example.com");
        assert_eq!(stats.top_domains[0].count, 2);
    }

    #[test]
    fn test_devices_and_blocked_percentage() {
        let result = aggregate(sample(), AggregateOptions::default());
        assert_eq!(result.devices.len(), 2);

        let first = &result.devices[0];
        assert_eq!(first.ip, "10.0.0.1");
        assert_eq!(first.query_count, 3);
        assert_eq!(first.unique_domains, 2);
        assert_eq!(first.blocked_count, 1);
        assert_eq!(first.blocked_percentage, 33.33);

        let second = &result.devices[1];
        assert_eq!(second.blocked_percentage, 50.0);

        let total: usize = result.devices.iter().map(|d| d.query_count).sum();
        assert_eq!(total, result.stats.total_queries);
    }

    #[test]
    fn test_percentage_never_divides_by_zero() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 3), 100.0);
        assert_eq!(percentage(1, 8), 12.5);
    }

    #[test]
    fn test_relationship_views_are_symmetric() {
        let result = aggregate(sample(), AggregateOptions::default());
        let rel = &result.relationships;

        let ip1 = &rel.ip_to_domains[0];
        assert_eq!(ip1.ip, "10.0.0.1");
        assert_eq!(ip1.total_queries, 3);
        assert_eq!(ip1.domains[0].key, "example.com");
        assert_eq!(ip1.domains[0].count, 2);

        // example.com and other.net both have 3 queries: tie broken by name
        assert_eq!(rel.domain_to_ips[0].domain, "example.com");
        assert_eq!(rel.domain_to_ips[1].domain, "other.net");
        assert_eq!(rel.domain_to_ips[0].unique_ips, 2);

        let forward: usize = rel.ip_to_domains.iter().map(|e| e.total_queries).sum();
        let backward: usize = rel.domain_to_ips.iter().map(|e| e.total_queries).sum();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_hourly_buckets() {
        let result = aggregate(sample(), AggregateOptions::default());
        let hourly = &result.time_series.hourly;
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].hour.to_rfc3339(), "2024-01-15T10:00:00+00:00");
        assert_eq!(hourly[0].total, 3);
        assert_eq!(hourly[1].total, 2);
        assert_eq!(hourly[1].statuses[&QueryStatus::Unknown], 1);
    }

    #[test]
    fn test_suspicious_in_chronological_order() {
        let mut records = sample();
        records.reverse();
        let result = aggregate(records, AggregateOptions::default());
        let suspicious = &result.suspicious_domains;
        assert_eq!(suspicious.len(), 2);
        assert!(suspicious[0].timestamp < suspicious[1].timestamp);
        assert_eq!(suspicious[0].matched_pattern, "^ads");
        assert_eq!(suspicious[0].client_ip, "10.0.0.1");
    }

    #[test]
    fn test_order_independence() {
        let forward = aggregate(sample(), AggregateOptions::default());
        let mut shuffled = sample();
        shuffled.rotate_left(2);
        let rotated = aggregate(shuffled, AggregateOptions::default());
        assert_eq!(forward, rotated);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let records = sample();
        let single = aggregate(records.clone(), AggregateOptions::default());

        let mut left = Aggregator::new(AggregateOptions::default());
        let mut right = Aggregator::new(AggregateOptions::default());
        left.extend(records[..2].iter().cloned());
        right.extend(records[2..].iter().cloned());
        right.merge(left);
        assert_eq!(right.finish(), single);
    }

    #[test]
    fn test_registered_source_without_records() {
        let mut acc = Aggregator::new(AggregateOptions::default());
        acc.register_source(LogSource::Routeros);
        acc.extend(sample());
        let result = acc.finish();
        assert_eq!(result.stats.source_distribution[&LogSource::Routeros], 0);
    }

    #[test]
    fn test_empty_input() {
        let result = aggregate(Vec::new(), AggregateOptions::default());
        assert_eq!(result.stats.total_queries, 0);
        assert!(result.devices.is_empty());
        assert_eq!(result.stats.time_range.start, None);
        assert_eq!(result.stats.time_range.duration_hours, 0.0);
    }

    #[test]
    fn test_top_n_limit() {
        let result = aggregate(sample(), AggregateOptions { top_n: 1 });
        assert_eq!(result.stats.top_domains.len(), 1);
        assert_eq!(result.stats.top_clients.len(), 1);
        assert_eq!(result.stats.top_clients[0].key, "10.0.0.1");
    }
}
