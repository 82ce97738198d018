use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::aggregate::{AggregateOptions, AggregationResult, Aggregator};
use crate::blocklist::{CompiledBlocklist, MatchTarget, RejectedPattern};
use crate::errors::{AnalyzerError, IoResultExt, Result};
use crate::record::LogSource;
use crate::sources::{LogParser, NextDnsParser, ParseOutcome, RouterOsOptions, RouterOsParser};

/// High-level façade providing library-consumable entry points.
///
/// Both entry points run the same pipeline: parse each source, annotate every
/// record against the blocklist, aggregate per source, then merge the partial
/// accumulators in a fixed source order. A source that fails as a whole
/// (unreadable file, unusable header) is reported and left out; the run only
/// fails when no source succeeds.
///
/// Nothing here prints. Presentation lives in `app` and `styled_output`.
pub struct DnsLogAnalyzer;

impl DnsLogAnalyzer {
    /// Analyze in-memory source contents.
    pub fn analyze_contents(
        inputs: &[SourceContent<'_>],
        blocklist: &CompiledBlocklist,
        opts: &AnalysisOptions,
    ) -> Result<Analysis> {
        let start = Instant::now();
        let mut ordered: Vec<&SourceContent<'_>> = inputs.iter().collect();
        ordered.sort_by_key(|input| input.source);

        let runs = ordered
            .into_iter()
            .map(|input| {
                let outcome = run_source(input.source, input.content, blocklist, opts);
                (input.source, None, outcome)
            })
            .collect();

        finish_runs(runs, blocklist.len(), Vec::new(), opts, start)
    }

    /// Read and analyze files on disk.
    ///
    /// Each source is read and parsed on its own blocking task; the partial
    /// results are merged after all tasks complete.
    pub async fn analyze_files(request: AnalysisRequest, opts: AnalysisOptions) -> Result<Analysis> {
        let start = Instant::now();

        let (blocklist, rejected) = match &request.blocklist {
            Some(path) => CompiledBlocklist::from_path(path)?,
            None => (CompiledBlocklist::empty(), Vec::new()),
        };
        let blocklist = Arc::new(blocklist);
        let opts = Arc::new(opts);

        let mut handles = Vec::new();
        for (source, path) in request.sources() {
            let blocklist = Arc::clone(&blocklist);
            let task_opts = Arc::clone(&opts);
            let task_path = path.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let content = read_source(&task_path, task_opts.max_file_size)?;
                run_source(source, &content, &blocklist, &task_opts)
            });
            handles.push((source, path, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (source, path, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AnalyzerError::from(e)),
            };
            runs.push((source, Some(path), outcome));
        }

        finish_runs(runs, blocklist.len(), rejected, &opts, start)
    }
}

/* ----------------------------- Public Data Model --------------------------- */

/// Runtime knobs independent of the CLI.
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    pub routeros: RouterOsOptions,
    pub match_target: MatchTarget,
    pub top_n: usize,
    /// Largest source file accepted, in bytes
    pub max_file_size: u64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            routeros: RouterOsOptions::default(),
            match_target: MatchTarget::default(),
            top_n: AggregateOptions::default().top_n,
            max_file_size: 512 * 1024 * 1024,
        }
    }
}

impl AnalysisOptions {
    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions { top_n: self.top_n }
    }
}

/// Raw content of one source.
#[derive(Debug, Clone, Copy)]
pub struct SourceContent<'a> {
    pub source: LogSource,
    pub content: &'a str,
}

/// Files to analyze.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub routeros: Option<PathBuf>,
    pub nextdns: Option<PathBuf>,
    pub blocklist: Option<PathBuf>,
}

impl AnalysisRequest {
    /// Requested sources in merge order.
    fn sources(&self) -> Vec<(LogSource, PathBuf)> {
        [
            (LogSource::Routeros, &self.routeros),
            (LogSource::Nextdns, &self.nextdns),
        ]
        .into_iter()
        .filter_map(|(source, path)| path.clone().map(|p| (source, p)))
        .collect()
    }
}

/// Terminal result of a run: the aggregation plus what happened to each input.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AggregationResult,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    pub patterns_loaded: usize,
    pub patterns_discarded: Vec<RejectedPattern>,
    pub total_records: usize,
    pub suspicious_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Ok,
    Failed { reason: String },
}

impl SourceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SourceStatus::Ok)
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: LogSource,
    pub path: Option<PathBuf>,
    pub status: SourceStatus,
    pub records: usize,
    pub skipped: usize,
    pub dropped: usize,
}

/* ------------------------------- Pipeline ---------------------------------- */

/// What one source produced: its partial accumulator and parse counts.
struct SourceRun {
    aggregator: Aggregator,
    records: usize,
    skipped: usize,
    dropped: usize,
}

fn read_source(path: &Path, max_file_size: u64) -> Result<String> {
    let display = path.display().to_string();
    let size = fs::metadata(path).with_path(&display, "stat")?.len();
    if size > max_file_size {
        return Err(AnalyzerError::InputTooLarge {
            path: display,
            size,
            limit: max_file_size,
        });
    }
    let bytes = fs::read(path).with_path(&display, "read")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_source(source: LogSource, content: &str, opts: &AnalysisOptions) -> Result<ParseOutcome> {
    match source {
        LogSource::Routeros => RouterOsParser::new(opts.routeros).parse(content),
        LogSource::Nextdns => NextDnsParser::new().parse(content),
    }
}

fn run_source(
    source: LogSource,
    content: &str,
    blocklist: &CompiledBlocklist,
    opts: &AnalysisOptions,
) -> Result<SourceRun> {
    let ParseOutcome {
        records,
        skipped,
        dropped,
        ..
    } = parse_source(source, content, opts)?;

    let mut aggregator = Aggregator::new(opts.aggregate_options());
    aggregator.register_source(source);
    let count = records.len();
    aggregator.extend(
        records
            .into_iter()
            .map(|record| blocklist.annotate(record, opts.match_target)),
    );

    Ok(SourceRun {
        aggregator,
        records: count,
        skipped,
        dropped,
    })
}

fn finish_runs(
    runs: Vec<(LogSource, Option<PathBuf>, Result<SourceRun>)>,
    patterns_loaded: usize,
    patterns_discarded: Vec<RejectedPattern>,
    opts: &AnalysisOptions,
    start: Instant,
) -> Result<Analysis> {
    if runs.is_empty() {
        return Err(AnalyzerError::no_usable_source("no log source was given"));
    }

    let mut merged = Aggregator::new(opts.aggregate_options());
    let mut reports = Vec::with_capacity(runs.len());
    let mut failures = Vec::new();

    for (source, path, outcome) in runs {
        match outcome {
            Ok(run) => {
                info!(
                    %source,
                    records = run.records,
                    skipped = run.skipped,
                    dropped = run.dropped,
                    "source analyzed"
                );
                merged.merge(run.aggregator);
                reports.push(SourceReport {
                    source,
                    path,
                    status: SourceStatus::Ok,
                    records: run.records,
                    skipped: run.skipped,
                    dropped: run.dropped,
                });
            }
            Err(e) => {
                warn!(%source, "source failed: {e}");
                failures.push(format!("{}: {e}", source.display_name()));
                reports.push(SourceReport {
                    source,
                    path,
                    status: SourceStatus::Failed {
                        reason: e.to_string(),
                    },
                    records: 0,
                    skipped: 0,
                    dropped: 0,
                });
            }
        }
    }

    if reports.iter().all(|r| !r.status.is_ok()) {
        return Err(AnalyzerError::no_usable_source(failures.join("; ")));
    }

    let total_records = merged.total();
    let result = merged.finish();
    debug!(
        total_records,
        suspicious = result.stats.suspicious_count,
        "aggregation finished"
    );

    let summary = RunSummary {
        sources: reports,
        patterns_loaded,
        patterns_discarded,
        total_records,
        suspicious_count: result.stats.suspicious_count,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    Ok(Analysis { result, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ROUTEROS: &str = "\
2024-01-15 10:23:45 dns,packet query from 192.168.88.10:53211: #1 ads.example.com. A
2024-01-15 10:24:01 dns,packet query from 192.168.88.11:40000: #2 www.example.org. AAAA
garbage line
";

    const NEXTDNS: &str = "\
timestamp,domain,query_type,client_ip,status
2024-01-15T11:00:00Z,tracker.example.net,A,192.168.88.10,blocked
2024-01-15T11:05:00Z,www.example.org,A,192.168.88.12,default
";

    fn blocklist() -> CompiledBlocklist {
        CompiledBlocklist::load([r"^ads\.", "tracker"]).0
    }

    #[test]
    fn test_contents_from_both_sources() {
        let inputs = [
            SourceContent {
                source: LogSource::Nextdns,
                content: NEXTDNS,
            },
            SourceContent {
                source: LogSource::Routeros,
                content: ROUTEROS,
            },
        ];
        let analysis =
            DnsLogAnalyzer::analyze_contents(&inputs, &blocklist(), &AnalysisOptions::default())
                .unwrap();

        assert_eq!(analysis.result.stats.total_queries, 4);
        assert_eq!(analysis.result.stats.suspicious_count, 2);
        assert_eq!(analysis.summary.sources[0].source, LogSource::Routeros);
        assert_eq!(analysis.summary.sources[0].skipped, 1);
        assert_eq!(analysis.summary.sources[1].records, 2);
        assert_eq!(analysis.summary.patterns_loaded, 2);
    }

    #[test]
    fn test_failed_source_is_left_out() {
        let inputs = [
            SourceContent {
                source: LogSource::Routeros,
                content: ROUTEROS,
            },
            SourceContent {
                source: LogSource::Nextdns,
                content: "timestamp,status\n2024-01-15T11:00:00Z,blocked\n",
            },
        ];
        let analysis = DnsLogAnalyzer::analyze_contents(
            &inputs,
            &CompiledBlocklist::empty(),
            &AnalysisOptions::default(),
        )
        .unwrap();

        let dist = &analysis.result.stats.source_distribution;
        assert_eq!(dist.get(&LogSource::Routeros), Some(&2));
        assert_eq!(dist.get(&LogSource::Nextdns), None);
        assert!(!analysis.summary.sources[1].status.is_ok());
    }

    #[test]
    fn test_no_usable_source() {
        let inputs = [SourceContent {
            source: LogSource::Nextdns,
            content: "nothing,useful\n",
        }];
        let err = DnsLogAnalyzer::analyze_contents(
            &inputs,
            &CompiledBlocklist::empty(),
            &AnalysisOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::NoUsableSource { .. }));

        let err = DnsLogAnalyzer::analyze_contents(
            &[],
            &CompiledBlocklist::empty(),
            &AnalysisOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::NoUsableSource { .. }));
    }

    #[test]
    fn test_match_target_changes_recall() {
        let inputs = [SourceContent {
            source: LogSource::Nextdns,
            content: NEXTDNS,
        }];
        let (list, _) = CompiledBlocklist::load([r"^example\.net$"]);

        let by_query =
            DnsLogAnalyzer::analyze_contents(&inputs, &list, &AnalysisOptions::default()).unwrap();
        assert_eq!(by_query.result.stats.suspicious_count, 0);

        let opts = AnalysisOptions {
            match_target: MatchTarget::BaseDomain,
            ..Default::default()
        };
        let by_base = DnsLogAnalyzer::analyze_contents(&inputs, &list, &opts).unwrap();
        assert_eq!(by_base.result.stats.suspicious_count, 1);
    }

    #[tokio::test]
    async fn test_analyze_files_with_missing_source() {
        let mut nextdns = NamedTempFile::new().unwrap();
        nextdns.write_all(NEXTDNS.as_bytes()).unwrap();
        let mut list = NamedTempFile::new().unwrap();
        writeln!(list, "# comment\ntracker\n(bad").unwrap();

        let request = AnalysisRequest {
            routeros: Some(PathBuf::from("/nonexistent/router.log")),
            nextdns: Some(nextdns.path().to_path_buf()),
            blocklist: Some(list.path().to_path_buf()),
        };
        let analysis = DnsLogAnalyzer::analyze_files(request, AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(analysis.result.stats.total_queries, 2);
        assert_eq!(analysis.summary.patterns_loaded, 1);
        assert_eq!(analysis.summary.patterns_discarded.len(), 1);
        assert!(matches!(
            analysis.summary.sources[0].status,
            SourceStatus::Failed { .. }
        ));
        assert_eq!(analysis.summary.suspicious_count, 1);
    }

    #[tokio::test]
    async fn test_file_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(ROUTEROS.as_bytes()).unwrap();
        let request = AnalysisRequest {
            routeros: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let opts = AnalysisOptions {
            max_file_size: 16,
            ..Default::default()
        };
        let err = DnsLogAnalyzer::analyze_files(request, opts)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::NoUsableSource { .. }));
        assert!(err.to_string().contains("above the configured limit"));
    }
}
