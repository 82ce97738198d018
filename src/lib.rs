//! dnslog-analyzer library
//!
//! Ingests DNS query logs from a MikroTik RouterOS router and from NextDNS
//! CSV exports, normalizes them into one record shape, flags queries that
//! match a regex blocklist, and aggregates everything into a single
//! structured artifact:
//!
//! - overview statistics and distributions
//! - a per-device table
//! - client / base domain relationship views
//! - hourly time series
//! - the list of suspicious (blocklist-matched) queries
//!
//! # Example
//!
//! ```rust,no_run
//! use dnslog_analyzer::{AnalysisOptions, AnalysisOutput, CompiledBlocklist, DnsLogAnalyzer};
//! use dnslog_analyzer::facade::SourceContent;
//! use dnslog_analyzer::record::LogSource;
//!
//! let csv = std::fs::read_to_string("nextdns.csv")?;
//! let (blocklist, _rejected) = CompiledBlocklist::load([r"^ads\."]);
//! let analysis = DnsLogAnalyzer::analyze_contents(
//!     &[SourceContent { source: LogSource::Nextdns, content: &csv }],
//!     &blocklist,
//!     &AnalysisOptions::default(),
//! )?;
//! println!("{}", AnalysisOutput::from(&analysis.result).to_json()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aggregate;
pub mod app;
pub mod blocklist;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod facade;
pub mod record;
pub mod sources;
pub mod structured_output;
pub mod styled_output;

// Re-export commonly used types and functions for convenience
pub use aggregate::{AggregateOptions, AggregationResult, Aggregator, aggregate};
pub use blocklist::{CompiledBlocklist, MatchTarget};
pub use domain::normalize;
pub use errors::{AnalyzerError, Result};
pub use facade::{Analysis, AnalysisOptions, AnalysisRequest, DnsLogAnalyzer};
pub use record::{AnnotatedRecord, LogRecord, LogSource, QueryStatus, QueryType};
pub use structured_output::AnalysisOutput;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
