use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::blocklist::MatchTarget;
use crate::structured_output::OutputFormat;

/// Command-line interface definition.
///
/// Verbosity levels (diagnostics on stderr; `RUST_LOG` overrides):
/// 0 - silent
/// 1 - errors
/// 2 - warnings + errors (default)
/// 3 - progress info
/// 5 - debug, including every skipped line
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Aggregate RouterOS and NextDNS query logs into a single analysis artifact"
)]
pub struct Cli {
    /// RouterOS log file (free-text DNS lines)
    #[arg(
        long,
        value_name = "FILE",
        required_unless_present_any = ["nextdns", "generate_schema"]
    )]
    pub routeros: Option<PathBuf>,

    /// NextDNS query log CSV export
    #[arg(
        long,
        value_name = "FILE",
        required_unless_present_any = ["routeros", "generate_schema"]
    )]
    pub nextdns: Option<PathBuf>,

    /// Blocklist file, one regular expression per line
    #[arg(long, value_name = "FILE")]
    pub blocklist: Option<PathBuf>,

    /// Write the artifact here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Artifact format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Single-line JSON
    #[arg(long)]
    pub compact: bool,

    /// Field tested against the blocklist
    #[arg(long = "match-target", value_enum)]
    pub match_target: Option<MatchTargetArg>,

    /// Length of the top domain / client lists
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Router clock offset from UTC in minutes (e.g. 60, -300)
    #[arg(long = "routeros-utc-offset", value_name = "MINUTES", allow_negative_numbers = true)]
    pub routeros_utc_offset: Option<i32>,

    /// Date assumed for RouterOS entries without one (default: today; set it for reproducible output)
    #[arg(long = "routeros-date", value_name = "YYYY-MM-DD")]
    pub routeros_date: Option<NaiveDate>,

    /// Verbosity level (0-5)
    #[arg(long, default_value_t = 2)]
    pub verbose: u8,

    /// Print the JSON schema of the artifact and exit
    #[arg(long)]
    pub generate_schema: bool,

    /// Do not print the end-of-run summary
    #[arg(long)]
    pub no_summary: bool,

    /// Disable colors in the summary
    #[arg(long)]
    pub no_color: bool,
}

/// Artifact format as spelled on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Yaml => OutputFormat::Yaml,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTargetArg {
    /// Full query name
    Query,
    /// Reduced base domain
    Base,
}

impl From<MatchTargetArg> for MatchTarget {
    fn from(arg: MatchTargetArg) -> Self {
        match arg {
            MatchTargetArg::Query => MatchTarget::QueryDomain,
            MatchTargetArg::Base => MatchTarget::BaseDomain,
        }
    }
}

impl Cli {
    /// Parse CLI arguments from process args.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Are error-level messages enabled?
    pub fn error_enabled(&self) -> bool {
        self.verbose >= 1
    }

    /// Default `tracing` filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "off",
            1 => "error",
            2 => "warn",
            3 | 4 => "info",
            _ => "debug",
        }
    }

    /// Should the summary be printed at all?
    pub fn summary_enabled(&self) -> bool {
        !self.no_summary && self.verbose > 0
    }
}
