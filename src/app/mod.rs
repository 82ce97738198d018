//! Application orchestration layer.
//!
//! This module provides the CLI-facing `App`. It resolves configuration,
//! runs the analysis through [`DnsLogAnalyzer`], writes the artifact and
//! prints the end-of-run summary.
//!
//! Major steps in `App::run`:
//!   1. Schema generation early-exit
//!   2. Config load (defaults, environment, flags) and validation
//!   3. Blocklist load and per-source parse / aggregate
//!   4. Artifact rendering (JSON/YAML) and atomic write
//!   5. Summary on stderr
//!
//! The artifact is rendered completely in memory before anything touches
//! the destination, and file output goes through a temporary file in the
//! destination directory that is renamed into place. A failed or
//! interrupted run leaves no partial artifact behind.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::Config;
use crate::errors::{AnalyzerError, IoResultExt, Result};
use crate::facade::{AnalysisRequest, DnsLogAnalyzer, RunSummary};
use crate::structured_output::AnalysisOutput;
use crate::styled_output::{Destination, StyledFormatter};

/// Exit code for a run that produced no artifact.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for invalid configuration.
pub const EXIT_CONFIG: i32 = 2;

/// Application façade.
pub struct App;

impl App {
    /// Execute the end-to-end analysis workflow.
    ///
    /// Returns: intended process exit code (0 = success, 1 = no artifact,
    /// 2 = configuration error).
    pub async fn run(cli: &Cli) -> Result<i32> {
        if Self::maybe_print_schema(cli)? {
            return Ok(0);
        }

        let Some(config) = Self::validate_config(cli) else {
            return Ok(EXIT_CONFIG);
        };
        let opts = config
            .analysis_options()
            .map_err(|e| AnalyzerError::configuration(e.to_string()))?;

        let request = AnalysisRequest {
            routeros: cli.routeros.clone(),
            nextdns: cli.nextdns.clone(),
            blocklist: cli.blocklist.clone(),
        };

        info!(
            match_target = %opts.match_target,
            top_n = opts.top_n,
            "starting analysis"
        );

        let analysis = match DnsLogAnalyzer::analyze_files(request, opts).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(category = %e.category(), "analysis failed: {e}");
                if cli.error_enabled() {
                    eprintln!("Error: {e}");
                }
                return Ok(EXIT_FAILURE);
            }
        };

        let rendered = AnalysisOutput::from(&analysis.result)
            .render(config.output.format, config.output.pretty)
            .map_err(|e| AnalyzerError::serialization(e.to_string()))?;

        let destination = Self::write_artifact(cli.output.as_deref(), &rendered)?;
        info!(
            records = analysis.summary.total_records,
            format = config.output.format.as_str(),
            "artifact written"
        );

        Self::print_summary(cli, &analysis.summary, Some(destination));
        Ok(0)
    }
}

impl App {
    fn maybe_print_schema(cli: &Cli) -> Result<bool> {
        if cli.generate_schema {
            match AnalysisOutput::generate_json_schema() {
                Ok(schema) => {
                    println!("{schema}");
                }
                Err(e) => {
                    return Err(AnalyzerError::serialization(e.to_string()));
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn validate_config(cli: &Cli) -> Option<Config> {
        let mut config = match Config::from_env() {
            Ok(config) => config,
            Err(e) => {
                if cli.error_enabled() {
                    eprintln!("Configuration error: {e}");
                }
                return None;
            }
        };
        config.merge_with_cli(cli);
        if let Err(e) = config.validate() {
            if cli.error_enabled() {
                eprintln!("Configuration error: {e}");
            }
            return None;
        }
        Some(config)
    }

    /// Write `rendered` to `path` atomically, or to stdout.
    fn write_artifact<'a>(path: Option<&'a Path>, rendered: &str) -> Result<Destination<'a>> {
        let Some(path) = path else {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            if !rendered.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
            return Ok(Destination::Stdout);
        };

        let display = path.display().to_string();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir).with_path(dir.display().to_string(), "create")?;
        tmp.write_all(rendered.as_bytes())
            .with_path(&display, "write")?;
        tmp.as_file().sync_all().with_path(&display, "sync")?;
        tmp.persist(path)
            .map_err(|e| AnalyzerError::io(&display, "persist", e.error))?;

        Ok(Destination::File(path))
    }

    fn print_summary(cli: &Cli, summary: &RunSummary, destination: Option<Destination<'_>>) {
        if !cli.summary_enabled() {
            return;
        }
        let formatter = if cli.no_color {
            StyledFormatter::without_colors()
        } else {
            StyledFormatter::new()
        };
        if let Err(e) = formatter.print_summary(summary, destination) {
            error!("could not print summary: {e}");
        }
    }
}
