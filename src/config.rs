//! Configuration management for dnslog-analyzer.
//!
//! Values are layered: built-in defaults, then `DNSLOG_*` environment
//! variables, then command-line flags. [`Config::validate`] runs last and
//! rejects combinations the pipeline cannot honour.

use chrono::{FixedOffset, Local, NaiveDate};
use thiserror::Error;

use crate::aggregate::DEFAULT_TOP_N;
use crate::blocklist::MatchTarget;
use crate::facade::AnalysisOptions;
use crate::sources::RouterOsOptions;
use crate::structured_output::OutputFormat;

/// Largest accepted UTC offset, in minutes (UTC+14:00 / UTC-12:00 rounded up).
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Main configuration structure.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Input file handling
    pub input: InputConfig,

    /// RouterOS timestamp interpretation
    pub routeros: RouterOsConfig,

    /// Blocklist matching
    pub matching: MatchConfig,

    /// Artifact rendering
    pub output: OutputConfig,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Maximum source file size to process (in bytes)
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RouterOsConfig {
    /// Router clock offset from UTC, in minutes
    pub utc_offset_minutes: i32,

    /// Date assumed for time-only entries; `None` means today
    pub reference_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchConfig {
    /// Field tested against the blocklist
    pub target: MatchTarget,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Pretty-print JSON
    pub pretty: bool,

    /// Length of the top domain / client lists
    pub top_n: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            pretty: true,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values are reported rather than ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("DNSLOG_MAX_FILE_SIZE") {
            config.input.max_file_size = parse_env("DNSLOG_MAX_FILE_SIZE", &raw)?;
        }

        if let Some(raw) = lookup("DNSLOG_ROUTEROS_UTC_OFFSET_MINUTES") {
            config.routeros.utc_offset_minutes =
                parse_env("DNSLOG_ROUTEROS_UTC_OFFSET_MINUTES", &raw)?;
        }

        if let Some(raw) = lookup("DNSLOG_ROUTEROS_DATE") {
            config.routeros.reference_date = Some(parse_date("DNSLOG_ROUTEROS_DATE", &raw)?);
        }

        if let Some(raw) = lookup("DNSLOG_MATCH_TARGET") {
            config.matching.target = raw.parse().map_err(|_| ConfigError::InvalidValue {
                field: "DNSLOG_MATCH_TARGET".to_string(),
                value: raw.clone(),
                reason: "expected `query` or `base`".to_string(),
            })?;
        }

        if let Some(raw) = lookup("DNSLOG_TOP_N") {
            config.output.top_n = parse_env("DNSLOG_TOP_N", &raw)?;
        }

        if let Some(raw) = lookup("DNSLOG_OUTPUT_FORMAT") {
            config.output.format =
                OutputFormat::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    field: "DNSLOG_OUTPUT_FORMAT".to_string(),
                    value: raw.clone(),
                    reason: "expected `json` or `yaml`".to_string(),
                })?;
        }

        Ok(config)
    }

    /// Merge with CLI arguments, giving CLI precedence
    pub fn merge_with_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(offset) = cli.routeros_utc_offset {
            self.routeros.utc_offset_minutes = offset;
        }
        if let Some(date) = cli.routeros_date {
            self.routeros.reference_date = Some(date);
        }
        if let Some(target) = cli.match_target {
            self.matching.target = target.into();
        }
        if let Some(top) = cli.top {
            self.output.top_n = top;
        }
        if let Some(format) = cli.format {
            self.output.format = format.into();
        }
        if cli.compact {
            self.output.pretty = false;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.max_file_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "input.max_file_size".to_string(),
                value: "0".to_string(),
                reason: "Max file size must be greater than 0".to_string(),
            });
        }

        if self.routeros.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(ConfigError::InvalidValue {
                field: "routeros.utc_offset_minutes".to_string(),
                value: self.routeros.utc_offset_minutes.to_string(),
                reason: format!("Offset must be within ±{MAX_OFFSET_MINUTES} minutes"),
            });
        }

        if self.output.top_n == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.top_n".to_string(),
                value: "0".to_string(),
                reason: "Top-N lists need at least one entry".to_string(),
            });
        }

        Ok(())
    }

    /// Router clock offset as a chrono offset.
    pub fn routeros_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.routeros.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: "routeros.utc_offset_minutes".to_string(),
                value: self.routeros.utc_offset_minutes.to_string(),
                reason: "Offset out of range".to_string(),
            }
        })
    }

    /// Pipeline options derived from this configuration.
    pub fn analysis_options(&self) -> Result<AnalysisOptions, ConfigError> {
        Ok(AnalysisOptions {
            routeros: RouterOsOptions {
                utc_offset: self.routeros_offset()?,
                reference_date: self
                    .routeros
                    .reference_date
                    .unwrap_or_else(|| Local::now().date_naive()),
            },
            match_target: self.matching.target,
            top_n: self.output.top_n,
            max_file_size: self.input.max_file_size,
        })
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: format!("expected YYYY-MM-DD ({e})"),
    })
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}
