//! Styled end-of-run summary using anstyle.
//!
//! The summary goes to stderr so stdout stays reserved for the artifact.
//! Colors are used only when stderr is a terminal and `NO_COLOR` is unset.

use anstyle::{AnsiColor, Color, Style};
use std::fmt::Write;
use std::io::{self, Write as IoWrite};
use std::path::Path;

use crate::facade::{RunSummary, SourceReport, SourceStatus};

/// Style definitions for different UI elements
pub struct Styles {
    pub header: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub muted: Style,
    pub bold: Style,
    pub path: Style,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            header: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue))),
            success: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
            warning: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
            error: Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
            bold: Style::new().bold(),
            path: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan)))
                .underline(),
        }
    }
}

/// Where the artifact went.
#[derive(Debug, Clone, Copy)]
pub enum Destination<'a> {
    Stdout,
    File(&'a Path),
}

/// Styled formatter for the run summary
pub struct StyledFormatter {
    styles: Styles,
    use_colors: bool,
}

impl Default for StyledFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl StyledFormatter {
    pub fn new() -> Self {
        Self {
            styles: Styles::default(),
            use_colors: Self::should_use_colors(),
        }
    }

    /// Create a formatter without colors (for non-interactive use)
    pub fn without_colors() -> Self {
        Self {
            styles: Styles::default(),
            use_colors: false,
        }
    }

    fn should_use_colors() -> bool {
        atty::is(atty::Stream::Stderr) && std::env::var("NO_COLOR").is_err()
    }

    /// Apply style to text if colors are enabled
    fn styled(&self, text: &str, style: &Style) -> String {
        if self.use_colors {
            format!("{}{}{}", style.render(), text, style.render_reset())
        } else {
            text.to_string()
        }
    }

    /// Render the summary as text.
    pub fn format_summary(
        &self,
        summary: &RunSummary,
        destination: Option<Destination<'_>>,
    ) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        let s = &self.styles;

        writeln!(out, "{}", self.styled("DNS log analysis", &s.header))?;

        for report in &summary.sources {
            self.write_source(&mut out, report)?;
        }

        let discarded = summary.patterns_discarded.len();
        let discarded_text = format!("{discarded} discarded");
        writeln!(
            out,
            "  {:<10} {} patterns loaded, {}",
            "blocklist",
            summary.patterns_loaded,
            if discarded > 0 {
                self.styled(&discarded_text, &s.warning)
            } else {
                discarded_text
            }
        )?;
        for rejected in &summary.patterns_discarded {
            writeln!(
                out,
                "             {}",
                self.styled(
                    &format!(
                        "line {}: `{}` ({})",
                        rejected.line, rejected.pattern, rejected.reason
                    ),
                    &s.muted
                )
            )?;
        }

        writeln!(
            out,
            "  {:<10} {} records, {} suspicious",
            "total",
            self.styled(&summary.total_records.to_string(), &s.bold),
            if summary.suspicious_count > 0 {
                self.styled(&summary.suspicious_count.to_string(), &s.warning)
            } else {
                summary.suspicious_count.to_string()
            }
        )?;

        match destination {
            Some(Destination::File(path)) => writeln!(
                out,
                "  {:<10} {}",
                "artifact",
                self.styled(&path.display().to_string(), &s.path)
            )?,
            Some(Destination::Stdout) => writeln!(out, "  {:<10} stdout", "artifact")?,
            None => writeln!(
                out,
                "  {:<10} {}",
                "artifact",
                self.styled("not written", &s.error)
            )?,
        }

        writeln!(
            out,
            "  {}",
            self.styled(&format!("finished in {} ms", summary.duration_ms), &s.muted)
        )?;

        Ok(out)
    }

    fn write_source(&self, out: &mut String, report: &SourceReport) -> std::fmt::Result {
        let s = &self.styles;
        let name = report.source.display_name();
        match &report.status {
            SourceStatus::Ok => {
                let skipped = format!("{} skipped", report.skipped);
                writeln!(
                    out,
                    "  {:<10} {} {} records, {}, {} dropped",
                    name,
                    self.styled("ok", &s.success),
                    report.records,
                    if report.skipped > 0 {
                        self.styled(&skipped, &s.warning)
                    } else {
                        skipped
                    },
                    report.dropped
                )?;
                if let Some(path) = &report.path {
                    writeln!(
                        out,
                        "             {}",
                        self.styled(&path.display().to_string(), &s.muted)
                    )?;
                }
            }
            SourceStatus::Failed { reason } => {
                writeln!(out, "  {:<10} {} {}", name, self.styled("failed", &s.error), reason)?;
            }
        }
        Ok(())
    }

    /// Print the summary to stderr.
    pub fn print_summary(
        &self,
        summary: &RunSummary,
        destination: Option<Destination<'_>>,
    ) -> io::Result<()> {
        let text = self
            .format_summary(summary, destination)
            .map_err(io::Error::other)?;
        let mut stderr = io::stderr().lock();
        stderr.write_all(text.as_bytes())?;
        stderr.flush()
    }
}
