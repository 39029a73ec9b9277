//! Output formatting and management

use crate::fingerprint::{Confidence, FingerprintReport, OsFamily};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::net::Ipv4Addr;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<String>,
    pub colored: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
        }
    }
}

/// JSON envelope around a report
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    target: Ipv4Addr,
    port: u16,
    #[serde(flatten)]
    report: &'a FingerprintReport,
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write a report to the configured sink
    pub fn write_report(&self, target: Ipv4Addr, port: u16, report: &FingerprintReport) -> io::Result<()> {
        let output = self.render(target, port, report)?;

        match &self.config.file {
            Some(filename) => {
                let mut file = File::create(filename)?;
                file.write_all(output.as_bytes())?;
            }
            None => print!("{}", output),
        }

        Ok(())
    }

    pub fn render(&self, target: Ipv4Addr, port: u16, report: &FingerprintReport) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(target, port, report)),
            OutputFormat::Json => format_json(target, port, report),
        }
    }

    fn format_text(&self, target: Ipv4Addr, port: u16, report: &FingerprintReport) -> String {
        let rule = "=".repeat(46);
        let mut output = String::new();
        output.push_str(&format!("\n{}\n", rule));
        output.push_str(&format!("OS FINGERPRINT REPORT for {}:{}\n", target, port));
        output.push_str(&format!("{}\n", rule));

        let (scan, ranked, verdict) = match report {
            FingerprintReport::Unreachable => {
                let outcome = self.paint("HOST DOWN OR FILTERED", |s| s.red().bold());
                output.push_str(&format!("Outcome: {}\n{}\n", outcome, rule));
                return output;
            }
            FingerprintReport::Completed {
                scan,
                ranked,
                verdict,
            } => (scan, ranked, verdict),
        };

        output.push_str(&format!(
            "Observed: TTL={} WIN={} DF={} FLAGS={} OPTIONS={}\n",
            scan.ttl,
            scan.window,
            if scan.df_flag { "Y" } else { "N" },
            scan.flags,
            if scan.options.is_empty() { "-" } else { scan.options.as_str() },
        ));
        output.push_str(&format!("Result Vector: {}\n\n", verdict.vector));

        if ranked.is_empty() {
            output.push_str("No signature matched\n");
        } else {
            output.push_str("Best matches:\n");
            for (i, m) in ranked.iter().enumerate() {
                let confidence = match m.confidence {
                    Confidence::High => self.paint("HIGH", |s| s.green().bold()),
                    Confidence::Medium => self.paint("MEDIUM", |s| s.yellow()),
                    Confidence::Low => self.paint("LOW", |s| s.dimmed()),
                };
                output.push_str(&format!(
                    "  {}. {} (score {}, {})\n",
                    i + 1,
                    m.name,
                    m.score,
                    confidence
                ));
            }
        }

        let family = format!("OPERATING SYSTEM: {}", verdict.family.to_string().to_uppercase());
        let family = match verdict.family {
            OsFamily::Linux => self.paint(&family, |s| s.green().bold()),
            _ => self.paint(&family, |s| s.blue().bold()),
        };
        output.push_str(&format!("\nOutcome: {}\n", family));
        output.push_str(&format!("Reason:  {}\n{}\n", verdict.reason(), rule));
        output
    }

    fn paint<F>(&self, text: &str, style: F) -> String
    where
        F: Fn(&str) -> ColoredString,
    {
        if self.config.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn format_json(target: Ipv4Addr, port: u16, report: &FingerprintReport) -> io::Result<String> {
    let json = JsonReport {
        target,
        port,
        report,
    };
    serde_json::to_string_pretty(&json).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}
