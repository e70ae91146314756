//! Decoding of masscan's output and formatting of decoded results

pub mod timestamp;
pub mod xml;

pub use timestamp::Timestamp;
pub use xml::{parse_xml, Address, Finished, Host, HostRecord, MasscanRun, Port, ScanInfo, Service, State};

use crate::scanner::iflist::InterfaceList;
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    Greppable,
    /// The engine's own report, byte for byte
    Xml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "greppable" | "grep" => Ok(OutputFormat::Greppable),
            "xml" => Ok(OutputFormat::Xml),
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
    pub show_closed: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
            show_closed: false,
        }
    }
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Render a report in the configured format
    pub fn render(&self, run: &MasscanRun) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(run)),
            OutputFormat::Json => serde_json::to_string_pretty(run)
                .map(|mut s| {
                    s.push('\n');
                    s
                })
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
            OutputFormat::Csv => self.format_csv(run),
            OutputFormat::Greppable => Ok(self.format_greppable(run)),
            OutputFormat::Xml => Ok(String::from_utf8_lossy(run.raw_xml()).into_owned()),
        }
    }

    /// Render and write to the configured file, or stdout
    pub fn write_results(&self, run: &MasscanRun) -> io::Result<()> {
        let output = self.render(run)?;
        self.emit(&output)
    }

    /// Render the `--iflist` table
    pub fn write_interfaces(&self, list: &InterfaceList) -> io::Result<()> {
        let output = match self.config.format {
            OutputFormat::Json => serde_json::to_string_pretty(list)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            _ => {
                let mut out = String::new();
                for iface in &list.interfaces {
                    let name = self.paint(&iface.name, |s| s.bright_cyan());
                    out.push_str(&format!("{:>3}  {:<16} {}\n", iface.index, name, iface.description));
                }
                out
            }
        };
        self.emit(&output)
    }

    fn emit(&self, output: &str) -> io::Result<()> {
        match &self.config.file {
            Some(filename) => {
                let mut file = File::create(filename)?;
                file.write_all(output.as_bytes())?;
            }
            None => {
                print!("{}", output);
            }
        }
        Ok(())
    }

    fn format_text(&self, run: &MasscanRun) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{} {} scan started {}\n",
            run.scanner,
            run.version,
            run.start.human()
        ));

        for host in &run.hosts {
            for port in &host.ports {
                let line = format!(
                    "  {:<39} {:>5}/{:<4} {:<8} {}",
                    host.address.addr, port.id, port.protocol, port.state.state, port.state.reason
                );
                if port.state.is_open() {
                    output.push_str(&self.paint(&line, |s| s.bright_green()));
                } else if self.config.show_closed {
                    output.push_str(&self.paint(&line, |s| s.bright_black()));
                } else {
                    continue;
                }
                output.push('\n');

                if let Some(service) = &port.service {
                    output.push_str(&format!("      {}: {}\n", service.name, service.banner));
                }
            }
        }

        output.push_str(&format!(
            "hosts: {} total, {} up, {} down; finished {} ({}s)\n",
            run.host_record.total,
            run.host_record.up,
            run.host_record.down,
            run.finished.time.human(),
            run.finished.elapsed
        ));
        output
    }

    fn format_csv(&self, run: &MasscanRun) -> io::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["address", "addr_type", "port", "protocol", "state", "reason", "reason_ttl", "service", "banner", "end_time"])
            .map_err(io::Error::from)?;

        for host in &run.hosts {
            for port in &host.ports {
                if !port.state.is_open() && !self.config.show_closed {
                    continue;
                }
                let (service, banner) = port
                    .service
                    .as_ref()
                    .map(|s| (s.name.as_str(), s.banner.as_str()))
                    .unwrap_or(("", ""));
                let end_time = host.end_time.to_string();
                writer
                    .write_record([
                        host.address.addr.as_str(),
                        host.address.addr_type.as_str(),
                        port.id.as_str(),
                        port.protocol.as_str(),
                        port.state.state.as_str(),
                        port.state.reason.as_str(),
                        port.state.reason_ttl.as_str(),
                        service,
                        banner,
                        end_time.as_str(),
                    ])
                    .map_err(io::Error::from)?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn format_greppable(&self, run: &MasscanRun) -> String {
        let mut output = String::new();
        for (host, port) in run.open_ports() {
            output.push_str(&format!(
                "Host: {} () Ports: {}/open/{}////\n",
                host.address.addr, port.id, port.protocol
            ));
        }
        output
    }

    fn paint(&self, text: &str, style: impl Fn(&str) -> ColoredString) -> String {
        if self.config.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }
}
