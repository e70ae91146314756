//! `masscan --iflist` support

use super::args::IFLIST_FLAG;
use super::MasscanScanner;
use crate::{Result, ScanError};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEADER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid header regex"));

/// Rows start this many lines below the numeric header
const ROWS_OFFSET: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceList {
    pub interfaces: Vec<Interface>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    pub description: String,
}

impl InterfaceList {
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

impl MasscanScanner {
    /// Ask masscan for the adapters it can use.
    ///
    /// The configured arguments are passed along with `--iflist`. A non-zero
    /// exit is returned as `ExitStatusError`.
    pub async fn interface_list(&self) -> Result<InterfaceList> {
        let mut args = self.args.as_slice().to_vec();
        args.push(IFLIST_FLAG.to_string());

        let mut cmd = self.command(&args);
        let output = tokio::select! {
            biased;
            _ = self.deadline().expired() => return Err(ScanError::TimeoutError),
            output = cmd.output() => output?,
        };

        if !output.status.success() {
            return Err(ScanError::ExitStatusError(output.status));
        }

        let list = parse_interfaces(&String::from_utf8_lossy(&output.stdout));
        debug!("masscan reported {} interfaces", list.len());
        Ok(list)
    }
}

/// Parse the `--iflist` report.
///
/// The first line made only of digits is the header; rows begin two lines
/// below it. Rows with fewer than three fields are skipped.
pub fn parse_interfaces(content: &str) -> InterfaceList {
    let lines: Vec<&str> = content.lines().collect();

    let interfaces = lines
        .iter()
        .position(|line| HEADER_LINE.is_match(line))
        .map(|header| {
            lines
                .iter()
                .skip(header + ROWS_OFFSET)
                .filter_map(|line| parse_interface(line))
                .collect()
        })
        .unwrap_or_default();

    InterfaceList { interfaces }
}

/// `<index> <name> <description...>`
pub fn parse_interface(line: &str) -> Option<Interface> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }

    Some(Interface {
        index: fields[0].parse().unwrap_or_default(),
        name: fields[1].to_string(),
        description: fields[2..].join(" "),
    })
}
