//! Decoder for the XML report masscan writes with `-oX -`
//!
//! The report borrows nmap's layout:
//!
//! ```xml
//! <nmaprun scanner="masscan" start="1700000000" version="1.3.2" xmloutputversion="1.03">
//!   <scaninfo type="syn" protocol="tcp" />
//!   <host endtime="1700000001">
//!     <address addr="10.0.0.1" addrtype="ipv4"/>
//!     <ports><port protocol="tcp" portid="80"><state state="open" reason="syn-ack" reason_ttl="64"/></port></ports>
//!   </host>
//!   <runstats>
//!     <finished time="1700000012" timestr="2023-11-14 22:13:32" elapsed="12" />
//!     <hosts up="1" down="0" total="1" />
//!   </runstats>
//! </nmaprun>
//! ```
//!
//! `hosts` and `finished` are accepted both inside `runstats` and directly
//! under the root element.

use super::timestamp::Timestamp;
use log::debug;
use quick_xml::events::Event;
use quick_xml::{DeError, Reader};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Name of the report's root element
pub const ROOT_ELEMENT: &str = "nmaprun";

/// A fully decoded scan report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MasscanRun {
    pub scanner: String,
    pub start: Timestamp,
    pub version: String,
    pub xml_output_version: String,
    pub scaninfo: ScanInfo,
    #[serde(rename = "host")]
    pub hosts: Vec<Host>,
    pub finished: Finished,
    #[serde(rename = "hosts")]
    pub host_record: HostRecord,
    #[serde(skip)]
    raw_xml: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanInfo {
    #[serde(rename(serialize = "type", deserialize = "@type"), default)]
    pub scan_type: String,
    #[serde(rename(serialize = "protocol", deserialize = "@protocol"), default)]
    pub protocol: String,
}

/// One scanned address and the ports reported for it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    #[serde(rename(serialize = "end_time", deserialize = "@endtime"), default)]
    pub end_time: Timestamp,
    #[serde(default)]
    pub address: Address,
    #[serde(default, deserialize_with = "port_list")]
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename(serialize = "addr_type", deserialize = "@addrtype"), default)]
    pub addr_type: String,
    #[serde(rename(serialize = "addr", deserialize = "@addr"), default)]
    pub addr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Kept as text: masscan is not limited to numeric ids
    #[serde(rename(serialize = "port_id", deserialize = "@portid"), default)]
    pub id: String,
    #[serde(rename(serialize = "protocol", deserialize = "@protocol"), default)]
    pub protocol: String,
    #[serde(default)]
    pub state: State,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(rename(serialize = "state", deserialize = "@state"), default)]
    pub state: String,
    #[serde(rename(serialize = "reason", deserialize = "@reason"), default)]
    pub reason: String,
    #[serde(
        rename(serialize = "reason_ttl", deserialize = "@reasonttl"),
        alias = "@reason_ttl",
        default
    )]
    pub reason_ttl: String,
}

/// Banner captured for a port when `--banners` is on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename(serialize = "name", deserialize = "@name"), default)]
    pub name: String,
    #[serde(rename(serialize = "banner", deserialize = "@banner"), default)]
    pub banner: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(
        rename(serialize = "total", deserialize = "@total"),
        default,
        deserialize_with = "lossy_count"
    )]
    pub total: u64,
    #[serde(
        rename(serialize = "up", deserialize = "@up"),
        default,
        deserialize_with = "lossy_count"
    )]
    pub up: u64,
    #[serde(
        rename(serialize = "down", deserialize = "@down"),
        default,
        deserialize_with = "lossy_count"
    )]
    pub down: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finished {
    #[serde(rename(serialize = "elapsed", deserialize = "@elapsed"), default)]
    pub elapsed: String,
    #[serde(rename(serialize = "time", deserialize = "@time"), default)]
    pub time: Timestamp,
    #[serde(
        rename(serialize = "time_str", deserialize = "@timeStr"),
        alias = "@timestr",
        default
    )]
    pub time_str: String,
}

/// Root element exactly as it appears in the document
#[derive(Deserialize)]
struct RawRun {
    #[serde(rename = "@scanner", default)]
    scanner: String,
    #[serde(rename = "@start", default)]
    start: Timestamp,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "@xmloutputversion", default)]
    xml_output_version: String,
    #[serde(default)]
    scaninfo: ScanInfo,
    #[serde(rename = "host", default)]
    hosts: Vec<Host>,
    #[serde(default)]
    finished: Option<Finished>,
    #[serde(rename = "hosts", default)]
    host_record: Option<HostRecord>,
    #[serde(default)]
    runstats: Option<RunStats>,
}

#[derive(Deserialize, Default)]
struct RunStats {
    #[serde(default)]
    finished: Option<Finished>,
    #[serde(rename = "hosts", default)]
    host_record: Option<HostRecord>,
}

#[derive(Deserialize)]
struct PortList {
    #[serde(rename = "port", default)]
    ports: Vec<Port>,
}

fn port_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Port>, D::Error> {
    Ok(PortList::deserialize(deserializer)?.ports)
}

/// Host counts that are empty or not a number read as 0
fn lossy_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse().unwrap_or_default())
}

impl RawRun {
    fn into_run(self, raw_xml: Vec<u8>) -> MasscanRun {
        let stats = self.runstats.unwrap_or_default();
        MasscanRun {
            scanner: self.scanner,
            start: self.start,
            version: self.version,
            xml_output_version: self.xml_output_version,
            scaninfo: self.scaninfo,
            hosts: self.hosts,
            finished: self.finished.or(stats.finished).unwrap_or_default(),
            host_record: self.host_record.or(stats.host_record).unwrap_or_default(),
            raw_xml,
        }
    }
}

/// Decode a complete report.
///
/// Either the whole document decodes or an error is returned; no partially
/// filled result ever escapes.
pub fn parse_xml(content: &[u8]) -> Result<MasscanRun, DeError> {
    check_root(content)?;
    let raw: RawRun = quick_xml::de::from_reader(content)?;
    let run = raw.into_run(content.to_vec());
    debug!("Decoded report with {} host entries", run.hosts.len());
    Ok(run)
}

/// The serde pass ignores the root's name, so look at it first
fn check_root(content: &[u8]) -> Result<(), DeError> {
    let mut reader = Reader::from_reader(content);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.name();
                return if name.as_ref() == ROOT_ELEMENT.as_bytes() {
                    Ok(())
                } else {
                    Err(DeError::Custom(format!(
                        "expected element <{}> but have <{}>",
                        ROOT_ELEMENT,
                        String::from_utf8_lossy(name.as_ref())
                    )))
                };
            }
            Event::Eof => {
                return Err(DeError::Custom("document has no root element".to_string()))
            }
            _ => {}
        }
    }
}

impl MasscanRun {
    /// The bytes this report was decoded from
    pub fn raw_xml(&self) -> &[u8] {
        &self.raw_xml
    }

    /// Every (host, port) pair whose state is `open`
    pub fn open_ports(&self) -> impl Iterator<Item = (&Host, &Port)> {
        self.hosts
            .iter()
            .flat_map(|host| host.ports.iter().map(move |port| (host, port)))
            .filter(|(_, port)| port.state.is_open())
    }
}

impl fmt::Display for MasscanRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.human())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.end_time.human())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

impl fmt::Display for Finished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.human())
    }
}

impl State {
    pub fn status(&self) -> &str {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}
