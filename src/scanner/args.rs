//! Command-line argument builder for masscan
//!
//! Every call appends tokens in call order. Nothing here checks whether a
//! target or port is valid: masscan is the authority on that.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const PORTS_FLAG: &str = "-p";
pub const RESUME_FLAG: &str = "--resume";
pub const IFLIST_FLAG: &str = "--iflist";

/// Directive pair asking masscan for an XML report on stdout
pub const XML_TO_STDOUT: [&str; 2] = ["-oX", "-"];

/// Ordered list of masscan arguments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanArgs {
    tokens: Vec<String>,
}

impl ScanArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// IP addresses, ranges (`10.0.0.1-10.0.0.100`) or CIDR blocks, appended verbatim
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Port list, comma-joined. A later call extends the existing `-p`
    /// value in place instead of adding a second flag.
    pub fn with_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = ports
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.merge_ports(list);
        self
    }

    /// UDP ports, merged into `-p` like `with_ports`.
    ///
    /// masscan marks a UDP port with `U:` and reads every comma-separated
    /// element on its own, so each element gets the prefix: `"53,161"`
    /// becomes `U:53,U:161`.
    pub fn with_udp_ports(mut self, spec: impl fmt::Display) -> Self {
        let list = spec
            .to_string()
            .split(',')
            .map(|port| format!("U:{}", port.trim()))
            .collect::<Vec<_>>()
            .join(",");
        self.merge_ports(list);
        self
    }

    /// Grab banners such as HTTP server versions and HTML titles
    pub fn with_banners(self) -> Self {
        self.flag("--banners")
    }

    /// Packets per second to transmit
    pub fn with_rate(self, rate: u64) -> Self {
        self.option("--rate", rate)
    }

    /// Include an ICMP echo request in the scan
    pub fn with_ping(self) -> Self {
        self.flag("--ping")
    }

    /// List the available network interfaces, then exit
    pub fn with_iflist(self) -> Self {
        self.flag(IFLIST_FLAG)
    }

    /// TTL of outgoing packets.
    ///
    /// # Panics
    ///
    /// Panics when `ttl` is outside `0..=255`.
    pub fn with_ttl(self, ttl: i32) -> Self {
        assert!(
            (0..=255).contains(&ttl),
            "ttl must be within 0..=255, got {}",
            ttl
        );
        self.option("--ttl", ttl)
    }

    pub fn with_connection_timeout(self, seconds: u64) -> Self {
        self.option("--connection-timeout", seconds)
    }

    pub fn with_retries(self, retries: u32) -> Self {
        self.option("--retries", retries)
    }

    pub fn with_exclude(self, target: impl Into<String>) -> Self {
        self.option("--exclude", target.into())
    }

    pub fn with_exclude_file(self, path: impl AsRef<Path>) -> Self {
        self.option("--excludefile", path.as_ref().display())
    }

    pub fn with_top_ports(self, count: u32) -> Self {
        self.option("--top-ports", count)
    }

    pub fn with_top_ten(self) -> Self {
        self.flag("--top-ten")
    }

    /// Continue an interrupted scan from its `paused.conf`
    pub fn with_resume(self, resume_file: impl AsRef<Path>) -> Self {
        self.option(RESUME_FLAG, resume_file.as_ref().display())
    }

    /// Network adapter to send from, by name (`eth0`)
    pub fn with_adapter(self, name: impl Into<String>) -> Self {
        self.option("--adapter", name.into())
    }

    pub fn with_adapter_ip(self, ip: impl Into<String>) -> Self {
        self.option("--adapter-ip", ip.into())
    }

    pub fn with_adapter_port(self, port: u16) -> Self {
        self.option("--adapter-port", port)
    }

    pub fn with_adapter_mac(self, mac: impl Into<String>) -> Self {
        self.option("--adapter-mac", mac.into())
    }

    pub fn with_router_mac(self, mac: impl Into<String>) -> Self {
        self.option("--router-mac", mac.into())
    }

    pub fn with_http_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.option("--http-user-agent", user_agent.into())
    }

    /// Seconds to keep listening for responses after the last packet
    pub fn with_wait(self, seconds: u64) -> Self {
        self.option("--wait", seconds)
    }

    /// Escape hatch for flags without a dedicated method
    pub fn with_raw_arg(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn contains_flag(&self, flag: &str) -> bool {
        self.tokens.iter().any(|t| t == flag)
    }

    /// Resume runs read their settings from the resume file and skip `-oX -`
    pub fn is_resume(&self) -> bool {
        self.contains_flag(RESUME_FLAG)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Final argument list for a scan run
    pub(crate) fn for_run(&self, xml_to_stdout: bool) -> Vec<String> {
        let mut args = self.tokens.clone();
        if xml_to_stdout {
            args.extend(XML_TO_STDOUT.iter().map(|s| s.to_string()));
        }
        args
    }

    fn merge_ports(&mut self, list: String) {
        match self.tokens.iter().position(|t| t == PORTS_FLAG) {
            Some(idx) if idx + 1 < self.tokens.len() => {
                let merged = format!("{},{}", self.tokens[idx + 1], list);
                self.tokens[idx + 1] = merged;
            }
            _ => {
                self.tokens.push(PORTS_FLAG.to_string());
                self.tokens.push(list);
            }
        }
    }

    fn flag(mut self, flag: &str) -> Self {
        self.tokens.push(flag.to_string());
        self
    }

    fn option(mut self, flag: &str, value: impl fmt::Display) -> Self {
        self.tokens.push(flag.to_string());
        self.tokens.push(value.to_string());
        self
    }
}

impl<S: Into<String>> FromIterator<S> for ScanArgs {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ScanArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_appended_verbatim() {
        let args = ScanArgs::new()
            .with_targets(["10.0.0.0/8", "192.168.0.1"])
            .with_targets(vec!["10.0.0.0/8".to_string()]);
        assert_eq!(args.as_slice(), ["10.0.0.0/8", "192.168.0.1", "10.0.0.0/8"]);
    }

    #[test]
    fn test_ports_merge_into_existing_flag() {
        let args = ScanArgs::new()
            .with_ports(["80", "443"])
            .with_targets(["10.0.0.1"])
            .with_ports(["8080"]);
        assert_eq!(args.as_slice(), ["-p", "80,443,8080", "10.0.0.1"]);
        assert_eq!(args.as_slice().iter().filter(|t| *t == "-p").count(), 1);
    }

    #[test]
    fn test_empty_port_merge_keeps_double_comma() {
        let args = ScanArgs::new()
            .with_ports(["80"])
            .with_ports(Vec::<String>::new())
            .with_ports(["443"]);
        assert_eq!(args.as_slice(), ["-p", "80,,443"]);
    }

    #[test]
    fn test_udp_ports_share_the_port_flag() {
        let args = ScanArgs::new().with_ports(["80"]).with_udp_ports(53);
        assert_eq!(args.as_slice(), ["-p", "80,U:53"]);

        let args = ScanArgs::new().with_udp_ports("161-162");
        assert_eq!(args.as_slice(), ["-p", "U:161-162"]);
    }

    #[test]
    fn test_udp_list_prefixes_every_port() {
        let args = ScanArgs::new().with_udp_ports("53,161-162, 500");
        assert_eq!(args.as_slice(), ["-p", "U:53,U:161-162,U:500"]);

        let args = ScanArgs::new().with_ports(["443"]).with_udp_ports("53,161");
        assert_eq!(args.as_slice(), ["-p", "443,U:53,U:161"]);
    }

    #[test]
    fn test_options_in_call_order() {
        let args = ScanArgs::new()
            .with_targets(["10.0.0.0/24"])
            .with_banners()
            .with_rate(10_000)
            .with_ping()
            .with_connection_timeout(5)
            .with_retries(2)
            .with_exclude("10.0.0.1")
            .with_exclude_file("/etc/masscan/exclude.txt")
            .with_top_ports(100)
            .with_top_ten()
            .with_adapter_ip("192.168.1.5")
            .with_adapter_port(40000)
            .with_adapter_mac("00-11-22-33-44-55")
            .with_router_mac("66-55-44-33-22-11")
            .with_http_user_agent("deimos/0.3")
            .with_wait(3);

        assert_eq!(
            args.as_slice(),
            [
                "10.0.0.0/24",
                "--banners",
                "--rate", "10000",
                "--ping",
                "--connection-timeout", "5",
                "--retries", "2",
                "--exclude", "10.0.0.1",
                "--excludefile", "/etc/masscan/exclude.txt",
                "--top-ports", "100",
                "--top-ten",
                "--adapter-ip", "192.168.1.5",
                "--adapter-port", "40000",
                "--adapter-mac", "00-11-22-33-44-55",
                "--router-mac", "66-55-44-33-22-11",
                "--http-user-agent", "deimos/0.3",
                "--wait", "3",
            ]
        );
    }

    #[test]
    fn test_ttl_bounds_accepted() {
        let args = ScanArgs::new().with_ttl(0).with_ttl(255);
        assert_eq!(args.as_slice(), ["--ttl", "0", "--ttl", "255"]);
    }

    #[test]
    #[should_panic(expected = "ttl must be within 0..=255")]
    fn test_ttl_above_range_panics() {
        let _ = ScanArgs::new().with_ttl(256);
    }

    #[test]
    #[should_panic(expected = "ttl must be within 0..=255")]
    fn test_ttl_negative_panics() {
        let _ = ScanArgs::new().with_ttl(-1);
    }

    #[test]
    fn test_resume_detection_and_run_args() {
        let fresh = ScanArgs::new().with_targets(["10.0.0.1"]);
        assert!(!fresh.is_resume());
        assert_eq!(fresh.for_run(true), ["10.0.0.1", "-oX", "-"]);

        let resumed = ScanArgs::new().with_resume("paused.conf");
        assert!(resumed.is_resume());
        assert_eq!(resumed.for_run(false), ["--resume", "paused.conf"]);
    }

    #[test]
    fn test_display_joins_tokens() {
        let args: ScanArgs = ["10.0.0.1", "-p", "80"].into_iter().collect();
        assert_eq!(args.to_string(), "10.0.0.1 -p 80");
    }
}
