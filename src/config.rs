//! Configuration file support for the deimos driver

use crate::scanner::{MasscanScanner, ScanArgs};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".deimos.toml";

/// Defaults applied to every scan before command-line options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Explicit masscan binary; `PATH` is searched when unset
    pub binary_path: Option<PathBuf>,

    /// Per-run deadline in seconds
    pub timeout: Option<u64>,

    /// Packets per second
    pub rate: Option<u64>,

    /// Seconds to wait for late responses
    pub wait: Option<u64>,

    /// Grab banners on open ports
    pub banners: bool,

    pub adapter: Option<String>,

    pub exclude_file: Option<PathBuf>,

    /// Tokens appended verbatim after the options above
    pub extra_args: Vec<String>,
}

impl DriverConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            crate::ScanError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// `~/.deimos.toml`, when a home directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
    }

    /// Load `path`, or the default file when `path` is `None`.
    ///
    /// A missing default file yields the defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => {
                let config = Self::from_toml_file(&default)?;
                info!("Loaded config from {}", default.display());
                Ok(config)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Append the configured options to `args`
    pub fn apply(&self, mut args: ScanArgs) -> ScanArgs {
        if let Some(rate) = self.rate {
            args = args.with_rate(rate);
        }
        if let Some(wait) = self.wait {
            args = args.with_wait(wait);
        }
        if self.banners {
            args = args.with_banners();
        }
        if let Some(adapter) = &self.adapter {
            args = args.with_adapter(adapter.clone());
        }
        if let Some(file) = &self.exclude_file {
            args = args.with_exclude_file(file);
        }
        for token in &self.extra_args {
            args = args.with_raw_arg(token.clone());
        }
        args
    }

    /// Build a scanner from the configured binary (or `PATH`) and deadline
    pub fn scanner(&self) -> crate::Result<MasscanScanner> {
        let scanner = match &self.binary_path {
            Some(path) => MasscanScanner::with_binary_path(path)?,
            None => MasscanScanner::new()?,
        };
        let scanner = scanner.configure(|args| self.apply(args));
        Ok(match self.timeout_duration() {
            Some(timeout) => scanner.with_timeout(timeout),
            None => scanner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_partial_file() {
        let config: DriverConfig = toml::from_str("rate = 50000\nbanners = true\n").unwrap();
        assert_eq!(config.rate, Some(50_000));
        assert!(config.banners);
        assert_eq!(config.timeout, None);
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_apply_order() {
        let config = DriverConfig {
            rate: Some(1000),
            wait: Some(2),
            banners: true,
            adapter: Some("eth1".to_string()),
            exclude_file: Some(PathBuf::from("exclude.txt")),
            extra_args: vec!["--randomize-hosts".to_string()],
            ..Default::default()
        };
        let args = config.apply(ScanArgs::new().with_targets(["10.0.0.0/24"]));
        assert_eq!(
            args.as_slice(),
            [
                "10.0.0.0/24",
                "--rate", "1000",
                "--wait", "2",
                "--banners",
                "--adapter", "eth1",
                "--excludefile", "exclude.txt",
                "--randomize-hosts",
            ]
        );
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout = 90\nbinary_path = \"/opt/masscan/bin/masscan\"").unwrap();

        let config = DriverConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.timeout_duration(), Some(Duration::from_secs(90)));
        assert_eq!(config.binary_path, Some(PathBuf::from("/opt/masscan/bin/masscan")));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = DriverConfig::load(Some(Path::new("/nonexistent/deimos.toml"))).unwrap_err();
        assert!(matches!(err, crate::ScanError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rate = \"fast\"").unwrap();
        assert!(matches!(
            DriverConfig::from_toml_file(file.path()),
            Err(crate::ScanError::ConfigError(_))
        ));
    }

    #[test]
    fn test_scanner_with_missing_binary() {
        let config = DriverConfig {
            binary_path: Some(PathBuf::from("/nonexistent/masscan")),
            ..Default::default()
        };
        assert!(config.scanner().unwrap_err().is_missing_binary());
    }
}
