//! Masscan process driver
//!
//! A [`MasscanScanner`] holds everything one run needs: the engine binary,
//! the accumulated [`ScanArgs`] and a cancellation token. Runs borrow the
//! scanner immutably, so several scans can be in flight at once, each with
//! its own subprocess.

pub mod args;
pub mod iflist;
pub mod runner;

pub use args::ScanArgs;
pub use iflist::{parse_interfaces, Interface, InterfaceList};
pub use runner::{RunningScan, ScanOutcome};

use crate::{Result, ScanError};
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Name of the engine binary looked up on `PATH`
pub const MASSCAN_BINARY: &str = "masscan";

/// Anything that can run a configured scan to completion
#[async_trait]
pub trait MasscanRunner: Send + Sync {
    async fn run(&self) -> ScanOutcome;
}

/// Configured masscan invocation
#[derive(Debug, Clone)]
pub struct MasscanScanner {
    binary_path: PathBuf,
    args: ScanArgs,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl MasscanScanner {
    /// Use the `masscan` found on `PATH`
    pub fn new() -> Result<Self> {
        let binary_path = find_in_path(MASSCAN_BINARY).ok_or(ScanError::NotInstalled)?;
        Ok(Self::from_path(binary_path))
    }

    /// Use an explicit engine binary; the path must exist
    pub fn with_binary_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScanError::BinaryNotFound(path.to_path_buf()));
        }
        debug!("masscan path: {}", path.display());
        Ok(Self::from_path(path.to_path_buf()))
    }

    fn from_path(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            args: ScanArgs::new(),
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    /// Replace the argument list
    pub fn with_args(mut self, args: ScanArgs) -> Self {
        self.args = args;
        self
    }

    /// Extend the argument list in place, e.g.
    /// `scanner.configure(|a| a.with_targets(["10.0.0.0/8"]).with_ports(["80"]))`
    pub fn configure(mut self, f: impl FnOnce(ScanArgs) -> ScanArgs) -> Self {
        self.args = f(std::mem::take(&mut self.args));
        self
    }

    /// Runs stop with `ScanError::TimeoutError` once this token is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Deadline measured from the start of each run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn args(&self) -> &ScanArgs {
        &self.args
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn deadline(&self) -> runner::Deadline {
        runner::Deadline::new(self.cancel.clone(), self.timeout)
    }

    fn command(&self, args: &[String]) -> Command {
        debug!("Executing {} with args: {:?}", self.binary_path.display(), args);
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl MasscanRunner for MasscanScanner {
    async fn run(&self) -> ScanOutcome {
        MasscanScanner::run(self).await
    }
}

/// Search `PATH` for an executable file called `name`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .flat_map(|dir| {
            let plain = dir.join(name);
            let exe = dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_path() {
        let err = MasscanScanner::with_binary_path("/nonexistent/deimos/masscan").unwrap_err();
        assert!(matches!(err, ScanError::BinaryNotFound(_)));
    }

    #[test]
    fn test_builder_state() {
        let token = CancellationToken::new();
        let scanner = MasscanScanner::from_path(PathBuf::from("/usr/bin/masscan"))
            .configure(|a| a.with_targets(["10.0.0.1"]))
            .configure(|a| a.with_ports(["80"]))
            .with_cancellation(token.clone())
            .with_timeout(Duration::from_secs(30));

        assert_eq!(scanner.args().as_slice(), ["10.0.0.1", "-p", "80"]);
        assert_eq!(scanner.timeout(), Some(Duration::from_secs(30)));
        token.cancel();
        assert!(scanner.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_find_in_path_misses_unknown_binary() {
        assert!(find_in_path("deimos-no-such-binary-7f3a").is_none());
    }
}
