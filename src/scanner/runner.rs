//! Scan execution: run-to-completion and streaming modes

use super::args::ScanArgs;
use super::MasscanScanner;
use crate::output::xml::{parse_xml, MasscanRun};
use crate::{Result, ScanError};
use log::{debug, info, warn};
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus an optional per-run time limit
#[derive(Debug, Clone)]
pub(crate) struct Deadline {
    token: CancellationToken,
    limit: Option<Duration>,
}

impl Deadline {
    pub(crate) fn new(token: CancellationToken, limit: Option<Duration>) -> Self {
        Self { token, limit }
    }

    /// Resolves when the token is cancelled or the time limit runs out
    pub(crate) async fn expired(self) {
        match self.limit {
            Some(limit) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Result of a run together with the engine's stderr lines.
///
/// Warnings are kept whether or not the run succeeded.
#[derive(Debug)]
pub struct ScanOutcome {
    pub result: Result<MasscanRun>,
    pub warnings: Vec<String>,
}

impl ScanOutcome {
    fn failed(error: ScanError) -> Self {
        Self {
            result: Err(error),
            warnings: Vec::new(),
        }
    }

    /// Decode a finished run's captured output
    fn from_output(stdout: &[u8], stderr: &[u8]) -> Self {
        let mut warnings = split_warnings(stderr);
        match parse_xml(stdout) {
            Ok(run) => Self {
                result: Ok(run),
                warnings,
            },
            Err(e) => {
                warn!("Failed to decode masscan output: {}", e);
                warnings.push(e.to_string());
                Self {
                    result: Err(ScanError::ParseError),
                    warnings,
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_parts(self) -> (Result<MasscanRun>, Vec<String>) {
        (self.result, self.warnings)
    }
}

/// Split captured stderr into lines, dropping the newlines around it
pub fn split_warnings(stderr: &[u8]) -> Vec<String> {
    if stderr.is_empty() {
        return Vec::new();
    }
    String::from_utf8_lossy(stderr)
        .trim_matches('\n')
        .split('\n')
        .map(str::to_string)
        .collect()
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn drain<R>(reader: Option<R>) -> Option<JoinHandle<std::io::Result<Vec<u8>>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    reader.map(|r| tokio::spawn(read_all(r)))
}

async fn collect(task: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match task {
        Some(task) => task
            .await
            .map_err(|e| ScanError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))?
            .map_err(ScanError::from),
        None => Ok(Vec::new()),
    }
}

enum Race {
    Expired,
    Exited(std::io::Result<ExitStatus>),
}

impl MasscanScanner {
    /// Run the scan to completion and decode its report.
    ///
    /// `-oX -` is appended unless the arguments resume an earlier scan.
    /// When the token fires first the process is killed and the outcome is
    /// `TimeoutError` with no warnings. Otherwise the exit code is ignored and
    /// stdout alone decides success.
    pub async fn run(&self) -> ScanOutcome {
        let args = self.args.for_run(!self.args.is_resume());
        let started = Instant::now();

        let mut child = match self.command(&args).spawn() {
            Ok(child) => child,
            Err(e) => return ScanOutcome::failed(e.into()),
        };
        info!("Started masscan (pid {:?})", child.id());

        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        let race = tokio::select! {
            biased;
            _ = self.deadline().expired() => Race::Expired,
            status = child.wait() => Race::Exited(status),
        };

        match race {
            Race::Expired => {
                warn!("Scan deadline reached, killing masscan");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill masscan: {}", e);
                }
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return ScanOutcome::failed(ScanError::TimeoutError);
            }
            Race::Exited(Ok(status)) => {
                debug!("masscan exited with {} after {:?}", status, started.elapsed());
            }
            Race::Exited(Err(e)) => return ScanOutcome::failed(e.into()),
        }

        let stdout = match collect(stdout_task).await {
            Ok(bytes) => bytes,
            Err(e) => return ScanOutcome::failed(e),
        };
        let stderr = match collect(stderr_task).await {
            Ok(bytes) => bytes,
            Err(e) => return ScanOutcome::failed(e),
        };

        let outcome = ScanOutcome::from_output(&stdout, &stderr);
        if let Ok(run) = &outcome.result {
            info!(
                "Scan finished in {:.2}s: {} host entries, {} warnings",
                started.elapsed().as_secs_f64(),
                run.hosts.len(),
                outcome.warnings.len()
            );
        }
        outcome
    }

    /// Start the scan without waiting for it.
    ///
    /// `-oX -` is always appended. A watcher task owns the process and kills
    /// it when the token fires, whether or not anyone reads the streams or
    /// calls [`RunningScan::wait`].
    pub async fn start(&self) -> Result<RunningScan> {
        let args = self.args.for_run(true);
        let mut child = self.command(&args).spawn()?;
        let pid = child.id();
        info!("Started masscan (pid {:?})", pid);

        let stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

        let deadline = self.deadline();
        let watcher = tokio::spawn(async move {
            let race = tokio::select! {
                biased;
                _ = deadline.expired() => Race::Expired,
                status = child.wait() => Race::Exited(status),
            };
            match race {
                Race::Expired => {
                    warn!("Scan deadline reached, killing masscan (pid {:?})", pid);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill masscan: {}", e);
                    }
                    Err(ScanError::TimeoutError)
                }
                Race::Exited(status) => status.map_err(ScanError::from),
            }
        });

        Ok(RunningScan {
            pid,
            stdout,
            stderr,
            watcher,
        })
    }
}

/// A scan started with [`MasscanScanner::start`]
#[derive(Debug)]
pub struct RunningScan {
    pid: Option<u32>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    watcher: JoinHandle<Result<ExitStatus>>,
}

impl RunningScan {
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Next stdout line, `None` once the stream is closed or taken
    pub async fn next_stdout_line(&mut self) -> Result<Option<String>> {
        match self.stdout.as_mut() {
            Some(lines) => Ok(lines.next_line().await?),
            None => Ok(None),
        }
    }

    /// Next stderr line, `None` once the stream is closed or taken
    pub async fn next_stderr_line(&mut self) -> Result<Option<String>> {
        match self.stderr.as_mut() {
            Some(lines) => Ok(lines.next_line().await?),
            None => Ok(None),
        }
    }

    /// Move the stdout reader out, e.g. to drain it on another task
    pub fn take_stdout(&mut self) -> Option<Lines<BufReader<ChildStdout>>> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<Lines<BufReader<ChildStderr>>> {
        self.stderr.take()
    }

    /// Wait for the process to exit.
    ///
    /// A non-zero exit becomes `ExitStatusError`, a kill by the watcher
    /// becomes `TimeoutError`. Output is not decoded here. Drain or take the
    /// streams first: masscan blocks once a pipe buffer is full.
    pub async fn wait(self) -> Result<ExitStatus> {
        let RunningScan { watcher, .. } = self;
        let status = watcher
            .await
            .map_err(|e| ScanError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        if status.success() {
            Ok(status)
        } else {
            Err(ScanError::ExitStatusError(status))
        }
    }

    /// Drain both streams, wait for exit and decode stdout the same way
    /// [`MasscanScanner::run`] does.
    pub async fn finish(mut self) -> ScanOutcome {
        let stdout = self.stdout.take();
        let stderr = self.stderr.take();
        let (stdout, stderr) = tokio::join!(read_lines(stdout), read_lines(stderr));

        let exit = match self.watcher.await {
            Ok(exit) => exit,
            Err(e) => Err(ScanError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e))),
        };
        if let Err(e) = exit {
            return ScanOutcome::failed(e);
        }

        let stdout = match stdout {
            Ok(bytes) => bytes,
            Err(e) => return ScanOutcome::failed(e.into()),
        };
        let stderr = match stderr {
            Ok(bytes) => bytes,
            Err(e) => return ScanOutcome::failed(e.into()),
        };
        ScanOutcome::from_output(&stdout, &stderr)
    }
}

async fn read_lines<R>(lines: Option<Lines<R>>) -> std::io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut lines) = lines {
        while let Some(line) = lines.next_line().await? {
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
    }
    Ok(buf)
}

/// Next line of engine output with invalid UTF-8 replaced, `None` at end
/// of stream. The trailing `\n` or `\r\n` is dropped.
pub async fn next_lossy_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Argument list a run of `args` would use
pub fn run_arguments(args: &ScanArgs) -> Vec<String> {
    args.for_run(!args.is_resume())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_warnings_trailing_newline() {
        assert_eq!(split_warnings(b"warn1\nwarn2\n"), ["warn1", "warn2"]);
    }

    #[test]
    fn test_split_warnings_empty() {
        assert!(split_warnings(b"").is_empty());
    }

    #[test]
    fn test_split_warnings_keeps_inner_blank_lines() {
        assert_eq!(split_warnings(b"\nfirst\n\nsecond"), ["first", "", "second"]);
    }

    #[test]
    fn test_parse_failure_keeps_warnings_and_adds_message() {
        let outcome = ScanOutcome::from_output(b"<nmaprun scanner=\"masscan\">", b"rate limited\n");
        assert!(matches!(outcome.result, Err(ScanError::ParseError)));
        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(outcome.warnings[0], "rate limited");
    }

    #[test]
    fn test_successful_decode_without_warnings() {
        let outcome = ScanOutcome::from_output(br#"<nmaprun scanner="masscan" start="1700000000"></nmaprun>"#, b"");
        assert!(outcome.is_ok());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_run_arguments_respect_resume() {
        let fresh = ScanArgs::new().with_targets(["10.0.0.1"]);
        assert_eq!(run_arguments(&fresh), ["10.0.0.1", "-oX", "-"]);

        let resumed = ScanArgs::new().with_resume("paused.conf");
        assert_eq!(run_arguments(&resumed), ["--resume", "paused.conf"]);
    }

    #[tokio::test]
    async fn test_lossy_lines_survive_invalid_utf8() {
        let mut reader: &[u8] = b"rate:  0.10-kpps\r\n\xffbad\nlast";

        let first = next_lossy_line(&mut reader).await.unwrap();
        assert_eq!(first.as_deref(), Some("rate:  0.10-kpps"));
        let second = next_lossy_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(second, "\u{FFFD}bad");
        assert_eq!(next_lossy_line(&mut reader).await.unwrap().as_deref(), Some("last"));
        assert_eq!(next_lossy_line(&mut reader).await.unwrap(), None);
    }

    #[test]
    fn test_deadline_fires_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        tokio_test::block_on(Deadline::new(token, None).expired());
    }

    #[tokio::test]
    async fn test_deadline_fires_on_time_limit() {
        let deadline = Deadline::new(CancellationToken::new(), Some(Duration::from_millis(10)));
        tokio::time::timeout(Duration::from_secs(5), deadline.expired())
            .await
            .unwrap();
    }
}
