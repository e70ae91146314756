//! Deimos - drive masscan from Rust
//!
//! Build a masscan argument list, run the engine as a subprocess under a
//! cancellation token, and get its XML report back as typed values.
//!
//! ```no_run
//! use deimos::{MasscanScanner, ScanArgs};
//! use std::time::Duration;
//!
//! # async fn demo() -> deimos::Result<()> {
//! let scanner = MasscanScanner::new()?
//!     .with_args(ScanArgs::new().with_targets(["10.0.0.0/24"]).with_ports(["80", "443"]).with_rate(10_000))
//!     .with_timeout(Duration::from_secs(120));
//!
//! let outcome = scanner.run().await;
//! for warning in &outcome.warnings {
//!     eprintln!("masscan: {}", warning);
//! }
//! for (host, port) in outcome.result?.open_ports() {
//!     println!("{} {}/{}", host.address, port.id, port.protocol);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod scanner;

// Re-export commonly used types
pub use config::DriverConfig;
pub use error::{ScanError, ScanResult};
pub use output::{parse_xml, MasscanRun, Timestamp};
pub use scanner::{
    InterfaceList, MasscanRunner, MasscanScanner, RunningScan, ScanArgs, ScanOutcome,
};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ScanError>;
