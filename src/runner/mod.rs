//! Where the scanning tool actually runs.
//!
//! Every phase of a batch talks to nmap through the [`Runner`] trait, so the
//! pipeline never needs to know whether it is driving a local process or a
//! process on the far side of an SSH jump host. One runner is picked with
//! [`select`] at the start of a batch and shared by every phase.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ScanError;

mod local;
mod remote;

pub use local::LocalRunner;
pub use remote::RemoteRunner;

/// Name of the scanning binary every phase invokes.
pub const NMAP: &str = "nmap";

/// Default time SSH may spend setting up the connection to the relay.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs an external program and hands back what it wrote to stdout.
#[async_trait]
pub trait Runner: Send + Sync + fmt::Debug {
    /// Runs `program` with `args`, killing it if `deadline` passes first.
    ///
    /// A non-zero exit becomes an error carrying the program's stderr.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        deadline: Instant,
    ) -> Result<Vec<u8>, ScanError>;

    /// Checks that `program` can be run at all before the batch starts.
    ///
    /// Runners that cannot check ahead of time succeed here and report a
    /// missing program when [`Runner::run`] is called.
    fn preflight(&self, _program: &str) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Picks the runner for a batch: local when `relay` is `None`, SSH otherwise.
pub fn select(relay: Option<&str>, connect_timeout: Duration) -> Arc<dyn Runner> {
    match relay {
        Some(target) => Arc::new(RemoteRunner::new(target, connect_timeout)),
        None => Arc::new(LocalRunner),
    }
}

/// Treats `user@host` as a relay target. Anything with a `/` is a CIDR.
pub fn looks_like_relay(arg: &str) -> bool {
    arg.contains('@') && !arg.contains('/')
}
