//! The error taxonomy shared by every phase of a discovery batch.
//!
//! Some variants abort the whole batch, others are absorbed at the phase
//! boundary where they happen. [`ScanError::is_fatal`] tells them apart.
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Everything that can go wrong while running a batch.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The scanning binary is not on the local `PATH`.
    #[error("{tool} not found in PATH")]
    ToolUnavailable { tool: String },

    /// The SSH relay could not be reached or refused to authenticate.
    #[error("ssh to {target} failed: {detail}")]
    Transport { target: String, detail: String },

    /// The liveness sweep failed, so there is nothing to scan.
    #[error("host discovery failed: {0}")]
    LivenessDiscovery(#[source] Box<ScanError>),

    /// The MAC address pass failed. The batch continues without enrichment.
    #[error("mac discovery failed: {0}")]
    AddressResolution(#[source] Box<ScanError>),

    /// The process could not be started at all.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process ran but exited unsuccessfully.
    #[error("{program} failed: {status}\nstderr: {stderr}")]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Nmap produced XML we could not make sense of.
    #[error("failed to parse nmap xml: {0}")]
    Parse(#[from] quick_xml::DeError),

    /// Contradictory or missing options, caught before anything runs.
    #[error("{0}")]
    Config(String),

    /// The batch deadline passed. Running processes have been killed.
    #[error("deadline exceeded, scan aborted")]
    DeadlineExceeded,
}

impl ScanError {
    /// Whether this error must abort the whole batch.
    ///
    /// Per-host failures, parse failures and a failed MAC pass only remove
    /// data from the result; everything else stops the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::ToolUnavailable { .. }
                | ScanError::Transport { .. }
                | ScanError::LivenessDiscovery(_)
                | ScanError::Config(_)
                | ScanError::DeadlineExceeded
        )
    }

    /// Shorthand for building a [`ScanError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        ScanError::Config(msg.into())
    }
}
