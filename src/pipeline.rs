//! Drives one discovery batch from targets to rows.
//!
//! Phases run strictly one after another under a single deadline:
//! liveness sweep, the optional MAC pass, the per-host scans and finally
//! aggregation. Only the per-host scans run concurrently.
use std::collections::HashMap;

use log::{info, warn};
use tokio::time::Instant;

use crate::discovery;
use crate::error::ScanError;
use crate::input::ScanConfig;
use crate::merge::{self, Row, SkippedHost, VendorLookup};
use crate::runner::{Runner, NMAP};
use crate::scanner::{self, HostResult};

/// Everything a batch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Merged rows, sorted by address.
    pub rows: Vec<Row>,
    /// Network address to MAC address, empty unless the MAC pass ran.
    pub macs: HashMap<String, String>,
    /// Live hosts whose scan contributed nothing.
    pub skipped: Vec<SkippedHost>,
    /// Failures that were absorbed instead of aborting the batch.
    pub warnings: Vec<String>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs a full batch against `targets`.
///
/// The configuration is validated and the scanning tool is checked for
/// before anything is executed. Only fatal errors (see
/// [`ScanError::is_fatal`]) are returned; everything else ends up in the
/// report.
pub async fn run_batch(
    targets: &[String],
    config: &ScanConfig,
    runner: &dyn Runner,
    deadline: Instant,
    vendor: Option<VendorLookup<'_>>,
    on_done: Option<&(dyn Fn(&HostResult) + Sync)>,
) -> Result<BatchReport, ScanError> {
    config.validate()?;
    if targets.is_empty() {
        return Err(ScanError::config("no scan targets provided"));
    }
    runner.preflight(NMAP)?;

    info!("Discovering live hosts among {} target(s)", targets.len());
    let live = discovery::discover_hosts(targets, runner, deadline).await?;
    if live.is_empty() {
        info!("No live hosts, nothing to scan");
        return Ok(BatchReport::default());
    }

    let mut report = BatchReport::default();

    if config.resolve_macs {
        info!("Resolving MAC addresses for {} host(s)", live.len());
        match discovery::discover_macs(&live, runner, deadline).await {
            Ok(macs) => report.macs = macs,
            Err(ScanError::DeadlineExceeded) => return Err(ScanError::DeadlineExceeded),
            Err(e) => {
                warn!("{e}, continuing without MAC addresses");
                report.warnings.push(e.to_string());
            }
        }
    }

    info!("Scanning {} live host(s)", live.len());
    let results = scanner::scan_hosts(&live, config, runner, deadline, on_done).await?;

    let vendor = if config.vendors { vendor } else { None };
    let aggregate = merge::aggregate(&results, Some(&report.macs), vendor);
    report.rows = aggregate.rows;
    report.skipped = aggregate.skipped;

    info!(
        "Batch finished: {} row(s), {} skipped host(s)",
        report.rows.len(),
        report.skipped.len()
    );
    Ok(report)
}
