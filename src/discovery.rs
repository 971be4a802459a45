//! The two bulk passes that run before any per-host scan.
//!
//! Liveness discovery (`nmap -sn -oG -`) decides which targets are worth
//! scanning at all and must succeed. MAC discovery (`nmap -sn -oX -`) maps
//! live addresses to hardware addresses and is allowed to fail, since it only
//! works on the local segment and often needs root.
use std::collections::HashMap;

use log::{debug, info};
use tokio::time::Instant;

use crate::error::ScanError;
use crate::nmap;
use crate::runner::{Runner, NMAP};

const LIVE_MARKER: &str = "Status: Up";
const HOST_MARKER: &str = "Host:";

/// Finds which targets respond, in the order nmap reports them.
///
/// Transport and deadline failures keep their own error class, anything
/// else is reported as a liveness failure.
pub async fn discover_hosts(
    targets: &[String],
    runner: &dyn Runner,
    deadline: Instant,
) -> Result<Vec<String>, ScanError> {
    let mut args = vec!["-sn".to_owned(), "-oG".to_owned(), "-".to_owned()];
    args.extend(targets.iter().cloned());

    let out = runner
        .run(NMAP, &args, deadline)
        .await
        .map_err(|e| match e {
            ScanError::Transport { .. } | ScanError::DeadlineExceeded => e,
            other => ScanError::LivenessDiscovery(Box::new(other)),
        })?;

    let live = parse_grepable(&String::from_utf8_lossy(&out));
    info!("Host discovery found {} live host(s)", live.len());
    Ok(live)
}

/// Extracts live hosts from grepable output.
///
/// A line counts only when it carries `Status: Up`; the address is the
/// token right after `Host:` on that line.
///
/// ```
/// # use ndscan::discovery::parse_grepable;
/// let out = "# Nmap 7.94 scan\nHost: 192.168.1.5 (unknown)  Status: Up\nHost: 192.168.1.6 ()\tStatus: Down\n";
/// assert_eq!(parse_grepable(out), vec!["192.168.1.5".to_owned()]);
/// ```
pub fn parse_grepable(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(LIVE_MARKER))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.find(|&token| token == HOST_MARKER)?;
            tokens.next().map(str::to_owned)
        })
        .collect()
}

/// Maps live network addresses to MAC addresses.
///
/// Hosts reported without either address contribute nothing.
pub async fn discover_macs(
    live: &[String],
    runner: &dyn Runner,
    deadline: Instant,
) -> Result<HashMap<String, String>, ScanError> {
    let mut args = vec!["-sn".to_owned(), "-oX".to_owned(), "-".to_owned()];
    args.extend(live.iter().cloned());

    let xml = runner
        .run(NMAP, &args, deadline)
        .await
        .map_err(|e| match e {
            ScanError::DeadlineExceeded => e,
            other => ScanError::AddressResolution(Box::new(other)),
        })?;
    let run = nmap::parse(&xml).map_err(|e| ScanError::AddressResolution(Box::new(e)))?;

    let macs: HashMap<String, String> = run
        .hosts
        .iter()
        .filter_map(|host| Some((host.ip()?.to_owned(), host.mac()?.to_owned())))
        .collect();

    debug!("MAC discovery resolved {} of {} host(s)", macs.len(), live.len());
    Ok(macs)
}
