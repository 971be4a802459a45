//! Turns raw per-host scan output into the canonical rows of a batch.
//!
//! The steps run in a fixed order: drop failed hosts, parse, flatten each
//! host into a [`Row`], fill in MAC addresses from the discovery pass, look
//! up vendors, merge rows describing the same host, and sort.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::IpAddr;

use log::debug;
use serde_derive::Serialize;

use crate::nmap;
use crate::scanner::HostResult;

/// Resolves a MAC address to a vendor name.
pub type VendorLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// One host as presented to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Row {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub up: bool,
    /// Open ports as labels like `22/tcp ssh OpenSSH`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

impl Row {
    /// Flattens a parsed host. Only open ports become labels.
    pub fn from_host(host: &nmap::Host) -> Self {
        Self {
            ip: host.ip().unwrap_or_default().to_owned(),
            mac: host.mac().map(str::to_owned),
            vendor: None,
            hostname: host.hostname().map(str::to_owned),
            up: host.is_up(),
            ports: host.open_ports().map(nmap::Port::label).collect(),
        }
    }

    /// Rows with the same identity describe the same host.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.ip.clone(),
            self.mac.clone().unwrap_or_default(),
            self.hostname.clone().unwrap_or_default(),
        )
    }
}

/// A host that contributed nothing to the rows, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedHost {
    pub host: String,
    pub reason: String,
}

/// The rows of a batch plus the hosts that were dropped along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub rows: Vec<Row>,
    pub skipped: Vec<SkippedHost>,
}

/// Runs every aggregation step over the results of a batch.
///
/// `macs` fills in MAC addresses nmap did not report in the host scan, and
/// `vendor` (when given) resolves those addresses to vendor names.
pub fn aggregate(
    results: &[HostResult],
    macs: Option<&HashMap<String, String>>,
    vendor: Option<VendorLookup<'_>>,
) -> Aggregate {
    let (mut rows, skipped) = flatten(results);

    if let Some(macs) = macs {
        fill_macs(&mut rows, macs);
    }
    if let Some(lookup) = vendor {
        fill_vendors(&mut rows, lookup);
    }

    let mut rows = merge_rows(rows);
    sort_rows(&mut rows);

    debug!(
        "Aggregated {} host result(s) into {} row(s), skipped {}",
        results.len(),
        rows.len(),
        skipped.len()
    );
    Aggregate { rows, skipped }
}

/// Parses every successful result into rows.
///
/// Failed scans, empty output and unparseable XML are reported as skipped.
pub fn flatten(results: &[HostResult]) -> (Vec<Row>, Vec<SkippedHost>) {
    let mut rows = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();

    for result in results {
        let skip = |reason: String| SkippedHost {
            host: result.host.clone(),
            reason,
        };

        let xml = match &result.outcome {
            Err(e) => {
                skipped.push(skip(e.to_string()));
                continue;
            }
            Ok(xml) if xml.is_empty() => {
                skipped.push(skip("empty scan output".to_owned()));
                continue;
            }
            Ok(xml) => xml,
        };

        match nmap::parse(xml) {
            Ok(run) => rows.extend(run.hosts.iter().map(Row::from_host)),
            Err(e) => skipped.push(skip(e.to_string())),
        }
    }

    (rows, skipped)
}

/// Fills in missing MAC addresses. Addresses already present are kept.
pub fn fill_macs(rows: &mut [Row], macs: &HashMap<String, String>) {
    for row in rows.iter_mut().filter(|row| row.mac.is_none()) {
        row.mac = macs.get(&row.ip).cloned();
    }
}

/// Resolves each row's MAC address to a vendor name.
pub fn fill_vendors(rows: &mut [Row], lookup: VendorLookup<'_>) {
    for row in rows.iter_mut() {
        row.vendor = row.mac.as_deref().and_then(lookup);
    }
}

/// Merges rows with the same identity, keeping first-seen order.
///
/// Port labels are concatenated, not deduplicated: merging a row with an
/// identical copy of itself lists each port twice.
pub fn merge_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut merged: Vec<Row> = Vec::with_capacity(rows.len());
    let mut index: HashMap<(String, String, String), usize> = HashMap::new();

    for row in rows {
        match index.get(&row.identity()) {
            Some(&i) => merged[i].ports.extend(row.ports),
            None => {
                index.insert(row.identity(), merged.len());
                merged.push(row);
            }
        }
    }
    merged
}

/// Sorts rows by network address.
///
/// Valid IP addresses sort numerically, IPv4 before IPv6, and anything
/// unparseable goes last in lexical order. Ties fall back to MAC address,
/// then hostname.
pub fn sort_rows(rows: &mut [Row]) {
    rows.sort_by(|a, b| {
        address_order(&a.ip, &b.ip)
            .then_with(|| a.mac.cmp(&b.mac))
            .then_with(|| a.hostname.cmp(&b.hostname))
    });
}

fn address_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
