//! MAC prefix (OUI) to vendor name table.
//!
//! The table lives in `~/.ndscan/oui.txt`, one `<prefix> <vendor>` or
//! `<prefix>\t<vendor>` entry per line. Without that file a small built-in
//! sample is used.
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

const SAMPLE: &str = "00:11:22\tAcmeCorp
00:25:96\tD-Link
3C:5A:B4\tTP-Link
48:5A:3F\tCisco
";

/// Vendor names keyed by normalized 6 hex digit prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorTable {
    entries: HashMap<String, String>,
}

impl VendorTable {
    /// Loads `~/.ndscan/oui.txt`, falling back to the built-in sample.
    pub fn load_default() -> Self {
        match default_table_path().map(|path| Self::load(&path)) {
            Some(Ok(table)) => table,
            Some(Err(e)) => {
                debug!("No vendor table loaded ({e}), using built-in sample");
                Self::sample()
            }
            None => Self::sample(),
        }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        let table = Self::parse(&content);
        debug!("Loaded {} vendor prefix(es) from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn sample() -> Self {
        Self::parse(SAMPLE)
    }

    /// Parses the table format. Blank lines, `#` comments and lines whose
    /// prefix does not normalize are skipped.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (prefix, name) = match line.split_once('\t') {
                    Some((prefix, name)) => (prefix, name.trim()),
                    None => {
                        let (prefix, name) = line.split_once(char::is_whitespace)?;
                        (prefix, name.trim())
                    }
                };
                if name.is_empty() {
                    return None;
                }
                Some((normalize(prefix)?, name.to_owned()))
            })
            .collect();

        Self { entries }
    }

    /// Finds the vendor for a MAC address in any common notation.
    pub fn lookup(&self, mac: &str) -> Option<&str> {
        self.entries.get(&normalize(mac)?).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reduces a MAC address or prefix to its first 6 hex digits, uppercased.
///
/// ```
/// # use ndscan::vendor::normalize;
/// assert_eq!(normalize("00:11:22:33:44:55").as_deref(), Some("001122"));
/// assert_eq!(normalize("0011.2233.4455").as_deref(), Some("001122"));
/// assert_eq!(normalize("12:34"), None);
/// ```
pub fn normalize(mac: &str) -> Option<String> {
    let mut digits = mac.trim().to_ascii_uppercase();
    for sep in [":", "-", ".", "0X"] {
        digits = digits.replace(sep, "");
    }

    let prefix = digits.get(..6)?;
    prefix
        .chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| prefix.to_owned())
}

/// Constructs default path to the vendor table
pub fn default_table_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".ndscan");
    path.push("oui.txt");
    Some(path)
}
