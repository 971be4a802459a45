//! Provides a means to read, parse and hold configuration options for scans.
use clap::{Parser, ValueEnum};
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScanError;

const LOWEST_PORT_NUMBER: u16 = 1;
const TOP_PORT_NUMBER: u16 = 65535;

/// Named sets of nmap flags for the per-host scan.
///   - quick: fast timing, the 100 most common ports.
///   - default: fast timing, service and OS detection on the default ports.
///   - udp: UDP scan with fast timing.
///   - deep: fast timing, all 65535 ports, service and OS detection.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
#[serde(from = "String")]
pub enum Preset {
    Quick,
    Default,
    Udp,
    Deep,
}

impl Preset {
    /// Looks a preset up by name. Unknown names fall back to quick.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Preset::Default,
            "udp" => Preset::Udp,
            "deep" => Preset::Deep,
            _ => Preset::Quick,
        }
    }

    /// The nmap flags this preset adds to a host scan, apart from port
    /// selection.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Preset::Quick => &["-T4"],
            Preset::Default | Preset::Deep => &["-T4", "-A"],
            Preset::Udp => &["-sU", "-T4"],
        }
    }

    /// The ports this preset scans. Empty means nmap's default ports.
    /// An explicit port list replaces these.
    pub fn port_flags(self) -> &'static [&'static str] {
        match self {
            Preset::Quick => &["-F"],
            Preset::Default | Preset::Udp => &[],
            Preset::Deep => &["-p", "1-65535"],
        }
    }
}

impl From<String> for Preset {
    fn from(name: String) -> Self {
        Preset::from_name(&name)
    }
}

/// How results are printed to the terminal.
///   - table lists one host per row with port numbers only.
///   - tree lists every host with its detailed port labels.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Table,
    Tree,
}

/// Checks a port list such as `22,80,443` or `1-1024,8080`.
///
/// The list is handed to nmap unchanged, so this only rejects input nmap
/// would choke on.
pub fn parse_port_spec(input: &str) -> Result<String, String> {
    let mut seen_any = false;

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('-') {
            parse_port_range(part)?;
        } else {
            parse_single_port(part)?;
        }
        seen_any = true;
    }

    if !seen_any {
        return Err(String::from("No valid ports or ranges provided"));
    }

    Ok(input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(","))
}

fn parse_port_range(range_str: &str) -> Result<(u16, u16), String> {
    let range_parts: Vec<&str> = range_str.split('-').collect();
    if range_parts.len() != 2 {
        return Err(format!(
            "Invalid range format '{range_str}'. Expected 'start-end'. Example: 1-1000.",
        ));
    }

    let start: u16 = range_parts[0].parse().map_err(|_| {
        format!(
            "Invalid start port '{}' in range '{range_str}'",
            range_parts[0]
        )
    })?;
    let end: u16 = range_parts[1].parse().map_err(|_| {
        format!(
            "Invalid end port '{}' in range '{range_str}'",
            range_parts[1]
        )
    })?;

    if start > end {
        return Err(format!(
            "Start port {start} is greater than end port {end} in range '{range_str}'",
        ));
    }

    if start < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Ports in range '{range_str}' must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok((start, end))
}

fn parse_single_port(port_str: &str) -> Result<u16, String> {
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("Invalid port number '{port_str}'"))?;

    if port < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok(port)
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ndscan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
    after_help = "If the first argument looks like \"user@host\", nmap runs on that host over SSH.\nExample:\n  ndscan emre@203.0.113.10 192.168.0.0/24 --table",
)]
#[allow(clippy::struct_excessive_bools)]
/// Discover live hosts, then scan their open ports, locally or through an SSH jump host.
pub struct Opts {
    /// An optional `user@host` relay followed by the CIDRs, IPs or hosts to scan.
    #[arg(required = true, value_name = "[user@host] TARGETS")]
    pub targets: Vec<String>,

    /// Scan preset: quick, default, udp or deep.
    #[arg(short = 'P', long, value_enum, ignore_case = true, default_value = "quick")]
    pub preset: Preset,

    /// Ports to scan, overriding the preset. Examples: 22,80,443 or 1-1024.
    #[arg(short, long, value_parser = parse_port_spec)]
    pub ports: Option<String>,

    /// Write JSON output to this file instead of printing.
    #[arg(short, long)]
    pub json: Option<PathBuf>,

    /// Include MAC addresses (same L2 segment only).
    #[arg(long)]
    pub show_mac: bool,

    /// Include vendor names. Requires --show-mac.
    #[arg(long)]
    pub show_vendors: bool,

    /// Use a SYN scan (-sS), which needs root on the machine running nmap.
    #[arg(long)]
    pub root_scan: bool,

    /// Maximum number of hosts scanned in parallel.
    #[arg(long, default_value = "32")]
    pub concurrency: usize,

    /// Per-host timeout in seconds handed to nmap. 0 disables it.
    #[arg(long, default_value = "20")]
    pub host_timeout: u64,

    /// Output view.
    #[arg(long, value_enum, ignore_case = true, default_value = "table")]
    pub view: View,

    /// Same as --view table.
    #[arg(long, alias = "tb")]
    pub table: bool,

    /// Same as --view tree.
    #[arg(long, alias = "tr")]
    pub tree: bool,

    /// Deadline in seconds for the whole batch.
    #[arg(long, default_value = "1800")]
    pub deadline: u64,

    /// Seconds SSH may spend connecting to the relay.
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Opts::parse_from(normalize_args(std::env::args()))
    }

    /// Reads the configuration file and merges it in, unless `--no-config`
    /// was given, in which case the file is never opened.
    pub fn load_config(&mut self) -> Result<(), ScanError> {
        if self.no_config {
            return Ok(());
        }
        let config = Config::read(self.config_path.clone())?;
        self.merge(&config);
        Ok(())
    }

    /// Merges values found within the user configuration file into the
    /// command line options.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            preset,
            root_scan,
            concurrency,
            host_timeout,
            show_mac,
            show_vendors,
            view,
            deadline,
            connect_timeout,
            accessible
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(ports);
    }

    /// Splits the positionals into the optional relay and the scan targets.
    pub fn relay_and_targets(&self) -> (Option<&str>, &[String]) {
        match self.targets.split_first() {
            Some((first, rest)) if crate::runner::looks_like_relay(first) => {
                (Some(first.as_str()), rest)
            }
            _ => (None, self.targets.as_slice()),
        }
    }

    /// Resolves `--table`/`--tree` against `--view`.
    pub fn resolved_view(&self) -> Result<View, ScanError> {
        match (self.table, self.tree) {
            (true, true) => Err(ScanError::config(
                "choose one: --table (-tb) OR --tree (-tr), not both",
            )),
            (true, false) => Ok(View::Table),
            (false, true) => Ok(View::Tree),
            (false, false) => Ok(self.view),
        }
    }

    /// Builds the validated scan configuration for the pipeline.
    pub fn scan_config(&self) -> Result<ScanConfig, ScanError> {
        let (_, targets) = self.relay_and_targets();
        if targets.is_empty() {
            return Err(ScanError::config(
                "no scan targets provided after SSH target",
            ));
        }
        self.resolved_view()?;

        let config = ScanConfig {
            preset: self.preset,
            ports: self.ports.clone(),
            privileged: self.root_scan,
            concurrency: self.concurrency,
            host_timeout: Duration::from_secs(self.host_timeout),
            resolve_macs: self.show_mac,
            vendors: self.show_vendors,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.deadline)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Turns the single-dash `-tb`/`-tr` shorthands into long flags so clap
/// does not read them as bundles of short options.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| match arg.as_str() {
            "-tb" => "--tb".to_owned(),
            "-tr" => "--tr".to_owned(),
            _ => arg,
        })
        .collect()
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            targets: vec![],
            preset: Preset::Quick,
            ports: None,
            json: None,
            show_mac: false,
            show_vendors: false,
            root_scan: false,
            concurrency: 32,
            host_timeout: 20,
            view: View::Table,
            table: false,
            tree: false,
            deadline: 1800,
            connect_timeout: 10,
            no_config: true,
            config_path: None,
            accessible: false,
        }
    }
}

/// Everything the scan phases need to know, fixed for a whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub preset: Preset,
    /// Explicit port list, takes precedence over the preset's ports.
    pub ports: Option<String>,
    /// SYN scan (`-sS`) instead of connect scan (`-sT`).
    pub privileged: bool,
    pub concurrency: usize,
    /// Zero means no `--host-timeout`.
    pub host_timeout: Duration,
    /// Run the MAC discovery pass.
    pub resolve_macs: bool,
    /// Resolve MAC addresses to vendor names.
    pub vendors: bool,
}

impl ScanConfig {
    /// Rejects contradictory settings before anything is executed.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.vendors && !self.resolve_macs {
            return Err(ScanError::config(
                "--show-vendors requires --show-mac",
            ));
        }
        Ok(())
    }

    /// Concurrency limit, never below one.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Quick,
            ports: None,
            privileged: false,
            concurrency: 32,
            host_timeout: Duration::from_secs(20),
            resolve_macs: false,
            vendors: false,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    preset: Option<Preset>,
    ports: Option<String>,
    root_scan: Option<bool>,
    concurrency: Option<usize>,
    host_timeout: Option<u64>,
    show_mac: Option<bool>,
    show_vendors: Option<bool>,
    view: Option<View>,
    deadline: Option<u64>,
    connect_timeout: Option<u64>,
    accessible: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
#[allow(clippy::doc_link_with_quotes)]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file is an empty configuration.
    ///
    /// # Format
    ///
    /// preset = "deep"
    /// ports = "22,80,443"
    /// concurrency = 64
    /// show_mac = true
    /// view = "tree"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, ScanError> {
        let config_path = match custom_config_path.or_else(default_config_path) {
            Some(path) => path,
            None => return Ok(Config::default()),
        };
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| {
            ScanError::config(format!("could not read {}: {e}", config_path.display()))
        })?;
        Config::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ScanError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ScanError::config(format!("Found {e} in configuration file.")))?;
        if let Some(ports) = &config.ports {
            parse_port_spec(ports).map_err(ScanError::config)?;
        }
        Ok(config)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".ndscan.toml");
    Some(config_path)
}
