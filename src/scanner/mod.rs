//! Core functionality for the per-host scanning phase.
//!
//! Every live host gets its own nmap invocation. At most
//! [`ScanConfig::concurrency`] of them run at once, and each outcome lands in
//! the slot matching its host's position in the input list, whatever order
//! the scans finish in.
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio::time::{self, Instant};

use crate::error::ScanError;
use crate::input::ScanConfig;
use crate::runner::{Runner, NMAP};

/// Flags trading accuracy for speed, added to every host scan.
const SPEED_FLAGS: [&str; 4] = ["--max-retries", "1", "--min-rate", "200"];

/// The outcome of scanning one host: its raw `-oX` output or why it failed.
#[derive(Debug)]
pub struct HostResult {
    pub host: String,
    pub outcome: Result<Vec<u8>, ScanError>,
}

impl HostResult {
    pub fn new(host: impl Into<String>, outcome: Result<Vec<u8>, ScanError>) -> Self {
        Self {
            host: host.into(),
            outcome,
        }
    }

    /// The XML nmap wrote, if the scan succeeded.
    pub fn output(&self) -> Option<&[u8]> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&ScanError> {
        self.outcome.as_ref().err()
    }
}

/// Builds the nmap argv for scanning `host`.
///
/// ```
/// # use ndscan::input::ScanConfig;
/// # use ndscan::scanner::build_args;
/// let args = build_args("10.0.0.1", &ScanConfig::default());
/// assert_eq!(args[..4], ["-oX", "-", "-Pn", "-sT"]);
/// assert_eq!(args.last().unwrap(), "10.0.0.1");
/// ```
pub fn build_args(host: &str, config: &ScanConfig) -> Vec<String> {
    let mut args: Vec<String> = vec!["-oX".into(), "-".into(), "-Pn".into()];

    args.push(if config.privileged { "-sS" } else { "-sT" }.into());
    args.extend(config.preset.flags().iter().map(|&flag| flag.to_owned()));

    match &config.ports {
        Some(ports) => {
            args.push("-p".into());
            args.push(ports.clone());
        }
        None => args.extend(config.preset.port_flags().iter().map(|&flag| flag.to_owned())),
    }

    if !config.host_timeout.is_zero() {
        args.push("--host-timeout".into());
        args.push(format_timeout(config.host_timeout));
    }

    args.extend(SPEED_FLAGS.iter().map(|&flag| flag.to_owned()));
    args.push(host.to_owned());
    args
}

/// Formats a duration the way nmap's time options expect (`20s`, `500ms`).
fn format_timeout(timeout: std::time::Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

/// Scans every host in `live` and returns exactly one result per host, in
/// input order.
///
/// A failing host never stops its siblings; its error is kept in its slot.
/// `on_done` is called once per finished host, in completion order.
/// If `deadline` passes, unfinished scans are killed, hosts not yet started
/// are dropped and the whole call fails with [`ScanError::DeadlineExceeded`].
pub async fn scan_hosts(
    live: &[String],
    config: &ScanConfig,
    runner: &dyn Runner,
    deadline: Instant,
    on_done: Option<&(dyn Fn(&HostResult) + Sync)>,
) -> Result<Vec<HostResult>, ScanError> {
    if live.is_empty() {
        return Ok(Vec::new());
    }

    let concurrency = config.concurrency();
    debug!(
        "Scanning {} host(s), {} at a time",
        live.len(),
        concurrency
    );

    let mut slots: Vec<Option<HostResult>> = live.iter().map(|_| None).collect();

    let scans = stream::iter(live.iter().enumerate())
        .map(|(index, host)| async move {
            let args = build_args(host, config);
            let outcome = runner.run(NMAP, &args, deadline).await;
            (index, HostResult::new(host.as_str(), outcome))
        })
        .buffer_unordered(concurrency);
    futures::pin_mut!(scans);

    let collect = async {
        while let Some((index, result)) = scans.next().await {
            if let Some(err) = result.error() {
                warn!("Scan of {} failed: {}", result.host, err);
            }
            if let Some(callback) = on_done {
                callback(&result);
            }
            slots[index] = Some(result);
        }
    };

    time::timeout_at(deadline, collect)
        .await
        .map_err(|_| ScanError::DeadlineExceeded)?;

    let results: Vec<HostResult> = slots.into_iter().flatten().collect();
    debug_assert_eq!(results.len(), live.len());

    if results
        .iter()
        .any(|r| matches!(r.error(), Some(ScanError::DeadlineExceeded)))
    {
        return Err(ScanError::DeadlineExceeded);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::{build_args, scan_hosts, HostResult};
    use crate::error::ScanError;
    use crate::input::{Preset, ScanConfig};
    use crate::runner::Runner;
    use async_trait::async_trait;
    use parameterized::parameterized;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Pretends to scan: echoes the host back after a random delay and
    /// tracks how many scans are in flight.
    #[derive(Debug, Default)]
    struct Echo {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fail: Vec<&'static str>,
        stall: Vec<&'static str>,
    }

    #[async_trait]
    impl Runner for Echo {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            deadline: Instant,
        ) -> Result<Vec<u8>, ScanError> {
            let host = args.last().cloned().unwrap_or_default();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = if self.stall.iter().any(|h| *h == host) {
                Duration::from_secs(30)
            } else {
                Duration::from_millis(rand::rng().random_range(1..20))
            };
            let slept = tokio::time::timeout_at(deadline, tokio::time::sleep(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if slept.is_err() {
                return Err(ScanError::DeadlineExceeded);
            }
            if self.fail.iter().any(|h| *h == host) {
                return Err(ScanError::Spawn {
                    program: "nmap".to_owned(),
                    source: std::io::Error::from(std::io::ErrorKind::TimedOut),
                });
            }
            Ok(host.into_bytes())
        }
    }

    fn hosts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("10.0.0.{i}")).collect()
    }

    fn config(concurrency: usize) -> ScanConfig {
        ScanConfig {
            concurrency,
            ..ScanConfig::default()
        }
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[parameterized(concurrency = { 0, 1, 2, 3, 8, 64 })]
    #[parameterized_macro(tokio::test)]
    async fn results_stay_aligned_with_input(concurrency: usize) {
        let runner = Echo::default();
        let live = hosts(17);

        let results = scan_hosts(&live, &config(concurrency), &runner, far_deadline(), None)
            .await
            .unwrap();

        assert_eq!(results.len(), live.len());
        for (host, result) in live.iter().zip(&results) {
            assert_eq!(&result.host, host);
            assert_eq!(result.output(), Some(host.as_bytes()));
        }
        assert!(runner.peak.load(Ordering::SeqCst) <= concurrency.max(1));
    }

    #[tokio::test]
    async fn failures_do_not_stop_siblings() {
        let runner = Echo {
            fail: vec!["10.0.0.2", "10.0.0.4"],
            ..Echo::default()
        };
        let live = hosts(5);

        let results = scan_hosts(&live, &config(2), &runner, far_deadline(), None)
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| r.error().is_some())
            .map(|r| r.host.as_str())
            .collect();
        assert_eq!(failed, vec!["10.0.0.2", "10.0.0.4"]);
        assert_eq!(results[4].output(), Some(&b"10.0.0.5"[..]));
    }

    #[tokio::test]
    async fn reports_each_finished_host() {
        let runner = Echo::default();
        let seen = Mutex::new(Vec::new());
        let record: &(dyn Fn(&HostResult) + Sync) =
            &|r: &HostResult| seen.lock().unwrap().push(r.host.clone());

        scan_hosts(&hosts(6), &config(3), &runner, far_deadline(), Some(record))
            .await
            .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, hosts(6));
    }

    #[tokio::test]
    async fn no_hosts_no_scans() {
        let runner = Echo::default();
        let results = scan_hosts(&[], &config(4), &runner, far_deadline(), None)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(runner.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deadline_fails_the_batch() {
        let runner = Echo {
            stall: vec!["10.0.0.3"],
            ..Echo::default()
        };
        let started = Instant::now();

        let err = scan_hosts(
            &hosts(4),
            &config(1),
            &runner,
            Instant::now() + Duration::from_millis(300),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ScanError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[parameterized(preset = {
        Preset::Quick, Preset::Default, Preset::Udp, Preset::Deep,
    }, expected = {
        vec!["-T4", "-F"],
        vec!["-T4", "-A"],
        vec!["-sU", "-T4"],
        vec!["-T4", "-A", "-p", "1-65535"],
    })]
    fn preset_flags(preset: Preset, expected: Vec<&str>) {
        let config = ScanConfig {
            preset,
            host_timeout: Duration::ZERO,
            ..ScanConfig::default()
        };
        let args = build_args("10.0.0.1", &config);

        let mut want = vec!["-oX", "-", "-Pn", "-sT"];
        want.extend(expected);
        want.extend(["--max-retries", "1", "--min-rate", "200", "10.0.0.1"]);
        assert_eq!(args, want);
    }

    #[test]
    fn privileged_scan_uses_syn() {
        let config = ScanConfig {
            privileged: true,
            ..ScanConfig::default()
        };
        assert_eq!(build_args("10.0.0.1", &config)[3], "-sS");
    }

    #[parameterized(preset = {
        Preset::Quick, Preset::Default, Preset::Udp, Preset::Deep,
    })]
    fn explicit_ports_replace_preset_ports(preset: Preset) {
        let config = ScanConfig {
            preset,
            ports: Some("22,80".to_owned()),
            ..ScanConfig::default()
        };
        let args = build_args("10.0.0.1", &config);

        assert_eq!(args.iter().filter(|a| *a == "-p").count(), 1);
        assert!(!args.iter().any(|a| a == "-F" || a == "1-65535"));
        let p = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[p + 1], "22,80");
        for flag in preset.flags() {
            assert!(args.iter().any(|a| a == flag));
        }
    }

    #[parameterized(timeout = {
        Duration::from_secs(20), Duration::from_millis(1500), Duration::ZERO,
    }, expected = {
        Some("20s"), Some("1500ms"), None,
    })]
    fn host_timeout_flag(timeout: Duration, expected: Option<&str>) {
        let config = ScanConfig {
            host_timeout: timeout,
            ..ScanConfig::default()
        };
        let args = build_args("10.0.0.1", &config);
        let flag = args
            .iter()
            .position(|a| a == "--host-timeout")
            .map(|i| args[i + 1].as_str());

        assert_eq!(flag, expected);
    }
}
