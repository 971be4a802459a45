//! This crate exposes the internal functionality of the `ndscan` network
//! discovery tool.
//!
//! ndscan does not scan anything itself. It drives `nmap`, either on the
//! local machine or on a jump host reached over SSH, through a discovery
//! batch with three phases:
//!
//! 1. **Liveness sweep**: one `nmap -sn` over all targets finds the hosts
//!    that respond.
//! 2. **MAC pass** (optional): one more `nmap -sn` maps live addresses to
//!    hardware addresses. It is allowed to fail.
//! 3. **Host scans**: every live host gets its own port scan, a bounded
//!    number at a time.
//!
//! The per-host XML is then parsed, merged and sorted into [`merge::Row`]s.
//!
//! ## Architecture Overview
//!
//! Everything that executes a process goes through the
//! [`Runner`](crate::runner::Runner) trait, picked once per batch by
//! [`runner::select`]. [`pipeline::run_batch`] drives the phases in order
//! under a single deadline and returns a [`pipeline::BatchReport`].
//!
//! ## Basic Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! use ndscan::input::ScanConfig;
//! use ndscan::pipeline::run_batch;
//! use ndscan::runner;
//!
//! # async fn scan() -> Result<(), ndscan::error::ScanError> {
//! let targets = vec!["192.168.1.0/24".to_owned()];
//! let runner = runner::select(None, runner::DEFAULT_CONNECT_TIMEOUT);
//! let deadline = Instant::now() + Duration::from_secs(600);
//!
//! let report = run_batch(&targets, &ScanConfig::default(), runner.as_ref(), deadline, None, None).await?;
//! for row in &report.rows {
//!     println!("{} {:?}", row.ip, row.ports);
//! }
//! # Ok(())
//! # }
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod error;

pub mod input;

pub mod runner;

pub mod nmap;

pub mod discovery;

pub mod scanner;

pub mod merge;

pub mod vendor;

pub mod pipeline;
