use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tokio::time::Instant;

use ndscan::input::{Opts, View};
use ndscan::merge::VendorLookup;
use ndscan::pipeline::{run_batch, BatchReport};
use ndscan::runner;
use ndscan::scanner::HostResult;
use ndscan::tui::{self, Columns};
use ndscan::vendor::VendorTable;
use ndscan::{detail, output, warning};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut opts: Opts = Opts::read();
    opts.load_config()?;

    debug!("Main() `opts` arguments are {opts:?}");

    let scan_config = opts.scan_config()?;
    let view = opts.resolved_view()?;
    let (relay, targets) = opts.relay_and_targets();

    if let Some(relay) = relay {
        detail!(format!("Running nmap on {relay} over SSH"), opts.accessible);
    }
    let runner = runner::select(relay, opts.connect_timeout());
    let deadline = Instant::now() + opts.batch_deadline();

    let table = scan_config.vendors.then(VendorTable::load_default);
    let lookup = |mac: &str| table.as_ref()?.lookup(mac).map(str::to_owned);
    let vendor: VendorLookup = &lookup;

    let progress = if opts.accessible {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    progress.set_style(ProgressStyle::with_template(
        "{spinner:.blue} [{elapsed}] {pos} host(s) scanned {msg}",
    )?);
    progress.enable_steady_tick(Duration::from_millis(100));

    let on_done: &(dyn Fn(&HostResult) + Sync) = &|result: &HostResult| {
        progress.inc(1);
        progress.set_message(result.host.clone());
    };

    let report = run_batch(
        targets,
        &scan_config,
        runner.as_ref(),
        deadline,
        Some(vendor),
        Some(on_done),
    )
    .await;
    progress.finish_and_clear();
    let report = report.context("scan aborted")?;

    print_notes(&report, opts.accessible);

    let columns = Columns {
        mac: opts.show_mac,
        vendor: opts.show_vendors,
    };

    if let Some(path) = &opts.json {
        tui::write_json(&report.rows, path)
            .with_context(|| format!("could not write {}", path.display()))?;
        output!(
            format!("Wrote {} host(s) to {}", report.rows.len(), path.display()),
            opts.accessible
        );
        return Ok(());
    }

    if report.is_empty() {
        warning!("No hosts found.", opts.accessible);
        return Ok(());
    }

    match view {
        View::Table => print!("{}", tui::render_table(&report.rows, columns)),
        View::Tree => print!("{}", tui::render_tree(&report.rows, columns)),
    }

    Ok(())
}

fn print_notes(report: &BatchReport, accessible: bool) {
    for note in &report.warnings {
        warning!(note, accessible);
    }
    for skipped in &report.skipped {
        detail!(
            format!("Skipped {}: {}", skipped.host, skipped.reason),
            accessible
        );
    }
}
