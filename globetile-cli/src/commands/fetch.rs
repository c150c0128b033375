//! Fetch command - make a region of a layer available offline.

use std::sync::Arc;
use std::time::Duration;

use globetile::layer::Cacheable;
use globetile::retrieval::{BulkProgress, BulkRetriever, BulkSummary};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::common::RegionArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the fetch command.
pub struct FetchArgs {
    pub region: RegionArgs,
    pub parallel: usize,
    pub offline: bool,
}

/// Run the fetch command.
pub fn run(runner: &CliRunner, args: FetchArgs) -> Result<(), CliError> {
    runner.log_startup("fetch");
    let (layer, sector) = args.region.load_layer(!args.offline)?;
    let store = Arc::clone(layer.file_store());

    println!("Globetile Fetch v{}", globetile::VERSION);
    println!("=====================");
    println!();
    println!("Layer:      {}", layer.name());
    println!("Region:     {}", sector);
    println!("Resolution: {} degrees per tile", args.region.resolution);
    println!("Cache:      {}", args.region.cache_dir().display());
    if args.offline {
        println!("Network:    disabled (cache only)");
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    // Set up signal handler for graceful shutdown
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        handler_token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let summary = runtime.block_on(async {
        let (tx, rx) = mpsc::unbounded_channel();
        let bar = progress_bar();
        let reporter = tokio::spawn(report_progress(rx, bar.clone()));

        let bulk = BulkRetriever::new(cancel)
            .with_concurrency(args.parallel)
            .with_progress(tx);
        let result = bulk
            .make_local(&layer, &sector, args.region.resolution, store)
            .await;

        // Closes the progress channel.
        drop(bulk);
        let _ = reporter.await;
        bar.finish_and_clear();
        result
    })?;

    print_summary(&summary);
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} tiles {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<BulkProgress>, bar: ProgressBar) {
    while let Some(progress) = rx.recv().await {
        bar.set_length(progress.total);
        bar.set_position(progress.completed);
        bar.set_message(HumanBytes(progress.bytes_downloaded).to_string());
    }
}

fn print_summary(summary: &BulkSummary) {
    println!("Session Summary");
    println!("───────────────");
    println!("  Tiles in region: {}", summary.total);
    println!("  Already cached:  {}", summary.already_local);
    println!(
        "  Downloaded:      {} ({})",
        summary.downloaded,
        HumanBytes(summary.bytes_downloaded)
    );
    if summary.absent > 0 {
        println!("  Not available:   {}", summary.absent);
    }
    if summary.skipped > 0 {
        println!("  Skipped:         {}", summary.skipped);
    }
    if summary.failed > 0 {
        println!("  Failed:          {} (see log)", summary.failed);
    }
    if summary.cancelled > 0 {
        println!("  Not fetched:     {} (interrupted)", summary.cancelled);
    }
    println!();
    if summary.is_complete() {
        println!("Region is available offline.");
    } else {
        println!("Region is incomplete; run the command again to retry.");
    }
}
