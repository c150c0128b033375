//! Estimate command - report how much a region still needs to download.

use std::sync::Arc;

use globetile::layer::Cacheable;
use globetile::retrieval::BulkRetriever;
use indicatif::HumanBytes;
use tokio_util::sync::CancellationToken;

use super::common::RegionArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the estimate command.
pub fn run(runner: &CliRunner, region: RegionArgs) -> Result<(), CliError> {
    runner.log_startup("estimate");
    let (layer, sector) = region.load_layer(false)?;
    let store = Arc::clone(layer.file_store());

    let estimate = BulkRetriever::new(CancellationToken::new()).estimate_missing_bytes(
        &layer,
        &sector,
        region.resolution,
        store.as_ref(),
    );

    println!("Layer:  {}", layer.name());
    println!("Region: {}", sector);
    println!();
    println!("  Tiles in region: {}", estimate.total_tiles);
    println!("  Missing tiles:   {}", estimate.missing_tiles);
    println!(
        "  Download size:   ~{}",
        HumanBytes(estimate.estimated_bytes)
    );
    Ok(())
}
