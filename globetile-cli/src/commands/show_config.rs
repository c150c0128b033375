//! Show-config command - print a layer file as the library reads it.

use std::path::Path;

use globetile::config::LayerConfig;
use globetile::pyramid::LevelSet;

use crate::error::CliError;

/// Run the show-config command.
pub fn run(path: &Path) -> Result<(), CliError> {
    let config = LayerConfig::load(path)?;
    let levels = LevelSet::from_config(&config)?;

    println!("{}", config.to_metadata_json()?);
    println!();
    println!("Level  Tile delta (deg)       Texel size (rad)  Tiles");
    for level in levels.levels() {
        let delta = level.tile_delta();
        let tiles = levels.count_tiles_in_sector(level.number(), levels.sector());
        let note = if level.is_empty() { "  (empty)" } else { "" };
        println!(
            "{:>5}  {:>10.6} x {:<10.6}  {:>16.3e}  {}{}",
            level.number(),
            delta.lat,
            delta.lon,
            level.texel_size(),
            tiles,
            note
        );
    }
    Ok(())
}
