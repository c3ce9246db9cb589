use anyhow::{bail, Context, Result};
use gridelev::filename::{resource_path, zip_resource_path};
use gridelev::{ResolverConfig, Tile, TileIndex};
use std::fs;
use std::path::Path;

/// Where a tile's raster was found.
#[derive(Debug, PartialEq, Eq)]
enum RasterStatus {
    Present(u64),
    Zipped(u64),
    Missing,
}

pub fn run(config: &ResolverConfig) -> Result<()> {
    if config.rasters.is_file() {
        let size = fs::metadata(&config.rasters).map(|m| m.len()).unwrap_or(0);
        println!("Single raster: {}", config.rasters.display());
        println!("  Size: {}", format_size(size));
        return Ok(());
    }
    if !config.rasters.is_dir() {
        bail!("Raster folder does not exist: {}", config.rasters.display());
    }

    let index = TileIndex::from_geojson_file(&config.tile_index, &config.id_field)
        .with_context(|| format!("Failed to load tile index {}", config.tile_index.display()))?;

    if index.is_empty() {
        println!("No tiles in: {}", config.tile_index.display());
        return Ok(());
    }

    let mut present = 0;
    let mut zipped = 0;
    let mut missing = 0;
    let mut total_size: u64 = 0;

    println!("{:<16} {:>8} {:>40}", "TILE", "RASTER", "BOUNDS");
    println!("{}", "-".repeat(66));

    for tile in index.tiles() {
        let status = raster_status(&config.rasters, tile, &config.raster_extension);
        let label = match status {
            RasterStatus::Present(size) => {
                present += 1;
                total_size += size;
                "present"
            }
            RasterStatus::Zipped(size) => {
                zipped += 1;
                total_size += size;
                "zipped"
            }
            RasterStatus::Missing => {
                missing += 1;
                "MISSING"
            }
        };

        println!("{:<16} {:>8} {:>40}", tile.id(), label, format_bounds(tile));
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", index.len());
    println!("  Present: {}", present);
    if zipped > 0 {
        println!("  Zipped: {}", zipped);
    }
    if missing > 0 {
        println!("  Missing: {}", missing);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Tile index: {}", config.tile_index.display());
    println!("  Raster folder: {}", config.rasters.display());

    Ok(())
}

fn raster_status(folder: &Path, tile: &Tile, extension: &str) -> RasterStatus {
    let size = |path: &Path| fs::metadata(path).ok().map(|m| m.len());

    if let Some(len) = size(&resource_path(folder, tile.id(), extension)) {
        RasterStatus::Present(len)
    } else if let Some(len) = size(&zip_resource_path(folder, tile.id(), extension)) {
        RasterStatus::Zipped(len)
    } else {
        RasterStatus::Missing
    }
}

fn format_bounds(tile: &Tile) -> String {
    let bounds = tile.bounds();
    format!(
        "[{:.4}, {:.4}] to [{:.4}, {:.4}]",
        bounds.min().x,
        bounds.min().y,
        bounds.max().x,
        bounds.max().y
    )
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
