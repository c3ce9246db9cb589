use anyhow::{bail, Context, Result};
use geojson::GeoJson;
use gridelev::TileIndex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub fn run(folder: PathBuf, output: Option<PathBuf>, id_field: &str) -> Result<()> {
    if !folder.is_dir() {
        bail!("Raster folder does not exist: {}", folder.display());
    }

    let index = TileIndex::from_hgt_folder(&folder)
        .with_context(|| format!("Failed to scan {}", folder.display()))?;
    if index.is_empty() {
        println!("No .hgt files found in: {}", folder.display());
        return Ok(());
    }

    let geojson = GeoJson::FeatureCollection(index.to_geojson(id_field));

    match output {
        Some(path) => {
            let file = File::create(&path).context("Failed to create output file")?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &geojson)?;
            writer.flush()?;
            println!("Indexed {} tiles", index.len());
            println!("Output written to: {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, &geojson)?;
            writeln!(writer)?;
        }
    }

    Ok(())
}
