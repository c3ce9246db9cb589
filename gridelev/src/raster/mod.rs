//! Raster sampling.
//!
//! A tile's raster is found by name under the tiles folder and opened as a
//! [`RasterSampler`]. Two formats are supported, chosen by extension:
//!
//! - `hgt`: SRTM1/SRTM3 binary grids, see [`hgt`]
//! - `asc`: ESRI ASCII grids, see [`ascii`]
//!
//! Samplers are opened per batch and released when dropped.

pub mod ascii;
pub mod hgt;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use geo::{Coord, Rect};

use crate::error::{ElevationError, Result};
use crate::filename::{filename_to_lat_lon, resource_path, zip_resource_path};
use crate::tile_index::TileId;

pub use ascii::AsciiGrid;
pub use hgt::{HgtRaster, SrtmResolution};

/// Read access to an elevation raster.
pub trait RasterSampler {
    /// Sample one value per coordinate, in the order given.
    ///
    /// Coordinates are `x = longitude`, `y = latitude` in degrees. A
    /// coordinate outside the raster or on a no-data cell yields `None`.
    fn sample(&self, coords: &[Coord]) -> Vec<Option<f64>>;

    /// Extent covered by the raster.
    fn bounds(&self) -> Rect<f64>;
}

/// Open the raster at `path`.
///
/// `.hgt` rasters are georeferenced from an SRTM file name, or from
/// `fallback_origin` (south-west corner as `(lat, lon)`) when the name
/// carries none. `.asc` rasters carry their own georeference.
pub fn open_raster(path: &Path, fallback_origin: Option<(i32, i32)>) -> Result<Box<dyn RasterSampler>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("hgt") => {
            let origin = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(filename_to_lat_lon)
                .or(fallback_origin)
                .ok_or_else(|| ElevationError::InvalidFilename {
                    path: path.to_path_buf(),
                })?;
            let raster = HgtRaster::from_file_with_coords(path, origin.0, origin.1)?;
            Ok(Box::new(raster))
        }
        Some("asc") => Ok(Box::new(AsciiGrid::from_file(path)?)),
        _ => Err(ElevationError::InvalidRaster {
            path: path.to_path_buf(),
            message: "unsupported raster format (expected .hgt or .asc)".to_string(),
        }),
    }
}

/// Find the raster for `id` in `folder`.
///
/// Looks for `<id>.<extension>` first. If only `<id>.<extension>.zip`
/// exists, the raster is extracted next to the archive. Returns `Ok(None)`
/// when neither is present.
pub fn locate_resource(folder: &Path, id: &TileId, extension: &str) -> Result<Option<PathBuf>> {
    let path = resource_path(folder, id, extension);
    if path.exists() {
        return Ok(Some(path));
    }

    let zip_path = zip_resource_path(folder, id, extension);
    if zip_path.exists() {
        extract_from_zip(&zip_path, &path, extension)?;
        return Ok(Some(path));
    }

    Ok(None)
}

/// Extract the raster entry of a zip archive to `out_path`.
fn extract_from_zip(zip_path: &Path, out_path: &Path, extension: &str) -> Result<()> {
    let invalid = |e: zip::result::ZipError| io::Error::new(io::ErrorKind::InvalidData, e);

    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(invalid)?;

    let filename = out_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let suffix = format!(".{}", extension);

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(invalid)?;
        let entry_name = entry.name().to_string();
        if entry_name == filename || entry_name.ends_with(&suffix) {
            let mut out_file = File::create(out_path)?;
            io::copy(&mut entry, &mut out_file)?;
            tracing::debug!(archive = %zip_path.display(), entry = %entry_name, "Extracted raster");
            return Ok(());
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("No .{} file found in {}", extension, zip_path.display()),
    )
    .into())
}
