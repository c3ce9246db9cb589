//! SRTM `.hgt` rasters.
//!
//! This module provides [`HgtRaster`] for reading SRTM `.hgt` files and
//! sampling elevation at specific coordinates.
//!
//! SRTM files contain elevation data in a simple binary format:
//!
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m) resolution
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m) resolution
//!
//! Each sample is a 16-bit big-endian signed integer representing elevation in meters.
//! The special value -32768 indicates void (no data).

use std::fs::File;
use std::path::Path;

use geo::{Coord, Rect};
use memmap2::Mmap;

use crate::error::{ElevationError, Result};
use crate::filename::filename_to_lat_lon;
use crate::raster::RasterSampler;

/// File size for SRTM1 (1 arc-second, ~30m resolution): 3601 × 3601 × 2 bytes
pub const SRTM1_SIZE: usize = 3601 * 3601 * 2; // 25,934,402 bytes

/// File size for SRTM3 (3 arc-second, ~90m resolution): 1201 × 1201 × 2 bytes
pub const SRTM3_SIZE: usize = 1201 * 1201 * 2; // 2,884,802 bytes

/// Number of samples per row/column for SRTM1
const SRTM1_SAMPLES: usize = 3601;

/// Number of samples per row/column for SRTM3
const SRTM3_SAMPLES: usize = 1201;

/// Value indicating no data (void) in SRTM files
pub const VOID_VALUE: i16 = -32768;

/// Resolution type of an SRTM raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtmResolution {
    /// SRTM1: 1 arc-second (~30m) resolution
    Srtm1,
    /// SRTM3: 3 arc-second (~90m) resolution
    Srtm3,
}

impl SrtmResolution {
    /// Detect the resolution from a file size in bytes.
    pub fn from_file_size(size: u64) -> Option<Self> {
        match usize::try_from(size).ok()? {
            SRTM1_SIZE => Some(SrtmResolution::Srtm1),
            SRTM3_SIZE => Some(SrtmResolution::Srtm3),
            _ => None,
        }
    }

    /// Returns the number of samples per row/column for this resolution.
    pub fn samples(&self) -> usize {
        match self {
            SrtmResolution::Srtm1 => SRTM1_SAMPLES,
            SrtmResolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    /// Returns the approximate resolution in meters.
    pub fn meters(&self) -> f64 {
        match self {
            SrtmResolution::Srtm1 => 30.0,
            SrtmResolution::Srtm3 => 90.0,
        }
    }
}

/// A memory-mapped SRTM raster covering one 1° × 1° cell.
///
/// The mapping is released when the raster is dropped.
pub struct HgtRaster {
    /// Memory-mapped file data
    data: Mmap,
    /// Number of samples per row/column (1201 or 3601)
    samples: usize,
    /// Resolution type
    resolution: SrtmResolution,
    /// Southwest corner latitude (integer)
    base_lat: i32,
    /// Southwest corner longitude (integer)
    base_lon: i32,
}

impl HgtRaster {
    /// Load a raster whose name encodes its south-west corner (`N35E138.hgt`).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name does not follow the SRTM convention
    /// - The file cannot be opened or memory-mapped
    /// - The file size doesn't match SRTM1 or SRTM3 format
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (base_lat, base_lon) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(filename_to_lat_lon)
            .ok_or_else(|| ElevationError::InvalidFilename {
                path: path.to_path_buf(),
            })?;
        Self::from_file_with_coords(path, base_lat, base_lon)
    }

    /// Load a raster with explicit base coordinates.
    ///
    /// This is useful when the filename doesn't follow the standard naming convention.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the `.hgt` file
    /// * `base_lat` - Latitude of the southwest corner (integer)
    /// * `base_lon` - Longitude of the southwest corner (integer)
    pub fn from_file_with_coords<P: AsRef<Path>>(
        path: P,
        base_lat: i32,
        base_lon: i32,
    ) -> Result<Self> {
        let file = File::open(&path)?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let mmap = unsafe { Mmap::map(&file)? };

        let resolution = SrtmResolution::from_file_size(mmap.len() as u64)
            .ok_or(ElevationError::InvalidFileSize { size: mmap.len() })?;

        Ok(Self {
            data: mmap,
            samples: resolution.samples(),
            resolution,
            base_lat,
            base_lon,
        })
    }

    /// Get the elevation at the specified coordinates (nearest sample).
    ///
    /// # Returns
    ///
    /// The elevation in meters, or [`VOID_VALUE`] (-32768) if no data is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinates are outside the raster's cell.
    pub fn get_elevation(&self, lat: f64, lon: f64) -> Result<i16> {
        // Fractional position within the cell, measured from the south-west corner
        let lat_frac = lat - self.base_lat as f64;
        let lon_frac = lon - self.base_lon as f64;

        if !(0.0..=1.0).contains(&lat_frac) || !(0.0..=1.0).contains(&lon_frac) {
            return Err(ElevationError::OutOfBounds { lat, lon });
        }

        // Rows are inverted: row 0 is the north edge (top of file)
        let row = ((1.0 - lat_frac) * (self.samples - 1) as f64).round() as usize;
        let col = (lon_frac * (self.samples - 1) as f64).round() as usize;

        Ok(self.get_elevation_at(row, col))
    }

    /// Get elevation at a specific row/column index.
    ///
    /// # Arguments
    ///
    /// * `row` - Row index (0 = north edge)
    /// * `col` - Column index (0 = west edge)
    fn get_elevation_at(&self, row: usize, col: usize) -> i16 {
        let row = row.min(self.samples - 1);
        let col = col.min(self.samples - 1);

        // 2 bytes per sample, row-major order
        let offset = (row * self.samples + col) * 2;

        i16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Returns the resolution of this raster.
    pub fn resolution(&self) -> SrtmResolution {
        self.resolution
    }

    /// Returns the number of samples per row/column.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Returns the base latitude (southwest corner).
    pub fn base_lat(&self) -> i32 {
        self.base_lat
    }

    /// Returns the base longitude (southwest corner).
    pub fn base_lon(&self) -> i32 {
        self.base_lon
    }
}

impl RasterSampler for HgtRaster {
    fn sample(&self, coords: &[Coord]) -> Vec<Option<f64>> {
        coords
            .iter()
            .map(|c| match self.get_elevation(c.y, c.x) {
                Ok(v) if v != VOID_VALUE => Some(v as f64),
                _ => None,
            })
            .collect()
    }

    fn bounds(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.base_lon as f64,
                y: self.base_lat as f64,
            },
            Coord {
                x: (self.base_lon + 1) as f64,
                y: (self.base_lat + 1) as f64,
            },
        )
    }
}
