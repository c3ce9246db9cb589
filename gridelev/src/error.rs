//! Error types for the gridelev library.

use std::path::PathBuf;
use thiserror::Error;

use crate::frame::ReferenceFrame;

/// Errors that can occur while loading inputs or resolving elevations.
///
/// Unmatched points and missing tile rasters are *not* errors: they are
/// reported as `None` elevations plus a warning. Everything here aborts the
/// run.
#[derive(Error, Debug)]
pub enum ElevationError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON or GeoJSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed CSV document.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The point source yielded nothing usable.
    #[error("No coordinates provided")]
    NoCoordinates,

    /// File extension is not one of the supported vector formats.
    #[error("Unsupported file format: {path} (expected .geojson, .json or .csv)")]
    UnsupportedFormat { path: PathBuf },

    /// Input data is readable but not well-formed for its purpose.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A geometry could not be used (wrong type, empty ring, bad coordinate).
    #[error("Invalid geometry in feature {feature}: {message}")]
    InvalidGeometry { feature: usize, message: String },

    /// Two tiles in the same index share an identifier.
    #[error("Duplicate tile id in tile index: {id}")]
    DuplicateTileId { id: String },

    /// Points and tiles are not both expressed in geographic degrees.
    #[error("Reference frame mismatch: points are {points}, tiles are {tiles} (both must be geographic degrees)")]
    ReferenceFrameMismatch {
        points: ReferenceFrame,
        tiles: ReferenceFrame,
    },

    /// File size doesn't match SRTM1 or SRTM3 format.
    #[error("Invalid file size: {size} bytes (expected 25934402 for SRTM1 or 2884802 for SRTM3)")]
    InvalidFileSize { size: usize },

    /// Coordinates fall outside the raster they were looked up in.
    #[error("Coordinates out of bounds: lat={lat}, lon={lon}")]
    OutOfBounds { lat: f64, lon: f64 },

    /// Raster file content could not be parsed.
    #[error("Invalid raster {path}: {message}")]
    InvalidRaster { path: PathBuf, message: String },

    /// The raster has no georeference of its own and none was supplied.
    #[error("Cannot derive tile origin from filename: {path}")]
    InvalidFilename { path: PathBuf },

    /// A required raster file was not found.
    #[error("Raster file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Result assembly detected a grouping bug.
    #[error("Data integrity violation: {0}")]
    Integrity(#[from] IntegrityError),
}

/// Invariant violations detected while scattering group results back into
/// input order.
///
/// These indicate a bug in assignment or grouping, never a data problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// An index received a value from more than one group.
    #[error("index {index} written twice")]
    DuplicateWrite { index: usize },

    /// An index received no value and was not marked unresolved.
    #[error("index {index} never written")]
    MissingWrite { index: usize },

    /// A group referenced an index past the end of the input.
    #[error("index {index} out of range for {total} points")]
    IndexOutOfRange { index: usize, total: usize },

    /// A sampler returned a different number of values than it was given.
    #[error("tile {tile}: sampler returned {actual} values for {expected} points")]
    SampleCountMismatch {
        tile: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
