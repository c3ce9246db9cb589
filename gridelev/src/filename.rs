//! Tile resource naming.
//!
//! A tile's raster lives at `<tiles_folder>/<id>.<extension>`, optionally
//! packed as `<id>.<extension>.zip`. SRTM rasters additionally encode their
//! south-west corner in the name.
//!
//! # SRTM Filename Format
//!
//! `{N|S}{lat}{E|W}{lon}.hgt`
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N35, S12)
//! - Longitude: 3 digits with E/W prefix (e.g., E138, W077)
//!
//! The name represents the **southwest corner** of the 1° × 1° tile.

use std::path::{Path, PathBuf};

use crate::tile_index::TileId;

/// Path of the raster backing `id`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use gridelev::filename::resource_path;
/// use gridelev::TileId;
///
/// let path = resource_path(Path::new("/dem"), &TileId::from("N35E138"), "hgt");
/// assert_eq!(path, Path::new("/dem/N35E138.hgt"));
/// ```
pub fn resource_path(folder: &Path, id: &TileId, extension: &str) -> PathBuf {
    folder.join(format!("{}.{}", id, extension))
}

/// Path of the zip archive that may hold the raster for `id`.
pub fn zip_resource_path(folder: &Path, id: &TileId, extension: &str) -> PathBuf {
    folder.join(format!("{}.{}.zip", id, extension))
}

/// Strip `.<extension>` or `.<extension>.zip` from a file name.
///
/// Returns `None` for files of any other type.
///
/// # Examples
///
/// ```
/// use gridelev::filename::tile_stem;
///
/// assert_eq!(tile_stem("N35E138.hgt", "hgt"), Some("N35E138"));
/// assert_eq!(tile_stem("N35E138.hgt.zip", "hgt"), Some("N35E138"));
/// assert_eq!(tile_stem("readme.txt", "hgt"), None);
/// ```
pub fn tile_stem<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    let name = name.strip_suffix(".zip").unwrap_or(name);
    let stem = name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Parse an SRTM filename to extract the base coordinates.
///
/// # Arguments
///
/// * `filename` - The filename (with or without path, with or without
///   `.hgt` / `.hgt.zip` extension)
///
/// # Returns
///
/// The (latitude, longitude) of the southwest corner, or `None` if parsing fails.
///
/// # Examples
///
/// ```
/// use gridelev::filename::filename_to_lat_lon;
///
/// assert_eq!(filename_to_lat_lon("N35E138.hgt"), Some((35, 138)));
/// assert_eq!(filename_to_lat_lon("S12W077.hgt.zip"), Some((-12, -77)));
/// assert_eq!(filename_to_lat_lon("/path/to/N00E000.hgt"), Some((0, 0)));
/// assert_eq!(filename_to_lat_lon("A"), None);
/// ```
pub fn filename_to_lat_lon(filename: &str) -> Option<(i32, i32)> {
    // Extract just the filename if a path is given
    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename);

    let name = name.strip_suffix(".zip").unwrap_or(name);
    let name = name.strip_suffix(".hgt").unwrap_or(name);

    // Must be exactly 7 characters: N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }

    let chars: Vec<char> = name.chars().collect();

    let lat_sign = match chars[0] {
        'N' | 'n' => 1,
        'S' | 's' => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;

    let lon_sign = match chars[3] {
        'E' | 'e' => 1,
        'W' | 'w' => -1,
        _ => return None,
    };
    let lon: i32 = name[4..7].parse().ok()?;

    Some((lat * lat_sign, lon * lon_sign))
}
