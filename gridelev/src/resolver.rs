//! Batched elevation resolution.
//!
//! Points are matched to the tile whose extent contains them, grouped by
//! tile, and each group is sampled with one call against that tile's
//! raster. Group results are then scattered back into input order by
//! [`assemble`](crate::assemble::assemble).
//!
//! Unmatched points and groups whose raster is missing or unreadable are
//! not errors: they come back as `None`, with one warning for all
//! unmatched points and one per missing raster.
//!
//! # Example
//!
//! ```ignore
//! use gridelev::{ElevationSource, PointSet, ResolverBuilder, TileIndex};
//!
//! let resolver = ResolverBuilder::new().raster_extension("hgt").build();
//! let index = TileIndex::from_geojson_file("files/SRTM.geojson", "id")?;
//! let source = ElevationSource::Tiled { index, folder: "files/images".into() };
//!
//! let points = PointSet::from_lon_lat(&[(138.7274, 35.3606)])?;
//! let resolution = resolver.resolve(&points, &source)?;
//! println!("{:?}", resolution.elevations);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use geo::Coord;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::assemble::{assemble, SampledGroup};
use crate::error::{ElevationError, Result};
use crate::filename::resource_path;
use crate::frame::ReferenceFrame;
use crate::points::{Point, PointSet};
use crate::raster::{locate_resource, open_raster};
use crate::tile_index::{Tile, TileIndex};

/// Paths and naming used to find the tile index and rasters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// GeoJSON tile index.
    pub tile_index: PathBuf,
    /// Folder of tile rasters, or a single raster file.
    pub rasters: PathBuf,
    /// Raster file extension, without the dot.
    pub raster_extension: String,
    /// Tile index property holding each tile's id.
    pub id_field: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tile_index: PathBuf::from("files/SRTM.geojson"),
            rasters: PathBuf::from("files/images"),
            raster_extension: "hgt".to_string(),
            id_field: "id".to_string(),
        }
    }
}

/// What points are resolved against.
pub enum ElevationSource {
    /// One raster covering every point.
    SingleRaster(PathBuf),
    /// A tile index plus the folder holding `<id>.<ext>` rasters.
    Tiled { index: TileIndex, folder: PathBuf },
}

/// Which tile a point was matched to, by tile ordinal. `None` means the
/// point lies outside every tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub index: usize,
    pub tile: Option<usize>,
}

/// Counters for one resolve run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveStats {
    /// Number of input points.
    pub total_points: usize,
    /// Points that fell inside a tile.
    pub matched_points: usize,
    /// Points outside every tile.
    pub unmatched_points: usize,
    /// Distinct tiles with at least one point.
    pub groups: usize,
    /// Raster sampling calls made.
    pub sampler_calls: usize,
    /// Rasters that were missing or could not be opened.
    pub missing_resources: Vec<PathBuf>,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

/// Elevations in input order plus run counters.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub elevations: Vec<Option<f64>>,
    pub stats: ResolveStats,
}

enum GroupOutcome {
    Sampled(SampledGroup),
    /// No usable raster. `error` is set when one was found but failed to
    /// open.
    Missing {
        resource: PathBuf,
        indices: Vec<usize>,
        error: Option<String>,
    },
}

/// Resolves elevations for point sets.
#[derive(Debug, Clone, Default)]
pub struct ElevationResolver {
    config: ResolverConfig,
}

impl ElevationResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Build the source described by the configuration.
    ///
    /// A `rasters` directory selects tiled mode and loads the tile index; a
    /// `rasters` file selects single-raster mode.
    pub fn elevation_source(&self) -> Result<ElevationSource> {
        let rasters = &self.config.rasters;
        if rasters.is_dir() {
            let index = TileIndex::from_geojson_file(&self.config.tile_index, &self.config.id_field)?;
            Ok(ElevationSource::Tiled {
                index,
                folder: rasters.clone(),
            })
        } else if rasters.is_file() {
            Ok(ElevationSource::SingleRaster(rasters.clone()))
        } else {
            Err(ElevationError::FileNotFound {
                path: rasters.clone(),
            })
        }
    }

    /// Resolve one elevation per point, in input order.
    ///
    /// # Errors
    ///
    /// - [`ElevationError::ReferenceFrameMismatch`] if the points (and, in
    ///   tiled mode, the index) are not both geographic
    /// - [`ElevationError::FileNotFound`] or a raster error if the single
    ///   raster cannot be used
    /// - [`ElevationError::Integrity`] if reassembly finds a gap or overlap
    pub fn resolve(&self, points: &PointSet, source: &ElevationSource) -> Result<Resolution> {
        let start = Instant::now();

        let mut resolution = match source {
            ElevationSource::SingleRaster(path) => self.resolve_single(points, path)?,
            ElevationSource::Tiled { index, folder } => self.resolve_tiled(points, index, folder)?,
        };

        resolution.stats.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            points = resolution.stats.total_points,
            unmatched = resolution.stats.unmatched_points,
            missing_resources = resolution.stats.missing_resources.len(),
            elapsed_ms = resolution.stats.elapsed_ms,
            "Resolved elevations"
        );
        Ok(resolution)
    }

    fn resolve_single(&self, points: &PointSet, path: &Path) -> Result<Resolution> {
        check_frames(points.frame(), ReferenceFrame::Geographic)?;

        let mut stats = ResolveStats {
            total_points: points.len(),
            ..Default::default()
        };
        if points.is_empty() {
            return Ok(Resolution {
                elevations: Vec::new(),
                stats,
            });
        }
        if !path.exists() {
            return Err(ElevationError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let sampler = open_raster(path, None)?;
        let group = SampledGroup {
            tile: path.display().to_string().into(),
            indices: (0..points.len()).collect(),
            values: sampler.sample(&points.coords()),
        };
        stats.matched_points = points.len();
        stats.groups = 1;
        stats.sampler_calls = 1;

        let elevations = assemble(std::slice::from_ref(&group), &[], points.len())?;
        Ok(Resolution { elevations, stats })
    }

    fn resolve_tiled(&self, points: &PointSet, index: &TileIndex, folder: &Path) -> Result<Resolution> {
        check_frames(points.frame(), index.frame())?;

        let assignments = assign(index, points.points());
        let (groups, unmatched) = group(&assignments);

        if !unmatched.is_empty() {
            tracing::warn!(
                count = unmatched.len(),
                "{} point(s) fall outside every tile; their elevation is unresolved",
                unmatched.len()
            );
        }

        let jobs: Vec<(usize, Vec<usize>)> = groups.into_iter().collect();

        #[cfg(feature = "rayon")]
        let outcomes: Vec<GroupOutcome> = jobs
            .into_par_iter()
            .map(|(ordinal, indices)| self.sample_group(index, ordinal, indices, points, folder))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let outcomes: Vec<GroupOutcome> = jobs
            .into_iter()
            .map(|(ordinal, indices)| self.sample_group(index, ordinal, indices, points, folder))
            .collect();

        let mut stats = ResolveStats {
            total_points: points.len(),
            matched_points: points.len() - unmatched.len(),
            unmatched_points: unmatched.len(),
            groups: outcomes.len(),
            ..Default::default()
        };

        let mut sampled = Vec::with_capacity(outcomes.len());
        let mut unresolved = unmatched;
        for outcome in outcomes {
            match outcome {
                GroupOutcome::Sampled(group) => {
                    stats.sampler_calls += 1;
                    sampled.push(group);
                }
                GroupOutcome::Missing {
                    resource,
                    indices,
                    error,
                } => {
                    match error {
                        None => tracing::warn!(
                            points = indices.len(),
                            "Elevation raster not found: {}",
                            resource.display()
                        ),
                        Some(error) => tracing::warn!(
                            points = indices.len(),
                            "Elevation raster unusable: {}: {}",
                            resource.display(),
                            error
                        ),
                    }
                    stats.missing_resources.push(resource);
                    unresolved.extend(indices);
                }
            }
        }

        let elevations = assemble(&sampled, &unresolved, points.len())?;
        Ok(Resolution { elevations, stats })
    }

    /// Sample every point of one tile group with a single raster call.
    ///
    /// The raster is opened here and released when this returns. Missing
    /// rasters are reported by the caller, one warning per group.
    fn sample_group(
        &self,
        index: &TileIndex,
        ordinal: usize,
        indices: Vec<usize>,
        points: &PointSet,
        folder: &Path,
    ) -> GroupOutcome {
        let Some(tile) = index.get(ordinal) else {
            return GroupOutcome::Missing {
                resource: folder.to_path_buf(),
                indices,
                error: Some(format!("no tile with ordinal {}", ordinal)),
            };
        };
        let extension = &self.config.raster_extension;

        let opened = locate_resource(folder, tile.id(), extension).and_then(|found| match found {
            Some(path) => open_raster(&path, Some(tile_origin(tile))).map(Some),
            None => Ok(None),
        });

        let resource = resource_path(folder, tile.id(), extension);
        match opened {
            Ok(Some(sampler)) => {
                let coords: Vec<Coord> = indices.iter().map(|&i| points.points()[i].coord()).collect();
                let values = sampler.sample(&coords);
                tracing::debug!(tile = %tile.id(), points = indices.len(), "Sampled tile group");
                GroupOutcome::Sampled(SampledGroup {
                    tile: tile.id().clone(),
                    indices,
                    values,
                })
            }
            Ok(None) => GroupOutcome::Missing {
                resource,
                indices,
                error: None,
            },
            Err(e) => GroupOutcome::Missing {
                resource,
                indices,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Builder for [`ElevationResolver`].
///
/// # Example
///
/// ```
/// use gridelev::ResolverBuilder;
///
/// let resolver = ResolverBuilder::new()
///     .tile_index("tiles/index.geojson")
///     .rasters("tiles")
///     .raster_extension("asc")
///     .build();
/// assert_eq!(resolver.config().raster_extension, "asc");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResolverBuilder {
    config: ResolverConfig,
}

impl ResolverBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from environment variables, falling back to the defaults.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `GRIDELEV_TILE_INDEX` | GeoJSON tile index | `files/SRTM.geojson` |
    /// | `GRIDELEV_RASTERS` | Raster folder or single raster | `files/images` |
    /// | `GRIDELEV_RASTER_EXT` | Raster extension | `hgt` |
    /// | `GRIDELEV_ID_FIELD` | Tile id property | `id` |
    pub fn from_env() -> Self {
        let mut config = ResolverConfig::default();
        if let Ok(path) = std::env::var("GRIDELEV_TILE_INDEX") {
            config.tile_index = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("GRIDELEV_RASTERS") {
            config.rasters = PathBuf::from(path);
        }
        if let Ok(ext) = std::env::var("GRIDELEV_RASTER_EXT") {
            config.raster_extension = ext.trim_start_matches('.').to_string();
        }
        if let Ok(field) = std::env::var("GRIDELEV_ID_FIELD") {
            config.id_field = field;
        }
        Self { config }
    }

    pub fn tile_index<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.tile_index = path.as_ref().to_path_buf();
        self
    }

    pub fn rasters<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.rasters = path.as_ref().to_path_buf();
        self
    }

    /// Raster extension, with or without a leading dot.
    pub fn raster_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.config.raster_extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.config.id_field = field.into();
        self
    }

    pub fn build(self) -> ElevationResolver {
        ElevationResolver::new(self.config)
    }
}

/// Match every point to a tile.
///
/// A point on a boundary shared by several tiles, or inside overlapping
/// tiles, goes to the lowest tile ordinal.
pub fn assign(index: &TileIndex, points: &[Point]) -> Vec<Assignment> {
    points
        .iter()
        .map(|p| Assignment {
            index: p.index,
            tile: index.locate(p.coord()),
        })
        .collect()
}

/// Split assignments into per-tile index lists (keyed by ordinal, each in
/// input order) and the unmatched indices.
pub fn group(assignments: &[Assignment]) -> (BTreeMap<usize, Vec<usize>>, Vec<usize>) {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut unmatched = Vec::new();
    for assignment in assignments {
        match assignment.tile {
            Some(ordinal) => groups.entry(ordinal).or_default().push(assignment.index),
            None => unmatched.push(assignment.index),
        }
    }
    (groups, unmatched)
}

fn check_frames(points: ReferenceFrame, tiles: ReferenceFrame) -> Result<()> {
    if points != tiles || !points.is_geographic() {
        return Err(ElevationError::ReferenceFrameMismatch { points, tiles });
    }
    Ok(())
}

/// South-west corner of a tile as whole degrees `(lat, lon)`, used to
/// georeference rasters whose name carries no origin.
fn tile_origin(tile: &Tile) -> (i32, i32) {
    let min = tile.bounds().min();
    (min.y.floor() as i32, min.x.floor() as i32)
}
