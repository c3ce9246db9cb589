//! # gridelev - Batched elevation lookup against tiled DEMs
//!
//! Resolve ground elevation for a batch of (longitude, latitude) points
//! against a digital elevation model split into tiles, one value (or
//! "unknown") per point, in input order.
//!
//! ## How a batch is resolved
//!
//! 1. Each point is matched to the tile whose extent contains it, using a
//!    [`TileIndex`] loaded from GeoJSON or built from a folder of `.hgt`
//!    files.
//! 2. Matched points are grouped by tile.
//! 3. Each tile's raster (`<folder>/<id>.<ext>`, optionally zipped) is
//!    opened once and sampled once with the whole group.
//! 4. Group results are scattered back into input order.
//!
//! Points outside every tile, and points whose tile raster is missing, come
//! back as `None` with a warning instead of failing the run.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gridelev::{Orchestrator, OutputMode, PointSource, ResolverBuilder};
//!
//! let resolver = ResolverBuilder::new()
//!     .tile_index("files/SRTM.geojson")
//!     .rasters("files/images")
//!     .build();
//!
//! let orchestrator = Orchestrator::new(resolver, OutputMode::Return);
//! let outcome = orchestrator.process(&PointSource::Inline(vec![(138.7274, 35.3606)]))?;
//! ```
//!
//! ## Raster formats
//!
//! - **SRTM `.hgt`**: 1201×1201 or 3601×3601 big-endian `i16` samples,
//!   -32768 for void, georeferenced from the `N35E138` style file name or
//!   from the tile extent
//! - **ESRI ASCII grid `.asc`**: self-georeferenced text grids
//!
//! ## Features
//!
//! - `rayon`: sample tile groups in parallel
//! - `proj`: convert any projected input (UTM, national grids) to degrees
//!   with PROJ; without it only Web Mercator is converted

pub mod assemble;
pub mod error;
pub mod filename;
pub mod frame;
pub mod orchestrator;
pub mod output;
pub mod points;
pub mod raster;
pub mod resolver;
pub mod tile_index;

// Re-export main types at crate root for convenience
pub use assemble::{assemble, SampledGroup};
pub use error::{ElevationError, IntegrityError, Result};
pub use frame::{ReferenceFrame, ToGeographic};
pub use orchestrator::{Orchestrator, Outcome, OutputMode};
pub use points::{LoadOptions, Point, PointSet, PointSource};
pub use raster::{open_raster, RasterSampler};
pub use resolver::{
    Assignment, ElevationResolver, ElevationSource, Resolution, ResolveStats, ResolverBuilder,
    ResolverConfig,
};
pub use tile_index::{Tile, TileId, TileIndex};
