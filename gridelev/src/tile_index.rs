//! Tile index: named extents that route points to rasters.
//!
//! A [`TileIndex`] is loaded once per run from a GeoJSON FeatureCollection
//! (one polygon feature per tile plus an id property) or built from a folder
//! of SRTM `.hgt` files, and is read-only afterwards. Containment queries go
//! through an R-tree of tile envelopes and are confirmed with an exact
//! polygon test.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::{
    BoundingRect, Coord, Intersects, LineString, MapCoordsInPlace, MultiPolygon, Polygon, Rect,
};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{ElevationError, Result};
use crate::filename::{filename_to_lat_lon, tile_stem};
use crate::frame::{ReferenceFrame, ToGeographic};

/// Unique identifier of a tile, also the stem of its raster file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(String);

impl TileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TileId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// A named polygonal extent backed by one raster.
#[derive(Debug, Clone)]
pub struct Tile {
    id: TileId,
    extent: MultiPolygon<f64>,
    bounds: Rect<f64>,
}

impl Tile {
    /// Create a tile. Fails if the extent is empty.
    pub fn new(id: impl Into<TileId>, extent: MultiPolygon<f64>) -> Result<Self> {
        let id = id.into();
        let bounds = extent
            .bounding_rect()
            .ok_or_else(|| ElevationError::InvalidInput {
                message: format!("tile {} has an empty extent", id),
            })?;
        Ok(Self { id, extent, bounds })
    }

    /// A 1° × 1° tile with its south-west corner at (`lat`, `lon`).
    pub fn from_degree_cell(id: impl Into<TileId>, lat: i32, lon: i32) -> Self {
        let rect = Rect::new(
            Coord { x: lon as f64, y: lat as f64 },
            Coord { x: (lon + 1) as f64, y: (lat + 1) as f64 },
        );
        let extent = MultiPolygon::new(vec![rect.to_polygon()]);
        Self {
            id: id.into(),
            extent,
            bounds: rect,
        }
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn extent(&self) -> &MultiPolygon<f64> {
        &self.extent
    }

    /// Axis-aligned bounds of the extent.
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Whether `coord` lies inside the extent or on its boundary.
    pub fn contains(&self, coord: Coord) -> bool {
        self.extent.0.iter().any(|polygon| polygon.intersects(&coord))
    }
}

/// R-tree entry pointing back at a tile by its load order.
struct TileEnvelope {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for TileEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Collection of uniquely identified tiles in one reference frame.
///
/// Tiles keep the order they were loaded in. That order (the tile
/// *ordinal*) breaks ties when extents overlap: the lowest ordinal wins.
/// Overlapping tiles are tolerated but not otherwise supported.
pub struct TileIndex {
    tiles: Vec<Tile>,
    frame: ReferenceFrame,
    tree: RTree<TileEnvelope>,
}

impl TileIndex {
    /// Build an index, rejecting duplicate ids.
    pub fn new(tiles: Vec<Tile>, frame: ReferenceFrame) -> Result<Self> {
        let mut seen = HashSet::new();
        for tile in &tiles {
            if !seen.insert(tile.id.as_str()) {
                return Err(ElevationError::DuplicateTileId {
                    id: tile.id.to_string(),
                });
            }
        }

        let entries = tiles
            .iter()
            .enumerate()
            .map(|(ordinal, tile)| {
                let min = tile.bounds.min();
                let max = tile.bounds.max();
                TileEnvelope {
                    ordinal,
                    envelope: AABB::from_corners([min.x, min.y], [max.x, max.y]),
                }
            })
            .collect();

        Ok(Self {
            tiles,
            frame,
            tree: RTree::bulk_load(entries),
        })
    }

    /// Load an index from a GeoJSON file.
    ///
    /// Each feature must carry a Polygon or MultiPolygon geometry and an id,
    /// read from the `id_field` property or, failing that, the feature id.
    /// Projected indexes are converted to degrees on load when a
    /// transformation exists (see [`ToGeographic`]).
    pub fn from_geojson_file<P: AsRef<Path>>(path: P, id_field: &str) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let geojson: GeoJson = serde_json::from_reader(BufReader::new(file))?;
        Self::from_geojson(geojson, id_field)
    }

    /// Load an index from a GeoJSON string.
    pub fn from_geojson_str(s: &str, id_field: &str) -> Result<Self> {
        let geojson: GeoJson = serde_json::from_str(s)?;
        Self::from_geojson(geojson, id_field)
    }

    /// Load an index from a parsed GeoJSON document.
    pub fn from_geojson(geojson: GeoJson, id_field: &str) -> Result<Self> {
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            _ => {
                return Err(ElevationError::InvalidInput {
                    message: "tile index must be a FeatureCollection".to_string(),
                })
            }
        };

        let mut frame = match collection
            .foreign_members
            .as_ref()
            .and_then(|members| members.get("crs"))
        {
            Some(crs) => ReferenceFrame::from_crs_member(crs)?,
            None => ReferenceFrame::Geographic,
        };

        let mut tiles = Vec::with_capacity(collection.features.len());
        for (i, feature) in collection.features.iter().enumerate() {
            let id = feature_tile_id(feature, id_field).ok_or_else(|| {
                ElevationError::InvalidInput {
                    message: format!("feature {} has no '{}' property or id", i, id_field),
                }
            })?;
            let geometry = feature
                .geometry
                .as_ref()
                .ok_or_else(|| ElevationError::InvalidGeometry {
                    feature: i,
                    message: "missing geometry".to_string(),
                })?;
            let extent = match &geometry.value {
                Value::Polygon(rings) => MultiPolygon::new(vec![polygon_from_rings(rings, i)?]),
                Value::MultiPolygon(polygons) => MultiPolygon::new(
                    polygons
                        .iter()
                        .map(|rings| polygon_from_rings(rings, i))
                        .collect::<Result<Vec<_>>>()?,
                ),
                other => {
                    return Err(ElevationError::InvalidGeometry {
                        feature: i,
                        message: format!(
                            "expected Polygon or MultiPolygon, got {}",
                            geometry_type(other)
                        ),
                    })
                }
            };
            tiles.push(Tile::new(id, extent)?);
        }

        if let Some(transform) = ToGeographic::for_frame(frame) {
            let converted = tiles
                .iter()
                .map(|tile| {
                    let mut extent = tile.extent.clone();
                    extent.try_map_coords_in_place(|c| transform.convert(c))?;
                    Ok(extent)
                })
                .collect::<std::result::Result<Vec<_>, String>>();
            match converted {
                Ok(extents) => {
                    for (tile, extent) in tiles.iter_mut().zip(extents) {
                        if let Some(bounds) = extent.bounding_rect() {
                            tile.bounds = bounds;
                        }
                        tile.extent = extent;
                    }
                    frame = ReferenceFrame::Geographic;
                }
                Err(message) => {
                    tracing::warn!(%frame, "Could not convert tile extents to degrees: {}", message);
                }
            }
        }

        tracing::debug!(tiles = tiles.len(), %frame, "Loaded tile index");
        Self::new(tiles, frame)
    }

    /// Build an index of 1° × 1° extents from the SRTM files in `folder`.
    ///
    /// Both `.hgt` and `.hgt.zip` files are discovered; each tile id is the
    /// file stem, so the resolver finds the raster again under the same
    /// name. Files whose name does not encode a south-west corner are
    /// skipped.
    pub fn from_hgt_folder<P: AsRef<Path>>(folder: P) -> Result<Self> {
        let mut cells = BTreeMap::new();

        for entry in std::fs::read_dir(folder.as_ref())?.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = tile_stem(&name, "hgt") else {
                continue;
            };
            match filename_to_lat_lon(stem) {
                Some(origin) => {
                    cells.insert(stem.to_string(), origin);
                }
                None => tracing::debug!(file = %name, "Skipping file without SRTM origin"),
            }
        }

        let tiles = cells
            .into_iter()
            .map(|(stem, (lat, lon))| Tile::from_degree_cell(stem, lat, lon))
            .collect();
        Self::new(tiles, ReferenceFrame::Geographic)
    }

    /// Serialise the index as a FeatureCollection with ids under `id_field`.
    pub fn to_geojson(&self, id_field: &str) -> FeatureCollection {
        let features = self
            .tiles
            .iter()
            .map(|tile| {
                let mut properties = JsonObject::new();
                properties.insert(id_field.to_string(), tile.id.as_str().into());
                let value = match tile.extent.0.as_slice() {
                    [single] => Value::Polygon(polygon_to_rings(single)),
                    many => Value::MultiPolygon(many.iter().map(polygon_to_rings).collect()),
                };
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(value)),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    /// Ordinal of the tile containing `coord`, if any.
    ///
    /// Containment includes the boundary: a point exactly on a tile edge is
    /// matched, where a strict-interior ("within") test would leave it
    /// unmatched. When several tiles contain the point, as on a shared edge,
    /// the lowest ordinal is returned.
    pub fn locate(&self, coord: Coord) -> Option<usize> {
        let probe = AABB::from_point([coord.x, coord.y]);
        self.tree
            .locate_in_envelope_intersecting(&probe)
            .map(|entry| entry.ordinal)
            .filter(|&ordinal| self.tiles[ordinal].contains(coord))
            .min()
    }

    /// Tile at `ordinal`.
    pub fn get(&self, ordinal: usize) -> Option<&Tile> {
        self.tiles.get(ordinal)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn frame(&self) -> ReferenceFrame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Read a tile id from the feature's `id_field` property or its GeoJSON id.
///
/// Integer ids are normalised to their decimal form.
fn feature_tile_id(feature: &Feature, id_field: &str) -> Option<TileId> {
    let from_property = feature
        .properties
        .as_ref()
        .and_then(|props| props.get(id_field))
        .and_then(json_to_id);
    if from_property.is_some() {
        return from_property;
    }
    match feature.id.as_ref()? {
        Id::String(s) => Some(TileId::from(s.as_str())),
        Id::Number(n) => json_to_id(&serde_json::Value::Number(n.clone())),
    }
}

fn json_to_id(value: &serde_json::Value) -> Option<TileId> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(TileId::from(s.as_str())),
        serde_json::Value::Number(n) => {
            let text = match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => i.to_string(),
                (None, Some(u)) => u.to_string(),
                _ => n.to_string(),
            };
            Some(TileId::from(text))
        }
        _ => None,
    }
}

/// Convert GeoJSON polygon rings (exterior first) into a polygon.
pub(crate) fn polygon_from_rings(rings: &[Vec<Vec<f64>>], feature: usize) -> Result<Polygon<f64>> {
    let mut converted = rings.iter().map(|ring| {
        ring.iter()
            .map(|position| position_to_coord(position, feature))
            .collect::<Result<Vec<_>>>()
            .map(LineString::from)
    });

    let exterior = match converted.next() {
        Some(ring) => ring?,
        None => {
            return Err(ElevationError::InvalidGeometry {
                feature,
                message: "polygon has no rings".to_string(),
            })
        }
    };
    if exterior.0.len() < 3 {
        return Err(ElevationError::InvalidGeometry {
            feature,
            message: "polygon exterior ring has fewer than 3 positions".to_string(),
        });
    }
    let interiors = converted.collect::<Result<Vec<_>>>()?;

    Ok(Polygon::new(exterior, interiors))
}

/// Read the `[x, y, ...]` part of a GeoJSON position.
pub(crate) fn position_to_coord(position: &[f64], feature: usize) -> Result<Coord> {
    match position {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
        [_, _, ..] => Err(ElevationError::InvalidGeometry {
            feature,
            message: "position is not finite".to_string(),
        }),
        _ => Err(ElevationError::InvalidGeometry {
            feature,
            message: "position must have at least 2 elements".to_string(),
        }),
    }
}

/// GeoJSON type name of a geometry value.
pub(crate) fn geometry_type(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn polygon_to_rings(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
        .collect()
}
