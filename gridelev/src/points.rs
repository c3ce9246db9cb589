//! Coordinate sources.
//!
//! Points come either from a file (`.geojson`, `.json`, `.csv`) or from an
//! inline list of `(lon, lat)` pairs. Whatever the source, the result is a
//! [`PointSet`]: points in input order, each tagged with its original
//! position, plus the reference frame they are expressed in and the
//! original attributes of each record.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use geo::Coord;
use geojson::{Feature, GeoJson, Geometry, JsonObject, Value};
use serde::Deserialize;

use crate::error::{ElevationError, Result};
use crate::frame::{to_geographic, ReferenceFrame};
use crate::tile_index::{geometry_type, position_to_coord};

/// A query point. `index` is its position in the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub index: usize,
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn coord(&self) -> Coord {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

/// Where points are read from.
#[derive(Debug, Clone)]
pub enum PointSource {
    /// A `.geojson`, `.json` or `.csv` file.
    File(PathBuf),
    /// `(lon, lat)` pairs in degrees.
    Inline(Vec<(f64, f64)>),
}

/// Column names used when reading CSV points.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub lon_column: String,
    pub lat_column: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            lon_column: "lon".to_string(),
            lat_column: "lat".to_string(),
        }
    }
}

/// Ordered points in one reference frame.
#[derive(Debug, Clone)]
pub struct PointSet {
    points: Vec<Point>,
    frame: ReferenceFrame,
    attributes: Vec<Option<JsonObject>>,
}

/// `{"geometry": [[lon, lat], ...]}`
#[derive(Deserialize)]
struct CoordinatePayload {
    geometry: Option<Vec<Vec<f64>>>,
}

impl PointSet {
    /// Build a set from coordinates already in `frame`, without attributes.
    ///
    /// Projected coordinates are converted to degrees when a transformation
    /// exists (see [`ToGeographic`](crate::frame::ToGeographic)); otherwise
    /// they are kept as tagged.
    pub fn new(coords: Vec<Coord>, frame: ReferenceFrame) -> Result<Self> {
        let attributes = vec![None; coords.len()];
        Self::with_attributes(coords, frame, attributes)
    }

    /// Build a geographic set from `(lon, lat)` pairs.
    pub fn from_lon_lat(pairs: &[(f64, f64)]) -> Result<Self> {
        let coords = pairs
            .iter()
            .enumerate()
            .map(|(i, &(lon, lat))| {
                if lon.is_finite() && lat.is_finite() {
                    Ok(Coord { x: lon, y: lat })
                } else {
                    Err(ElevationError::InvalidInput {
                        message: format!("point {} has a non-finite coordinate", i),
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(coords, ReferenceFrame::Geographic)
    }

    fn with_attributes(
        mut coords: Vec<Coord>,
        frame: ReferenceFrame,
        attributes: Vec<Option<JsonObject>>,
    ) -> Result<Self> {
        if attributes.len() != coords.len() {
            return Err(ElevationError::InvalidInput {
                message: format!(
                    "{} attribute records for {} points",
                    attributes.len(),
                    coords.len()
                ),
            });
        }
        let frame = to_geographic(frame, &mut coords);
        let points = coords
            .into_iter()
            .enumerate()
            .map(|(index, c)| Point {
                index,
                lon: c.x,
                lat: c.y,
            })
            .collect();
        Ok(Self {
            points,
            frame,
            attributes,
        })
    }

    /// Load points from `source`.
    pub fn load(source: &PointSource, options: &LoadOptions) -> Result<Self> {
        match source {
            PointSource::Inline(pairs) => Self::from_lon_lat(pairs),
            PointSource::File(path) => Self::from_file(path, options),
        }
    }

    /// Load points from a file, choosing the reader by extension.
    pub fn from_file<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let set = match extension.as_str() {
            "geojson" => {
                let file = File::open(path)?;
                let geojson: GeoJson = serde_json::from_reader(BufReader::new(file))?;
                Self::from_geojson(geojson)?
            }
            "json" => {
                let file = File::open(path)?;
                let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
                Self::from_json_value(value)?
            }
            "csv" => Self::from_csv_reader(File::open(path)?, options)?,
            _ => {
                return Err(ElevationError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        tracing::debug!(path = %path.display(), points = set.len(), frame = %set.frame, "Loaded points");
        Ok(set)
    }

    /// Read Point features from a GeoJSON document.
    ///
    /// A FeatureCollection may carry a `crs` member naming its frame; bare
    /// features and geometries are geographic.
    pub fn from_geojson(geojson: GeoJson) -> Result<Self> {
        let (features, frame) = match geojson {
            GeoJson::FeatureCollection(fc) => {
                let frame = match fc.foreign_members.as_ref().and_then(|m| m.get("crs")) {
                    Some(crs) => ReferenceFrame::from_crs_member(crs)?,
                    None => ReferenceFrame::Geographic,
                };
                (fc.features, frame)
            }
            GeoJson::Feature(feature) => (vec![feature], ReferenceFrame::Geographic),
            GeoJson::Geometry(geometry) => (
                vec![Feature::from(geometry)],
                ReferenceFrame::Geographic,
            ),
        };

        let mut coords = Vec::with_capacity(features.len());
        let mut attributes = Vec::with_capacity(features.len());
        for (i, feature) in features.into_iter().enumerate() {
            coords.push(point_coord(feature.geometry.as_ref(), i)?);
            attributes.push(feature.properties);
        }

        Self::with_attributes(coords, frame, attributes)
    }

    /// Read a `.json` document: GeoJSON, or a coordinate payload
    /// `{"geometry": [[lon, lat], ...]}`.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        if value.get("type").is_some() {
            let geojson: GeoJson = serde_json::from_value(value)?;
            return Self::from_geojson(geojson);
        }

        let payload: CoordinatePayload = serde_json::from_value(value)?;
        let positions = payload.geometry.ok_or(ElevationError::NoCoordinates)?;
        let coords = positions
            .iter()
            .enumerate()
            .map(|(i, position)| position_to_coord(position, i))
            .collect::<Result<Vec<_>>>()?;
        Self::new(coords, ReferenceFrame::Geographic)
    }

    /// Read CSV records with a header row. Columns other than the
    /// coordinate columns are kept as string attributes.
    pub fn from_csv_reader<R: std::io::Read>(reader: R, options: &LoadOptions) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ElevationError::InvalidInput {
                    message: format!("Column '{}' not found in CSV", name),
                })
        };
        let lon_idx = column(&options.lon_column)?;
        let lat_idx = column(&options.lat_column)?;

        let mut coords = Vec::new();
        let mut attributes = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let parse = |idx: usize, name: &str| -> Result<f64> {
                record
                    .get(idx)
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ElevationError::InvalidInput {
                        message: format!("row {}: invalid {} value", row + 1, name),
                    })
            };
            coords.push(Coord {
                x: parse(lon_idx, &options.lon_column)?,
                y: parse(lat_idx, &options.lat_column)?,
            });

            let mut properties = JsonObject::new();
            for (idx, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
                if idx != lon_idx && idx != lat_idx {
                    properties.insert(header.to_string(), value.into());
                }
            }
            attributes.push(Some(properties));
        }

        Self::with_attributes(coords, ReferenceFrame::Geographic, attributes)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn frame(&self) -> ReferenceFrame {
        self.frame
    }

    /// Original attributes of each point, by index.
    pub fn attributes(&self) -> &[Option<JsonObject>] {
        &self.attributes
    }

    pub fn coords(&self) -> Vec<Coord> {
        self.points.iter().map(Point::coord).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn point_coord(geometry: Option<&Geometry>, feature: usize) -> Result<Coord> {
    let geometry = geometry.ok_or_else(|| ElevationError::InvalidGeometry {
        feature,
        message: "missing geometry".to_string(),
    })?;
    match &geometry.value {
        Value::Point(position) => position_to_coord(position, feature),
        other => Err(ElevationError::InvalidGeometry {
            feature,
            message: format!("expected Point, got {}", geometry_type(other)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inline_points_keep_order() {
        let set = PointSet::load(
            &PointSource::Inline(vec![(1.0, 2.0), (3.0, 4.0), (1.0, 2.0)]),
            &LoadOptions::default(),
        )
        .unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.frame(), ReferenceFrame::Geographic);
        assert_eq!(
            set.points()[1],
            Point {
                index: 1,
                lon: 3.0,
                lat: 4.0
            }
        );
        assert_eq!(set.points()[2].index, 2);
    }

    #[test]
    fn test_inline_empty_is_valid() {
        let set = PointSet::from_lon_lat(&[]).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_inline_rejects_nan() {
        assert!(PointSet::from_lon_lat(&[(f64::NAN, 0.0)]).is_err());
    }

    #[test]
    fn test_geojson_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "a"},
                 "geometry": {"type": "Point", "coordinates": [138.5, 35.5]}},
                {"type": "Feature", "properties": null,
                 "geometry": {"type": "Point", "coordinates": [-77.5, -12.5, 100.0]}}
            ]
        }"#;
        let set = PointSet::from_geojson(text.parse().unwrap()).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.points()[1].lon, -77.5);
        assert_eq!(set.points()[1].lat, -12.5);
        assert_eq!(
            set.attributes()[0].as_ref().unwrap().get("name"),
            Some(&serde_json::Value::from("a"))
        );
        assert!(set.attributes()[1].is_none());
    }

    #[test]
    fn test_geojson_non_point_rejected() {
        let text = r#"{"type": "LineString", "coordinates": [[0, 0], [1, 1]]}"#;
        let result = PointSet::from_geojson(text.parse().unwrap());

        assert!(matches!(
            result,
            Err(ElevationError::InvalidGeometry { feature: 0, .. })
        ));
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn test_geojson_projected_frame_kept() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "EPSG:32633"}},
            "features": [
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [500000, 4649776]}}
            ]
        }"#;
        let set = PointSet::from_geojson(text.parse().unwrap()).unwrap();
        assert_eq!(set.frame(), ReferenceFrame::Projected { epsg: 32633 });
    }

    #[cfg(feature = "proj")]
    #[test]
    fn test_geojson_utm_converted() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "EPSG:32633"}},
            "features": [
                {"type": "Feature", "properties": {"name": "cm"},
                 "geometry": {"type": "Point", "coordinates": [500000, 4649776.22]}},
                {"type": "Feature", "properties": {"name": "east"},
                 "geometry": {"type": "Point", "coordinates": [583000, 4649776.22]}}
            ]
        }"#;
        let set = PointSet::from_geojson(text.parse().unwrap()).unwrap();

        assert_eq!(set.frame(), ReferenceFrame::Geographic);
        assert!((set.points()[0].lon - 15.0).abs() < 1e-6);
        assert!((set.points()[0].lat - 42.0).abs() < 1e-6);
        assert!(set.points()[1].lon > 15.9 && set.points()[1].lon < 16.1);
        assert_eq!(
            set.attributes()[1].as_ref().unwrap().get("name"),
            Some(&serde_json::json!("east"))
        );
    }

    #[test]
    fn test_unknown_projection_kept() {
        let set = PointSet::new(
            vec![Coord { x: 1.0, y: 2.0 }],
            ReferenceFrame::Projected { epsg: 999_999 },
        )
        .unwrap();
        assert_eq!(set.frame(), ReferenceFrame::Projected { epsg: 999_999 });
        assert_eq!(set.points()[0].lon, 1.0);
    }

    #[test]
    fn test_geojson_web_mercator_converted() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "EPSG:3857"}},
            "features": [
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [111319.49, 0]}}
            ]
        }"#;
        let set = PointSet::from_geojson(text.parse().unwrap()).unwrap();

        assert_eq!(set.frame(), ReferenceFrame::Geographic);
        assert!((set.points()[0].lon - 1.0).abs() < 1e-4);
        assert!(set.points()[0].lat.abs() < 1e-9);
    }

    #[test]
    fn test_json_coordinate_payload() {
        let value = serde_json::json!({"geometry": [[10.5, 40.5], [11.0, 41.0]]});
        let set = PointSet::from_json_value(value).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.points()[1].coord(), Coord { x: 11.0, y: 41.0 });
    }

    #[test]
    fn test_json_without_geometry() {
        let value = serde_json::json!({"points": []});
        assert!(matches!(
            PointSet::from_json_value(value),
            Err(ElevationError::NoCoordinates)
        ));
    }

    #[test]
    fn test_json_short_position() {
        let value = serde_json::json!({"geometry": [[10.5]]});
        assert!(matches!(
            PointSet::from_json_value(value),
            Err(ElevationError::InvalidGeometry { feature: 0, .. })
        ));
    }

    #[test]
    fn test_csv_points() {
        let data = "name,lat,lon\nfuji,35.3606,138.7274\nlima,-12.05,-77.04\n";
        let set = PointSet::from_csv_reader(data.as_bytes(), &LoadOptions::default()).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.points()[0].lon, 138.7274);
        assert_eq!(set.points()[1].lat, -12.05);
        let attrs = set.attributes()[0].as_ref().unwrap();
        assert_eq!(attrs.get("name"), Some(&serde_json::Value::from("fuji")));
        assert!(attrs.get("lat").is_none());
    }

    #[test]
    fn test_csv_custom_columns() {
        let data = "x,y\n1.5,2.5\n";
        let options = LoadOptions {
            lon_column: "x".to_string(),
            lat_column: "y".to_string(),
        };
        let set = PointSet::from_csv_reader(data.as_bytes(), &options).unwrap();
        assert_eq!(set.points()[0].coord(), Coord { x: 1.5, y: 2.5 });
    }

    #[test]
    fn test_csv_errors() {
        let missing_column = "a,b\n1,2\n";
        assert!(PointSet::from_csv_reader(missing_column.as_bytes(), &LoadOptions::default())
            .is_err());

        let bad_value = "lon,lat\nabc,2\n";
        assert!(matches!(
            PointSet::from_csv_reader(bad_value.as_bytes(), &LoadOptions::default()),
            Err(ElevationError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_from_file_dispatch() {
        let temp_dir = TempDir::new().unwrap();

        let csv_path = temp_dir.path().join("points.csv");
        fs::write(&csv_path, "lon,lat\n1,2\n").unwrap();
        let json_path = temp_dir.path().join("points.json");
        fs::write(&json_path, r#"{"geometry": [[1, 2], [3, 4]]}"#).unwrap();
        let txt_path = temp_dir.path().join("points.txt");
        fs::write(&txt_path, "1 2").unwrap();

        let options = LoadOptions::default();
        assert_eq!(PointSet::from_file(&csv_path, &options).unwrap().len(), 1);
        assert_eq!(
            PointSet::load(&PointSource::File(json_path), &options)
                .unwrap()
                .len(),
            2
        );
        assert!(matches!(
            PointSet::from_file(&txt_path, &options),
            Err(ElevationError::UnsupportedFormat { .. })
        ));
    }
}
