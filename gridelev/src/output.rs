//! GeoJSON output of resolved points.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};

use crate::error::{ElevationError, Result};
use crate::points::PointSet;

/// One Point feature per input point, in input order, carrying the
/// point's original attributes plus `name: elevation | null`.
pub fn to_feature_collection(
    points: &PointSet,
    elevations: &[Option<f64>],
    name: &str,
) -> Result<FeatureCollection> {
    if elevations.len() != points.len() {
        return Err(ElevationError::InvalidInput {
            message: format!(
                "{} elevations for {} points",
                elevations.len(),
                points.len()
            ),
        });
    }

    let features = points
        .points()
        .iter()
        .zip(points.attributes())
        .zip(elevations)
        .map(|((point, attributes), elevation)| {
            let mut properties = attributes.clone().unwrap_or_else(JsonObject::new);
            properties.insert(name.to_string(), (*elevation).into());
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![point.lon, point.lat]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Write `<dir>/<name>.geojson`, creating `dir` if needed.
pub fn write_geojson(
    points: &PointSet,
    elevations: &[Option<f64>],
    dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    let collection = to_feature_collection(points, elevations, name)?;

    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.geojson", name));
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, &GeoJson::FeatureCollection(collection))?;
    writer.flush()?;

    tracing::info!(path = %path.display(), features = points.len(), "Saved elevations");
    Ok(path)
}
