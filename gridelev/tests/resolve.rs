use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use gridelev::raster::ascii::write_ascii_grid;
use gridelev::raster::hgt::SRTM3_SIZE;
use gridelev::{
    ElevationError, ElevationResolver, ElevationSource, Orchestrator, Outcome, OutputMode,
    PointSet, PointSource, ResolverBuilder, TileIndex,
};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

/// Tiles A over [0,1]x[0,1] and B over [1,2]x[0,1].
const INDEX: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"id": "A"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
        {"type": "Feature", "properties": {"id": "B"},
         "geometry": {"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}}
    ]
}"#;

const CELLS: usize = 10;
const CELL: f64 = 0.1;

/// Elevation of the cell at global column `col` (0..20) and row `row`
/// (0 = north).
fn cell_value(row: usize, col: usize) -> f64 {
    (col / CELLS) as f64 * 1000.0 + (row * 10 + col % CELLS) as f64
}

fn write_tile(dir: &Path, id: &str, tile_col: usize) {
    let rows: Vec<Vec<f64>> = (0..CELLS)
        .map(|row| {
            (0..CELLS)
                .map(|col| cell_value(row, tile_col * CELLS + col))
                .collect()
        })
        .collect();
    write_ascii_grid(
        &dir.join(format!("{}.asc", id)),
        (tile_col as f64, 0.0),
        CELL,
        -9999.0,
        &rows,
    )
    .unwrap();
}

/// One grid covering both tiles with the same cell values.
fn write_mosaic(path: &Path) {
    let rows: Vec<Vec<f64>> = (0..CELLS)
        .map(|row| (0..2 * CELLS).map(|col| cell_value(row, col)).collect())
        .collect();
    write_ascii_grid(path, (0.0, 0.0), CELL, -9999.0, &rows).unwrap();
}

fn tiled_source(folder: &Path) -> ElevationSource {
    ElevationSource::Tiled {
        index: TileIndex::from_geojson_str(INDEX, "id").unwrap(),
        folder: folder.to_path_buf(),
    }
}

fn resolver() -> ElevationResolver {
    ResolverBuilder::new().raster_extension("asc").build()
}

/// Shared buffer the test subscriber writes formatted events into.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a subscriber that records warnings, one line each.
fn with_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    (result, text.lines().map(str::to_string).collect())
}

/// Points at cell centres spread over both tiles.
fn sample_points() -> Vec<(f64, f64)> {
    (0..2 * CELLS)
        .flat_map(|col| {
            (0..CELLS).step_by(3).map(move |row| {
                (
                    col as f64 * CELL + CELL / 2.0,
                    1.0 - (row as f64 * CELL + CELL / 2.0),
                )
            })
        })
        .collect()
}

#[test]
fn full_coverage_resolves_every_point() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    write_tile(temp_dir.path(), "B", 1);

    let pairs = sample_points();
    let points = PointSet::from_lon_lat(&pairs).unwrap();
    let resolution = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();

    assert_eq!(resolution.elevations.len(), pairs.len());
    assert!(resolution
        .elevations
        .iter()
        .all(|v| v.map_or(false, f64::is_finite)));
    assert_eq!(resolution.stats.sampler_calls, 2);

    // Values land on the point they were sampled for
    for (i, &(lon, lat)) in pairs.iter().enumerate() {
        let col = (lon / CELL).floor() as usize;
        let row = ((1.0 - lat) / CELL).floor() as usize;
        assert_eq!(resolution.elevations[i], Some(cell_value(row, col)));
    }
}

#[test]
fn permuting_input_permutes_output() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    write_tile(temp_dir.path(), "B", 1);
    let source = tiled_source(temp_dir.path());

    let mut pairs = sample_points();
    pairs.push((7.0, 7.0));
    let original = resolver()
        .resolve(&PointSet::from_lon_lat(&pairs).unwrap(), &source)
        .unwrap()
        .elevations;

    // Reverse, then take every other point twice over
    let reversed: Vec<usize> = (0..pairs.len()).rev().collect();
    let mut shuffled: Vec<usize> = reversed.iter().copied().step_by(2).collect();
    shuffled.extend(reversed.iter().copied().skip(1).step_by(2));

    let permuted_pairs: Vec<(f64, f64)> = shuffled.iter().map(|&i| pairs[i]).collect();
    let permuted = resolver()
        .resolve(&PointSet::from_lon_lat(&permuted_pairs).unwrap(), &source)
        .unwrap()
        .elevations;

    for (k, &i) in shuffled.iter().enumerate() {
        assert_eq!(permuted[k], original[i]);
    }
}

#[test]
fn unmatched_points_are_none() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    write_tile(temp_dir.path(), "B", 1);

    let points = PointSet::from_lon_lat(&[(-0.5, 0.5), (0.55, 0.55), (2.5, 0.5), (1.0, 1.5)])
        .unwrap();
    let resolution = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();

    assert_eq!(resolution.elevations[0], None);
    assert!(resolution.elevations[1].is_some());
    assert_eq!(resolution.elevations[2], None);
    assert_eq!(resolution.elevations[3], None);
    assert_eq!(resolution.stats.unmatched_points, 3);
}

#[test]
fn all_unmatched_makes_no_sampler_calls() {
    let temp_dir = TempDir::new().unwrap();

    let points = PointSet::from_lon_lat(&[(10.0, 10.0), (-10.0, -10.0)]).unwrap();
    let resolution = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();

    assert_eq!(resolution.elevations, vec![None, None]);
    assert_eq!(resolution.stats.sampler_calls, 0);
    assert!(resolution.stats.missing_resources.is_empty());
}

#[test]
fn missing_resource_only_affects_its_tile() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    write_tile(temp_dir.path(), "B", 1);
    let pairs = sample_points();
    let points = PointSet::from_lon_lat(&pairs).unwrap();

    let complete = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap()
        .elevations;

    fs::remove_file(temp_dir.path().join("B.asc")).unwrap();
    let partial = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();

    for (i, &(lon, _)) in pairs.iter().enumerate() {
        if lon < 1.0 {
            assert_eq!(partial.elevations[i], complete[i]);
        } else {
            assert_eq!(partial.elevations[i], None);
        }
    }
    assert_eq!(
        partial.stats.missing_resources,
        vec![temp_dir.path().join("B.asc")]
    );
}

#[test]
fn resolving_twice_gives_identical_results() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    let source = tiled_source(temp_dir.path());

    let mut pairs = sample_points();
    pairs.push((0.55, 0.55));
    pairs.push((0.55, 0.55));
    let points = PointSet::from_lon_lat(&pairs).unwrap();

    let first = resolver().resolve(&points, &source).unwrap();
    let second = resolver().resolve(&points, &source).unwrap();

    assert_eq!(first.elevations, second.elevations);
    let n = pairs.len();
    assert_eq!(first.elevations[n - 1], first.elevations[n - 2]);
}

#[test]
fn single_raster_matches_tiled_mode() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    write_tile(temp_dir.path(), "B", 1);
    let mosaic = temp_dir.path().join("mosaic.asc");
    write_mosaic(&mosaic);

    let points = PointSet::from_lon_lat(&sample_points()).unwrap();
    let tiled = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();
    let single = resolver()
        .resolve(&points, &ElevationSource::SingleRaster(mosaic))
        .unwrap();

    assert_eq!(tiled.elevations, single.elevations);
    assert_eq!(single.stats.sampler_calls, 1);
}

#[test]
fn two_tiles_with_one_missing() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);

    // Point 1 in A, points 2 and 3 in B whose raster is absent
    let points = PointSet::from_lon_lat(&[(0.55, 0.55), (1.55, 0.55), (1.25, 0.15)]).unwrap();
    let (result, warnings) =
        with_warnings(|| resolver().resolve(&points, &tiled_source(temp_dir.path())));
    let resolution = result.unwrap();

    assert_eq!(
        resolution.elevations,
        vec![Some(cell_value(4, 5)), None, None]
    );
    assert_eq!(resolution.stats.sampler_calls, 1);
    assert_eq!(resolution.stats.unmatched_points, 0);
    assert_eq!(
        resolution.stats.missing_resources,
        vec![temp_dir.path().join("B.asc")]
    );

    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].contains("B.asc"));
}

#[test]
fn unmatched_points_warn_once() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    write_tile(temp_dir.path(), "B", 1);

    let points =
        PointSet::from_lon_lat(&[(-0.5, 0.5), (0.55, 0.55), (2.5, 0.5), (1.0, 1.5)]).unwrap();
    let (result, warnings) =
        with_warnings(|| resolver().resolve(&points, &tiled_source(temp_dir.path())));

    assert_eq!(result.unwrap().stats.unmatched_points, 3);
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].contains("3 point(s)"));
}

#[test]
fn empty_input_is_silent() {
    let temp_dir = TempDir::new().unwrap();

    let points = PointSet::from_lon_lat(&[]).unwrap();
    let (result, warnings) =
        with_warnings(|| resolver().resolve(&points, &tiled_source(temp_dir.path())));

    assert!(result.unwrap().elevations.is_empty());
    assert!(warnings.is_empty(), "{:?}", warnings);
}

#[test]
fn empty_input_returns_empty() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);

    let points = PointSet::from_lon_lat(&[]).unwrap();
    let resolution = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();

    assert!(resolution.elevations.is_empty());
    assert_eq!(resolution.stats.sampler_calls, 0);
    assert_eq!(resolution.stats.groups, 0);
}

#[test]
fn empty_inline_input_skips_raster_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let resolver = ResolverBuilder::new()
        .rasters(temp_dir.path().join("nowhere"))
        .build();

    let outcome = Orchestrator::new(resolver, OutputMode::Return)
        .process(&PointSource::Inline(Vec::new()))
        .unwrap();
    assert_eq!(outcome, Outcome::Returned(Vec::new()));
}

const UTM_POINTS: &str = r#"{
    "type": "FeatureCollection",
    "crs": {"type": "name", "properties": {"name": "EPSG:32631"}},
    "features": [
        {"type": "Feature", "properties": {},
         "geometry": {"type": "Point", "coordinates": [221600, 55300]}}
    ]
}"#;

#[test]
fn unconvertible_points_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("grid.geojson");
    fs::write(&input, UTM_POINTS.replace("EPSG:32631", "EPSG:999999")).unwrap();

    let points = PointSet::load(&PointSource::File(input), &Default::default()).unwrap();
    let result = resolver().resolve(&points, &tiled_source(temp_dir.path()));

    assert!(matches!(
        result,
        Err(ElevationError::ReferenceFrameMismatch { .. })
    ));
}

#[cfg(not(feature = "proj"))]
#[test]
fn projected_points_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("utm.geojson");
    fs::write(&input, UTM_POINTS).unwrap();

    let points = PointSet::load(&PointSource::File(input), &Default::default()).unwrap();
    let result = resolver().resolve(&points, &tiled_source(temp_dir.path()));

    assert!(matches!(
        result,
        Err(ElevationError::ReferenceFrameMismatch { .. })
    ));
}

#[cfg(feature = "proj")]
#[test]
fn projected_points_are_reprojected() {
    let temp_dir = TempDir::new().unwrap();
    write_tile(temp_dir.path(), "A", 0);
    let input = temp_dir.path().join("utm.geojson");
    fs::write(&input, UTM_POINTS).unwrap();

    let points = PointSet::load(&PointSource::File(input), &Default::default()).unwrap();
    let resolution = resolver()
        .resolve(&points, &tiled_source(temp_dir.path()))
        .unwrap();

    // About (0.50, 0.50): column 5, row 4 or 5 of tile A
    let value = resolution.elevations[0].unwrap();
    assert!(value == cell_value(4, 5) || value == cell_value(5, 5));
}

#[test]
fn zipped_hgt_folder_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let images = temp_dir.path().join("images");
    fs::create_dir(&images).unwrap();

    // N35E138 as a zip archive with 500 m at the centre sample
    let mut data = vec![0u8; SRTM3_SIZE];
    let center = (600 * 1201 + 600) * 2;
    data[center..center + 2].copy_from_slice(&500i16.to_be_bytes());
    let file = fs::File::create(images.join("N35E138.hgt.zip")).unwrap();
    let mut zip_writer = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    zip_writer.start_file("N35E138.hgt", options).unwrap();
    zip_writer.write_all(&data).unwrap();
    zip_writer.finish().unwrap();

    let index = TileIndex::from_hgt_folder(&images).unwrap();
    let index_path = temp_dir.path().join("SRTM.geojson");
    fs::write(
        &index_path,
        serde_json::to_string(&geojson::GeoJson::FeatureCollection(index.to_geojson("id")))
            .unwrap(),
    )
    .unwrap();

    let resolver = ResolverBuilder::new()
        .tile_index(&index_path)
        .rasters(&images)
        .build();
    let orchestrator = Orchestrator::new(resolver, OutputMode::Return);
    let outcome = orchestrator
        .process(&PointSource::Inline(vec![(138.5, 35.5), (0.0, 0.0)]))
        .unwrap();

    assert_eq!(outcome, Outcome::Returned(vec![Some(500.0), None]));
    assert!(images.join("N35E138.hgt").exists());
}
