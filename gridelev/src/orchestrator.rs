//! End-to-end runs: load points, resolve, then return or persist.

use std::path::PathBuf;

use crate::error::Result;
use crate::output::write_geojson;
use crate::points::{LoadOptions, PointSet, PointSource};
use crate::resolver::{ElevationResolver, Resolution, ResolveStats};

/// What to do with resolved elevations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Hand the values back to the caller.
    Return,
    /// Write `<dir>/<name>.geojson`; `name` is also the elevation attribute.
    Persist { dir: PathBuf, name: String },
}

impl OutputMode {
    /// Persist under `dir` with the default `elevation` name.
    pub fn persist(dir: impl Into<PathBuf>) -> Self {
        OutputMode::Persist {
            dir: dir.into(),
            name: "elevation".to_string(),
        }
    }
}

/// Result of [`Orchestrator::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Returned(Vec<Option<f64>>),
    Saved(PathBuf),
}

/// Runs one resolve from a point source to an [`Outcome`].
///
/// The tile index (or single raster) is looked up from the resolver's
/// configuration on every run, after the points are loaded. An empty point
/// source never touches it.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    resolver: ElevationResolver,
    load_options: LoadOptions,
    output: OutputMode,
}

impl Orchestrator {
    pub fn new(resolver: ElevationResolver, output: OutputMode) -> Self {
        Self {
            resolver,
            load_options: LoadOptions::default(),
            output,
        }
    }

    /// Column names used for CSV sources.
    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    pub fn output(&self) -> &OutputMode {
        &self.output
    }

    pub fn process(&self, source: &PointSource) -> Result<Outcome> {
        self.process_with_stats(source).map(|(outcome, _)| outcome)
    }

    /// Like [`process`](Self::process), also returning the run counters.
    pub fn process_with_stats(&self, source: &PointSource) -> Result<(Outcome, ResolveStats)> {
        let points = PointSet::load(source, &self.load_options)?;

        let resolution = if points.is_empty() {
            Resolution {
                elevations: Vec::new(),
                stats: ResolveStats::default(),
            }
        } else {
            let elevation_source = self.resolver.elevation_source()?;
            self.resolver.resolve(&points, &elevation_source)?
        };

        let outcome = match &self.output {
            OutputMode::Return => Outcome::Returned(resolution.elevations),
            OutputMode::Persist { dir, name } => {
                Outcome::Saved(write_geojson(&points, &resolution.elevations, dir, name)?)
            }
        };
        Ok((outcome, resolution.stats))
    }
}
