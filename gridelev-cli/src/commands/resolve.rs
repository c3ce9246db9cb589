use anyhow::{bail, Context, Result};
use gridelev::{
    ElevationResolver, LoadOptions, Orchestrator, Outcome, OutputMode, PointSource,
    ResolveStats, ResolverConfig,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ResolveResponse<'a> {
    elevations: &'a [Option<f64>],
    unmatched: usize,
    missing_resources: &'a [PathBuf],
}

/// Parse an inline point given as `lon,lat`.
pub fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (lon, lat) = s
        .split_once(',')
        .ok_or_else(|| format!("expected lon,lat but got '{}'", s))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{}'", lon))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{}'", lat))?;
    Ok((lon, lat))
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    config: ResolverConfig,
    input: Option<PathBuf>,
    points: Vec<(f64, f64)>,
    options: LoadOptions,
    output: Option<PathBuf>,
    name: String,
    json: bool,
) -> Result<()> {
    let source = match input {
        Some(path) => PointSource::File(path),
        None if !points.is_empty() => PointSource::Inline(points),
        None => bail!("No coordinates provided. Pass an input file or --point lon,lat"),
    };

    let mode = match output {
        Some(dir) => OutputMode::Persist { dir, name },
        None => OutputMode::Return,
    };

    let orchestrator =
        Orchestrator::new(ElevationResolver::new(config), mode).with_load_options(options);
    let (outcome, stats) = orchestrator
        .process_with_stats(&source)
        .context("Failed to resolve elevations")?;

    match outcome {
        Outcome::Returned(elevations) if json => {
            let response = ResolveResponse {
                elevations: &elevations,
                unmatched: stats.unmatched_points,
                missing_resources: &stats.missing_resources,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
            return Ok(());
        }
        Outcome::Returned(elevations) => {
            for elevation in elevations {
                match elevation {
                    Some(v) => println!("{}", v),
                    None => println!("void"),
                }
            }
        }
        Outcome::Saved(path) => {
            if json {
                println!("{}", serde_json::json!({ "output": path.display().to_string() }));
                return Ok(());
            }
            println!("Output written to: {}", path.display());
        }
    }

    print_summary(&stats);
    Ok(())
}

fn print_summary(stats: &ResolveStats) {
    eprintln!();
    eprintln!("Summary:");
    eprintln!("  Points: {}", stats.total_points);
    eprintln!("  Tiles sampled: {}", stats.sampler_calls);
    if stats.unmatched_points > 0 {
        eprintln!("  Outside every tile: {}", stats.unmatched_points);
    }
    for resource in &stats.missing_resources {
        eprintln!("  Missing raster: {}", resource.display());
    }
    eprintln!("  Elapsed: {} ms", stats.elapsed_ms);
}
