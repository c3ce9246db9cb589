use anyhow::Result;
use clap::{Parser, Subcommand};
use gridelev::{LoadOptions, ResolverConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Batched elevation lookup against tiled DEMs
#[derive(Parser)]
#[command(name = "gridelev")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// GeoJSON tile index (one polygon per tile with an id property)
    #[arg(
        long,
        env = "GRIDELEV_TILE_INDEX",
        default_value = "files/SRTM.geojson",
        global = true
    )]
    tile_index: PathBuf,

    /// Folder of tile rasters, or a single raster file
    #[arg(
        short,
        long,
        env = "GRIDELEV_RASTERS",
        default_value = "files/images",
        global = true
    )]
    rasters: PathBuf,

    /// Raster file extension (hgt or asc)
    #[arg(long, env = "GRIDELEV_RASTER_EXT", default_value = "hgt", global = true)]
    raster_ext: String,

    /// Tile index property holding the tile id
    #[arg(long, env = "GRIDELEV_ID_FIELD", default_value = "id", global = true)]
    id_field: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve elevations for points from a file or the command line
    Resolve {
        /// Input file (.geojson, .json or .csv)
        input: Option<PathBuf>,

        /// Inline point as "lon,lat" (repeatable)
        #[arg(
            short,
            long = "point",
            value_parser = commands::resolve::parse_point,
            allow_hyphen_values = true,
            conflicts_with = "input"
        )]
        points: Vec<(f64, f64)>,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Write <OUTPUT>/<NAME>.geojson instead of printing values
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output file name and elevation attribute
        #[arg(short, long, default_value = "elevation")]
        name: String,

        /// Print results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Build a tile index from the .hgt files in a folder
    Index {
        /// Folder containing .hgt / .hgt.zip files
        folder: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the tiles of the index and whether their rasters are present
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridelev=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = ResolverConfig {
        tile_index: cli.tile_index,
        rasters: cli.rasters,
        raster_extension: cli.raster_ext.trim_start_matches('.').to_string(),
        id_field: cli.id_field,
    };

    match cli.command {
        Commands::Resolve {
            input,
            points,
            lon_col,
            lat_col,
            output,
            name,
            json,
        } => commands::resolve::run(
            config,
            input,
            points,
            LoadOptions {
                lon_column: lon_col,
                lat_column: lat_col,
            },
            output,
            name,
            json,
        ),
        Commands::Index { folder, output } => commands::index::run(folder, output, &config.id_field),
        Commands::List => commands::list::run(&config),
    }
}
