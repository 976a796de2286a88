use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tilegeo::{build_bounding_box, select_zoom, tiles_for, LatLon, MapEdges};

mod cache;
mod config;
mod download;
mod report;
mod scenario;

use cache::TileCache;
use config::Settings;
use download::{FetchQuota, TileDownloader};
use montage::ImageGenerator;
use report::MapEdgesReport;
use scenario::ScenarioPlan;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache directory
    #[arg(short, long, default_value = ".cache")]
    cache_dir: PathBuf,

    /// Path to the output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Optional JSON config file with provider and image settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate overview, location and leg images for a scenario
    Build {
        /// Path to the scenario plan JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Tiles per side of each leg image
        #[arg(short, long)]
        window: Option<u32>,

        /// Maximum tiles to fetch this month
        #[arg(long)]
        monthly_quota: Option<u64>,
    },

    /// Print the zoom level and tile box that fit a set of coordinates
    Zoom {
        /// Coordinates as "lat,lon"; degrees-minutes-seconds are accepted
        #[arg(long, num_args = 1.., required = true)]
        coords: Vec<String>,

        /// Maximum tiles across
        #[arg(long, default_value_t = 2)]
        wide: u32,

        /// Maximum tiles down
        #[arg(long, default_value_t = 2)]
        high: u32,
    },

    /// Clear the tile cache for the configured provider
    ClearCache,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Build { scenario, window, monthly_quota } => {
            if let Some(window) = window {
                anyhow::ensure!(*window > 0, "--window must be at least 1");
                settings.images.leg_window_tiles = *window;
            }
            if monthly_quota.is_some() {
                settings.provider.monthly_quota = *monthly_quota;
            }
            build(&cli, &settings, scenario)?;
        },

        Commands::Zoom { coords, wide, high } => {
            let coords = coords
                .iter()
                .map(|text| text.parse::<LatLon>())
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to parse coordinates")?;

            let zoom = select_zoom(&coords, *wide, *high)?;
            let bbox = build_bounding_box(&tiles_for(&coords, zoom), zoom)?;
            let edges = MapEdges::from_bounding_box(&bbox);

            println!("zoom {}", zoom);
            println!("x tiles {:?}", bbox.x_axis);
            println!("y tiles {:?}", bbox.y_axis);
            println!(
                "north {:.6} south {:.6} west {:.6} east {:.6}",
                edges.north, edges.south, edges.west, edges.east
            );
        },

        Commands::ClearCache => {
            let cache = TileCache::new(&cli.cache_dir, &settings.provider.url_template)
                .context("Failed to create cache")?;
            info!("Clearing cache {}", cache.dir().display());
            cache.clear()
                .context("Failed to clear cache")?;
            info!("Cache cleared");
        },
    }

    Ok(())
}

fn build(cli: &Cli, settings: &Settings, scenario: &Path) -> Result<()> {
    let plan = ScenarioPlan::load(scenario)?;
    let coords = plan.coordinates();
    info!(
        "Building {} scenario '{}' with {} coordinates",
        plan.scenario.label(),
        plan.name,
        coords.len()
    );

    std::fs::create_dir_all(&cli.output_dir)
        .context("Failed to create output directory")?;

    let cache = TileCache::new(&cli.cache_dir, &settings.provider.url_template)
        .context("Failed to create cache")?;
    let quota = FetchQuota::load(cli.cache_dir.join("quota.json"), settings.provider.monthly_quota)
        .context("Failed to load fetch quota")?;
    let downloader = TileDownloader::new(cache, settings.provider.clone(), quota)?;
    let config = settings.generator_config(cli.output_dir.clone());
    let generator = ImageGenerator::new(downloader, config);

    let mut report = MapEdgesReport::new(&plan.name, plan.scenario.label());

    report.overview = Some(
        generator.compute_overview_image(&coords)
            .context("Failed to build overview image")?,
    );

    if let Some(location) = plan.location() {
        match generator.compute_location_image(&[location]) {
            Ok(artifact) => report.location = Some(artifact),
            Err(e) => warn!("Skipping location image: {}", e),
        }
    }

    if coords.len() >= 2 {
        match generator.compute_all_leg_route_images(&coords, settings.images.leg_window_tiles) {
            Ok(legs) => report.legs = legs,
            Err(e) => warn!("Skipping leg images: {}", e),
        }
    }

    let path = report.write(&cli.output_dir)?;
    info!("Wrote {} images, map edges in {}", report.image_count(), path.display());

    if let Some(limit) = generator.source().quota().limit() {
        info!("{} of {} monthly tile fetches used", generator.source().quota().used()?, limit);
    }

    Ok(())
}
