//! Command-line interface.

use clap::Parser;
use std::path::PathBuf;
use tilestitch::config::{MapProvider, SavedLocation};

/// Stitch map tiles around a coordinate.
#[derive(Parser, Debug)]
#[command(name = "Tilestitch")]
#[command(version)]
#[command(author)]
#[command(about = "Stitch map tiles around a coordinate", long_about = None)]
pub struct Cli {
    /// Latitude of the map center, in degrees.
    #[arg(long, allow_negative_numbers = true, required_unless_present = "location")]
    pub lat: Option<f64>,

    /// Longitude of the map center, in degrees.
    #[arg(long, allow_negative_numbers = true, required_unless_present = "location")]
    pub lon: Option<f64>,

    /// Saved location to center the map on, e.g. "London, UK".
    #[arg(long, conflicts_with_all = ["lat", "lon"], value_parser = clap::value_parser!(SavedLocation))]
    pub location: Option<SavedLocation>,

    /// Zoom level of the tiles.
    #[arg(long, short = 'z', default_value_t = 12, value_parser = clap::value_parser!(u32).range(1..=19))]
    pub zoom: u32,

    /// Width of the output, in pixels.
    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u32).range(1..=16384))]
    pub width: u32,

    /// Height of the output, in pixels.
    #[arg(long, default_value_t = 400, value_parser = clap::value_parser!(u32).range(1..=16384))]
    pub height: u32,

    /// Size of the tiles served by the map provider, in pixels.
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u32).range(1..=4096))]
    pub tile_size: u32,

    /// JSON file containing the map provider configuration. Defaults to
    /// OpenStreetMap.
    #[arg(long = "map-config", value_parser = clap::value_parser!(MapProvider))]
    pub map_provider: Option<MapProvider>,

    /// Path of the cache directory.
    #[arg(long, short = 'c')]
    pub cache_directory: Option<String>,

    /// Maximum number of requests to send in parallel to a server.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub parallel_requests: u32,

    /// Maximum number of decoded tiles to keep in memory. Unbounded by
    /// default.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_cached_tiles: Option<u32>,

    /// Remember tiles that failed to load as blank, instead of retrying them.
    #[arg(long)]
    pub cache_failed_tiles: bool,

    /// Timeout of each tile request, in seconds.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=300))]
    pub request_timeout_secs: u64,

    /// PNG file to write the map to.
    #[arg(long, short = 'o', default_value = "map.png")]
    pub output: PathBuf,

    /// Saved location to pan to smoothly, writing one numbered PNG file per
    /// frame.
    #[arg(long, value_parser = clap::value_parser!(SavedLocation))]
    pub fly_to: Option<SavedLocation>,

    /// Zoom level to reach at the end of the pan. Defaults to the starting
    /// zoom.
    #[arg(long, requires = "fly_to", value_parser = clap::value_parser!(u32).range(1..=19))]
    pub fly_to_zoom: Option<u32>,

    /// Maximum number of frames to render when panning.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub frames: u32,
}
