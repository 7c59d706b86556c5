//! Tilestitch - stitch map tiles around a coordinate.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use image::{ImageFormat, RgbaImage};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tilestitch::caching::cache::Cache;
use tilestitch::caching::tile_cache::TileCache;
use tilestitch::config::MapProvider;
use tilestitch::map::compositor::Compositor;
use tilestitch::map::projection::GeoPoint;
use tilestitch::map::tiles::{HttpTileSource, TileFetcher};
use tilestitch::map::viewport::Viewport;
use tokio::runtime::Runtime;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let map_provider = cli.map_provider.clone().unwrap_or_default();

    let cache: Option<Cache> = match &cli.cache_directory {
        Some(dir) => match Cache::new(dir, &map_provider) {
            Ok(c) => Some(c),
            Err(e) => {
                error!("Couldn't create cache: {e:?}");
                None
            }
        },
        None => {
            info!("No cache configured. You can set one up with --cache-directory.");
            None
        }
    };

    let rt = Runtime::new().context("Failed to create the Tokio runtime")?;
    rt.block_on(render(&cli, &map_provider, cache.as_ref()))?;

    info!("Done");
    Ok(())
}

/// Composites the map(s) requested on the command line and writes them to
/// disk.
async fn render(
    cli: &Cli,
    map_provider: &MapProvider,
    cache: Option<&Cache>,
) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(cli.request_timeout_secs);
    let source = HttpTileSource::new(map_provider, timeout)?;
    let memory = TileCache::new(cli.max_cached_tiles.map(|n| n as usize));
    let fetcher = TileFetcher::new(map_provider, &source, &memory)
        .with_disk_cache(cache)
        .cache_failed_tiles(cli.cache_failed_tiles);
    let compositor = Compositor::new(fetcher, cli.parallel_requests as usize);

    let center = match (cli.location, cli.lat, cli.lon) {
        (Some(location), _, _) => location.point,
        (None, Some(lat), Some(lon)) => GeoPoint::new(lat, lon),
        _ => anyhow::bail!("Either --location or both --lat and --lon are required"),
    };
    let mut viewport = Viewport::new(
        cli.width,
        cli.height,
        cli.tile_size,
        center,
        cli.zoom as i64,
    )?;
    if viewport.center() != center {
        info!("Clamped center {center:?} to {:?}", viewport.center());
    }

    let Some(target) = cli.fly_to else {
        let raster = compositor.composite(&viewport.request()).await;
        return save(&raster, &cli.output);
    };

    let target_zoom = cli.fly_to_zoom.unwrap_or(cli.zoom) as i64;
    info!("Flying to {} in at most {} frames", target.name, cli.frames);
    for frame in 0..cli.frames {
        let raster = compositor.composite(&viewport.request()).await;
        save(&raster, &frame_path(&cli.output, frame))?;
        if !viewport.step_towards(&target.point, target_zoom) {
            break;
        }
    }
    Ok(())
}

/// Writes the given raster as a PNG file.
fn save(raster: &RgbaImage, path: &Path) -> anyhow::Result<()> {
    raster
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write map to: {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Returns the path of a numbered frame next to the given output path, e.g.
/// `map-007.png` for `map.png`.
fn frame_path(output: &Path, frame: u32) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_owned());
    output.with_file_name(format!("{stem}-{frame:03}.png"))
}
