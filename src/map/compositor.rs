//! Assembles the tiles covering a viewport into a single raster.

use super::projection::{GeoPoint, MAX_LATITUDE, MAX_ZOOM, MIN_ZOOM};
use super::raster::{background, blit, TileImage};
use super::tile_grid::TileGrid;
use super::tiles::{TileFetcher, TileIndex, TileSource};
use anyhow::{ensure, Context};
use futures::{stream, StreamExt};
use image::RgbaImage;
use log::{debug, info};
use std::collections::HashMap;

/// Everything that determines a composited map.
///
/// Outside of this module, a request is obtained either from
/// [`ViewportRequest::new`] or from a [`Viewport`](super::viewport::Viewport),
/// so its parameters are always valid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportRequest {
    /// Output width, in pixels.
    pub(super) width: u32,
    /// Output height, in pixels.
    pub(super) height: u32,
    /// Coordinate at the center of the output.
    pub(super) center: GeoPoint,
    /// Zoom level of the tiles.
    pub(super) zoom: u32,
    /// Size of the tiles, in pixels.
    pub(super) tile_size: u32,
}

impl ViewportRequest {
    /// Checks the parameters of a viewport.
    ///
    /// The latitude must lie within the range displayed by the Mercator
    /// projection, which notably excludes the poles.
    pub fn new(
        width: u32,
        height: u32,
        center: GeoPoint,
        zoom: u32,
        tile_size: u32,
    ) -> anyhow::Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "Output size must be positive, got {width}x{height}"
        );
        ensure!(tile_size > 0, "Tile size must be positive");
        ensure!(
            (MIN_ZOOM..=MAX_ZOOM).contains(&zoom),
            "Zoom level {zoom} is outside of [{MIN_ZOOM}, {MAX_ZOOM}]"
        );
        ensure!(
            center.lat.abs() <= MAX_LATITUDE,
            "Latitude {} is outside of [-{MAX_LATITUDE}, {MAX_LATITUDE}]",
            center.lat
        );
        ensure!(
            center.lon.abs() <= 180.0,
            "Longitude {} is outside of [-180, 180]",
            center.lon
        );
        // The checks above also reject NaN, which fails every comparison.
        Ok(Self {
            width,
            height,
            center,
            zoom,
            tile_size,
        })
    }

    /// Output width, in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height, in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Coordinate at the center of the output.
    pub fn center(&self) -> GeoPoint {
        self.center
    }

    /// Zoom level of the tiles.
    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    /// Size of the tiles, in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Returns the grid of tiles covering this viewport.
    pub fn tile_grid(&self) -> TileGrid {
        TileGrid::new(
            &self.center,
            self.zoom,
            self.width,
            self.height,
            self.tile_size,
        )
    }
}

/// Composites viewports out of tiles obtained from a [`TileFetcher`].
pub struct Compositor<'a, S> {
    /// Source of decoded tiles.
    fetcher: TileFetcher<'a, S>,
    /// Maximum number of tiles loaded at the same time by one composite.
    parallel_requests: usize,
}

impl<'a, S: TileSource> Compositor<'a, S> {
    /// Creates a compositor fetching at most `parallel_requests` tiles at once
    /// for each composite.
    pub fn new(fetcher: TileFetcher<'a, S>, parallel_requests: usize) -> Self {
        Self {
            fetcher,
            parallel_requests: parallel_requests.max(1),
        }
    }

    /// Renders the given viewport.
    ///
    /// All the tiles are loaded before any is drawn. Pixels not covered by a
    /// tile, as well as tiles that failed to load, are white. This never
    /// fails, and may be called concurrently.
    pub async fn composite(&self, request: &ViewportRequest) -> RgbaImage {
        let grid = request.tile_grid();
        let indices = grid.tile_indices();
        debug!(
            "Compositing {}x{} grid ({} tiles) for {request:?}",
            grid.columns(),
            grid.rows(),
            indices.len()
        );

        let tile_size = request.tile_size;
        let tiles: HashMap<TileIndex, TileImage> = stream::iter(indices)
            .map(|index| async move { (index, self.fetcher.fetch(index, tile_size).await) })
            .buffer_unordered(self.parallel_requests)
            .collect()
            .await;

        let mut raster = background(request.width, request.height);
        let mut drawn_tiles = 0;
        for cell in grid.cells() {
            let Some(tile) = cell.index.and_then(|index| tiles.get(&index)) else {
                continue;
            };
            if blit(&mut raster, tile, cell.offset.x, cell.offset.y) > 0 {
                drawn_tiles += 1;
            }
        }

        info!(
            "Composited {}x{} map at {:?} (zoom {}) from {drawn_tiles} tiles",
            request.width, request.height, request.center, request.zoom
        );
        raster
    }

    /// Validates the given parameters and renders the corresponding viewport.
    pub async fn composite_at(
        &self,
        width: u32,
        height: u32,
        center: GeoPoint,
        zoom: u32,
        tile_size: u32,
    ) -> anyhow::Result<RgbaImage> {
        let request = ViewportRequest::new(width, height, center, zoom, tile_size)
            .context("Invalid viewport")?;
        Ok(self.composite(&request).await)
    }
}
