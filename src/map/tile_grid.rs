//! The rectangular grid of tiles covering a viewport.

use super::projection::{geo_to_global_pixel, tile_index_for_global_pixel, GeoPoint, Point};
use super::tiles::TileIndex;
use log::trace;

/// A rectangular grid of tiles at a given zoom level, covering a window of
/// `width` x `height` pixels whose top-left corner is at `top_left` in global
/// pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
    /// Zoom level.
    z: u32,
    /// Size of a tile, in pixels.
    tile_size: u32,
    /// Global pixel coordinates of the top-left corner of the window.
    top_left: Point<f64>,
    /// Inclusive minimum tile indices of the grid.
    min: Point<i64>,
    /// Inclusive maximum tile indices of the grid.
    max: Point<i64>,
}

/// A cell of a [`TileGrid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridCell {
    /// Column within the grid, starting at 0.
    pub column: u32,
    /// Row within the grid, starting at 0.
    pub row: u32,
    /// Position of the tile's top-left corner in window pixels. Negative when
    /// the tile starts before the window's edge.
    pub offset: Point<i64>,
    /// Tile to draw in this cell, or [`None`] if the cell is above the North
    /// or below the South edge of the world.
    pub index: Option<TileIndex>,
}

impl TileGrid {
    /// Returns the grid covering a window of the given size centered on the
    /// given coordinate.
    pub fn new(center: &GeoPoint, zoom: u32, width: u32, height: u32, tile_size: u32) -> Self {
        let center_pixel = geo_to_global_pixel(center, zoom, tile_size);
        let top_left = Point {
            x: center_pixel.x - width as f64 / 2.0,
            y: center_pixel.y - height as f64 / 2.0,
        };
        trace!("Window top-left is {top_left:?} at zoom {zoom}");

        let min = Point {
            x: tile_index_for_global_pixel(top_left.x, tile_size),
            y: tile_index_for_global_pixel(top_left.y, tile_size),
        };
        let max = Point {
            x: tile_index_for_global_pixel(top_left.x + width as f64, tile_size),
            y: tile_index_for_global_pixel(top_left.y + height as f64, tile_size),
        };

        let result = TileGrid {
            z: zoom,
            tile_size,
            top_left,
            min,
            max,
        };
        trace!("Tile grid: {result:?}");
        result
    }

    /// Returns the number of columns of the grid.
    pub fn columns(&self) -> u32 {
        (self.max.x - self.min.x + 1) as u32
    }

    /// Returns the number of rows of the grid.
    pub fn rows(&self) -> u32 {
        (self.max.y - self.min.y + 1) as u32
    }

    /// Counts the number of cells within the grid.
    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    /// Checks whether the grid has no cell, which never happens for a window
    /// of positive size.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the window position of the tile at the given column and row.
    ///
    /// The remainder is the Euclidean one, so that a window starting at a
    /// negative global coordinate still aligns tiles on the tile grid.
    fn offset(&self, column: u32, row: u32) -> Point<i64> {
        let tile_size = self.tile_size as f64;
        Point {
            x: (column as f64 * tile_size - self.top_left.x.rem_euclid(tile_size)).floor() as i64,
            y: (row as f64 * tile_size - self.top_left.y.rem_euclid(tile_size)).floor() as i64,
        }
    }

    /// Maps grid coordinates to an existing tile.
    ///
    /// Columns past the antimeridian wrap around the world, while rows beyond
    /// the poles have no tile.
    fn tile_index(&self, x: i64, y: i64) -> Option<TileIndex> {
        let n = 1_i64 << self.z;
        if !(0..n).contains(&y) {
            trace!("No tile at row {y} for zoom {}", self.z);
            return None;
        }
        Some(TileIndex {
            z: self.z,
            x: x.rem_euclid(n) as u32,
            y: y as u32,
        })
    }

    /// Returns all the cells of the grid, row by row.
    pub fn cells(&self) -> Vec<GridCell> {
        let mut result = Vec::with_capacity(self.len());
        for row in 0..self.rows() {
            for column in 0..self.columns() {
                result.push(GridCell {
                    column,
                    row,
                    offset: self.offset(column, row),
                    index: self.tile_index(self.min.x + column as i64, self.min.y + row as i64),
                });
            }
        }
        result
    }

    /// Returns the distinct tiles to fetch to fill the grid, sorted.
    pub fn tile_indices(&self) -> Vec<TileIndex> {
        let mut result: Vec<TileIndex> = self.cells().iter().filter_map(|c| c.index).collect();
        result.sort();
        result.dedup();
        result
    }
}
