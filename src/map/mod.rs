//! Map geometry, tile fetching and compositing.

pub mod compositor;
pub mod projection;
pub mod raster;
pub mod tile_grid;
pub mod tiles;
pub mod viewport;

#[cfg(test)]
mod testing;
