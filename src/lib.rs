//! Tilestitch - stitch map tiles into a single picture.
//!
//! The [`map::compositor::Compositor`] turns a center coordinate, a zoom level
//! and an output size into an RGBA raster, fetching the needed tiles in
//! parallel through a [`map::tiles::TileFetcher`] backed by a shared
//! [`caching::tile_cache::TileCache`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod caching;
pub mod config;
pub mod map;
