//! Caches for map tiles, in memory and on disk.

pub mod cache;
pub mod lru;
pub mod tile_cache;
