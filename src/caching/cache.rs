//! Local on-disk cache of raw tile bytes.

use crate::config::MapProvider;
use crate::map::tiles::TileIndex;
use anyhow::Context;
use std::fs;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Handle to the on-disk cache.
pub struct Cache {
    /// Folder holding the tiles of the current map provider.
    tile_root: PathBuf,
}

impl Cache {
    /// Initializes the cache at the given root directory for the given map
    /// provider.
    pub fn new<P: AsRef<Path>>(
        cache_directory: P,
        map_provider: &MapProvider,
    ) -> anyhow::Result<Self> {
        let folder = &map_provider.cache_folder;
        let tile_root = cache_directory.as_ref().join("tiles").join(folder);
        fs::create_dir_all(&tile_root)
            .with_context(|| format!("Failed to create the tile cache for provider: {folder}"))?;
        Ok(Self { tile_root })
    }

    /// Reads the given map tile.
    pub fn get_tile(&self, index: &TileIndex) -> anyhow::Result<Box<[u8]>> {
        let mut file = File::open(self.tile_path(index))
            .with_context(|| format!("Failed to open file for tile: {index:?}"))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .with_context(|| format!("Failed to read file for tile: {index:?}"))?;
        Ok(buf.into_boxed_slice())
    }

    /// Writes the given map tile.
    pub fn set_tile(&self, index: &TileIndex, tile: &[u8]) -> anyhow::Result<()> {
        let mut file = File::create(self.tile_path(index))
            .with_context(|| format!("Failed to create file for tile: {index:?}"))?;
        file.write_all(tile)
            .with_context(|| format!("Failed to write file for tile: {index:?}"))?;
        Ok(())
    }

    /// Computes the path associated to the given map tile.
    fn tile_path(&self, index: &TileIndex) -> PathBuf {
        self.tile_root.join(format!(
            "{z}-{x}-{y}.bin",
            z = index.z,
            x = index.x,
            y = index.y
        ))
    }
}
