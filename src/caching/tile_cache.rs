//! In-memory store of decoded tiles, shared by concurrent fetches.

use super::lru::Lru;
use crate::map::raster::TileImage;
use crate::map::tiles::TileIndex;
use log::trace;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifies a decoded tile.
///
/// The same index requested at another tile size is a different entry, so
/// that a lookup always returns a tile of the requested size.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TileKey {
    /// Index of the tile.
    pub index: TileIndex,
    /// Width and height of the decoded tile, in pixels.
    pub tile_size: u32,
}

impl TileKey {
    /// Creates the key of the given tile decoded at `tile_size` pixels.
    pub fn new(index: TileIndex, tile_size: u32) -> Self {
        Self { index, tile_size }
    }
}

/// Concurrent store of decoded tiles, keyed by [`TileKey`].
///
/// A tile, once inserted, is never replaced: the first insertion for a given
/// key wins and later ones are no-ops. Without a capacity the store only
/// grows; with a capacity the least recently used tiles are evicted.
pub struct TileCache {
    tiles: Mutex<Lru<TileKey, TileImage>>,
}

impl TileCache {
    /// Creates a cache that never evicts tiles.
    pub fn unbounded() -> Self {
        Self {
            tiles: Mutex::new(Lru::unbounded()),
        }
    }

    /// Creates a cache holding at most `capacity` tiles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tiles: Mutex::new(Lru::with_capacity(capacity)),
        }
    }

    /// Creates a cache bounded by the given capacity, or an unbounded one.
    pub fn new(capacity: Option<usize>) -> Self {
        match capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::unbounded(),
        }
    }

    /// Returns the tile stored under the given key, if any.
    pub fn lookup(&self, key: &TileKey) -> Option<TileImage> {
        self.lock().get(key).cloned()
    }

    /// Stores the given tile, unless a tile is already present for this key.
    ///
    /// Returns the tile that is in the cache after this call, which is the
    /// previously inserted one if there was a race.
    pub fn insert(&self, key: TileKey, image: TileImage) -> TileImage {
        let mut tiles = self.lock();
        let (inserted, evicted) = tiles.or_insert_with(key, || image.clone());
        if let Some(evicted) = evicted {
            trace!("Evicted tile {evicted:?} from memory");
        }
        if inserted {
            image
        } else {
            trace!("Tile {key:?} was already cached");
            tiles.get(&key).cloned().unwrap_or(image)
        }
    }

    /// Checks whether a tile is stored under the given key.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Returns the number of stored tiles.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Checks whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every stored tile.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Lru<TileKey, TileImage>> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
