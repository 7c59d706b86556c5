//! Service to fetch tiles from a map provider and decode them.

use super::raster::{blank_tile, decode_image, TileImage};
use crate::caching::cache::Cache;
use crate::caching::tile_cache::{TileCache, TileKey};
use crate::config::MapProvider;
use anyhow::{bail, Context};
use image::RgbaImage;
use log::{debug, error, trace, warn};
use reqwest::header::REFERER;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::spawn_blocking;

/// Index of a tile in Mercator coordinates.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TileIndex {
    /// Zoom level.
    pub z: u32,
    /// Index from West to East.
    pub x: u32,
    /// Index from North to South.
    pub y: u32,
}

/// Something that can download the raw bytes of a tile.
pub trait TileSource {
    /// Downloads the content at the given URL, in a single attempt.
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = anyhow::Result<Box<[u8]>>> + Send;
}

/// [`TileSource`] downloading tiles over HTTPS.
pub struct HttpTileSource {
    /// Network client.
    client: Client,
    /// Referer HTTP header to attach to each tile request.
    referer: Option<String>,
}

impl HttpTileSource {
    /// Creates a client for the given provider, giving up on requests that
    /// take longer than `timeout`.
    pub fn new(map_provider: &MapProvider, timeout: Duration) -> anyhow::Result<Self> {
        let client = Self::client_builder(map_provider, timeout)
            .build()
            .context("Failed to create the HTTP client")?;
        Ok(Self {
            client,
            referer: map_provider.referer.clone(),
        })
    }

    fn client_builder(map_provider: &MapProvider, timeout: Duration) -> ClientBuilder {
        Client::builder()
            .user_agent(map_provider.user_agent())
            .timeout(timeout)
    }
}

impl TileSource for HttpTileSource {
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Box<[u8]>> {
        let mut request = self.client.get(url);
        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to request {url} from the server"))?;

        let status_code = response.status();
        if status_code != StatusCode::OK {
            bail!("Tile server replied with status code {status_code} for {url}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read the response body for {url}"))?;
        Ok(Box::from(bytes.as_ref()))
    }
}

/// Handle to fetch decoded tiles, going through the caches before the
/// network.
///
/// Fetching never fails: a tile that can't be downloaded or decoded is
/// replaced by a blank tile.
pub struct TileFetcher<'a, S> {
    /// Provider to fetch the tiles from (on the Internet).
    map_provider: &'a MapProvider,
    /// Network access.
    source: &'a S,
    /// Decoded tiles shared across composites.
    memory: &'a TileCache,
    /// On-disk cache of raw tiles.
    disk: Option<&'a Cache>,
    /// Whether blank replacements of failed tiles are stored in memory too.
    cache_failed_tiles: bool,
    /// Lock per tile being loaded, so that concurrent requests for the same
    /// tile wait for a single download.
    in_flight: InFlight,
}

type InFlight = Mutex<HashMap<TileKey, Arc<tokio::sync::Mutex<()>>>>;

/// Share of the in-flight lock of a tile, held by one fetch.
///
/// Dropping the last share removes the lock from the map, whether the fetch
/// completed or was cancelled.
struct InFlightShare<'f> {
    in_flight: &'f InFlight,
    key: TileKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'f> InFlightShare<'f> {
    fn acquire(in_flight: &'f InFlight, key: TileKey) -> Self {
        let lock = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();
        Self {
            in_flight,
            key,
            lock,
        }
    }
}

impl Drop for InFlightShare<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Shares are only cloned under the map lock, so the count is stable here:
        // one for the map and one for this share.
        if Arc::strong_count(&self.lock) <= 2 {
            trace!("No more fetch in flight for tile {:?}", self.key);
            in_flight.remove(&self.key);
        }
    }
}

impl<'a, S: TileSource> TileFetcher<'a, S> {
    /// Creates a new handle to fetch tiles.
    pub fn new(map_provider: &'a MapProvider, source: &'a S, memory: &'a TileCache) -> Self {
        Self {
            map_provider,
            source,
            memory,
            disk: None,
            cache_failed_tiles: false,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Reads and writes raw tiles in the given on-disk cache.
    pub fn with_disk_cache(mut self, disk: Option<&'a Cache>) -> Self {
        self.disk = disk;
        self
    }

    /// Sets whether a tile that failed to load is remembered as blank (and
    /// never retried), or retried on the next request.
    pub fn cache_failed_tiles(mut self, cache_failed_tiles: bool) -> Self {
        self.cache_failed_tiles = cache_failed_tiles;
        self
    }

    /// Returns the decoded tile for the given index, or a blank tile of
    /// `tile_size` pixels if it couldn't be obtained.
    pub async fn fetch(&self, index: TileIndex, tile_size: u32) -> TileImage {
        let key = TileKey::new(index, tile_size);
        if let Some(tile) = self.memory.lookup(&key) {
            trace!("Obtained tile {key:?} from memory");
            return tile;
        }

        let share = InFlightShare::acquire(&self.in_flight, key);
        let _guard = share.lock.lock().await;

        // Another task may have loaded the tile while we were waiting.
        if let Some(tile) = self.memory.lookup(&key) {
            trace!("Tile {key:?} was loaded concurrently");
            return tile;
        }

        match self.load(&index, tile_size).await {
            Ok(image) => self.memory.insert(key, Arc::new(image)),
            Err(e) => {
                warn!("Using a blank tile for {key:?}: {e:#}");
                let blank = blank_tile(tile_size);
                if self.cache_failed_tiles {
                    self.memory.insert(key, blank)
                } else {
                    blank
                }
            }
        }
    }

    /// Loads the given tile from the disk cache or the network, and decodes it.
    async fn load(&self, index: &TileIndex, tile_size: u32) -> anyhow::Result<RgbaImage> {
        if let Some(disk) = self.disk {
            match disk.get_tile(index) {
                Ok(bytes) => match decode_tile(index, bytes, tile_size).await {
                    Ok(image) => {
                        debug!("Obtained tile {index:?} from disk");
                        return Ok(image);
                    }
                    Err(e) => warn!("Ignoring cached tile {index:?}: {e:#}"),
                },
                Err(e) => trace!("Tile {index:?} is not on disk: {e:#}"),
            }
        }

        let bytes = self.download(index).await?;
        let copy = self.disk.map(|_| bytes.clone());
        let image = decode_tile(index, bytes, tile_size).await?;

        if let (Some(disk), Some(bytes)) = (self.disk, copy) {
            if let Err(e) = disk.set_tile(index, &bytes) {
                error!("Couldn't write tile {index:?} to cache: {e:?}");
            }
        }
        Ok(image)
    }

    /// Downloads the raw bytes of the given tile.
    async fn download(&self, index: &TileIndex) -> anyhow::Result<Box<[u8]>> {
        let url = self.map_provider.tile_url(index);
        debug!("Requesting tile {index:?} from {url}");

        let bytes = self
            .source
            .fetch_bytes(&url)
            .await
            .with_context(|| format!("Failed to download tile {index:?}"))?;
        if bytes.is_empty() {
            bail!("Tile server returned an empty body for tile {index:?}");
        }
        Ok(bytes)
    }
}

/// Decodes a tile on a blocking thread, checking that it is a square of
/// `tile_size` pixels.
async fn decode_tile(
    index: &TileIndex,
    bytes: Box<[u8]>,
    tile_size: u32,
) -> anyhow::Result<RgbaImage> {
    trace!("Decoding tile {index:?} = {} bytes", bytes.len());
    let image = spawn_blocking(move || decode_image(&bytes))
        .await
        .with_context(|| format!("Failed to join background task decoding tile {index:?}"))?
        .with_context(|| format!("Failed to decode image data for tile {index:?}"))?;

    let (width, height) = image.dimensions();
    if (width, height) != (tile_size, tile_size) {
        bail!("Tile {index:?} is {width}x{height} pixels, expected {tile_size}x{tile_size}");
    }
    Ok(image)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::testing::{png_tile, FakeSource};
    use futures::future::join_all;
    use image::Rgba;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use tokio::time::timeout;

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn url(z: u32, x: u32, y: u32) -> String {
        format!("https://tile.openstreetmap.org/{z}/{x}/{y}.png")
    }

    #[tokio::test]
    async fn fetch_decodes_and_caches() {
        let provider = MapProvider::default();
        let source = FakeSource::new().with_response(&url(2, 1, 3), png_tile(16, RED));
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory);
        let index = TileIndex { z: 2, x: 1, y: 3 };

        let tile = fetcher.fetch(index, 16).await;
        assert_eq!(tile.dimensions(), (16, 16));
        assert_eq!(*tile.get_pixel(5, 5), Rgba(RED));
        assert!(memory.contains(&TileKey::new(index, 16)));

        let again = fetcher.fetch(index, 16).await;
        assert!(Arc::ptr_eq(&tile, &again));
        assert_eq!(source.request_count(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_blank_and_retried_by_default() {
        let provider = MapProvider::default();
        let source = FakeSource::new();
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory);
        let index = TileIndex {
            z: 16,
            x: 12345,
            y: 6789,
        };

        let tile = fetcher.fetch(index, 256).await;
        assert_eq!(tile.dimensions(), (256, 256));
        assert!(tile.as_raw().iter().all(|&b| b == 255));
        assert!(!memory.contains(&TileKey::new(index, 256)));

        fetcher.fetch(index, 256).await;
        assert_eq!(source.request_count(), 2);
        assert_eq!(source.requests()[0], url(16, 12345, 6789));
    }

    #[tokio::test]
    async fn fetch_failure_cached_when_configured() {
        let provider = MapProvider::default();
        let source = FakeSource::new();
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory).cache_failed_tiles(true);
        let index = TileIndex {
            z: 16,
            x: 12345,
            y: 6789,
        };

        let tile = fetcher.fetch(index, 256).await;
        assert!(tile.as_raw().iter().all(|&b| b == 255));
        assert!(memory.contains(&TileKey::new(index, 256)));

        let again = fetcher.fetch(index, 256).await;
        assert_eq!(*again, *blank_tile(256));
        assert_eq!(source.request_count(), 1);
    }

    #[tokio::test]
    async fn fetch_undecodable_or_empty_is_blank() {
        let provider = MapProvider::default();
        let source = FakeSource::new()
            .with_response(&url(3, 0, 0), Box::from(&b"<html>rate limited</html>"[..]))
            .with_response(&url(3, 0, 1), Box::from(&[][..]))
            .with_response(&url(3, 0, 2), png_tile(8, RED));
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory);

        for y in 0..3 {
            let tile = fetcher.fetch(TileIndex { z: 3, x: 0, y }, 16).await;
            assert_eq!(tile.dimensions(), (16, 16));
            assert!(tile.as_raw().iter().all(|&b| b == 255), "tile y = {y}");
        }
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn fetch_concurrent_requests_download_once() {
        let provider = MapProvider::default();
        let source = FakeSource::new()
            .with_response(&url(5, 7, 9), png_tile(32, RED))
            .with_delay(Duration::from_millis(20));
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory);
        let index = TileIndex { z: 5, x: 7, y: 9 };

        let tiles = join_all((0..16).map(|_| fetcher.fetch(index, 32))).await;
        assert_eq!(source.request_count(), 1);
        for tile in &tiles {
            assert_eq!(**tile, *tiles[0]);
        }
        assert!(fetcher.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_returns_requested_tile_size() {
        let provider = MapProvider::default();
        let source = FakeSource::new().with_response(&url(6, 10, 20), png_tile(16, RED));
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory);
        let index = TileIndex { z: 6, x: 10, y: 20 };

        let small = fetcher.fetch(index, 16).await;
        assert_eq!(small.dimensions(), (16, 16));
        assert_eq!(*small.get_pixel(0, 0), Rgba(RED));

        // The server only has 16-pixel tiles, so a 32-pixel tile is blank.
        let large = fetcher.fetch(index, 32).await;
        assert_eq!(large.dimensions(), (32, 32));
        assert!(large.as_raw().iter().all(|&b| b == 255));
        assert_eq!(source.request_count(), 2);

        let small = fetcher.fetch(index, 16).await;
        assert_eq!(small.dimensions(), (16, 16));
        assert_eq!(source.request_count(), 2);
    }

    #[tokio::test]
    async fn fetch_cancelled_releases_in_flight_locks() {
        let provider = MapProvider::default();
        let source = FakeSource::new().with_delay(Duration::from_millis(200));
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory);

        // Half of the fetches share a tile, so some are cancelled while
        // waiting for the lock and others while downloading.
        let fetches = (0..50).map(|x| {
            let index = TileIndex {
                z: 8,
                x: x % 25,
                y: 0,
            };
            timeout(Duration::from_millis(1), fetcher.fetch(index, 16))
        });
        for result in join_all(fetches).await {
            assert!(result.is_err());
        }
        assert!(fetcher.in_flight.lock().unwrap().is_empty());
        assert!(memory.is_empty());
    }

    /// Serves a single HTTP response on a local port, returning the base URL
    /// and a handle yielding the raw request.
    fn serve_once(response: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).to_lowercase()
        });
        (base, handle)
    }

    fn local_source(provider: &MapProvider) -> HttpTileSource {
        HttpTileSource {
            client: HttpTileSource::client_builder(provider, Duration::from_secs(5))
                .no_proxy()
                .build()
                .unwrap(),
            referer: provider.referer.clone(),
        }
    }

    #[tokio::test]
    async fn http_source_rejects_error_status() {
        let (base, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let provider = MapProvider {
            user_agent: Some("TileTest/1.0".to_owned()),
            referer: Some("https://example.org/".to_owned()),
            ..MapProvider::default()
        };
        let source = local_source(&provider);

        let result = source.fetch_bytes(&format!("{base}/1/0/0.png")).await;
        let error = format!("{:#}", result.unwrap_err());
        assert!(error.contains("404"), "{error}");

        let request = server.join().unwrap();
        assert!(request.starts_with("get /1/0/0.png "), "{request}");
        assert!(request.contains("user-agent: tiletest/1.0"), "{request}");
        assert!(request.contains("referer: https://example.org/"), "{request}");
    }

    #[tokio::test]
    async fn http_source_returns_body() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\ntile!",
        );
        let provider = MapProvider::default();
        let source = local_source(&provider);

        let bytes = source.fetch_bytes(&format!("{base}/2/1/1.png")).await.unwrap();
        assert_eq!(bytes.as_ref(), b"tile!");

        let request = server.join().unwrap();
        let user_agent = provider.user_agent().to_lowercase();
        assert!(request.contains(&format!("user-agent: {user_agent}")), "{request}");
    }

    #[tokio::test]
    async fn fetch_uses_disk_cache() {
        let dir =
            std::env::temp_dir().join(format!("tilestitch-fetch-disk-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let provider = MapProvider::default();
        let disk = Cache::new(&dir, &provider).unwrap();
        let index = TileIndex { z: 4, x: 2, y: 2 };

        // First run downloads and fills the disk cache.
        let source = FakeSource::new().with_response(&url(4, 2, 2), png_tile(8, RED));
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &source, &memory).with_disk_cache(Some(&disk));
        fetcher.fetch(index, 8).await;
        assert_eq!(source.request_count(), 1);
        assert!(disk.get_tile(&index).is_ok());

        // A fresh process memory finds the tile on disk.
        let offline = FakeSource::new();
        let memory = TileCache::unbounded();
        let fetcher = TileFetcher::new(&provider, &offline, &memory).with_disk_cache(Some(&disk));
        let tile = fetcher.fetch(index, 8).await;
        assert_eq!(*tile.get_pixel(0, 0), Rgba(RED));
        assert_eq!(offline.request_count(), 0);

        fs::remove_dir_all(&dir).unwrap();
    }
}
