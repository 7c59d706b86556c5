//! Test doubles for the tile network.

use super::tiles::TileSource;
use anyhow::anyhow;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Encodes a single-color square tile as PNG.
pub fn png_tile(tile_size: u32, color: [u8; 4]) -> Box<[u8]> {
    let image = RgbaImage::from_pixel(tile_size, tile_size, Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner().into_boxed_slice()
}

/// In-memory tile server, answering from a fixed set of URLs and counting
/// the requests it receives.
#[derive(Default)]
pub struct FakeSource {
    responses: HashMap<String, Box<[u8]>>,
    requests: Mutex<Vec<String>>,
    count: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the given bytes for the given URL. Other URLs fail.
    pub fn with_response(mut self, url: &str, bytes: Box<[u8]>) -> Self {
        self.responses.insert(url.to_owned(), bytes);
        self
    }

    /// Makes each request take some time, so that concurrent requests overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort();
        requests
    }
}

impl TileSource for FakeSource {
    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Box<[u8]>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(url.to_owned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("Tile server replied with status code 404 Not Found"))
    }
}
