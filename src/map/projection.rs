//! Web Mercator conversions between latitude-longitude coordinates and global
//! pixel coordinates.
//!
//! At zoom level `z` with tiles of `tile_size` pixels, the whole world is a
//! square of `2^z * tile_size` pixels, with the origin at the top-left corner
//! (180° West, ~85.05° North).

use std::f64::consts::PI;

/// Minimum supported zoom level.
pub const MIN_ZOOM: u32 = 1;
/// Maximum supported zoom level.
pub const MAX_ZOOM: u32 = 19;
/// Latitude at which the Mercator world map becomes square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Data structure representing a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point<T> {
    /// X coordinate.
    pub x: T,
    /// Y coordinate.
    pub y: T,
}

/// Data structure representing a latitude-longitude coordinate, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a new coordinate.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Returns this coordinate, with the latitude clamped to the range the
    /// Mercator projection can display and the longitude to [-180, 180].
    pub fn clamped(&self) -> Self {
        Self {
            lat: self.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE),
            lon: self.lon.clamp(-180.0, 180.0),
        }
    }
}

/// Clamps a zoom level to the supported range.
pub fn clamp_zoom(zoom: i64) -> u32 {
    zoom.clamp(MIN_ZOOM as i64, MAX_ZOOM as i64) as u32
}

/// Size of the world at the given zoom level, in pixels.
fn world_size(zoom: u32, tile_size: u32) -> f64 {
    2_f64.powi(zoom as i32) * tile_size as f64
}

/// Converts a coordinate into global pixel coordinates.
///
/// The poles are singular: at ±90° the Y coordinate is meaningless, so callers
/// should clamp latitudes with [`GeoPoint::clamped()`] first.
pub fn geo_to_global_pixel(point: &GeoPoint, zoom: u32, tile_size: u32) -> Point<f64> {
    let size = world_size(zoom, tile_size);
    let x = (point.lon + 180.0) / 360.0 * size;
    let lat_rad = point.lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * size;
    Point { x, y }
}

/// Converts global pixel coordinates back into a latitude-longitude
/// coordinate.
pub fn global_pixel_to_geo(pixel: &Point<f64>, zoom: u32, tile_size: u32) -> GeoPoint {
    let size = world_size(zoom, tile_size);
    let lon = pixel.x / size * 360.0 - 180.0;
    let lat = ((1.0 - 2.0 * pixel.y / size) * PI).sinh().atan().to_degrees();
    GeoPoint { lat, lon }
}

/// Returns the index of the tile containing the given global pixel coordinate.
pub fn tile_index_for_global_pixel(pixel: f64, tile_size: u32) -> i64 {
    (pixel / tile_size as f64).floor() as i64
}
