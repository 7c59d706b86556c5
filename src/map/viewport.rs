//! Where the map is looking at, as driven by user input.

use super::compositor::ViewportRequest;
use super::projection::{
    clamp_zoom, geo_to_global_pixel, global_pixel_to_geo, GeoPoint, Point,
};
use anyhow::ensure;

/// Fraction of the remaining distance covered by each step of
/// [`Viewport::step_towards()`].
const SMOOTHING: f64 = 0.2;
/// Distance in degrees below which a coordinate is considered reached.
const EPSILON: f64 = 1e-6;

/// Center, zoom and size of the displayed map.
///
/// Inputs are clamped so that every state can be composited: the latitude
/// stays within the Mercator range and the zoom within the supported levels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Window width, in pixels.
    width: u32,
    /// Window height, in pixels.
    height: u32,
    /// Size of the tiles, in pixels.
    tile_size: u32,
    /// Coordinate at the center of the window.
    center: GeoPoint,
    /// Zoom level.
    zoom: u32,
}

impl Viewport {
    /// Creates a viewport, clamping the given center and zoom.
    pub fn new(
        width: u32,
        height: u32,
        tile_size: u32,
        center: GeoPoint,
        zoom: i64,
    ) -> anyhow::Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "Window size must be positive, got {width}x{height}"
        );
        ensure!(tile_size > 0, "Tile size must be positive");
        ensure!(
            center.lat.is_finite() && center.lon.is_finite(),
            "Center must be finite, got {center:?}"
        );
        Ok(Self {
            width,
            height,
            tile_size,
            center: center.clamped(),
            zoom: clamp_zoom(zoom),
        })
    }

    /// Returns the coordinate at the center of the window.
    pub fn center(&self) -> GeoPoint {
        self.center
    }

    /// Returns the zoom level.
    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    /// Moves the center to the given coordinate.
    pub fn set_center(&mut self, center: GeoPoint) {
        if center.lat.is_finite() && center.lon.is_finite() {
            self.center = center.clamped();
        }
    }

    /// Adjusts the window size. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
    }

    /// Drags the map by the given number of pixels, i.e. moves the center in
    /// the opposite direction. The longitude wraps around the antimeridian.
    pub fn drag_relative(&mut self, dx: f64, dy: f64) {
        let pixel = geo_to_global_pixel(&self.center, self.zoom, self.tile_size);
        let moved = Point {
            x: pixel.x - dx,
            y: pixel.y - dy,
        };
        let mut center = global_pixel_to_geo(&moved, self.zoom, self.tile_size);
        center.lon = wrap_longitude(center.lon);
        self.set_center(center);
    }

    /// Changes the zoom level by the given number of steps, returning whether
    /// it changed.
    pub fn scroll(&mut self, steps: i64) -> bool {
        let zoom = clamp_zoom(self.zoom as i64 + steps);
        let changed = zoom != self.zoom;
        self.zoom = zoom;
        changed
    }

    /// Moves one step towards the given target: the center covers a fixed
    /// fraction of the remaining distance and the zoom changes by one level.
    ///
    /// Returns whether anything moved, i.e. whether the map needs to be
    /// composited again.
    pub fn step_towards(&mut self, target: &GeoPoint, target_zoom: i64) -> bool {
        let target = target.clamped();
        let target_zoom = clamp_zoom(target_zoom);
        let mut moved = false;

        if (self.center.lat - target.lat).abs() > EPSILON {
            self.center.lat += (target.lat - self.center.lat) * SMOOTHING;
            moved = true;
        }
        if (self.center.lon - target.lon).abs() > EPSILON {
            self.center.lon += (target.lon - self.center.lon) * SMOOTHING;
            moved = true;
        }
        match self.zoom.cmp(&target_zoom) {
            std::cmp::Ordering::Less => {
                self.zoom += 1;
                moved = true;
            }
            std::cmp::Ordering::Greater => {
                self.zoom -= 1;
                moved = true;
            }
            std::cmp::Ordering::Equal => (),
        }

        moved
    }

    /// Returns the request to composite the current view.
    pub fn request(&self) -> ViewportRequest {
        ViewportRequest {
            width: self.width,
            height: self.height,
            center: self.center,
            zoom: self.zoom,
            tile_size: self.tile_size,
        }
    }
}

/// Brings a longitude back into [-180, 180).
fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
