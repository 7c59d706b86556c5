//! RGBA pixel buffers: decoded tiles and composited maps.

use image::{ImageError, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

/// Color of pixels not covered by any tile.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// A decoded tile, shared between the cache and the composites using it.
pub type TileImage = Arc<RgbaImage>;

/// Returns an opaque white tile, used in place of tiles that couldn't be
/// fetched or decoded.
pub fn blank_tile(tile_size: u32) -> TileImage {
    Arc::new(RgbaImage::from_pixel(tile_size, tile_size, BACKGROUND))
}

/// Returns a raster of the given size filled with the background color.
pub fn background(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BACKGROUND)
}

/// Decodes an image in RGBA format, whatever the channel layout of the source.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, ImageError> {
    let dynamic_image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(dynamic_image.to_rgba8())
}

/// Copies `tile` into `dest` with its top-left corner at `(offset_x,
/// offset_y)`, skipping pixels that fall outside of `dest`.
///
/// Returns the number of pixels written.
pub fn blit(dest: &mut RgbaImage, tile: &RgbaImage, offset_x: i64, offset_y: i64) -> usize {
    let (dest_width, dest_height) = (dest.width() as i64, dest.height() as i64);
    let (tile_width, tile_height) = (tile.width() as i64, tile.height() as i64);

    let x0 = offset_x.max(0);
    let x1 = (offset_x + tile_width).min(dest_width);
    let y0 = offset_y.max(0);
    let y1 = (offset_y + tile_height).min(dest_height);
    if x0 >= x1 || y0 >= y1 {
        return 0;
    }

    let row_len = ((x1 - x0) * 4) as usize;
    let src = tile.as_raw();
    let dst: &mut [u8] = dest;
    for y in y0..y1 {
        let src_start = (((y - offset_y) * tile_width + (x0 - offset_x)) * 4) as usize;
        let dst_start = ((y * dest_width + x0) * 4) as usize;
        dst[dst_start..dst_start + row_len].copy_from_slice(&src[src_start..src_start + row_len]);
    }

    ((x1 - x0) * (y1 - y0)) as usize
}
