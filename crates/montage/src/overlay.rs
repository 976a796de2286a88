use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use log::debug;
use tilegeo::{tiles_per_axis, BoundingBox, Tile, TILE_SIZE};

use crate::compose::save_atomic;
use crate::StatusOr;

/// Appearance of a drawn route.
#[derive(Clone, Debug)]
pub struct RouteStyle {
    pub line_color: Rgb<u8>,
    pub line_width: f32,
    pub pushpins: bool,
    pub pushpin_radius: i32,
    pub pushpin_color: Rgb<u8>,
    pub pushpin_outline: Rgb<u8>,
}

impl Default for RouteStyle {
    fn default() -> Self {
        Self {
            line_color: Rgb([230, 20, 60]),
            line_width: 3.0,
            pushpins: true,
            pushpin_radius: 6,
            pushpin_color: Rgb([255, 215, 0]),
            pushpin_outline: Rgb([20, 20, 20]),
        }
    }
}

/// Pixel position of each tile's projected coordinate inside the montage of `bbox`.
///
/// Columns are counted eastward from the first column, across the antimeridian
/// if needed. Tiles must be projected at `bbox.zoom`.
pub fn route_pixels(tiles: &[Tile], bbox: &BoundingBox) -> Vec<(f32, f32)> {
    let n = i64::from(tiles_per_axis(bbox.zoom));
    let first_x = i64::from(bbox.x_axis.first().copied().unwrap_or(0));
    let first_y = i64::from(bbox.y_axis.first().copied().unwrap_or(0));
    let size = i64::from(TILE_SIZE);

    tiles
        .iter()
        .map(|tile| {
            let column = (i64::from(tile.x_index) - first_x).rem_euclid(n);
            let row = i64::from(tile.y_index) - first_y;
            (
                (column * size + i64::from(tile.x_offset)) as f32,
                (row * size + i64::from(tile.y_offset)) as f32,
            )
        })
        .collect()
}

/// Draws a line wider than one pixel by stamping circles along it.
fn draw_thick_line_segment_mut(
    image: &mut RgbImage,
    start: (f32, f32),
    end: (f32, f32),
    color: Rgb<u8>,
    width: f32,
) {
    if width <= 1.0 {
        draw_line_segment_mut(image, start, end, color);
        return;
    }

    let radius = (width / 2.0).max(1.0) as i32;
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let length = (dx * dx + dy * dy).sqrt();

    if length < 0.001 {
        draw_filled_circle_mut(image, (start.0 as i32, start.1 as i32), radius, color);
        return;
    }

    let step_size = (radius as f32 * 0.5).max(0.5);
    let num_steps = (length / step_size).ceil() as i32;
    let step_x = dx * step_size / length;
    let step_y = dy * step_size / length;

    for i in 0..=num_steps {
        let t = i as f32;
        let x = start.0 + t * step_x;
        let y = start.1 + t * step_y;
        draw_filled_circle_mut(image, (x.round() as i32, y.round() as i32), radius, color);
    }
    draw_filled_circle_mut(image, (end.0 as i32, end.1 as i32), radius, color);
}

/// Connects `points` in the given order and optionally marks each with a pushpin.
pub fn draw_route_on(image: &mut RgbImage, points: &[(f32, f32)], style: &RouteStyle) {
    for pair in points.windows(2) {
        draw_thick_line_segment_mut(image, pair[0], pair[1], style.line_color, style.line_width);
    }

    if style.pushpins {
        for &(x, y) in points {
            let centre = (x.round() as i32, y.round() as i32);
            draw_filled_circle_mut(image, centre, style.pushpin_radius + 1, style.pushpin_outline);
            draw_filled_circle_mut(image, centre, style.pushpin_radius, style.pushpin_color);
        }
    }
}

/// Draws the route given by `tiles` (in input order) onto the image at `image_path`.
pub fn draw_route(
    tiles: &[Tile],
    bbox: &BoundingBox,
    image_path: &Path,
    style: &RouteStyle,
) -> StatusOr<()> {
    let mut image = image::open(image_path)?.to_rgb8();
    let points = route_pixels(tiles, bbox);
    draw_route_on(&mut image, &points, style);
    save_atomic(&image, image_path)?;
    debug!("Drew {} route points onto {}", points.len(), image_path.display());
    Ok(())
}
