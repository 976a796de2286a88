//! Slippy-map tile geometry.
//!
//! Converts geographic coordinates into web-map tile indices, reduces sets of
//! tiles to minimal rectangular index ranges, and plans how a non-square tile
//! window is grown (or zoomed) until it becomes square.

use std::f64::consts::PI;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bbox;
pub mod parse;
pub mod square;

pub use bbox::{build_bounding_box, select_zoom, tiles_for, BoundingBox, MapEdges};
pub use parse::{parse_coordinate, parse_lat_lon, Axis};
pub use square::{plan_square_step, square_up, PadEdges, SquareGoal, SquareStep};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Failed to parse '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("No coordinates supplied")]
    EmptyCoordinates,

    #[error("Geometry exhausted: {0}")]
    GeometryExhausted(String),
}

pub type StatusOr<T> = Result<T, GeoError>;

/// Edge length of a web-map raster tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Lowest zoom level used for scenario imagery.
pub const MIN_ZOOM: u32 = 2;

/// Highest zoom level used for scenario imagery.
pub const MAX_ZOOM: u32 = 18;

/// Highest zoom level the projection functions accept.
pub const MAX_PROJECTION_ZOOM: u32 = 30;

/// Latitude at which Web Mercator tiles end (atan(sinh(pi)) in degrees).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

// Fractional indices this close to an integer are treated as lying on the tile corner.
const SNAP_EPSILON: f64 = 1e-7;

/// A geographic position in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// One web-map raster cell plus the pixel position of a coordinate inside it.
///
/// Two tiles are equal when their indices match; the offsets only describe
/// where the projected coordinate landed.
#[derive(Clone, Copy, Debug)]
pub struct Tile {
    pub x_index: u32,
    pub y_index: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.x_index == other.x_index && self.y_index == other.y_index
    }
}

impl Eq for Tile {}

impl Hash for Tile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x_index.hash(state);
        self.y_index.hash(state);
    }
}

/// Number of tiles along one axis at `zoom`.
pub fn tiles_per_axis(zoom: u32) -> u32 {
    assert!(
        zoom <= MAX_PROJECTION_ZOOM,
        "zoom {} outside supported range 0..={}",
        zoom,
        MAX_PROJECTION_ZOOM
    );
    1u32 << zoom
}

fn snap(fractional: f64) -> f64 {
    let rounded = fractional.round();
    if (fractional - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        fractional
    }
}

/// Splits a fractional tile index into the integer index and the pixel offset inside it.
fn split_index(fractional: f64) -> (i64, u32) {
    let fractional = snap(fractional);
    let index = fractional.floor();
    let offset = (f64::from(TILE_SIZE) * (fractional - index)).round() as u32;
    (index as i64, offset.min(TILE_SIZE - 1))
}

/// Projects a coordinate onto the tile grid at `zoom`.
pub fn to_tile(lon: f64, lat: f64, zoom: u32) -> Tile {
    let n = tiles_per_axis(zoom);
    let scale = f64::from(n);

    let x_fractional = (lon + 180.0) / 360.0 * scale;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let y_fractional = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * scale;

    let (x, x_offset) = split_index(x_fractional);
    let (y, mut y_offset) = split_index(y_fractional);

    // Tiles wrap horizontally but stop at the poles.
    let x_index = x.rem_euclid(i64::from(n)) as u32;
    let y_index = if y < 0 {
        y_offset = 0;
        0
    } else if y >= i64::from(n) {
        y_offset = TILE_SIZE - 1;
        n - 1
    } else {
        y as u32
    };

    Tile {
        x_index,
        y_index,
        x_offset,
        y_offset,
    }
}

/// Top-left corner of the tile `(x_index, y_index)`.
///
/// Indices equal to `2^zoom` are accepted and address the far edge of the
/// last tile, which is how the south-east corner of a map is found.
pub fn to_lat_lon(x_index: u32, y_index: u32, zoom: u32) -> LatLon {
    let scale = f64::from(tiles_per_axis(zoom));
    let lat = (PI * (1.0 - 2.0 * f64::from(y_index) / scale))
        .sinh()
        .atan()
        .to_degrees();
    let lon = f64::from(x_index) / scale * 360.0 - 180.0;
    LatLon { lat, lon }
}

/// Next tile east, wrapping across the antimeridian.
pub fn inc_x(x_index: u32, zoom: u32) -> u32 {
    let n = tiles_per_axis(zoom);
    (x_index % n + 1) % n
}

/// Next tile west, wrapping across the antimeridian.
pub fn dec_x(x_index: u32, zoom: u32) -> u32 {
    let n = tiles_per_axis(zoom);
    (x_index % n + n - 1) % n
}

/// Next tile south, or `None` at the south pole.
pub fn inc_y(y_index: u32, zoom: u32) -> Option<u32> {
    let n = tiles_per_axis(zoom);
    if y_index + 1 >= n {
        None
    } else {
        Some(y_index + 1)
    }
}

/// Next tile north, or `None` at the north pole.
pub fn dec_y(y_index: u32, zoom: u32) -> Option<u32> {
    tiles_per_axis(zoom);
    y_index.checked_sub(1)
}

/// Bing-style quadkey for a tile.
pub fn quadkey(x_index: u32, y_index: u32, zoom: u32) -> String {
    tiles_per_axis(zoom);
    (1..=zoom)
        .rev()
        .map(|level| {
            let mask = 1u32 << (level - 1);
            let mut digit = b'0';
            if x_index & mask != 0 {
                digit += 1;
            }
            if y_index & mask != 0 {
                digit += 2;
            }
            digit as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_origin_projects_to_grid_centre() {
        let tile = to_tile(0.0, 0.0, 1);
        assert_eq!((tile.x_index, tile.y_index), (1, 1));
        assert_eq!((tile.x_offset, tile.y_offset), (0, 0));
    }

    #[test]
    fn test_seattle_tiles() {
        let tile = to_tile(-122.3321, 47.6062, 12);
        assert_eq!((tile.x_index, tile.y_index), (656, 1430));
        assert_eq!((tile.x_offset, tile.y_offset), (34, 128));

        let tile = to_tile(-122.4443, 47.2529, 9);
        assert_eq!((tile.x_index, tile.y_index), (81, 179));
        assert_eq!((tile.x_offset, tile.y_offset), (219, 142));
    }

    #[test]
    fn test_offset_never_reaches_tile_size() {
        // The fractional y position rounds up to 256 at this zoom.
        let tile = to_tile(-122.3321, 47.6062, 13);
        assert_eq!(tile.y_index, 2860);
        assert_eq!(tile.y_offset, TILE_SIZE - 1);
    }

    #[test]
    fn test_corner_round_trip() {
        for zoom in MIN_ZOOM..=MAX_ZOOM {
            let n = tiles_per_axis(zoom);
            let samples = [0, 1, n / 3, n / 2, n - 2, n - 1];
            for &x in &samples {
                for &y in &samples {
                    let corner = to_lat_lon(x, y, zoom);
                    let tile = to_tile(corner.lon, corner.lat, zoom);
                    assert_eq!(
                        (tile.x_index, tile.y_index),
                        (x, y),
                        "round trip failed at zoom {} for ({}, {})",
                        zoom,
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_poles_and_antimeridian_clamp() {
        let north = to_tile(10.0, 90.0, 5);
        assert_eq!(north.y_index, 0);
        let south = to_tile(10.0, -90.0, 5);
        assert_eq!(south.y_index, 31);
        let east_edge = to_tile(180.0, 0.0, 5);
        assert_eq!(east_edge.x_index, 0);
    }

    #[test]
    fn test_top_left_corner() {
        let corner = to_lat_lon(0, 0, 3);
        assert!((corner.lat - MAX_LATITUDE).abs() < 1e-9);
        assert_eq!(corner.lon, -180.0);

        let far = to_lat_lon(8, 8, 3);
        assert!((far.lat + MAX_LATITUDE).abs() < 1e-9);
        assert_eq!(far.lon, 180.0);
    }

    #[test]
    fn test_x_wraps() {
        assert_eq!(inc_x(15, 4), 0);
        assert_eq!(dec_x(0, 4), 15);
        assert_eq!(inc_x(7, 4), 8);
        assert_eq!(dec_x(8, 4), 7);
    }

    #[test]
    fn test_y_saturates_at_poles() {
        assert_eq!(inc_y(15, 4), None);
        assert_eq!(dec_y(0, 4), None);
        assert_eq!(inc_y(3, 4), Some(4));
        assert_eq!(dec_y(3, 4), Some(2));
    }

    #[test]
    #[should_panic]
    fn test_zoom_precondition() {
        tiles_per_axis(31);
    }

    #[test]
    fn test_tile_identity_ignores_offsets() {
        let a = Tile { x_index: 4, y_index: 7, x_offset: 1, y_offset: 2 };
        let b = Tile { x_index: 4, y_index: 7, x_offset: 200, y_offset: 90 };
        assert_eq!(a, b);
        let set: HashSet<Tile> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_quadkey() {
        assert_eq!(quadkey(3, 5, 3), "213");
        assert_eq!(quadkey(0, 0, 1), "0");
        assert_eq!(quadkey(0, 0, 0), "");
    }
}
