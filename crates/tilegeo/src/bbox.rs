use std::collections::HashSet;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    tiles_per_axis, to_lat_lon, to_tile, GeoError, LatLon, StatusOr, Tile, MAX_ZOOM, MIN_ZOOM,
    TILE_SIZE,
};

/// Minimal rectangle of tile indices covering a set of tiles.
///
/// `x_axis` is listed west to east and may wrap from `2^zoom - 1` back to 0;
/// `y_axis` is listed north to south and never wraps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub zoom: u32,
    pub x_axis: Vec<u32>,
    pub y_axis: Vec<u32>,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x_axis.len() as u32
    }

    pub fn height(&self) -> u32 {
        self.y_axis.len() as u32
    }

    pub fn is_square(&self) -> bool {
        self.width() == self.height()
    }

    /// Raster dimensions of the montage built from this box.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width() * TILE_SIZE, self.height() * TILE_SIZE)
    }

    /// Every `(x, y)` in raster order: north to south, then west to east.
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.y_axis
            .iter()
            .flat_map(move |&y| self.x_axis.iter().map(move |&x| (x, y)))
    }

    /// Column of `x_index` inside the box, counting across the antimeridian.
    pub fn column_of(&self, x_index: u32) -> Option<u32> {
        let first = *self.x_axis.first()?;
        let n = tiles_per_axis(self.zoom);
        let column = (x_index % n + n - first) % n;
        (column < self.width()).then_some(column)
    }

    pub fn row_of(&self, y_index: u32) -> Option<u32> {
        let first = *self.y_axis.first()?;
        let row = y_index.checked_sub(first)?;
        (row < self.height()).then_some(row)
    }

    pub fn contains(&self, tile: &Tile) -> bool {
        self.column_of(tile.x_index).is_some() && self.row_of(tile.y_index).is_some()
    }
}

/// Projects coordinates at `zoom`, dropping tiles already seen.
pub fn tiles_for(coords: &[LatLon], zoom: u32) -> Vec<Tile> {
    let mut seen = HashSet::new();
    coords
        .iter()
        .map(|c| to_tile(c.lon, c.lat, zoom))
        .filter(|tile| seen.insert(*tile))
        .collect()
}

/// Complement of the largest circular gap between the sorted, distinct x indices.
fn minimal_x_arc(xs: &[u32], n: u32) -> Vec<u32> {
    let mut start = xs[0];
    let mut end = xs[xs.len() - 1];
    // Wrap gap first so the non-wrapping run wins a tie.
    let mut largest_gap = xs[0] + n - end;

    for pair in xs.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > largest_gap {
            largest_gap = gap;
            start = pair[1];
            end = pair[0];
        }
    }

    let span = (end + n - start) % n + 1;
    (0..span).map(|i| (start + i) % n).collect()
}

/// Reduces tiles to the minimal contiguous x and y index runs covering them.
pub fn build_bounding_box(tiles: &[Tile], zoom: u32) -> StatusOr<BoundingBox> {
    if tiles.is_empty() {
        return Err(GeoError::EmptyCoordinates);
    }
    let n = tiles_per_axis(zoom);

    let mut xs: Vec<u32> = tiles.iter().map(|t| t.x_index).collect();
    xs.sort_unstable();
    xs.dedup();

    let y_min = tiles.iter().map(|t| t.y_index).min().unwrap_or(0);
    let y_max = tiles.iter().map(|t| t.y_index).max().unwrap_or(0);

    Ok(BoundingBox {
        zoom,
        x_axis: minimal_x_arc(&xs, n),
        y_axis: (y_min..=y_max).collect(),
    })
}

/// Highest zoom at which the coordinates fit within `max_wide` x `max_high` tiles.
pub fn select_zoom(coords: &[LatLon], max_wide: u32, max_high: u32) -> StatusOr<u32> {
    if coords.is_empty() {
        return Err(GeoError::EmptyCoordinates);
    }

    for zoom in MIN_ZOOM..=MAX_ZOOM {
        let bbox = build_bounding_box(&tiles_for(coords, zoom), zoom)?;
        if bbox.width() > max_wide || bbox.height() > max_high {
            if zoom == MIN_ZOOM {
                warn!(
                    "{} coordinates exceed a {}x{} tile budget even at zoom {}",
                    coords.len(),
                    max_wide,
                    max_high,
                    MIN_ZOOM
                );
                return Ok(MIN_ZOOM);
            }
            debug!("Selected zoom {} for a {}x{} budget", zoom - 1, max_wide, max_high);
            return Ok(zoom - 1);
        }
    }

    Ok(MAX_ZOOM)
}

/// Geographic extent of a composited image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapEdges {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl MapEdges {
    /// Derived from the top-left corner of the first tile and the top-left
    /// corner of the tile diagonally past the last one.
    pub fn from_bounding_box(bbox: &BoundingBox) -> Self {
        let first_x = bbox.x_axis.first().copied().unwrap_or(0);
        let first_y = bbox.y_axis.first().copied().unwrap_or(0);
        let last_x = bbox.x_axis.last().copied().unwrap_or(0);
        let last_y = bbox.y_axis.last().copied().unwrap_or(0);

        let top_left = to_lat_lon(first_x, first_y, bbox.zoom);
        let bottom_right = to_lat_lon(last_x + 1, last_y + 1, bbox.zoom);

        Self {
            north: top_left.lat,
            south: bottom_right.lat,
            west: top_left.lon,
            east: bottom_right.lon,
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.east < self.west
    }

    pub fn contains(&self, point: &LatLon) -> bool {
        let within_lat = point.lat <= self.north && point.lat >= self.south;
        let within_lon = if self.crosses_antimeridian() {
            point.lon >= self.west || point.lon <= self.east
        } else {
            point.lon >= self.west && point.lon <= self.east
        };
        within_lat && within_lon
    }
}

impl From<&BoundingBox> for MapEdges {
    fn from(bbox: &BoundingBox) -> Self {
        Self::from_bounding_box(bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seattle() -> Vec<LatLon> {
        vec![LatLon::new(47.6062, -122.3321), LatLon::new(47.2529, -122.4443)]
    }

    fn tile(x: u32, y: u32) -> Tile {
        Tile { x_index: x, y_index: y, x_offset: 0, y_offset: 0 }
    }

    #[test]
    fn test_contiguous_box() {
        let bbox = build_bounding_box(&[tile(5, 9), tile(3, 7), tile(4, 8)], 6).unwrap();
        assert_eq!(bbox.x_axis, vec![3, 4, 5]);
        assert_eq!(bbox.y_axis, vec![7, 8, 9]);
        assert_eq!(bbox.pixel_size(), (768, 768));
    }

    #[test]
    fn test_gaps_are_filled() {
        let bbox = build_bounding_box(&[tile(2, 2), tile(6, 5)], 4).unwrap();
        assert_eq!(bbox.x_axis, vec![2, 3, 4, 5, 6]);
        assert_eq!(bbox.y_axis, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_antimeridian_wrap() {
        let coords = vec![LatLon::new(0.0, 179.9), LatLon::new(0.0, -179.9)];
        let tiles = tiles_for(&coords, 4);
        let bbox = build_bounding_box(&tiles, 4).unwrap();
        assert_eq!(bbox.x_axis, vec![15, 0], "should be the short wrapping run");
        assert_eq!(bbox.column_of(0), Some(1));
        assert_eq!(bbox.column_of(15), Some(0));
        assert_eq!(bbox.column_of(7), None);
    }

    #[test]
    fn test_wide_wrapping_run() {
        let bbox = build_bounding_box(&[tile(13, 1), tile(2, 1), tile(0, 1)], 4).unwrap();
        assert_eq!(bbox.x_axis, vec![13, 14, 15, 0, 1, 2]);
    }

    #[test]
    fn test_tied_gaps_prefer_plain_run() {
        let bbox = build_bounding_box(&[tile(0, 0), tile(2, 0)], 2).unwrap();
        assert_eq!(bbox.x_axis, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_tiles_fail() {
        assert_eq!(build_bounding_box(&[], 3), Err(GeoError::EmptyCoordinates));
        assert_eq!(select_zoom(&[], 2, 2), Err(GeoError::EmptyCoordinates));
    }

    #[test]
    fn test_tiles_for_deduplicates_in_order() {
        let coords = vec![
            LatLon::new(47.6062, -122.3321),
            LatLon::new(47.6063, -122.3322),
            LatLon::new(47.2529, -122.4443),
        ];
        let tiles = tiles_for(&coords, 9);
        assert_eq!(tiles.len(), 2);
        assert_eq!((tiles[0].x_index, tiles[0].y_index), (82, 178));
        assert_eq!((tiles[1].x_index, tiles[1].y_index), (81, 179));
    }

    #[test]
    fn test_select_zoom_seattle() {
        let coords = seattle();
        let zoom = select_zoom(&coords, 2, 2).unwrap();
        assert_eq!(zoom, 9);

        let bbox = build_bounding_box(&tiles_for(&coords, zoom), zoom).unwrap();
        assert!(bbox.width() <= 2 && bbox.height() <= 2);
        let next = build_bounding_box(&tiles_for(&coords, zoom + 1), zoom + 1).unwrap();
        assert!(next.width() > 2 || next.height() > 2);

        assert_eq!(select_zoom(&coords, 1, 1).unwrap(), 7);
    }

    #[test]
    fn test_select_zoom_single_point_reaches_max() {
        let coords = vec![LatLon::new(51.4775, -0.4614)];
        assert_eq!(select_zoom(&coords, 1, 1).unwrap(), MAX_ZOOM);
    }

    #[test]
    fn test_select_zoom_clamps_to_min() {
        let coords = vec![
            LatLon::new(60.0, -170.0),
            LatLon::new(-60.0, -10.0),
            LatLon::new(0.0, 80.0),
        ];
        assert_eq!(select_zoom(&coords, 1, 1).unwrap(), MIN_ZOOM);
    }

    #[test]
    fn test_footprint_is_monotonic() {
        let sets = vec![
            seattle(),
            vec![LatLon::new(-33.9, 151.2), LatLon::new(-41.3, 174.8)],
            vec![LatLon::new(64.8, 179.5), LatLon::new(65.5, -178.0), LatLon::new(66.0, 179.9)],
        ];
        for coords in sets {
            let mut previous = (0, 0);
            for zoom in MIN_ZOOM..=MAX_ZOOM {
                let bbox = build_bounding_box(&tiles_for(&coords, zoom), zoom).unwrap();
                assert!(bbox.width() >= previous.0, "width shrank at zoom {}", zoom);
                assert!(bbox.height() >= previous.1, "height shrank at zoom {}", zoom);
                previous = (bbox.width(), bbox.height());
            }
        }
    }

    #[test]
    fn test_map_edges_cover_route() {
        let coords = seattle();
        let zoom = select_zoom(&coords, 2, 2).unwrap();
        let bbox = build_bounding_box(&tiles_for(&coords, zoom), zoom).unwrap();
        let edges = MapEdges::from(&bbox);

        assert!(edges.north > edges.south);
        assert!(edges.east > edges.west);
        for point in &coords {
            assert!(point.lat >= edges.south && point.lat <= edges.north);
            assert!(edges.contains(point));
        }
    }

    #[test]
    fn test_map_edges_across_antimeridian() {
        let bbox = BoundingBox { zoom: 4, x_axis: vec![15, 0], y_axis: vec![7, 8] };
        let edges = MapEdges::from_bounding_box(&bbox);
        assert!(edges.crosses_antimeridian());
        assert_eq!(edges.west, 157.5);
        assert_eq!(edges.east, -157.5);
        assert!(edges.contains(&LatLon::new(0.0, 179.9)));
        assert!(edges.contains(&LatLon::new(0.0, -179.9)));
        assert!(!edges.contains(&LatLon::new(0.0, 0.0)));
    }

    #[test]
    fn test_map_edges_serialize() {
        let edges = MapEdges { north: 1.0, south: -1.0, west: 2.0, east: 3.0 };
        let json = serde_json::to_string(&edges).unwrap();
        assert_eq!(json, r#"{"north":1.0,"south":-1.0,"west":2.0,"east":3.0}"#);
    }
}
