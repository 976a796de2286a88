//! Planning for the pad/zoom state machine that turns a tile window square.
//!
//! Each call to [`plan_square_step`] inspects the current shape and picks
//! exactly one transition. The caller applies it (re-compositing the raster)
//! and asks again until [`SquareStep::Complete`].

use log::debug;

use crate::bbox::{build_bounding_box, tiles_for, BoundingBox};
use crate::{
    dec_x, dec_y, inc_x, inc_y, tiles_per_axis, GeoError, LatLon, StatusOr, MAX_ZOOM, TILE_SIZE,
};

const MAX_SQUARE_STEPS: usize = 64;

/// Desired final shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SquareGoal {
    /// Tiles per side the square must reach before padding stops.
    pub side: u32,
    /// Whether a finished square may be traded for the same tile count one zoom level higher.
    pub zoom_in: bool,
}

/// How many tiles were added on each edge by a padding step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PadEdges {
    pub north: u32,
    pub south: u32,
    pub west: u32,
    pub east: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SquareStep {
    Pad { bbox: BoundingBox, edges: PadEdges },
    ZoomIn { bbox: BoundingBox },
    Complete,
}

fn pad(bbox: &BoundingBox, edges: PadEdges) -> StatusOr<BoundingBox> {
    let n = tiles_per_axis(bbox.zoom);
    if bbox.width() + edges.west + edges.east > n {
        return Err(GeoError::GeometryExhausted(format!(
            "{} columns would exceed the {} available at zoom {}",
            bbox.width() + edges.west + edges.east,
            n,
            bbox.zoom
        )));
    }

    let mut x_axis = bbox.x_axis.clone();
    for _ in 0..edges.west {
        let first = x_axis[0];
        x_axis.insert(0, dec_x(first, bbox.zoom));
    }
    for _ in 0..edges.east {
        let last = x_axis[x_axis.len() - 1];
        x_axis.push(inc_x(last, bbox.zoom));
    }

    let mut y_axis = bbox.y_axis.clone();
    for _ in 0..edges.north {
        let next = dec_y(y_axis[0], bbox.zoom)
            .ok_or_else(|| GeoError::GeometryExhausted("north pole reached".to_string()))?;
        y_axis.insert(0, next);
    }
    for _ in 0..edges.south {
        let next = inc_y(y_axis[y_axis.len() - 1], bbox.zoom)
            .ok_or_else(|| GeoError::GeometryExhausted("south pole reached".to_string()))?;
        y_axis.push(next);
    }

    Ok(BoundingBox {
        zoom: bbox.zoom,
        x_axis,
        y_axis,
    })
}

/// Rows that can still be added above and below the box.
fn row_room(bbox: &BoundingBox) -> (u32, u32) {
    let n = tiles_per_axis(bbox.zoom);
    let north = bbox.y_axis[0];
    let south = n - 1 - bbox.y_axis[bbox.y_axis.len() - 1];
    (north, south)
}

/// True when the route's vertical centroid lies in the upper half of the box.
fn route_leans_north(bbox: &BoundingBox, coords: &[LatLon]) -> bool {
    let rows: Vec<f64> = tiles_for(coords, bbox.zoom)
        .iter()
        .filter_map(|t| {
            bbox.row_of(t.y_index)
                .map(|row| f64::from(row * TILE_SIZE + t.y_offset))
        })
        .collect();
    if rows.is_empty() {
        return false;
    }
    let centroid = rows.iter().sum::<f64>() / rows.len() as f64;
    centroid < f64::from(bbox.height() * TILE_SIZE) / 2.0
}

/// Splits `wanted` new rows between north and south, preferring an even split.
fn split_rows(north_room: u32, south_room: u32, wanted: u32) -> Option<(u32, u32)> {
    if north_room + south_room < wanted {
        return None;
    }
    let mut north = (wanted / 2).min(north_room);
    let mut south = wanted - north;
    if south > south_room {
        south = south_room;
        north = wanted - south;
    }
    Some((north, south))
}

/// The same tile count one level deeper, positioned over the route footprint.
fn zoom_window(bbox: &BoundingBox, coords: &[LatLon]) -> StatusOr<Option<BoundingBox>> {
    if coords.is_empty() || bbox.zoom >= MAX_ZOOM {
        return Ok(None);
    }
    let zoom = bbox.zoom + 1;
    let side = bbox.width();
    let footprint = build_bounding_box(&tiles_for(coords, zoom), zoom)?;
    if footprint.width() > side || footprint.height() > side {
        return Ok(None);
    }

    let n = tiles_per_axis(zoom);
    let child_x = bbox.x_axis[0] * 2 % n;
    let child_y = bbox.y_axis[0] * 2;

    let x_offset = (footprint.x_axis[0] + n - child_x) % n;
    let Some(y_offset) = footprint.y_axis[0].checked_sub(child_y) else {
        return Ok(None);
    };
    if x_offset + footprint.width() > 2 * side || y_offset + footprint.height() > 2 * side {
        return Ok(None);
    }

    let x_start = x_offset
        .saturating_sub((side - footprint.width()) / 2)
        .min(side);
    let y_start = y_offset
        .saturating_sub((side - footprint.height()) / 2)
        .min(side);

    Ok(Some(BoundingBox {
        zoom,
        x_axis: (0..side).map(|i| (child_x + x_start + i) % n).collect(),
        y_axis: (0..side).map(|i| child_y + y_start + i).collect(),
    }))
}

/// Picks the single next transition for `bbox`.
///
/// `coords` is the route the image must keep covering. It decides which side
/// receives a lone padding row and where a zoomed window is placed.
pub fn plan_square_step(
    bbox: &BoundingBox,
    coords: &[LatLon],
    goal: SquareGoal,
) -> StatusOr<SquareStep> {
    if bbox.x_axis.is_empty() || bbox.y_axis.is_empty() {
        return Err(GeoError::EmptyCoordinates);
    }
    let (width, height) = (bbox.width(), bbox.height());
    let (north_room, south_room) = row_room(bbox);

    let edges = if width < height {
        PadEdges { west: 1, east: 1, ..Default::default() }
    } else if width > height {
        if north_room == 0 && south_room == 0 {
            return Err(GeoError::GeometryExhausted(
                "rows already span both poles".to_string(),
            ));
        }
        if south_room == 0 {
            PadEdges { north: 1, ..Default::default() }
        } else if north_room == 0 {
            PadEdges { south: 1, ..Default::default() }
        } else if width - height >= 2 {
            PadEdges { north: 1, south: 1, ..Default::default() }
        } else if route_leans_north(bbox, coords) {
            PadEdges { north: 1, ..Default::default() }
        } else {
            PadEdges { south: 1, ..Default::default() }
        }
    } else if width < goal.side {
        let (north, south) = split_rows(north_room, south_room, 2).ok_or_else(|| {
            GeoError::GeometryExhausted("rows already span both poles".to_string())
        })?;
        PadEdges { north, south, west: 1, east: 1 }
    } else {
        return match zoom_window(bbox, coords)? {
            Some(zoomed) if goal.zoom_in => {
                debug!("Zooming {}x{} window from {} to {}", width, height, bbox.zoom, zoomed.zoom);
                Ok(SquareStep::ZoomIn { bbox: zoomed })
            }
            _ => Ok(SquareStep::Complete),
        };
    };

    let padded = pad(bbox, edges)?;
    debug!(
        "Padded {}x{} to {}x{} at zoom {} ({:?})",
        width,
        height,
        padded.width(),
        padded.height(),
        bbox.zoom,
        edges
    );
    Ok(SquareStep::Pad { bbox: padded, edges })
}

/// Applies planner steps until the box is square and complete.
pub fn square_up(bbox: &BoundingBox, coords: &[LatLon], goal: SquareGoal) -> StatusOr<BoundingBox> {
    let mut current = bbox.clone();
    for _ in 0..MAX_SQUARE_STEPS {
        match plan_square_step(&current, coords, goal)? {
            SquareStep::Pad { bbox, .. } | SquareStep::ZoomIn { bbox } => current = bbox,
            SquareStep::Complete => return Ok(current),
        }
    }
    Err(GeoError::GeometryExhausted(format!(
        "no square reached after {} steps",
        MAX_SQUARE_STEPS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{to_lat_lon, to_tile};

    const PAD_ONLY: SquareGoal = SquareGoal { side: 2, zoom_in: false };
    const ZOOMING: SquareGoal = SquareGoal { side: 2, zoom_in: true };

    fn bbox(zoom: u32, x_axis: &[u32], y_axis: &[u32]) -> BoundingBox {
        BoundingBox { zoom, x_axis: x_axis.to_vec(), y_axis: y_axis.to_vec() }
    }

    fn expect_pad(step: SquareStep) -> (BoundingBox, PadEdges) {
        match step {
            SquareStep::Pad { bbox, edges } => (bbox, edges),
            other => panic!("expected a padding step, got {:?}", other),
        }
    }

    #[test]
    fn test_tall_box_pads_west_and_east() {
        let route = vec![to_lat_lon(5, 5, 10), to_lat_lon(5, 6, 10)];
        let start = bbox(10, &[5], &[5, 6]);

        let (padded, edges) = expect_pad(plan_square_step(&start, &route, PAD_ONLY).unwrap());
        assert_eq!(padded.x_axis, vec![4, 5, 6]);
        assert_eq!(padded.y_axis, vec![5, 6]);
        assert_eq!(edges, PadEdges { west: 1, east: 1, ..Default::default() });
        assert_eq!(start.x_axis, vec![5], "input box must stay untouched");

        // 3x2 is one row short; the route sits in the upper half so north gets it.
        let (square, edges) = expect_pad(plan_square_step(&padded, &route, PAD_ONLY).unwrap());
        assert_eq!(square.y_axis, vec![4, 5, 6]);
        assert_eq!(edges.north, 1);
        assert!(square.is_square());
        assert_eq!(plan_square_step(&square, &route, PAD_ONLY).unwrap(), SquareStep::Complete);
    }

    #[test]
    fn test_wide_box_pads_both_rows() {
        let step = plan_square_step(&bbox(10, &[1, 2, 3], &[8]), &[], PAD_ONLY).unwrap();
        let (padded, edges) = expect_pad(step);
        assert_eq!(padded.y_axis, vec![7, 8, 9]);
        assert_eq!(edges, PadEdges { north: 1, south: 1, ..Default::default() });
    }

    #[test]
    fn test_wide_box_at_south_pole_pads_north() {
        let (padded, _) = expect_pad(plan_square_step(&bbox(3, &[2, 3], &[7]), &[], PAD_ONLY).unwrap());
        assert_eq!(padded.y_axis, vec![6, 7]);
    }

    #[test]
    fn test_wide_box_at_north_pole_pads_south() {
        let (padded, _) = expect_pad(plan_square_step(&bbox(3, &[2, 3, 4], &[0]), &[], PAD_ONLY).unwrap());
        assert_eq!(padded.y_axis, vec![0, 1]);
    }

    #[test]
    fn test_small_square_pads_all_sides() {
        let (padded, edges) = expect_pad(plan_square_step(&bbox(10, &[5], &[5]), &[], PAD_ONLY).unwrap());
        assert_eq!(padded.x_axis, vec![4, 5, 6]);
        assert_eq!(padded.y_axis, vec![4, 5, 6]);
        assert_eq!(edges, PadEdges { north: 1, south: 1, west: 1, east: 1 });
    }

    #[test]
    fn test_small_square_at_pole_grows_away_from_it() {
        let (padded, edges) = expect_pad(plan_square_step(&bbox(10, &[0], &[0]), &[], PAD_ONLY).unwrap());
        assert_eq!(padded.x_axis, vec![1023, 0, 1]);
        assert_eq!(padded.y_axis, vec![0, 1, 2]);
        assert_eq!(edges.north, 0);
        assert_eq!(edges.south, 2);
    }

    #[test]
    fn test_columns_cannot_exceed_world() {
        let result = plan_square_step(&bbox(2, &[0, 1, 2], &[0, 1, 2, 3]), &[], PAD_ONLY);
        assert!(matches!(result, Err(GeoError::GeometryExhausted(_))));

        let whole = bbox(2, &[0, 1, 2, 3], &[0, 1, 2, 3]);
        let result = plan_square_step(&whole, &[], SquareGoal { side: 6, zoom_in: false });
        assert!(matches!(result, Err(GeoError::GeometryExhausted(_))));
    }

    #[test]
    fn test_target_square_without_room_to_zoom_is_complete() {
        let route = vec![LatLon::new(47.6062, -122.3321), LatLon::new(47.2529, -122.4443)];
        let start = bbox(9, &[81, 82], &[178, 179]);
        assert_eq!(plan_square_step(&start, &route, ZOOMING).unwrap(), SquareStep::Complete);
    }

    #[test]
    fn test_zoom_in_keeps_tile_count_and_route() {
        let point = LatLon::new(51.4775, -0.4614);
        let tile = to_tile(point.lon, point.lat, 5);
        let start = bbox(5, &[tile.x_index], &[tile.y_index]);

        let result = square_up(&start, &[point], ZOOMING).unwrap();
        assert_eq!(result.zoom, MAX_ZOOM);
        assert_eq!((result.width(), result.height()), (3, 3));
        assert!(result.contains(&to_tile(point.lon, point.lat, MAX_ZOOM)));
    }

    #[test]
    fn test_zoom_in_across_antimeridian() {
        let point = LatLon::new(0.5, 179.99);
        let start = bbox(4, &[15], &[7]);

        let step = plan_square_step(&start, &[point], ZOOMING).unwrap();
        let (padded, _) = expect_pad(step);
        assert_eq!(padded.x_axis, vec![14, 15, 0]);

        match plan_square_step(&padded, &[point], ZOOMING).unwrap() {
            SquareStep::ZoomIn { bbox } => {
                assert_eq!(bbox.zoom, 5);
                assert_eq!(bbox.width(), 3);
                assert!(bbox.contains(&to_tile(point.lon, point.lat, 5)));
            }
            other => panic!("expected zoom in, got {:?}", other),
        }
    }

    #[test]
    fn test_square_up_converges() {
        let route = vec![LatLon::new(47.6062, -122.3321), LatLon::new(47.2529, -122.4443)];
        let start = build_bounding_box(&tiles_for(&route, 10), 10).unwrap();
        assert_eq!((start.width(), start.height()), (2, 3));

        let result = square_up(&start, &route, ZOOMING).unwrap();
        assert!(result.is_square());
        assert!(result.width() >= 2);
        for tile in tiles_for(&route, result.zoom) {
            assert!(result.contains(&tile), "route tile {:?} outside final box", tile);
        }
    }

    #[test]
    fn test_split_rows() {
        assert_eq!(split_rows(5, 5, 2), Some((1, 1)));
        assert_eq!(split_rows(0, 5, 2), Some((0, 2)));
        assert_eq!(split_rows(5, 0, 2), Some((2, 0)));
        assert_eq!(split_rows(1, 0, 2), None);
    }
}
