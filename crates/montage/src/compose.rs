use std::fs;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use log::{debug, info};
use tilegeo::{
    plan_square_step, square_up, BoundingBox, LatLon, SquareGoal, SquareStep, TILE_SIZE,
};

use crate::source::TileSource;
use crate::{CancelFlag, MontageError, StatusOr};

/// Pastes every tile of `bbox` into one raster, north to south and west to east.
pub fn compose<S: TileSource + ?Sized>(
    source: &S,
    bbox: &BoundingBox,
    cancel: &CancelFlag,
) -> StatusOr<RgbImage> {
    let (width, height) = bbox.pixel_size();
    let mut canvas = RgbImage::new(width, height);

    for (row, &y) in bbox.y_axis.iter().enumerate() {
        for (column, &x) in bbox.x_axis.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(MontageError::Cancelled);
            }

            let mut tile = source.tile_image(x, y, bbox.zoom)?;
            if tile.dimensions() != (TILE_SIZE, TILE_SIZE) {
                debug!(
                    "Resizing tile {}-{}_{} from {:?} to {}px",
                    bbox.zoom,
                    x,
                    y,
                    tile.dimensions(),
                    TILE_SIZE
                );
                tile = imageops::resize(&tile, TILE_SIZE, TILE_SIZE, FilterType::Lanczos3);
            }

            let left = i64::from(column as u32 * TILE_SIZE);
            let top = i64::from(row as u32 * TILE_SIZE);
            imageops::replace(&mut canvas, &tile, left, top);
        }
    }

    Ok(canvas)
}

/// Writes `image` next to `dest` and renames it into place, so readers never
/// see a partial file and a failed write leaves any previous file intact.
pub fn save_atomic(image: &RgbImage, dest: &Path) -> StatusOr<()> {
    let format = ImageFormat::from_path(dest)?;
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let temp = tempfile::Builder::new()
        .prefix(".montage-")
        .tempfile_in(dir)?;
    image.save_with_format(temp.path(), format)?;
    temp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Composites `bbox` and saves it as `dest`.
pub fn montage<S: TileSource + ?Sized>(
    source: &S,
    bbox: &BoundingBox,
    dest: &Path,
    cancel: &CancelFlag,
) -> StatusOr<()> {
    let image = compose(source, bbox, cancel)?;
    save_atomic(&image, dest)?;
    info!(
        "Composited {}x{} tiles at zoom {} into {}",
        bbox.width(),
        bbox.height(),
        bbox.zoom,
        dest.display()
    );
    Ok(())
}

/// Result of one [`make_square`] step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SquareOutcome {
    Padded(BoundingBox),
    ZoomedIn(BoundingBox),
    Complete(BoundingBox),
}

impl SquareOutcome {
    pub fn bbox(&self) -> &BoundingBox {
        match self {
            SquareOutcome::Padded(bbox)
            | SquareOutcome::ZoomedIn(bbox)
            | SquareOutcome::Complete(bbox) => bbox,
        }
    }
}

/// Applies one pad or zoom step to the image at `dest`, re-compositing it.
///
/// On failure the previously written image and `bbox` remain valid.
pub fn make_square<S: TileSource + ?Sized>(
    source: &S,
    bbox: &BoundingBox,
    coords: &[LatLon],
    goal: SquareGoal,
    dest: &Path,
    cancel: &CancelFlag,
) -> StatusOr<SquareOutcome> {
    match plan_square_step(bbox, coords, goal)? {
        SquareStep::Pad { bbox: padded, edges } => {
            debug!("Padding {} by {:?}", dest.display(), edges);
            montage(source, &padded, dest, cancel)?;
            Ok(SquareOutcome::Padded(padded))
        }
        SquareStep::ZoomIn { bbox: zoomed } => {
            montage(source, &zoomed, dest, cancel)?;
            Ok(SquareOutcome::ZoomedIn(zoomed))
        }
        SquareStep::Complete => Ok(SquareOutcome::Complete(bbox.clone())),
    }
}

/// Plans every pad and zoom step in memory, then composites the final box
/// into `dest` once.
///
/// Returns the final box; `dest` is left untouched when the plan fails.
pub fn square_and_montage<S: TileSource + ?Sized>(
    source: &S,
    bbox: &BoundingBox,
    coords: &[LatLon],
    goal: SquareGoal,
    dest: &Path,
    cancel: &CancelFlag,
) -> StatusOr<BoundingBox> {
    let done = square_up(bbox, coords, goal)?;
    if done != *bbox {
        debug!(
            "Squared {}x{} at zoom {} into {}x{} at zoom {}",
            bbox.width(),
            bbox.height(),
            bbox.zoom,
            done.width(),
            done.height(),
            done.zoom
        );
    }
    montage(source, &done, dest, cancel)?;
    Ok(done)
}

/// Resizes the image at `path` to `side` x `side` pixels in place.
pub fn resize_image(path: &Path, side: u32) -> StatusOr<()> {
    let image = image::open(path)?.to_rgb8();
    if image.dimensions() == (side, side) {
        return Ok(());
    }
    let resized = imageops::resize(&image, side, side, FilterType::Lanczos3);
    save_atomic(&resized, path)?;
    debug!("Resized {} to {}px", path.display(), side);
    Ok(())
}
