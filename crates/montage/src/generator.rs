use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;
use serde::Serialize;
use tilegeo::{
    build_bounding_box, select_zoom, tiles_for, to_tile, BoundingBox, LatLon, MapEdges, SquareGoal,
    Tile, MAX_ZOOM, TILE_SIZE,
};

use crate::compose::{resize_image, square_and_montage};
use crate::overlay::{draw_route, RouteStyle};
use crate::source::TileSource;
use crate::{CancelFlag, LogProgress, Progress, StatusOr};

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub output_dir: PathBuf,
    /// Tiles per side of the overview image.
    pub overview_tiles: u32,
    /// Tiles per side of the location thumbnail.
    pub location_tiles: u32,
    /// Number of successive zoom levels rendered for every leg.
    pub leg_zoom_levels: u32,
    /// Extension of written images; selects the encoder.
    pub image_extension: String,
    pub route_style: RouteStyle,
    pub draw_route_on_overview: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            overview_tiles: 2,
            location_tiles: 1,
            leg_zoom_levels: 3,
            image_extension: "png".to_string(),
            route_style: RouteStyle::default(),
            draw_route_on_overview: true,
        }
    }
}

/// An image written to disk together with the area it shows.
#[derive(Clone, Debug, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub zoom: u32,
    pub bbox: BoundingBox,
    pub edges: MapEdges,
}

/// Shape requirements for one image.
struct ImagePlan<'a> {
    coords: &'a [LatLon],
    zoom: u32,
    goal: SquareGoal,
    draw_route: bool,
    final_pixels: Option<u32>,
}

/// Builds overview, location and leg images from a tile source.
///
/// Holds no per-request state, so independent requests may run concurrently
/// as long as they write different files.
pub struct ImageGenerator<S: TileSource> {
    source: S,
    config: GeneratorConfig,
    progress: Arc<dyn Progress>,
    cancel: CancelFlag,
}

impl<S: TileSource> ImageGenerator<S> {
    pub fn new(source: S, config: GeneratorConfig) -> Self {
        Self {
            source,
            config,
            progress: Arc::new(LogProgress),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn output_path(&self, stem: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.{}", stem, self.config.image_extension))
    }

    fn route_tiles(coords: &[LatLon], zoom: u32) -> Vec<Tile> {
        coords.iter().map(|c| to_tile(c.lon, c.lat, zoom)).collect()
    }

    /// Builds the image in a hidden working file next to `path` and renames it
    /// into place only once every step has succeeded.
    fn render(&self, plan: ImagePlan<'_>, path: &Path) -> StatusOr<Artifact> {
        let dir = path.parent().unwrap_or(self.config.output_dir.as_path());
        fs::create_dir_all(dir)?;
        // Dropping the handle on any error path removes the working file
        let work = tempfile::Builder::new()
            .prefix(".render-")
            .suffix(&format!(".{}", self.config.image_extension))
            .tempfile_in(dir)?
            .into_temp_path();

        let start = build_bounding_box(&tiles_for(plan.coords, plan.zoom), plan.zoom)?;
        let bbox = square_and_montage(
            &self.source,
            &start,
            plan.coords,
            plan.goal,
            &work,
            &self.cancel,
        )?;

        if plan.draw_route {
            let tiles = Self::route_tiles(plan.coords, bbox.zoom);
            draw_route(&tiles, &bbox, &work, &self.config.route_style)?;
        }
        if let Some(pixels) = plan.final_pixels {
            resize_image(&work, pixels)?;
        }
        work.persist(path).map_err(|e| e.error)?;

        debug!("{} covers {:?}", path.display(), bbox);
        Ok(Artifact {
            path: path.to_path_buf(),
            zoom: bbox.zoom,
            edges: MapEdges::from_bounding_box(&bbox),
            bbox,
        })
    }

    /// Square overview of the whole route, drawn with the route on top.
    pub fn compute_overview_image(&self, coords: &[LatLon]) -> StatusOr<Artifact> {
        let side = self.config.overview_tiles;
        self.progress
            .report(&format!("Building overview image for {} coordinates", coords.len()));

        let plan = ImagePlan {
            coords,
            zoom: select_zoom(coords, side, side)?,
            goal: SquareGoal { side, zoom_in: true },
            draw_route: self.config.draw_route_on_overview,
            final_pixels: Some(side * TILE_SIZE),
        };
        let artifact = self.render(plan, &self.output_path("overview"))?;

        self.progress
            .report(&format!("Overview image written to {}", artifact.path.display()));
        Ok(artifact)
    }

    /// Thumbnail around the scenario location.
    pub fn compute_location_image(&self, coords: &[LatLon]) -> StatusOr<Artifact> {
        let side = self.config.location_tiles;
        self.progress.report("Building location image");

        let plan = ImagePlan {
            coords,
            zoom: select_zoom(coords, side, side)?,
            goal: SquareGoal { side, zoom_in: true },
            draw_route: false,
            final_pixels: Some(side * TILE_SIZE),
        };
        let artifact = self.render(plan, &self.output_path("location"))?;

        self.progress
            .report(&format!("Location image written to {}", artifact.path.display()));
        Ok(artifact)
    }

    /// One image per zoom level for the leg from `start` to `end`.
    ///
    /// The first level is the deepest zoom at which the leg fits in a
    /// `window` x `window` grid; following levels zoom in one step each.
    /// Every image is scaled to `window * TILE_SIZE` pixels square.
    pub fn compute_leg_route_images(
        &self,
        leg: usize,
        start: LatLon,
        end: LatLon,
        window: u32,
    ) -> StatusOr<Vec<Artifact>> {
        let coords = [start, end];
        let first_zoom = select_zoom(&coords, window, window)?;
        let last_zoom = (first_zoom + self.config.leg_zoom_levels.max(1) - 1).min(MAX_ZOOM);
        self.progress.report(&format!(
            "Building leg {} images for zoom {} to {}",
            leg + 1,
            first_zoom,
            last_zoom
        ));

        (first_zoom..=last_zoom)
            .map(|zoom| {
                let plan = ImagePlan {
                    coords: &coords,
                    zoom,
                    goal: SquareGoal { side: window, zoom_in: false },
                    draw_route: true,
                    final_pixels: Some(window * TILE_SIZE),
                };
                self.render(plan, &self.output_path(&format!("leg_{:02}_z{}", leg + 1, zoom)))
            })
            .collect()
    }

    /// Leg images for every consecutive pair of `coords`, built in parallel.
    pub fn compute_all_leg_route_images(
        &self,
        coords: &[LatLon],
        window: u32,
    ) -> StatusOr<Vec<Vec<Artifact>>> {
        let legs: Vec<(usize, LatLon, LatLon)> = coords
            .windows(2)
            .enumerate()
            .map(|(leg, pair)| (leg, pair[0], pair[1]))
            .collect();

        let images = legs
            .par_iter()
            .map(|&(leg, start, end)| self.compute_leg_route_images(leg, start, end, window))
            .collect::<StatusOr<Vec<_>>>()?;

        self.progress
            .report(&format!("Built images for {} legs", images.len()));
        Ok(images)
    }
}
