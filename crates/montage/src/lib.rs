//! Composites web-map tiles into scenario images.
//!
//! Tiles come from a [`TileSource`], are pasted into a raster, the raster is
//! padded or zoomed until square, and a route may be drawn over the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use thiserror::Error;
use tilegeo::GeoError;

pub mod compose;
pub mod generator;
pub mod overlay;
pub mod source;

pub use compose::{
    compose, make_square, montage, resize_image, save_atomic, square_and_montage, SquareOutcome,
};
pub use generator::{Artifact, GeneratorConfig, ImageGenerator};
pub use overlay::{draw_route, draw_route_on, route_pixels, RouteStyle};
pub use source::{MemoryTileSource, TileSource};

#[derive(Error, Debug)]
pub enum MontageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Tile {zoom}-{x}_{y} unavailable: {reason}")]
    TileUnavailable {
        x: u32,
        y: u32,
        zoom: u32,
        reason: String,
    },

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeoError),

    #[error("Image generation cancelled")]
    Cancelled,
}

pub type StatusOr<T> = Result<T, MontageError>;

impl MontageError {
    pub fn tile_unavailable(x: u32, y: u32, zoom: u32, reason: impl Into<String>) -> Self {
        MontageError::TileUnavailable {
            x,
            y,
            zoom,
            reason: reason.into(),
        }
    }
}

/// Cooperative cancellation checked between tile fetches.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives coarse-grained progress messages, one line per call.
pub trait Progress: Send + Sync {
    fn report(&self, message: &str);
}

/// Forwards progress to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn report(&self, message: &str) {
        info!("{}", message);
    }
}
