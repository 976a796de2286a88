use std::collections::HashMap;

use image::RgbImage;

use crate::{MontageError, StatusOr};

/// Supplies the raster for a tile.
///
/// Implementations own their caching and network access and must be safe to
/// share between image-generation workers.
pub trait TileSource: Send + Sync {
    /// Returns the tile image, or [`MontageError::TileUnavailable`] when it cannot be had.
    fn tile_image(&self, x: u32, y: u32, zoom: u32) -> StatusOr<RgbImage>;
}

impl<T: TileSource + ?Sized> TileSource for &T {
    fn tile_image(&self, x: u32, y: u32, zoom: u32) -> StatusOr<RgbImage> {
        (**self).tile_image(x, y, zoom)
    }
}

/// Tile images held in memory, keyed by `(x, y, zoom)`.
#[derive(Clone, Debug, Default)]
pub struct MemoryTileSource {
    tiles: HashMap<(u32, u32, u32), RgbImage>,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, x: u32, y: u32, zoom: u32, image: RgbImage) {
        self.tiles.insert((x, y, zoom), image);
    }
}

impl TileSource for MemoryTileSource {
    fn tile_image(&self, x: u32, y: u32, zoom: u32) -> StatusOr<RgbImage> {
        self.tiles
            .get(&(x, y, zoom))
            .cloned()
            .ok_or_else(|| MontageError::tile_unavailable(x, y, zoom, "not in memory source"))
    }
}
