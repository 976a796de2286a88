use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk cache of downloaded map tiles for a single provider
pub struct TileCache {
    cache_dir: PathBuf,
}

impl TileCache {
    /// Create a cache below `root` for tiles fetched from `url_template`
    ///
    /// Each provider gets its own subdirectory so tiles from different
    /// imagery sources never collide.
    pub fn new<P: AsRef<Path>>(root: P, url_template: &str) -> Result<Self> {
        let cache_dir = root.as_ref().join(provider_dir_name(url_template));

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)
                .with_context(|| {
                    format!("Failed to create cache directory {}", cache_dir.display())
                })?;
        }

        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path a tile is stored under
    pub fn tile_path(&self, x: u32, y: u32, zoom: u32) -> PathBuf {
        self.cache_dir.join(format!("{}-{}_{}.jpg", zoom, x, y))
    }

    /// Get the cached file for a tile
    /// Returns None if the tile is not in the cache
    pub fn cached_tile(&self, x: u32, y: u32, zoom: u32) -> Option<PathBuf> {
        let file_path = self.tile_path(x, y, zoom);
        if file_path.exists() {
            Some(file_path)
        } else {
            None
        }
    }

    /// Save tile bytes to the cache
    pub fn save_tile(&self, x: u32, y: u32, zoom: u32, data: &[u8]) -> Result<PathBuf> {
        let file_path = self.tile_path(x, y, zoom);

        // Workers may fetch the same tile at once, so write aside and rename
        let mut file = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .context("Failed to create cache file")?;
        file.write_all(data)
            .context("Failed to write data to cache file")?;
        file.persist(&file_path)
            .map_err(|e| e.error)
            .context("Failed to move tile into the cache")?;

        Ok(file_path)
    }

    /// Drop a cached tile, e.g. after it failed to decode
    pub fn evict(&self, x: u32, y: u32, zoom: u32) -> Result<()> {
        let file_path = self.tile_path(x, y, zoom);
        if file_path.exists() {
            fs::remove_file(&file_path)
                .with_context(|| format!("Failed to remove {}", file_path.display()))?;
        }
        Ok(())
    }

    /// Clear the cache
    pub fn clear(&self) -> Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)
                .context("Failed to remove cache directory")?;
            fs::create_dir_all(&self.cache_dir)
                .context("Failed to recreate cache directory")?;
        }

        Ok(())
    }
}

/// Short hash of the provider URL template
fn provider_dir_name(url_template: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url_template.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}
