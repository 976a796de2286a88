use anyhow::{Context, Result};
use image::io::Reader as ImageReader;
use image::RgbImage;
use log::{debug, info, warn};
use montage::{MontageError, TileSource};
use reqwest::blocking::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::cache::TileCache;
use crate::config::ProviderConfig;

mod quota;

pub use quota::FetchQuota;

/// Downloader for map tiles that serves from the cache when it can
pub struct TileDownloader {
    cache: TileCache,
    client: Client,
    provider: ProviderConfig,
    quota: FetchQuota,
    next_subdomain: AtomicUsize,
}

impl TileDownloader {
    /// Create a new downloader with the given cache, provider and quota
    pub fn new(cache: TileCache, provider: ProviderConfig, quota: FetchQuota) -> Result<Self> {
        let client = Client::builder()
            .user_agent(provider.user_agent.clone())
            .timeout(Duration::from_secs(provider.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            cache,
            client,
            provider,
            quota,
            next_subdomain: AtomicUsize::new(0),
        })
    }

    pub fn quota(&self) -> &FetchQuota {
        &self.quota
    }

    /// Fill the provider URL template for a tile
    pub fn tile_url(&self, x: u32, y: u32, zoom: u32) -> String {
        let mut url = self
            .provider
            .url_template
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
            .replace("{q}", &tilegeo::quadkey(x, y, zoom));

        if !self.provider.subdomains.is_empty() {
            let turn = self.next_subdomain.fetch_add(1, Ordering::Relaxed);
            let index = turn % self.provider.subdomains.len();
            url = url.replace("{s}", &self.provider.subdomains[index]);
        }
        if let Some(key) = &self.provider.api_key {
            url = url.replace("{key}", key);
        }
        url
    }

    /// Read a cached tile, discarding it if it does not decode
    fn load_cached(&self, x: u32, y: u32, zoom: u32) -> Option<RgbImage> {
        let path = self.cache.cached_tile(x, y, zoom)?;
        let decoded = ImageReader::open(&path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(image::ImageError::IoError)
            .and_then(|reader| reader.decode());

        match decoded {
            Ok(image) => Some(image.to_rgb8()),
            Err(e) => {
                warn!("Discarding corrupt cached tile {}: {}", path.display(), e);
                if let Err(e) = self.cache.evict(x, y, zoom) {
                    warn!("{:#}", e);
                }
                None
            }
        }
    }

    /// Download a tile and add it to the cache
    fn download(&self, x: u32, y: u32, zoom: u32) -> Result<RgbImage> {
        if !self.quota.try_acquire()? {
            anyhow::bail!(
                "Monthly fetch quota of {} tiles exhausted",
                self.quota.limit().unwrap_or_default()
            );
        }

        let url = self.tile_url(x, y, zoom);
        debug!("Downloading tile from {}", url);
        let response = self.client.get(&url)
            .send()
            .context("Failed to send request")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download: HTTP {}", response.status());
        }
        let data = response.bytes()
            .context("Failed to read response bytes")?;

        let image = image::load_from_memory(&data)
            .context("Downloaded tile is not a valid image")?
            .to_rgb8();

        let cache_path = self.cache.save_tile(x, y, zoom, &data)
            .context("Failed to save to cache")?;
        info!("Downloaded tile {}-{}_{} to {}", zoom, x, y, cache_path.display());

        Ok(image)
    }
}

impl TileSource for TileDownloader {
    fn tile_image(&self, x: u32, y: u32, zoom: u32) -> montage::StatusOr<RgbImage> {
        if let Some(image) = self.load_cached(x, y, zoom) {
            return Ok(image);
        }
        self.download(x, y, zoom)
            .map_err(|e| MontageError::tile_unavailable(x, y, zoom, format!("{:#}", e)))
    }
}
