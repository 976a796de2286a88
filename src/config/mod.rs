use anyhow::{Context, Result};
use montage::{GeneratorConfig, RouteStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where tiles come from and how they are requested
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// URL with `{z}`, `{x}`, `{y}`, `{q}` (quadkey), `{s}` (subdomain) and `{key}` placeholders
    pub url_template: String,
    pub api_key: Option<String>,
    pub subdomains: Vec<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Maximum tiles fetched per calendar month; unlimited when absent
    pub monthly_quota: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            api_key: None,
            subdomains: Vec::new(),
            user_agent: format!("scenegen/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            monthly_quota: None,
        }
    }
}

/// Image generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub overview_tiles: u32,
    pub location_tiles: u32,
    pub leg_window_tiles: u32,
    pub leg_zoom_levels: u32,
    pub image_extension: String,
    pub draw_route_on_overview: bool,
    pub pushpins: bool,
    pub line_width: f32,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            overview_tiles: 2,
            location_tiles: 1,
            leg_window_tiles: 2,
            leg_zoom_levels: 3,
            image_extension: "png".to_string(),
            draw_route_on_overview: true,
            pushpins: true,
            line_width: 3.0,
        }
    }
}

/// Contents of the optional JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderConfig,
    pub images: ImageSettings,
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        anyhow::ensure!(settings.images.overview_tiles > 0, "overview_tiles must be at least 1");
        anyhow::ensure!(settings.images.location_tiles > 0, "location_tiles must be at least 1");
        anyhow::ensure!(
            settings.images.leg_window_tiles > 0,
            "leg_window_tiles must be at least 1"
        );
        Ok(settings)
    }

    pub fn generator_config(&self, output_dir: PathBuf) -> GeneratorConfig {
        GeneratorConfig {
            output_dir,
            overview_tiles: self.images.overview_tiles,
            location_tiles: self.images.location_tiles,
            leg_zoom_levels: self.images.leg_zoom_levels,
            image_extension: self.images.image_extension.clone(),
            route_style: RouteStyle {
                pushpins: self.images.pushpins,
                line_width: self.images.line_width,
                ..RouteStyle::default()
            },
            draw_route_on_overview: self.images.draw_route_on_overview,
        }
    }
}
