use anyhow::{Context, Result};
use montage::Artifact;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Summary of every generated image and the geographic edges it spans
#[derive(Debug, Serialize)]
pub struct MapEdgesReport {
    pub scenario: String,
    pub kind: String,
    pub generated_at: String,
    pub overview: Option<Artifact>,
    pub location: Option<Artifact>,
    pub legs: Vec<Vec<Artifact>>,
}

impl MapEdgesReport {
    pub fn new(scenario: &str, kind: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            kind: kind.to_string(),
            generated_at: chrono::Local::now().to_rfc3339(),
            overview: None,
            location: None,
            legs: Vec::new(),
        }
    }

    pub fn image_count(&self) -> usize {
        self.overview.iter().count()
            + self.location.iter().count()
            + self.legs.iter().map(Vec::len).sum::<usize>()
    }

    /// Write the report as `map_edges.json` in `output_dir`
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join("map_edges.json");
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize map edges")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
