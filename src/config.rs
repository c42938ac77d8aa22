use std::path::PathBuf;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::Value;

use crate::error::StatError;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

/// Mesh dimensions and the coordinate of the origin tile. Trace rows carry
/// absolute coordinates; everything downstream indexes origin-relative.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct GridConfig {
    pub dim_x: usize,
    pub dim_y: usize,
    pub origin_x: u32,
    pub origin_y: u32,
}

impl Config for GridConfig {}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            dim_x: 1,
            dim_y: 1,
            // Row 0 of the mesh is the host interface; tiles start at y=1.
            origin_x: 0,
            origin_y: 1,
        }
    }
}

impl GridConfig {
    pub fn num_tiles(&self) -> usize {
        self.dim_x * self.dim_y
    }

    /// Translate an absolute trace coordinate to an origin-relative (y, x)
    /// index, rejecting anything outside the configured mesh.
    pub fn relative(&self, x: u32, y: u32) -> Result<(usize, usize), StatError> {
        let out_of_bounds = || StatError::TileOutOfBounds {
            x,
            y,
            dim_x: self.dim_x,
            dim_y: self.dim_y,
            origin_x: self.origin_x,
            origin_y: self.origin_y,
        };
        let rx = x.checked_sub(self.origin_x).ok_or_else(out_of_bounds)? as usize;
        let ry = y.checked_sub(self.origin_y).ok_or_else(out_of_bounds)? as usize;
        if rx >= self.dim_x || ry >= self.dim_y {
            return Err(out_of_bounds());
        }
        Ok((ry, rx))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub out_dir: PathBuf,
    pub per_tile: bool,
    pub per_tile_group: bool,
}

impl Config for ReportConfig {}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("stats"),
            per_tile: false,
            per_tile_group: false,
        }
    }
}

/// Parse the optional TOML config, pulling out the `[grid]` and `[report]`
/// sections. Missing sections fall back to defaults.
pub fn load_config(text: &str) -> (GridConfig, ReportConfig) {
    let table: toml::Table = toml::from_str(text).expect("cannot parse config toml");
    (
        GridConfig::from_section(table.get("grid")),
        ReportConfig::from_section(table.get("report")),
    )
}
