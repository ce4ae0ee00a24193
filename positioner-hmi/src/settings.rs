//! Persistent settings for the positioner console.
//!
//! Settings live as JSON files in one directory, `~/.positioner_hmi/` by
//! default:
//!
//! - `tag_map.json`: controller tag names ([`TagMap`])
//! - `inspection.json`: inspection bounds ([`InspectionParameters`])
//! - `access.json`: engineering login ([`Credentials`])
//!
//! A missing file means defaults. A file that exists but does not parse is
//! an error, so a typo never silently reverts a setting.

use std::path::{Path, PathBuf};

use plc_link::TagMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::Credentials;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("HOME not set")]
    NoHome,

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid inspection parameters: {0}")]
    Invalid(String),
}

/// Inspection bounds used by the vision station, in mm and degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionParameters {
    pub min_slit_mm: f64,
    pub max_slit_mm: f64,
    /// Maximum slit center offset in x
    pub max_center_x_mm: f64,
    pub min_thickness_mm: f64,
    pub max_thickness_mm: f64,
    /// Maximum deviation from parallel
    pub max_parallel_deg: f64,
    /// Calibration: `mm_per_pixel_num` millimetres span `mm_per_pixel_den` pixels
    pub mm_per_pixel_num: f64,
    pub mm_per_pixel_den: u32,
}

impl Default for InspectionParameters {
    fn default() -> Self {
        Self {
            min_slit_mm: 0.5,
            max_slit_mm: 1.5,
            max_center_x_mm: 0.25,
            min_thickness_mm: 0.8,
            max_thickness_mm: 1.2,
            max_parallel_deg: 2.0,
            mm_per_pixel_num: 1.0,
            mm_per_pixel_den: 100,
        }
    }
}

impl InspectionParameters {
    pub fn mm_per_pixel(&self) -> f64 {
        self.mm_per_pixel_num / f64::from(self.mm_per_pixel_den)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let range = |name: &str, min: f64, max: f64| {
            if min <= max {
                Ok(())
            } else {
                Err(SettingsError::Invalid(format!("{name}: min {min} > max {max}")))
            }
        };
        range("slit", self.min_slit_mm, self.max_slit_mm)?;
        range("thickness", self.min_thickness_mm, self.max_thickness_mm)?;
        range("center x", 0.0, self.max_center_x_mm)?;
        range("parallel", 0.0, self.max_parallel_deg)?;
        if self.mm_per_pixel_den == 0 || self.mm_per_pixel_num <= 0.0 {
            return Err(SettingsError::Invalid(
                "mm per pixel ratio must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings directory manager.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    root_path: PathBuf,
}

impl SettingsStore {
    /// Store at the default path (`~/.positioner_hmi`).
    pub fn new() -> Result<Self, SettingsError> {
        let home = std::env::var("HOME").map_err(|_| SettingsError::NoHome)?;
        Ok(Self::with_path(PathBuf::from(home).join(".positioner_hmi")))
    }

    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn tag_map_path(&self) -> PathBuf {
        self.root_path.join("tag_map.json")
    }

    fn inspection_path(&self) -> PathBuf {
        self.root_path.join("inspection.json")
    }

    fn access_path(&self) -> PathBuf {
        self.root_path.join("access.json")
    }

    pub fn load_tag_map(&self) -> Result<TagMap, SettingsError> {
        self.load_or_default(&self.tag_map_path())
    }

    pub fn save_tag_map(&self, tags: &TagMap) -> Result<PathBuf, SettingsError> {
        self.save(self.tag_map_path(), tags)
    }

    pub fn load_inspection(&self) -> Result<InspectionParameters, SettingsError> {
        let params: InspectionParameters = self.load_or_default(&self.inspection_path())?;
        params.validate()?;
        Ok(params)
    }

    pub fn save_inspection(&self, params: &InspectionParameters) -> Result<PathBuf, SettingsError> {
        params.validate()?;
        self.save(self.inspection_path(), params)
    }

    pub fn load_credentials(&self) -> Result<Credentials, SettingsError> {
        self.load_or_default(&self.access_path())
    }

    pub fn save_credentials(&self, credentials: &Credentials) -> Result<PathBuf, SettingsError> {
        self.save(self.access_path(), credentials)
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write a settings file, creating the directory if needed.
    fn save<T: Serialize>(&self, path: PathBuf, value: &T) -> Result<PathBuf, SettingsError> {
        std::fs::create_dir_all(&self.root_path).map_err(io_error(&self.root_path))?;
        let json = serde_json::to_string_pretty(value).map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(io_error(&path))?;
        Ok(path)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SettingsError {
    let path = path.to_path_buf();
    move |source| SettingsError::Io { path, source }
}
