use crate::error::{CheckError, Result};
use serde::{Deserialize, Serialize};
use simplelog::LevelFilter;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONTROL_ROOT: &str = "LEGEND_CHECK_CONTROL_ROOT";
pub const ENV_CONTROL_PREFIX: &str = "LEGEND_CHECK_CONTROL_PREFIX";
pub const ENV_ARTIFACT_DIR: &str = "LEGEND_CHECK_ARTIFACT_DIR";
pub const ENV_COLOR_TOLERANCE: &str = "LEGEND_CHECK_COLOR_TOLERANCE";
pub const ENV_LOG_LEVEL: &str = "LEGEND_CHECK_LOG_LEVEL";

const DEFAULT_CONTROL_ROOT: &str = "tests/testdata/control_images";

/// Where control images come from, where artifacts go, and how strict the
/// per-pixel comparison is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub control_root: PathBuf,
    pub control_path_prefix: String,
    pub artifact_dir: PathBuf,
    pub color_tolerance: u8,
    pub log_level: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            control_root: PathBuf::from(DEFAULT_CONTROL_ROOT),
            control_path_prefix: String::new(),
            artifact_dir: env::temp_dir(),
            color_tolerance: 0,
            log_level: "info".to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| CheckError::io(path, e))?;
        let config: CheckerConfig = serde_json::from_str(&content)
            .map_err(|e| CheckError::Config(format!("{}: {e}", path.display())))?;
        config.level_filter()?;
        Ok(config)
    }

    /// Defaults overlaid with the `LEGEND_CHECK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(root) = lookup(ENV_CONTROL_ROOT) {
            config.control_root = PathBuf::from(root);
        }
        if let Some(prefix) = lookup(ENV_CONTROL_PREFIX) {
            config.control_path_prefix = prefix;
        }
        if let Some(dir) = lookup(ENV_ARTIFACT_DIR) {
            config.artifact_dir = PathBuf::from(dir);
        }
        if let Some(tolerance) = lookup(ENV_COLOR_TOLERANCE) {
            config.color_tolerance = tolerance.trim().parse().map_err(|_| {
                CheckError::Config(format!(
                    "{ENV_COLOR_TOLERANCE} must be an integer in 0..=255, got {tolerance:?}"
                ))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.level_filter()?;
        Ok(config)
    }

    pub fn with_control_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.control_root = root.into();
        self
    }

    pub fn with_control_path_prefix(mut self, prefix: &str) -> Self {
        self.control_path_prefix = prefix.to_string();
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_color_tolerance(mut self, tolerance: u8) -> Self {
        self.color_tolerance = tolerance;
        self
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| CheckError::Config(format!("unknown log level {:?}", self.log_level)))
    }
}
