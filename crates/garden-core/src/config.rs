use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG: &str = "garden.toml";

/// Settings shared by every `garden` invocation.
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GardenConfig {
    pub modules_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub namespace: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_timeout_secs: Option<u64>,
    pub strict_placeholders: bool,
    pub ignore_hashes: bool,
}

impl Default for GardenConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("./modules"),
            reports_dir: PathBuf::from("./reports"),
            namespace: "garden".to_owned(),
            backend: "docker".to_owned(),
            host: None,
            context: None,
            unit_timeout_secs: None,
            strict_placeholders: false,
            ignore_hashes: false,
        }
    }
}

impl GardenConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))
    }

    /// Find the active config.
    ///
    /// An explicit path must exist. Otherwise `./garden.toml` is tried, then
    /// `$HOME/.config/garden/config.toml`, and finally the defaults are used.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, CoreError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(path) = user_config_path() {
            candidates.push(path);
        }
        for candidate in candidates {
            if candidate.is_file() {
                debug!("using config {}", candidate.display());
                return Self::load(&candidate);
            }
        }
        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Per-module deadline; zero is treated as no deadline.
    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

fn user_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/garden/config.toml"))
}
