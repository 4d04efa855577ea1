use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::ModelChoice;
use crate::replay::Pacing;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub gateway: Option<PathBuf>,
    #[serde(default)]
    pub model: ModelChoice,
    pub uniq: Option<String>,
    pub handshake_timeout_ms: Option<u64>,
    pub linger_ms: Option<u64>,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub strict: bool,
}

pub fn load_from_path(path: &Path) -> Option<FileConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => {
            log::debug!("Loaded config from {}", path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

pub fn load_from_default_paths() -> Option<FileConfig> {
    for path in default_config_paths() {
        if path.exists() {
            if let Some(config) = load_from_path(&path) {
                return Some(config);
            }
        }
    }
    None
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("uhid-replay.toml"));

    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".config").join("uhid-replay.toml"));
    }

    paths
}
