mod cli;
mod file;

pub use cli::{Cli, Command};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::capture::Capture;
use crate::device::Model;
use crate::error::{Error, Result};
use crate::event_loop::LoopOptions;
use crate::replay::Pacing;
use crate::uhid::UHID_PATH;

const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LINGER_MS: u64 = 1_000;

/// Which model handlers to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ModelChoice {
    /// Pick from the capture's vendor/product ids.
    #[default]
    Auto,
    Fixed(Model),
}

impl ModelChoice {
    pub fn resolve(self, capture: &Capture) -> Model {
        match self {
            ModelChoice::Auto => Model::detect(capture.vendor_id, capture.product_id),
            ModelChoice::Fixed(model) => model,
        }
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelChoice::Auto => write!(f, "auto"),
            ModelChoice::Fixed(model) => write!(f, "{}", model),
        }
    }
}

impl FromStr for ModelChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ModelChoice::Auto);
        }
        s.parse().map(ModelChoice::Fixed)
    }
}

impl TryFrom<String> for ModelChoice {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Merged configuration from CLI args and TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: PathBuf,
    pub model: ModelChoice,
    pub uniq: Option<String>,
    pub handshake_timeout_ms: u64,
    pub linger_ms: u64,
    pub pacing: Pacing,
    pub strict: bool,
}

impl Config {
    /// Load configuration by merging TOML file with CLI overrides.
    pub fn load(cli: &Cli) -> Self {
        let file_config = cli
            .config
            .as_ref()
            .and_then(|p| file::load_from_path(p))
            .or_else(file::load_from_default_paths)
            .unwrap_or_default();

        Self {
            gateway: cli
                .gateway
                .clone()
                .or(file_config.gateway)
                .unwrap_or_else(|| PathBuf::from(UHID_PATH)),
            model: cli.model.unwrap_or(file_config.model),
            uniq: cli.uniq.clone().or(file_config.uniq),
            handshake_timeout_ms: cli
                .handshake_timeout_ms
                .or(file_config.handshake_timeout_ms)
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            linger_ms: cli
                .linger_ms
                .or(file_config.linger_ms)
                .unwrap_or(DEFAULT_LINGER_MS),
            pacing: cli.pacing.unwrap_or(file_config.pacing),
            strict: cli.strict || file_config.strict,
        }
    }

    /// `uniq` to present: the configured one, else the model default.
    pub fn uniq_for(&self, model: Model) -> String {
        self.uniq
            .clone()
            .unwrap_or_else(|| model.profile().default_uniq.to_string())
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            linger: Duration::from_millis(self.linger_ms),
            strict: self.strict,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout_ms == 0 {
            return Err(Error::Config("handshake timeout must be greater than zero".into()));
        }
        if self.gateway.as_os_str().is_empty() {
            return Err(Error::Config("gateway path is empty".into()));
        }
        Ok(())
    }
}
