//! Configuration types for httpreplay

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use hyper::header::HeaderName;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{default_omit_headers, PathGenerator};
use crate::{ReplayError, Result};

/// Operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Serve existing recordings, record the ones that are missing
    #[default]
    RecordIfMissing,
    /// Serve recordings only; never touch the network
    PlaybackOnly,
    /// Always go to the network and overwrite recordings
    RecordOnly,
}

impl Mode {
    fn as_str(self) -> &'static str {
        match self {
            Mode::RecordIfMissing => "record-if-missing",
            Mode::PlaybackOnly => "playback-only",
            Mode::RecordOnly => "record-only",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "record-if-missing" => Ok(Mode::RecordIfMissing),
            "playback-only" => Ok(Mode::PlaybackOnly),
            "record-only" => Ok(Mode::RecordOnly),
            other => Err(ReplayError::Config(format!(
                "Unknown mode '{other}' (expected record-if-missing, playback-only or record-only)"
            ))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode
    #[serde(default)]
    pub mode: Mode,
    /// Directory recordings are read from and written to
    pub recording_dir: PathBuf,
    /// Disable the fallback from the checksum path to the generic path
    #[serde(default)]
    pub strict_path: bool,
    /// Headers excluded from the request checksum
    #[serde(default = "default_omit_header_names")]
    pub omit_headers: Vec<String>,
    /// Query parameters excluded from the request checksum
    #[serde(default)]
    pub omit_query: Vec<String>,
}

fn default_omit_header_names() -> Vec<String> {
    let mut names: Vec<String> = default_omit_headers()
        .iter()
        .map(|name| name.as_str().to_string())
        .collect();
    names.sort();
    names
}

impl Config {
    /// Default configuration rooted at `recording_dir`
    pub fn new(recording_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::default(),
            recording_dir: recording_dir.into(),
            strict_path: false,
            omit_headers: default_omit_header_names(),
            omit_query: Vec::new(),
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ReplayError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.recording_dir.as_os_str().is_empty() {
            return Err(ReplayError::Config(
                "recording_dir cannot be empty".to_string(),
            ));
        }

        self.omit_header_names().map(|_| ())
    }

    /// Build the fingerprint generator described by this configuration
    ///
    /// # Errors
    ///
    /// Returns error if a header name is invalid
    pub fn path_generator(&self) -> Result<PathGenerator> {
        let mut generator = PathGenerator::new();
        generator.omit_headers = self.omit_header_names()?;
        generator.omit_query = self.omit_query.iter().cloned().collect();
        Ok(generator)
    }

    fn omit_header_names(&self) -> Result<HashSet<HeaderName>> {
        self.omit_headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    ReplayError::Config(format!("Invalid header name '{name}': {e}"))
                })
            })
            .collect()
    }
}
