//! Optional TOML configuration.
//!
//! ```toml
//! [capture]
//! local_address = "127.0.0.1"
//! header_mode = "fixed"
//!
//! [inspect]
//! max_items = 5
//! preview_bytes = 50
//! ```
//!
//! Every key is optional. Command-line options take precedence over the file.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::artifact::DEFAULT_PREVIEW_BYTES;
use crate::capture::HeaderMode;
use crate::inspect::DEFAULT_MAX_ITEMS;

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "acpcap.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid local address '{0}'")]
    InvalidAddress(String),
}

#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub inspect: InspectSection,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct CaptureSection {
    pub local_address: Option<String>,
    pub header_mode: Option<HeaderMode>,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct InspectSection {
    pub max_items: Option<usize>,
    pub preview_bytes: Option<usize>,
}

pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ConfigFile = toml::from_str(&contents)?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// The explicit path if given, otherwise `acpcap.toml` when it exists.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            default_path.exists().then_some(default_path)
        }
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub local_address: Option<String>,
    pub header_mode: Option<HeaderMode>,
}

/// Effective settings after merging defaults, file and command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub local_address: Ipv4Addr,
    pub header_mode: HeaderMode,
    pub max_items: usize,
    pub preview_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_address: Ipv4Addr::LOCALHOST,
            header_mode: HeaderMode::Fixed,
            max_items: DEFAULT_MAX_ITEMS,
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        }
    }
}

impl Settings {
    pub fn resolve(file: ConfigFile, overrides: Overrides) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let local_address = match overrides.local_address.or(file.capture.local_address) {
            Some(address) => address
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(address.clone()))?,
            None => defaults.local_address,
        };

        Ok(Self {
            local_address,
            header_mode: overrides
                .header_mode
                .or(file.capture.header_mode)
                .unwrap_or(defaults.header_mode),
            max_items: file.inspect.max_items.unwrap_or(defaults.max_items),
            preview_bytes: file.inspect.preview_bytes.unwrap_or(defaults.preview_bytes),
        })
    }

    /// Load the config file, if any, and merge the overrides on top.
    pub fn load(config: Option<&Path>, overrides: Overrides) -> Result<Self, ConfigError> {
        let file = match find_config(config) {
            Some(path) => load_config(&path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(file, overrides)
    }
}
