//! Relay configuration, read from an optional TOML file.
//!
//! ```toml
//! max_message_size = 1048576
//! handshake_timeout_ms = 500
//! bind_address = "127.0.0.1"
//!
//! [discovery]
//! enabled = true
//!
//! [manifest]
//! name = "net.hu2ty.clay_relay"
//! allowed_origins = ["chrome-extension://ofgodpngengnlbmpnjhondghmdeembik/"]
//! ```

use crate::host::MAX_FROM_BROWSER;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

/// Socket messages above this size end the relay (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1_048_576;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_HOST_NAME: &str = "net.hu2ty.clay_relay";
pub const DEFAULT_EXTENSION_ORIGIN: &str = "chrome-extension://ofgodpngengnlbmpnjhondghmdeembik/";

const APP_DIR: &str = "clay-relay";
const CONFIG_FILE: &str = "relay.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub max_message_size: usize,
    pub max_frame_size: usize,
    pub handshake_timeout_ms: u64,
    pub bind_address: IpAddr,
    pub port: u16,
    pub allow_concurrent: bool,
    pub discovery: DiscoveryConfig,
    pub manifest: ManifestConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Where relay records go. Defaults to the viewer's app-data directory.
    pub dir: Option<PathBuf>,
    pub skip_in_ci: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    pub name: String,
    pub description: String,
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: MAX_FROM_BROWSER,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            allow_concurrent: false,
            discovery: DiscoveryConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            skip_in_ci: true,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_HOST_NAME.to_string(),
            description: "Clay relay".to_string(),
            allowed_origins: vec![DEFAULT_EXTENSION_ORIGIN.to_string()],
        }
    }
}

impl RelayConfig {
    /// Load from `path`, or from the default location if that file exists,
    /// or fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_path().filter(|p| p.is_file()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config");
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be non-zero"));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max_frame_size must be non-zero"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid("handshake_timeout_ms must be non-zero"));
        }
        if self.manifest.name.is_empty() {
            return Err(ConfigError::Invalid("manifest.name must be set"));
        }
        if !self.bind_address.is_loopback() {
            warn!(address = %self.bind_address, "relay will listen on a non-loopback address");
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// `<config_dir>/clay-relay/relay.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}
