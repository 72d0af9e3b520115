//! Relay discovery records.
//!
//! While the relay runs, `relayinfo-<port>.json` in the viewer's app-data
//! directory tells a companion process where to connect and with which token.

use crate::config::DiscoveryConfig;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    env,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};
use tracing::{debug, info, warn};

pub const VIEWER_APP_NAME: &str = "clay-viewer";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfo {
    pub port: u16,
    pub process_id: u32,
    pub tags: BTreeSet<String>,
    pub token: String,
}

impl RelayInfo {
    pub fn from_session(session: &Session) -> Self {
        Self {
            port: session.port(),
            process_id: process::id(),
            tags: session.tags().clone(),
            token: session.token().to_string(),
        }
    }
}

/// `%APPDATA%`, `~/Library/Application Support` or `~/.config`, plus the viewer's name.
pub fn viewer_data_dir() -> io::Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join(VIEWER_APP_NAME))
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "could not find app data path"))
}

pub fn record_path(dir: &Path, port: u16) -> PathBuf {
    dir.join(format!("relayinfo-{port}.json"))
}

/// A published record. Dropping it deletes the file.
#[derive(Debug)]
pub struct DiscoveryRecord {
    path: PathBuf,
    removed: bool,
}

impl DiscoveryRecord {
    pub fn publish(dir: &Path, info: &RelayInfo) -> io::Result<Self> {
        if !dir.exists() {
            debug!(path = %dir.display(), "creating viewer data directory");
            fs::create_dir_all(dir)?;
        }
        let path = record_path(dir, info.port);
        let json = serde_json::to_vec(info)?;
        let mut file = File::create(&path)?;
        file.write_all(&json)?;
        info!(path = %path.display(), "relay info published");
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        fs::remove_file(&self.path)
    }
}

impl Drop for DiscoveryRecord {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "could not remove relay info");
            }
        }
    }
}

fn in_ci() -> bool {
    env::var_os("CI").is_some()
}

/// Publish the record for `session` unless disabled. Failures are logged and
/// yield `None`.
pub fn publish_for(config: &DiscoveryConfig, session: &Session) -> Option<DiscoveryRecord> {
    if !config.enabled {
        debug!("discovery disabled");
        return None;
    }
    if config.skip_in_ci && in_ci() {
        debug!("CI environment, skipping discovery record");
        return None;
    }
    let dir = match config.dir.clone().map_or_else(viewer_data_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "no directory for relay info");
            return None;
        }
    };
    match DiscoveryRecord::publish(&dir, &RelayInfo::from_session(session)) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "could not publish relay info");
            None
        }
    }
}
