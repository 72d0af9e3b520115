use crate::config::ManifestConfig;
use crate::install::paths::chrome_user_manifest;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::info;

/// A native messaging host manifest as Chrome reads it.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: String,
    pub allowed_origins: Vec<String>,
}

impl Manifest {
    pub fn new(config: &ManifestConfig, exe_path: &Path) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            path: exe_path.to_path_buf(),
            kind: "stdio".to_string(),
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// Write `manifest` to `path`, replacing any previous file.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let manifest_json = serde_json::to_string_pretty(manifest)?;
    let mut file = File::create(path)?;
    file.write_all(manifest_json.as_bytes())
}

/// Register `exe_path` as the native messaging host described by `config`.
///
/// Returns where the manifest was written.
///
/// # Examples
///
/// ```no_run
/// use clay_relay::config::ManifestConfig;
/// use clay_relay::install::manifest::register_exe;
/// use std::path::Path;
///
/// let written = register_exe(&ManifestConfig::default(), Path::new("/opt/clay/clay-relay"))
///     .expect("Failed to register host");
/// eprintln!("manifest at {}", written.display());
/// ```
pub fn register_exe(config: &ManifestConfig, exe_path: &Path) -> io::Result<PathBuf> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    if !exe_path.is_absolute() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "host path must be absolute",
        ));
    }

    let manifest_path = chrome_user_manifest(&config.name)?;
    write_manifest(&manifest_path, &Manifest::new(config, exe_path))?;

    #[cfg(windows)]
    crate::install::winreg::write_chrome_manifest_reg(&config.name, &manifest_path)?;

    info!(path = %manifest_path.display(), "native messaging host registered");
    Ok(manifest_path)
}

/// Register the running executable.
pub fn register(config: &ManifestConfig) -> io::Result<PathBuf> {
    let exe = env::current_exe()?;
    register_exe(config, &exe)
}

/// Undo [`register`]. Nothing registered is not an error.
pub fn unregister(config: &ManifestConfig) -> io::Result<()> {
    #[cfg(windows)]
    {
        crate::install::winreg::remove_chrome_manifest_reg(&config.name)?;
    }
    #[cfg(not(windows))]
    {
        let manifest_path = chrome_user_manifest(&config.name)?;
        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }
    }
    info!(name = %config.name, "native messaging host unregistered");
    Ok(())
}

/// Whether a manifest for host `name` is in place.
pub fn is_registered(name: &str) -> io::Result<bool> {
    #[cfg(windows)]
    {
        Ok(crate::install::winreg::chrome_manifest_reg_exists(name))
    }
    #[cfg(not(windows))]
    {
        Ok(chrome_user_manifest(name)?.exists())
    }
}
