use std::{io, path::PathBuf};

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn unix_home_dir() -> io::Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))
}

/// Where Chrome looks for a per-user host manifest named `name`.
///
/// On Windows Chrome finds the manifest through the registry instead, so the
/// file sits next to the executable.
pub fn chrome_user_manifest(name: &str) -> io::Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        Ok(unix_home_dir()?
            .join("Library/Application Support/Google/Chrome/NativeMessagingHosts")
            .join(format!("{name}.json")))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(unix_home_dir()?
            .join(".config/google-chrome/NativeMessagingHosts")
            .join(format!("{name}.json")))
    }
    #[cfg(target_os = "windows")]
    {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent"))?;
        Ok(dir.join(format!("{name}.json")))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported os on this build: {} ({name})", std::env::consts::OS),
        ))
    }
}

pub fn chrome_winreg_path(name: &str) -> String {
    format!(r"Software\Google\Chrome\NativeMessagingHosts\{name}")
}
