use crate::install::paths::chrome_winreg_path;
use std::{io, path::Path};
use winreg::{enums::HKEY_CURRENT_USER, RegKey};

/// Point Chrome's HKCU registry entry for host `name` at `manifest_path`.
pub fn write_chrome_manifest_reg(name: &str, manifest_path: &Path) -> io::Result<()> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu.create_subkey(chrome_winreg_path(name))?;
    let value = manifest_path.to_string_lossy().into_owned();
    // "" is the key's (Default) value.
    key.set_value("", &value)?;
    Ok(())
}

/// Remove the HKCU registry entry for host `name`. A missing key is not an error.
pub fn remove_chrome_manifest_reg(name: &str) -> io::Result<()> {
    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    match hkcu.delete_subkey(chrome_winreg_path(name)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub fn chrome_manifest_reg_exists(name: &str) -> bool {
    RegKey::predef(HKEY_CURRENT_USER)
        .open_subkey(chrome_winreg_path(name))
        .is_ok()
}
