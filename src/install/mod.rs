//! Host registration: the manifest (and on Windows the registry key) that lets
//! Chrome launch this binary.

pub mod manifest;
pub mod paths;

#[cfg(windows)]
pub mod winreg;

pub use manifest::{is_registered, register, unregister};
