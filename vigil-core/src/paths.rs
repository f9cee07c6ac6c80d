//! Centralized path configuration for vigil.
//!
//! Daemon and tests resolve every on-disk location through this module.

use std::path::PathBuf;

/// Get the vigil configuration directory.
///
/// Resolution order:
/// 1. `VIGIL_CONFIG_DIR` environment variable
/// 2. `/etc/vigil` if it exists (system install)
/// 3. `~/.config/vigil` for user installs
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("VIGIL_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/etc/vigil");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::config_dir().map(|d| d.join("vigil")).unwrap_or(system_dir)
}

/// Get the default configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Get the directory holding per-VM stats sockets.
///
/// `VIGIL_SOCKET_DIR` overrides the default of `/var/run/vigil/sockets`.
pub fn socket_dir() -> PathBuf {
    std::env::var("VIGIL_SOCKET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/run/vigil/sockets"))
}

/// Stats socket file name for a VM.
///
/// `/` is not allowed in file names, so the namespace and name are joined with `_`.
pub fn socket_file_name(namespace: &str, name: &str) -> String {
    format!("{}_{}.sock", namespace, name)
}

/// Full stats socket path for a VM under `dir`.
pub fn vm_socket_path(dir: &std::path::Path, namespace: &str, name: &str) -> PathBuf {
    dir.join(socket_file_name(namespace, name))
}
