//! Where the control socket lives
//!
//! Prefers XDG_RUNTIME_DIR. Otherwise an owner-only `soundhorn` directory in
//! the user's local data dir is used.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const SOCKET_NAME: &str = "soundhorn.sock";

pub fn get_socket_dir() -> Result<PathBuf> {
    if let Some(runtime_dir) = dirs::runtime_dir().filter(|p| p.exists()) {
        return Ok(runtime_dir);
    }

    let socket_dir = dirs::data_local_dir()
        .context("No runtime or data directory for the control socket")?
        .join("soundhorn");

    std::fs::create_dir_all(&socket_dir).context("Failed to create socket directory")?;
    restrict_permissions(&socket_dir, 0o700).context("Failed to set socket directory permissions")?;

    Ok(socket_dir)
}

pub fn get_ipc_socket_path() -> Result<PathBuf> {
    Ok(get_socket_dir()?.join(SOCKET_NAME))
}

/// Configured socket path, or the default one when unset
pub fn resolve_socket_path(configured: &str) -> Result<PathBuf> {
    match configured.trim() {
        "" => get_ipc_socket_path(),
        path => Ok(PathBuf::from(path)),
    }
}

/// Owner read/write only
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        restrict_permissions(socket_path, 0o600).context("Failed to set socket permissions")?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_socket_path() {
        let path = get_ipc_socket_path().unwrap();
        assert!(path.ends_with(SOCKET_NAME));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_configured_path_wins() {
        let path = resolve_socket_path("/tmp/horn-test.sock").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/horn-test.sock"));
        assert!(resolve_socket_path("  ").unwrap().ends_with(SOCKET_NAME));
    }

    #[cfg(unix)]
    #[test]
    fn test_secure_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fake.sock");
        std::fs::write(&file, b"").unwrap();
        secure_socket_permissions(&file).unwrap();

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
