//! Unix socket path utilities with security-focused defaults
//!
//! Node sockets live in XDG_RUNTIME_DIR, falling back to a user-specific directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Get secure socket directory path
///
/// Priority:
/// 1. XDG_RUNTIME_DIR (user-specific, mode 0700, auto-cleaned)
/// 2. ~/.local/share/roomcast (user-specific, manual creation)
pub fn get_socket_dir() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        let path = PathBuf::from(runtime_dir);
        if path.exists() {
            return Ok(path);
        }
    }

    let home = std::env::var("HOME").context("HOME environment variable not set")?;

    let socket_dir = PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("roomcast");

    if !socket_dir.exists() {
        std::fs::create_dir_all(&socket_dir).context("Failed to create socket directory")?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(&socket_dir, permissions)
            .context("Failed to set socket directory permissions")?;
    }

    Ok(socket_dir)
}

/// Socket path for the node at `index` within `dir`
pub fn node_socket_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("roomcast-{}.sock", index))
}

/// Set secure permissions on a socket file (0600 = owner read/write only)
#[cfg(unix)]
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if socket_path.exists() {
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(socket_path, permissions)
            .context("Failed to set socket permissions")?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn secure_socket_permissions(_socket_path: &Path) -> Result<()> {
    Ok(())
}
