//! SSH identity resolution

use std::path::{Path, PathBuf};

use tracing::debug;

/// Identity file names tried by [`KeySource::Default`], in order
const DEFAULT_IDENTITIES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// Which private key the SSH transport authenticates with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Explicit private key file
    Path(PathBuf),
    /// First readable identity under `~/.ssh`
    Default,
}

impl KeySource {
    /// Resolve to a concrete key file.
    ///
    /// # Errors
    /// Returns `KeyError` if the key file is missing or readable by other users,
    /// or if no default identity exists.
    pub fn resolve(&self) -> Result<PathBuf, KeyError> {
        match self {
            KeySource::Path(path) => {
                validate_key_permissions(path)?;
                Ok(path.clone())
            }
            KeySource::Default => {
                let ssh_dir = dirs::home_dir()
                    .map(|home| home.join(".ssh"))
                    .ok_or(KeyError::NoHomeDir)?;
                let path = DEFAULT_IDENTITIES
                    .iter()
                    .map(|name| ssh_dir.join(name))
                    .find(|p| p.is_file())
                    .ok_or_else(|| KeyError::NotFound(ssh_dir.display().to_string()))?;
                debug!(path = %path.display(), "using default SSH identity");
                validate_key_permissions(&path)?;
                Ok(path)
            }
        }
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("no SSH identity found in {0}")]
    NotFound(String),

    #[error("home directory not available")]
    NoHomeDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(unix)]
fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group/other bits must be clear
    if mode & 0o077 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    std::fs::metadata(path)?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn key_file(mode: u32) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode)).unwrap();
        file
    }

    #[test]
    fn test_private_key_accepted() {
        let file = key_file(0o600);
        let resolved = KeySource::Path(file.path().to_path_buf()).resolve().unwrap();
        assert_eq!(resolved, file.path());
    }

    #[test]
    fn test_world_readable_key_rejected() {
        let file = key_file(0o644);
        let err = KeySource::Path(file.path().to_path_buf())
            .resolve()
            .unwrap_err();
        assert!(matches!(err, KeyError::BadPermissions(_)));
    }

    #[test]
    fn test_missing_key_is_io_error() {
        let err = KeySource::Path(PathBuf::from("/nonexistent/hostsweep/key"))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, KeyError::Io(_)));
    }
}
