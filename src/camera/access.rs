//! Device node accessibility checks.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Why a device node cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("no read/write permission for {0} (try: sudo chmod 666 {0}, or join the `video` group)")]
    PermissionDenied(String),
    #[error("cannot open {path}: {reason}")]
    Other { path: String, reason: String },
}

/// Returns true if `path` exists on the filesystem.
pub fn device_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Checks that `path` exists and can be opened for reading and writing.
///
/// The handle is closed again immediately.
pub fn check_device(path: &str) -> Result<(), AccessError> {
    if !device_exists(path) {
        return Err(AccessError::NotFound(path.to_owned()));
    }
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(AccessError::PermissionDenied(path.to_owned()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(AccessError::NotFound(path.to_owned())),
        Err(e) => Err(AccessError::Other {
            path: path.to_owned(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device() {
        assert_eq!(
            check_device("/definitely/not/a/video42"),
            Err(AccessError::NotFound("/definitely/not/a/video42".to_owned()))
        );
    }

    #[test]
    fn test_accessible_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert!(device_exists(path));
        assert_eq!(check_device(path), Ok(()));
    }
}
