//! JSON state files shared between separate invocations.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::error::StateError;

/// Read a JSON state file. A missing file is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StateError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a JSON state file, creating parent directories.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = serde_json::to_string_pretty(value).map_err(|source| StateError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    // Write then rename so a concurrent reader never sees a partial file.
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}
