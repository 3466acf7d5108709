//! YAML file helpers shared by the readers and writers.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};

/// Read and decode a YAML document, distinguishing a missing file from a
/// malformed one.
pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(BridgeError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| BridgeError::parse(path, e))?;
    serde_yaml::from_str(&content).map_err(|e| BridgeError::parse(path, e))
}

/// Encode `value` as YAML and write it to `path`, replacing any existing file.
pub(crate) fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_yaml::to_string(value).map_err(|e| {
        BridgeError::write(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    std::fs::write(path, content).map_err(|e| BridgeError::write(path, e))
}
