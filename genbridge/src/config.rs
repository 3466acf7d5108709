//! Configuration types for `global.generator.yml`.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Identifier of the only generator this bridge drives.
pub const GENERATOR_ID: &str = "CubeMX";

/// Root of the generator configuration file.
#[derive(Debug, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub generator: Vec<GeneratorEntry>,
}

/// One generator registered with the build tooling.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneratorEntry {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Where users can obtain the generator.
    #[serde(default)]
    pub download_url: String,
    /// Command the build tooling runs to invoke the bridge.
    #[serde(default)]
    pub run: String,
    /// Output path template.
    #[serde(default)]
    pub path: String,
}

/// The parameters the bridge needs from the generator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorParams {
    pub id: String,
    pub download_url: String,
}

impl GeneratorConfig {
    /// Returns the first entry whose id is `id`; file order decides ties.
    pub fn find(&self, id: &str) -> Option<&GeneratorEntry> {
        for entry in &self.generator {
            if entry.id == id {
                return Some(entry);
            }
        }
        None
    }
}

/// Load `global.generator.yml` and extract the [`GENERATOR_ID`] entry.
///
/// A file that parses but has no matching entry is an error, not a default.
pub fn read_generator_config(path: &Path) -> Result<GeneratorParams> {
    let config: GeneratorConfig = crate::yaml::read_yaml(path)?;
    debug!(
        path = %path.display(),
        entries = config.generator.len(),
        "loaded generator config"
    );

    let entry = config
        .find(GENERATOR_ID)
        .ok_or_else(|| BridgeError::MissingEntry {
            id: GENERATOR_ID.to_string(),
            path: path.to_path_buf(),
        })?;

    Ok(GeneratorParams {
        id: entry.id.clone(),
        download_url: entry.download_url.clone(),
    })
}
