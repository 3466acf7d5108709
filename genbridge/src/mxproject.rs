//! Reader for the `.mxproject` project-state file STM32CubeMX leaves behind.
//!
//! The file is INI-like: `[Section]` headers followed by `Key=Value` lines.
//! Lists come in two shapes, a `;`-separated scalar (`CDefines=A;B;`) and an
//! indexed sparse array (`SourceFiles#0=..`, `SourceFiles#1=..`). Indexed
//! entries are ordered by index, never by their position in the file.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{BridgeError, Result};

/// Section holding the files of the last MDK-ARM generation.
pub const KEIL_SECTION: &str = "PreviousUsedKeilFiles";

const SOURCE_FILES_KEY: &str = "SourceFiles";
const HEADER_PATH_KEY: &str = "HeaderPath";
const C_DEFINES_KEY: &str = "CDefines";

/// What STM32CubeMX reports it generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectState {
    pub source_files: Vec<String>,
    pub header_paths: Vec<String>,
    pub c_defines: Vec<String>,
}

/// Values of one key within a section.
#[derive(Debug, Default)]
struct KeyValues {
    scalar: Option<String>,
    indexed: BTreeMap<u32, String>,
}

/// A parsed INI document: section name -> key -> values.
#[derive(Debug, Default)]
pub struct IniDocument {
    sections: BTreeMap<String, BTreeMap<String, KeyValues>>,
}

impl IniDocument {
    /// Parse INI text. `origin` is only used in error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let mut doc = IniDocument::default();
        let mut section = String::new();

        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| {
                    BridgeError::parse(
                        origin,
                        format!("line {}: unterminated section header", lineno + 1),
                    )
                })?;
                section = name.trim().to_string();
                trace!(section = %section, "section");
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                BridgeError::parse(origin, format!("line {}: expected key=value", lineno + 1))
            })?;
            let (key, value) = (key.trim(), value.trim());

            let keys = doc.sections.entry(section.clone()).or_default();
            match split_index(key) {
                Some((base, index)) => {
                    keys.entry(base.to_string())
                        .or_default()
                        .indexed
                        .insert(index, value.to_string());
                }
                None => {
                    keys.entry(key.to_string()).or_default().scalar = Some(value.to_string());
                }
            }
        }

        Ok(doc)
    }

    /// Scalar value of `key` in `section`.
    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)?
            .get(key)?
            .scalar
            .as_deref()
    }

    /// List value of `key` in `section`: the non-empty `;`-separated items of
    /// the scalar form, followed by the indexed entries in ascending order.
    pub fn list(&self, section: &str, key: &str) -> Vec<String> {
        let Some(values) = self.sections.get(section).and_then(|s| s.get(key)) else {
            return Vec::new();
        };

        let mut items: Vec<String> = values
            .scalar
            .iter()
            .flat_map(|s| s.split(';'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        items.extend(values.indexed.values().cloned());
        items
    }
}

/// Split `Key#N` into `("Key", N)`. Keys whose suffix is not a number are
/// treated as plain keys.
fn split_index(key: &str) -> Option<(&str, u32)> {
    let (base, index) = key.rsplit_once('#')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = index.parse().ok()?;
    Some((base, index))
}

impl ProjectState {
    /// Extract the known lists; all other keys are ignored.
    pub fn from_document(doc: &IniDocument) -> Self {
        ProjectState {
            source_files: doc.list(KEIL_SECTION, SOURCE_FILES_KEY),
            header_paths: doc.list(KEIL_SECTION, HEADER_PATH_KEY),
            c_defines: doc.list(KEIL_SECTION, C_DEFINES_KEY),
        }
    }
}

/// Read the project-state file written by STM32CubeMX.
///
/// A missing file means the generator never completed and is reported as
/// [`BridgeError::NotFound`].
pub fn read_project_state(path: &Path) -> Result<ProjectState> {
    if !path.exists() {
        return Err(BridgeError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| BridgeError::parse(path, e))?;
    let doc = IniDocument::parse(&text, path)?;
    let state = ProjectState::from_document(&doc);
    debug!(
        path = %path.display(),
        sources = state.source_files.len(),
        headers = state.header_paths.len(),
        defines = state.c_defines.len(),
        "read project state"
    );
    Ok(state)
}
