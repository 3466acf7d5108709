//! Build description reader.
//!
//! Only the fields that drive generation are decoded; everything else in the
//! build description is ignored.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BuildDescription {
    build_gen: BuildGen,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BuildGen {
    #[serde(default)]
    device: String,
    #[serde(default)]
    board: String,
    #[serde(default)]
    output: String,
    #[serde(default)]
    subsystems: Vec<SubsystemParams>,
}

/// Generation parameters extracted from a build description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    pub device: String,
    /// Takes precedence over `device` when non-empty.
    pub board: String,
    /// Output directory, relative to the build description's directory.
    pub out_path: String,
    pub subsystems: Vec<SubsystemParams>,
}

/// One independently built unit of the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubsystemParams {
    #[serde(default)]
    pub core_name: String,
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub device: String,
    pub subsystem_idx: SubsystemIdx,
}

/// Index record naming the project a subsystem belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubsystemIdx {
    pub project: String,
    #[serde(default)]
    pub configuration: String,
}

impl SubsystemParams {
    /// Core name with its vendor prefix (`Dev-CM4` -> `CM4`) removed.
    pub fn core(&self) -> &str {
        match self.core_name.split_once('-') {
            Some((_, core)) => core,
            None => &self.core_name,
        }
    }
}

/// Read the build description at `path`.
///
/// `out_path_hint` is used only when the description names no output
/// directory of its own.
pub fn read_build_params(path: &Path, out_path_hint: &str) -> Result<BuildParams> {
    info!(path = %path.display(), "reading build description");
    let desc: BuildDescription = crate::yaml::read_yaml(path)?;
    let build_gen = desc.build_gen;

    let out_path = if build_gen.output.is_empty() {
        out_path_hint.to_string()
    } else {
        build_gen.output
    };

    Ok(BuildParams {
        device: build_gen.device,
        board: build_gen.board,
        out_path,
        subsystems: build_gen.subsystems,
    })
}
