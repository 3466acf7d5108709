//! genbridge — cbuild generator description ↔ STM32CubeMX bridge.
//!
//! Reads the generator parameters from a build description, drives
//! STM32CubeMX through a batch script, reads back the `.mxproject` state it
//! leaves behind and writes one generator-agnostic `*.cgen.yml` layer per
//! subsystem.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use genbridge::launch::{CubeMxLauncher, LauncherConfig};
//!
//! let launcher = CubeMxLauncher::new(LauncherConfig::default());
//! let layers = genbridge::run(Path::new("Blinky.cbuild-gen-idx.yml"), ".", &launcher).unwrap();
//! println!("wrote {} layer files", layers.len());
//! ```

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub mod cbuild;
pub mod config;
pub mod error;
pub mod launch;
pub mod layer;
pub mod mxproject;
pub mod script;
mod yaml;

pub use error::BridgeError;

use cbuild::BuildParams;
use launch::{LaunchMode, Launcher};
use layer::LayerRules;

/// Directory CubeMX generates into, below the work directory.
pub const CUBEMX_DIR: &str = "STM32CubeMX";
/// CubeMX project file, inside [`CUBEMX_DIR`].
pub const IOC_FILE: &str = "STM32CubeMX.ioc";
/// Project-state file, inside [`CUBEMX_DIR`].
pub const MXPROJECT_FILE: &str = ".mxproject";

/// Run the full pipeline: read the build description, launch CubeMX, read
/// its project state and write the layer files.
///
/// `out_path_hint` is the output directory used when the build description
/// names none; both are relative to the description's directory.
///
/// Returns the paths of the written layer files.
pub fn run(
    build_path: &Path,
    out_path_hint: &str,
    launcher: &dyn Launcher,
) -> Result<Vec<PathBuf>> {
    let params = cbuild::read_build_params(build_path, out_path_hint)
        .with_context(|| format!("reading build description {}", build_path.display()))?;

    let base_dir = build_path.parent().unwrap_or_else(|| Path::new("."));
    let work_dir = work_dir(base_dir, &params);
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("creating work directory {}", work_dir.display()))?;
    let work_dir = std::path::absolute(&work_dir)
        .with_context(|| format!("resolving work directory {}", work_dir.display()))?;

    launch_generator(&work_dir, &params, launcher)?;
    translate(&work_dir, &params)
}

/// Directory the generator works in and the layers are written to.
pub fn work_dir(base_dir: &Path, params: &BuildParams) -> PathBuf {
    clean(&base_dir.join(&params.out_path))
}

/// Lexically remove `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Open the existing CubeMX project if there is one, otherwise create it
/// from a freshly written script.
pub fn launch_generator(
    work_dir: &Path,
    params: &BuildParams,
    launcher: &dyn Launcher,
) -> Result<()> {
    let ioc = work_dir.join(CUBEMX_DIR).join(IOC_FILE);
    let mode = if ioc.exists() {
        LaunchMode::OpenProject(ioc)
    } else {
        let script = script::write_invocation_script(work_dir, params)?;
        info!(path = %script.display(), "generated script");
        LaunchMode::RunScript(script)
    };
    launcher.launch(&mode).context("running STM32CubeMX")?;
    Ok(())
}

/// Read the project state CubeMX left in `work_dir` and write the layers.
pub fn translate(work_dir: &Path, params: &BuildParams) -> Result<Vec<PathBuf>> {
    let mxproject = work_dir.join(CUBEMX_DIR).join(MXPROJECT_FILE);
    let state = mxproject::read_project_state(&mxproject)
        .context("STM32CubeMX did not leave a project state")?;

    let written = layer::write_layers(work_dir, &state, params, &LayerRules::default())?;
    info!(count = written.len(), "wrote layers");
    Ok(written)
}
