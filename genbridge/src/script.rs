//! STM32CubeMX batch script writer.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::cbuild::BuildParams;
use crate::error::{BridgeError, Result};

/// File name of the script inside the work directory.
pub const SCRIPT_FILE: &str = "project.script";

/// Project name CubeMX uses for the generated project directory.
pub const PROJECT_NAME: &str = "STM32CubeMX";

const TOOLCHAIN: &str = "MDK-ARM V5";
const COPY_LIBRARY: &str = "copy only";

fn quote(text: &str) -> String {
    format!("\"{text}\"")
}

/// Render the script text for `params`, one directive per line.
pub fn render_script(work_dir: &str, params: &BuildParams) -> String {
    let mut lines = Vec::with_capacity(5);
    if !params.board.is_empty() {
        lines.push(format!("loadboard {} allmodes", params.board));
    } else {
        lines.push(format!("load {}", params.device));
    }
    lines.push(format!("project name {PROJECT_NAME}"));
    lines.push(format!("project toolchain {}", quote(TOOLCHAIN)));
    lines.push(format!("project path {}", quote(&native_path(work_dir))));
    lines.push(format!("SetCopyLibrary {}", quote(COPY_LIBRARY)));

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Convert a `/`-separated path to the host's separator convention.
fn native_path(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.to_string()
    }
}

/// Write the script for `params` into `work_dir`, replacing any previous one.
///
/// Returns the path of the written script.
pub fn write_invocation_script(work_dir: &Path, params: &BuildParams) -> Result<PathBuf> {
    let path = work_dir.join(SCRIPT_FILE);
    info!(path = %path.display(), "writing CubeMX script");

    let text = render_script(&work_dir.to_string_lossy(), params);

    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| BridgeError::write(&path, e))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&path).map_err(|e| BridgeError::write(&path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| BridgeError::write(&path, e))?;

    Ok(path)
}
