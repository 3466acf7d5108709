//! Layer writer: turns a [`ProjectState`] into one `*.cgen.yml` layer file per
//! subsystem.
//!
//! Paths reported by STM32CubeMX are relative to its toolchain project
//! directory (`STM32CubeMX/MDK-ARM`). The layer files live in the work
//! directory, so every path is re-based through that segment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::cbuild::{BuildParams, SubsystemParams};
use crate::error::{BridgeError, Result};
use crate::mxproject::ProjectState;

/// A substring that excludes a generated source file, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipRule {
    pub pattern: String,
    pub reason: String,
}

impl SkipRule {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Fixed knowledge about STM32CubeMX's output layout and how its files are
/// grouped. Checked in order; the first matching skip rule wins.
#[derive(Debug, Clone)]
pub struct LayerRules {
    /// Directory, relative to the work dir, that tool-relative paths start from.
    pub relative_segment: String,
    pub skip: Vec<SkipRule>,
    /// Files whose rewritten path contains this go to the driver group.
    pub driver_marker: String,
    pub primary_group: String,
    pub driver_group: String,
    /// Appended to the subsystem's project name to form the output file name.
    pub file_suffix: String,
}

impl Default for LayerRules {
    fn default() -> Self {
        Self {
            relative_segment: "STM32CubeMX/MDK-ARM".to_string(),
            skip: vec![
                SkipRule::new("system_", "system_ file (delivered from elsewhere)"),
                SkipRule::new("Templates", "Templates file (mostly not present)"),
            ],
            driver_marker: "HAL_Driver".to_string(),
            primary_group: "CubeMX".to_string(),
            driver_group: "HAL Driver".to_string(),
            file_suffix: ".cgen.yml".to_string(),
        }
    }
}

impl LayerRules {
    /// Reason `file` must not be tracked, if any.
    pub fn skip_reason(&self, file: &str) -> Option<&str> {
        self.skip
            .iter()
            .find(|rule| file.contains(rule.pattern.as_str()))
            .map(|rule| rule.reason.as_str())
    }

    pub fn is_driver(&self, file: &str) -> bool {
        file.contains(self.driver_marker.as_str())
    }

    /// Drop skipped files, rewrite the rest with `rewrite`, and split them
    /// into `(primary, driver)` preserving input order.
    pub fn partition_sources<F>(
        &self,
        files: &[String],
        mut rewrite: F,
    ) -> Result<(Vec<String>, Vec<String>)>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut primary = Vec::new();
        let mut driver = Vec::new();
        for file in files {
            if let Some(reason) = self.skip_reason(file) {
                info!("ignoring {reason}: {file}");
                continue;
            }
            let file = rewrite(file)?;
            if self.is_driver(&file) {
                driver.push(file);
            } else {
                primary.push(file);
            }
        }
        Ok((primary, driver))
    }
}

// ---------------------------------------------------------------------------
// Layer file model
// ---------------------------------------------------------------------------

/// Root of a `*.cgen.yml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerFile {
    pub layer: LayerDescription,
}

/// Generator-agnostic description of one subsystem's generated code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LayerDescription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub for_board: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub for_device: String,
    #[serde(rename = "define", default, skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<String>,
    #[serde(rename = "add-path", default, skip_serializing_if = "Vec::is_empty")]
    pub include_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<FileGroup>,
}

/// A named list of source files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileGroup {
    #[serde(rename = "group")]
    pub name: String,
    #[serde(default, with = "file_entries", skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// Files are written as `- file: path` records.
mod file_entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct EntryRef<'a> {
        file: &'a str,
    }

    #[derive(Deserialize)]
    struct Entry {
        file: String,
    }

    pub fn serialize<S: Serializer>(files: &[String], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(files.iter().map(|file| EntryRef { file }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let entries = Vec::<Entry>::deserialize(d)?;
        Ok(entries.into_iter().map(|e| e.file).collect())
    }
}

// ---------------------------------------------------------------------------
// Path rewriting
// ---------------------------------------------------------------------------

fn has_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || has_drive(path)
}

/// Lexically resolve `.` and `..`. For absolute paths `..` never climbs past
/// the root (or drive); relative paths keep leading `..` components.
fn normalize(path: &str) -> Vec<&str> {
    let absolute = is_absolute(path);
    let floor = usize::from(has_drive(path));
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.len() > floor && parts.last() != Some(&"..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    parts
}

/// Whether `parts` starts with `base`. Drive letters compare without case.
fn within(parts: &[&str], base: &[&str]) -> bool {
    parts.len() >= base.len()
        && parts.iter().zip(base).enumerate().all(|(i, (p, b))| {
            if i == 0 && has_drive(b) {
                p.eq_ignore_ascii_case(b)
            } else {
                p == b
            }
        })
}

fn join_relative(parts: &[&str]) -> String {
    if parts.is_empty() {
        return ".".to_string();
    }
    let joined = parts.join("/");
    if parts[0] == ".." {
        joined
    } else {
        format!("./{joined}")
    }
}

/// Rewrite a path reported by STM32CubeMX so it resolves, relative to
/// `out_path`, to the same file.
///
/// - Relative paths are taken relative to `segment` inside `out_path`.
/// - Absolute paths inside `out_path` lose that prefix.
/// - Absolute paths elsewhere fail with [`BridgeError::PathOutsideTree`].
/// - Empty paths fail with [`BridgeError::EmptyPath`].
///
/// The result always uses `/` and starts with `./` or `../`.
pub fn rewrite_path(out_path: &Path, file: &str, segment: &str) -> Result<String> {
    let file = file.trim().replace('\\', "/");
    if file.is_empty() {
        return Err(BridgeError::EmptyPath);
    }

    if !is_absolute(&file) {
        let combined = format!("{segment}/{file}");
        return Ok(join_relative(&normalize(&combined)));
    }

    let base = out_path.to_string_lossy().replace('\\', "/");
    let outside = || BridgeError::PathOutsideTree {
        path: file.clone(),
        base: out_path.to_path_buf(),
    };
    if !is_absolute(&base) {
        return Err(outside());
    }

    let base_parts = normalize(&base);
    let file_parts = normalize(&file);
    if has_drive(&base) != has_drive(&file) || !within(&file_parts, &base_parts) {
        return Err(outside());
    }
    Ok(join_relative(&file_parts[base_parts.len()..]))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Build the layer description of `subsystem` without touching the disk.
pub fn build_layer(
    out_path: &Path,
    state: &ProjectState,
    subsystem: &SubsystemParams,
    rules: &LayerRules,
) -> Result<LayerDescription> {
    let rewrite = |file: &str| rewrite_path(out_path, file, &rules.relative_segment);

    let include_paths = state
        .header_paths
        .iter()
        .map(|p| rewrite(p))
        .collect::<Result<Vec<_>>>()?;

    let (primary, driver) = rules.partition_sources(&state.source_files, rewrite)?;

    Ok(LayerDescription {
        for_board: subsystem.board.clone(),
        for_device: subsystem.device.clone(),
        defines: state.c_defines.clone(),
        include_paths,
        groups: vec![
            FileGroup {
                name: rules.primary_group.clone(),
                files: primary,
            },
            FileGroup {
                name: rules.driver_group.clone(),
                files: driver,
            },
        ],
    })
}

/// Write the layer file of a single subsystem into `out_path`.
///
/// Returns the path of the written file.
pub fn write_single_layer(
    out_path: &Path,
    state: &ProjectState,
    subsystem: &SubsystemParams,
    rules: &LayerRules,
) -> Result<PathBuf> {
    let file_name = format!("{}{}", subsystem.subsystem_idx.project, rules.file_suffix);
    let out_file = out_path.join(file_name);
    debug!(core = subsystem.core(), project = %subsystem.subsystem_idx.project, "building layer");

    let layer = build_layer(out_path, state, subsystem, rules)?;
    crate::yaml::write_yaml(&out_file, &LayerFile { layer })?;

    info!(path = %out_file.display(), "wrote layer");
    Ok(out_file)
}

/// Write one layer file per subsystem in `params`.
///
/// Every subsystem is attempted; if any failed, the first error is returned
/// after the loop.
pub fn write_layers(
    out_path: &Path,
    state: &ProjectState,
    params: &BuildParams,
    rules: &LayerRules,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut first_err = None;
    for subsystem in &params.subsystems {
        match write_single_layer(out_path, state, subsystem, rules) {
            Ok(path) => written.push(path),
            Err(e) => {
                error!(project = %subsystem.subsystem_idx.project, err = %e, "layer failed");
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

/// Read a layer file back.
pub fn read_layer(path: &Path) -> Result<LayerDescription> {
    let file: LayerFile = crate::yaml::read_yaml(path)?;
    Ok(file.layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEG: &str = "STM32CubeMX/MDK-ARM";

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rules_with(pattern: &str, marker: &str) -> LayerRules {
        LayerRules {
            skip: vec![SkipRule::new(pattern, "test")],
            driver_marker: marker.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn partition_filters_and_keeps_order() {
        let rules = rules_with("system_", "HAL_Driver");
        let files = strings(&["a/system_init.c", "b/main.c", "c/HAL_Driver/x.c"]);
        let (primary, driver) = rules
            .partition_sources(&files, |f| Ok(f.to_string()))
            .unwrap();
        assert_eq!(primary, ["b/main.c"]);
        assert_eq!(driver, ["c/HAL_Driver/x.c"]);

        // Feeding the output back in changes nothing.
        let (again, _) = rules
            .partition_sources(&primary, |f| Ok(f.to_string()))
            .unwrap();
        assert_eq!(again, primary);
    }

    #[test]
    fn default_rules_skip_templates() {
        let rules = LayerRules::default();
        assert_eq!(
            rules.skip_reason("../Drivers/Templates/startup.s"),
            Some("Templates file (mostly not present)")
        );
        assert_eq!(rules.skip_reason("../Core/Src/main.c"), None);
    }

    #[test]
    fn relative_paths_rebased_through_segment() {
        let out = Path::new("/work");
        assert_eq!(
            rewrite_path(out, "..\\Core\\Src\\main.c", SEG).unwrap(),
            "./STM32CubeMX/Core/Src/main.c"
        );
        assert_eq!(
            rewrite_path(out, "startup_stm32f401xe.s", SEG).unwrap(),
            "./STM32CubeMX/MDK-ARM/startup_stm32f401xe.s"
        );
    }

    #[test]
    fn relative_paths_may_escape_upward() {
        let out = Path::new("/work");
        assert_eq!(
            rewrite_path(out, "../../../shared/x.c", SEG).unwrap(),
            "../shared/x.c"
        );
    }

    #[test]
    fn absolute_paths_inside_tree_lose_prefix() {
        let out = Path::new("/work/out");
        assert_eq!(
            rewrite_path(out, "/work/out/STM32CubeMX/Core/Inc", SEG).unwrap(),
            "./STM32CubeMX/Core/Inc"
        );
        assert_eq!(
            rewrite_path(Path::new("C:\\proj"), "C:\\proj\\Core\\Src\\a.c", SEG).unwrap(),
            "./Core/Src/a.c"
        );
        assert_eq!(
            rewrite_path(Path::new("C:\\proj"), "c:\\proj\\Core\\a.c", SEG).unwrap(),
            "./Core/a.c"
        );
        // Only the drive letter ignores case.
        assert!(matches!(
            rewrite_path(Path::new("C:\\proj"), "C:\\Proj\\Core\\a.c", SEG),
            Err(BridgeError::PathOutsideTree { .. })
        ));
    }

    #[test]
    fn absolute_paths_outside_tree_rejected() {
        let out = Path::new("/work/out");
        assert!(matches!(
            rewrite_path(out, "/work/other/a.c", SEG),
            Err(BridgeError::PathOutsideTree { .. })
        ));
        assert!(matches!(
            rewrite_path(out, "D:/work/out/a.c", SEG),
            Err(BridgeError::PathOutsideTree { .. })
        ));
        // A sibling directory sharing a name prefix is still outside.
        assert!(matches!(
            rewrite_path(out, "/work/output/a.c", SEG),
            Err(BridgeError::PathOutsideTree { .. })
        ));
    }

    #[test]
    fn empty_path_rejected() {
        assert!(matches!(
            rewrite_path(Path::new("/work"), "  ", SEG),
            Err(BridgeError::EmptyPath)
        ));
    }

    #[test]
    fn groups_always_emitted_in_fixed_order() {
        let state = ProjectState {
            source_files: strings(&["../Core/Src/main.c"]),
            header_paths: strings(&["../Core/Inc"]),
            c_defines: strings(&["USE_HAL_DRIVER"]),
        };
        let sub = SubsystemParams {
            board: "NUCLEO-F401RE".into(),
            ..Default::default()
        };
        let layer = build_layer(Path::new("/work"), &state, &sub, &LayerRules::default()).unwrap();
        assert_eq!(layer.groups.len(), 2);
        assert_eq!(layer.groups[0].name, "CubeMX");
        assert_eq!(layer.groups[0].files, ["./STM32CubeMX/Core/Src/main.c"]);
        assert_eq!(layer.groups[1].name, "HAL Driver");
        assert!(layer.groups[1].files.is_empty());
        assert_eq!(layer.include_paths, ["./STM32CubeMX/Core/Inc"]);
        assert_eq!(layer.for_board, "NUCLEO-F401RE");
    }

    #[test]
    fn layer_yaml_shape() {
        let layer = LayerFile {
            layer: LayerDescription {
                for_device: "STM32F401RETx".into(),
                groups: vec![FileGroup {
                    name: "CubeMX".into(),
                    files: strings(&["./a.c"]),
                }],
                ..Default::default()
            },
        };
        let text = serde_yaml::to_string(&layer).unwrap();
        assert!(text.contains("for-device: STM32F401RETx"));
        assert!(text.contains("- group: CubeMX"));
        assert!(text.contains("- file: ./a.c"));
        assert!(!text.contains("for-board"));
    }
}
