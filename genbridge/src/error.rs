//! Error types shared by every stage of the bridge.

use std::path::PathBuf;

/// Errors that can occur while translating between the build description,
/// STM32CubeMX and the generated layer files.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A required input file does not exist.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// An input file exists but could not be decoded.
    #[error("failed to parse {}: {detail}", path.display())]
    Parse {
        /// The file being decoded.
        path: PathBuf,
        /// Decoder message.
        detail: String,
    },

    /// A well-formed file lacks a record the bridge requires.
    #[error("generator {id} missing in {}", path.display())]
    MissingEntry {
        /// Identifier that was looked up.
        id: String,
        /// File that was searched.
        path: PathBuf,
    },

    /// Writing an output file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external generator, or something it needs, cannot be located.
    #[error("missing dependency {name}: {detail}")]
    MissingDependency { name: String, detail: String },

    /// The generator process could not be spawned or waited on.
    #[error("failed to launch generator: {0}")]
    Launch(#[source] std::io::Error),

    /// The generator ran but exited unsuccessfully.
    #[error("generator exited with status {exit_code}")]
    ProcessFailed { exit_code: i32 },

    /// The generator did not finish in time and was killed.
    #[error("generator timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// A path reported by the generator was empty.
    #[error("empty path in project state")]
    EmptyPath,

    /// An absolute path reported by the generator lies outside the output tree.
    #[error("path {path} lies outside output directory {}", base.display())]
    PathOutsideTree { path: String, base: PathBuf },
}

impl BridgeError {
    pub(crate) fn parse(path: impl Into<PathBuf>, detail: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
