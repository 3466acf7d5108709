//! STM32CubeMX subprocess launcher.
//!
//! The pipeline only talks to the [`Launcher`] trait so it can run without a
//! real CubeMX installation.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::{BridgeError, Result};

/// Environment variable naming the CubeMX installation directory.
pub const CUBEMX_ENV_VAR: &str = "STM32CubeMX_PATH";

/// Default time CubeMX may run before it is killed (one hour; the user may
/// be editing the project interactively).
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// How CubeMX is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Open an existing `.ioc` project in the GUI.
    OpenProject(PathBuf),
    /// Run a batch script (`-s <script>`).
    RunScript(PathBuf),
}

/// Runs the external generator to completion.
pub trait Launcher {
    fn launch(&self, mode: &LaunchMode) -> Result<()>;
}

/// Launcher that does nothing; used when only the translation is wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLauncher;

impl Launcher for NoopLauncher {
    fn launch(&self, mode: &LaunchMode) -> Result<()> {
        info!(?mode, "skipping CubeMX launch");
        Ok(())
    }
}

/// Configuration for [`CubeMxLauncher`].
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// CubeMX installation directory; falls back to [`CUBEMX_ENV_VAR`].
    pub install_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl LauncherConfig {
    pub fn install_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(path.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// Starts CubeMX through the Java runtime bundled with it.
#[derive(Debug, Default)]
pub struct CubeMxLauncher {
    config: LauncherConfig,
}

/// Executables inside a CubeMX installation.
#[derive(Debug, PartialEq, Eq)]
struct Installation {
    java: PathBuf,
    cubemx: PathBuf,
}

fn exe_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}

impl Installation {
    fn at(dir: &Path) -> Self {
        Self {
            java: dir.join("jre").join("bin").join(exe_name("java")),
            cubemx: dir.join(exe_name("STM32CubeMX")),
        }
    }

    fn verify(self) -> Result<Self> {
        for path in [&self.java, &self.cubemx] {
            if !path.exists() {
                return Err(BridgeError::MissingDependency {
                    name: "STM32CubeMX".to_string(),
                    detail: format!("{} does not exist", path.display()),
                });
            }
        }
        Ok(self)
    }
}

impl CubeMxLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    fn install_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.config.install_dir {
            return Ok(dir.clone());
        }
        match std::env::var(CUBEMX_ENV_VAR) {
            Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
            _ => Err(BridgeError::MissingDependency {
                name: "STM32CubeMX".to_string(),
                detail: format!("environment variable {CUBEMX_ENV_VAR} not set"),
            }),
        }
    }

    fn command(&self, mode: &LaunchMode) -> Result<Command> {
        let install = Installation::at(&self.install_dir()?).verify()?;
        let mut cmd = Command::new(&install.java);
        cmd.arg("-jar").arg(&install.cubemx);
        match mode {
            LaunchMode::OpenProject(ioc) => cmd.arg(ioc),
            LaunchMode::RunScript(script) => cmd.arg("-s").arg(script),
        };
        Ok(cmd)
    }
}

impl Launcher for CubeMxLauncher {
    fn launch(&self, mode: &LaunchMode) -> Result<()> {
        let mut cmd = self.command(mode)?;
        info!(?mode, "launching STM32CubeMX");
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(BridgeError::Launch)?;
        let status = wait_with_timeout(child, self.config.timeout)?;
        if !status.success() {
            return Err(BridgeError::ProcessFailed {
                exit_code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BridgeError::Timeout {
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(BridgeError::Launch(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = LauncherConfig::default()
            .install_dir("/opt/cubemx")
            .timeout_secs(60);
        assert_eq!(config.install_dir, Some(PathBuf::from("/opt/cubemx")));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn installation_layout() {
        let install = Installation::at(Path::new("/opt/cubemx"));
        assert_eq!(
            install.java,
            Path::new("/opt/cubemx/jre/bin").join(exe_name("java"))
        );
        assert_eq!(install.cubemx, Path::new("/opt/cubemx").join(exe_name("STM32CubeMX")));
    }

    #[test]
    fn missing_installation_is_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = CubeMxLauncher::new(LauncherConfig::default().install_dir(dir.path()));
        let err = launcher
            .launch(&LaunchMode::RunScript(dir.path().join("project.script")))
            .unwrap_err();
        assert!(matches!(err, BridgeError::MissingDependency { .. }));
    }

    #[test]
    fn script_mode_passes_script_flag() {
        let dir = tempfile::tempdir().unwrap();
        let install = Installation::at(dir.path());
        std::fs::create_dir_all(install.java.parent().unwrap()).unwrap();
        std::fs::write(&install.java, "").unwrap();
        std::fs::write(&install.cubemx, "").unwrap();

        let launcher = CubeMxLauncher::new(LauncherConfig::default().install_dir(dir.path()));
        let cmd = launcher
            .command(&LaunchMode::RunScript(PathBuf::from("project.script")))
            .unwrap();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args[0], "-jar");
        assert_eq!(args[2], "-s");
        assert_eq!(args[3], "project.script");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_process_failed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let install = Installation::at(dir.path());
        std::fs::create_dir_all(install.java.parent().unwrap()).unwrap();
        std::fs::write(&install.java, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&install.java, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(&install.cubemx, "").unwrap();

        let launcher = CubeMxLauncher::new(
            LauncherConfig::default()
                .install_dir(dir.path())
                .timeout_secs(30),
        );
        let err = launcher
            .launch(&LaunchMode::RunScript(dir.path().join("project.script")))
            .unwrap_err();
        assert!(
            matches!(err, BridgeError::ProcessFailed { exit_code: 3 }),
            "got {err}"
        );
    }

    #[test]
    fn wait_with_timeout_kills_slow_process() {
        if cfg!(windows) {
            return;
        }
        let child = Command::new("sleep").arg("5").spawn().unwrap();
        let err = wait_with_timeout(child, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
    }
}
