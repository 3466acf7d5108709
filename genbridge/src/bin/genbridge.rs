//! CLI entry point for genbridge.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use genbridge::BridgeError;
use genbridge::launch::{
    CubeMxLauncher, DEFAULT_TIMEOUT_SECS, Launcher, LauncherConfig, NoopLauncher,
};

/// genbridge — run STM32CubeMX for a cbuild project and write cgen layers.
#[derive(Parser, Debug)]
#[command(name = "genbridge", version, about)]
struct Cli {
    /// Path to the build description (`*.cbuild-gen-idx.yml`).
    build: PathBuf,

    /// Output directory used when the build description names none.
    #[arg(short, long, default_value = ".")]
    output: String,

    /// Path to `global.generator.yml`, used for the download hint.
    #[arg(short, long)]
    generator_config: Option<PathBuf>,

    /// Seconds STM32CubeMX may run before it is killed.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Do not start STM32CubeMX; only translate an existing `.mxproject`.
    #[arg(long)]
    no_launch: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("genbridge=info")),
        )
        .init();

    let cli = Cli::parse();

    let generator = match &cli.generator_config {
        Some(path) => {
            let params = genbridge::config::read_generator_config(path)?;
            info!(id = %params.id, url = %params.download_url, "using generator");
            Some(params)
        }
        None => None,
    };

    let launcher: Box<dyn Launcher> = if cli.no_launch {
        Box::new(NoopLauncher)
    } else {
        Box::new(CubeMxLauncher::new(
            LauncherConfig::default().timeout_secs(cli.timeout_secs),
        ))
    };

    match genbridge::run(&cli.build, &cli.output, launcher.as_ref()) {
        Ok(_) => Ok(()),
        Err(err) => {
            let missing = err.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<BridgeError>(),
                    Some(BridgeError::MissingDependency { .. })
                )
            });
            match generator {
                Some(params) if missing && !params.download_url.is_empty() => Err(err.context(
                    format!("install STM32CubeMX from {}", params.download_url),
                )),
                _ => Err(err),
            }
        }
    }
}
