//! towscan command-line entrypoint.
//!
//! `create` builds a fresh scene with the tug and aircraft coupled and saves it.
//! `load` opens a saved scene and runs the orientation sweep over it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info};
use thiserror::Error;

use towscan::{
    AssetLayout, Body, ChainError, ConfigError, MemoryScene, RaycastScanner, RunConfig,
    ScanOrchestrator, SceneError, SweepError, create_scene, parse_file,
};

/// Synthetic range-scan sweeps of a tug coupled to an aircraft.
#[derive(Parser, Debug)]
#[command(name = "towscan", version, about)]
struct CliArgs {
    /// `create` builds a new scene; `load` opens an existing one and scans it.
    #[arg(long, value_enum, default_value_t = Mode::Load)]
    mode: Mode,
    /// Scene file, relative to the root unless absolute.
    #[arg(long, value_name = "FILE", default_value = "scene.json")]
    scene: PathBuf,
    /// Tug variant; must exist in the tug directory.
    #[arg(long, default_value = "t5")]
    tug: String,
    /// Aircraft variant; must exist in the aircraft directory.
    #[arg(long, default_value = "a320_ceo")]
    ac: String,
    /// Directory holding the asset folders, the scene and the outputs.
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: PathBuf,
    /// Path to a TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log verbosity level.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum Mode {
    Create,
    Load,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error("failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    ReportJson(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match &cli.config {
        Some(path) => match RunConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => RunConfig::default(),
    };

    init_logger(&resolve_log_level(
        cli.log_level,
        std::env::var("RUST_LOG").ok(),
        config.log_level.as_deref(),
    ));

    match run(&cli, &config) {
        Ok(()) => {
            info!("--- RUN COMPLETE ---");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &CliArgs, config: &RunConfig) -> Result<(), CliError> {
    let layout = AssetLayout::new(&cli.root, &config.layout, &cli.tug, &cli.ac);
    layout.verify()?;
    let output_dir = layout.ensure_output_dir()?;

    let scene_path = resolve_scene_path(&cli.root, &cli.scene);
    info!("[MODE] {:?} | SCENE: {}", cli.mode, scene_path.display());

    let tug_chain = parse_file(&layout.tug.description)?;
    let aircraft_chain = parse_file(&layout.aircraft.description)?;
    let tug = Body {
        name: &layout.tug.name,
        chain: &tug_chain,
    };
    let aircraft = Body {
        name: &layout.aircraft.name,
        chain: &aircraft_chain,
    };

    match cli.mode {
        Mode::Create => {
            let scene = create_scene(
                &config.create,
                &config.sweep.coupling,
                (tug, &layout.tug),
                (aircraft, &layout.aircraft),
            )?;
            info!("Scene creation complete. Saving to: {}", scene_path.display());
            scene.save(&scene_path)?;
        }
        Mode::Load => {
            let mut scene = MemoryScene::load(&scene_path).inspect_err(|_| {
                error!("Load failed. Halting.");
            })?;
            let mut scanner = RaycastScanner::new(config.scanner.clone(), output_dir);
            let mut orchestrator = ScanOrchestrator::new(
                tug,
                aircraft,
                config.sweep.clone(),
                config.sensor.clone(),
            );
            let report = orchestrator.run(&mut scene, &mut scanner)?;

            let report_path = output_dir.join("sweep_report.json");
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(&report_path, json).map_err(|source| CliError::Report {
                path: report_path.clone(),
                source,
            })?;
            info!("Sweep report written to {}", report_path.display());
        }
    }

    Ok(())
}

fn resolve_scene_path(root: &Path, scene: &Path) -> PathBuf {
    if scene.is_absolute() {
        scene.to_path_buf()
    } else {
        root.join(scene)
    }
}

/// `--log-level`, then a non-blank `RUST_LOG`, then the config file, then `info`.
fn resolve_log_level(
    flag: Option<LogLevel>,
    env: Option<String>,
    config: Option<&str>,
) -> String {
    if let Some(level) = flag {
        return level.as_str().to_string();
    }

    if let Some(level) = env
        && !level.trim().is_empty()
    {
        return level;
    }

    config.unwrap_or("info").to_string()
}

fn init_logger(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_filters(level);
    builder.format_timestamp_millis();
    builder.init();
}
