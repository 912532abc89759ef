//! Run configuration and the on-disk asset layout.
//!
//! Every field has a default, so an absent or partial TOML file is valid. Command-line
//! flags are applied on top by the binary.

use crate::align::Coupling;
use crate::error::{BodyRole, ConfigError};
use crate::grid::{GridResolution, SensorPose};
use crate::scanner::ScannerSettings;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration of a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub sweep: SweepConfig,
    pub sensor: SensorConfig,
    pub scanner: ScannerSettings,
    pub layout: LayoutConfig,
    pub create: CreateConfig,
    /// Log filter used when neither `--log-level` nor `RUST_LOG` is given.
    pub log_level: Option<String>,
}

impl RunConfig {
    /// Loads a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// What the sweep visits and how bodies are coupled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Yaw angles of the tug in degrees, visited in order.
    pub orientations: Vec<i32>,
    pub coupling: Coupling,
    /// Mesh objects whose name contains this text (any case) are scanned.
    pub surface_pattern: String,
    pub grid: GridResolution,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            orientations: vec![0, 45, -45],
            coupling: Coupling::default(),
            surface_pattern: "cube".into(),
            grid: GridResolution::default(),
        }
    }
}

/// The sensor proxy object moved between grid points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub name: String,
    /// Height of the sensor above each sampled point (meters).
    pub z_offset: f32,
    /// XYZ Euler angles in degrees.
    pub rotation_degrees: Vec3,
    pub scale: Vec3,
}

impl Default for SensorConfig {
    fn default() -> Self {
        let pose = SensorPose::default();
        Self {
            name: "lidar".into(),
            z_offset: pose.z_offset,
            rotation_degrees: pose.rotation_degrees,
            scale: Vec3::splat(0.15),
        }
    }
}

impl SensorConfig {
    pub fn pose(&self) -> SensorPose {
        SensorPose {
            z_offset: self.z_offset,
            rotation_degrees: self.rotation_degrees,
        }
    }
}

/// Directory names of the asset layout, relative to the run root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub tug_dir: PathBuf,
    pub aircraft_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            tug_dir: "Tugs".into(),
            aircraft_dir: "AC".into(),
            output_dir: "Outputs".into(),
        }
    }
}

/// Scene contents for `create` mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateConfig {
    pub tug_start: Vec3,
    pub aircraft_start: Vec3,
    /// Surround the scene with four walls and a floor.
    pub boundary_walls: bool,
    /// Half the side length of the square walled area (meters).
    pub boundary_half_size: f32,
    pub wall_height: f32,
    /// Scan targets added to the new scene.
    pub surfaces: Vec<SurfaceSpec>,
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            tug_start: Vec3::ZERO,
            aircraft_start: Vec3::ZERO,
            boundary_walls: true,
            boundary_half_size: 40.0,
            wall_height: 5.0,
            surfaces: Vec::new(),
        }
    }
}

/// A box-shaped scan target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurfaceSpec {
    pub name: String,
    pub center: Vec3,
    pub half_extents: Vec3,
}

/// Description and geometry files of one body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyAssets {
    pub role: BodyRole,
    /// Object name of the body in the scene.
    pub name: String,
    pub description: PathBuf,
    pub geometry: PathBuf,
}

/// Resolved paths of a run rooted at one directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetLayout {
    pub tug: BodyAssets,
    pub aircraft: BodyAssets,
    pub output_dir: PathBuf,
}

impl AssetLayout {
    /// Builds the layout for the tug and aircraft variants named `tug` and `aircraft`.
    ///
    /// Tugs pair `<name>.urdf` with `<name>.stl`, aircraft pair `<name>.urdf` with
    /// `<name>.ply`.
    pub fn new(root: &Path, layout: &LayoutConfig, tug: &str, aircraft: &str) -> Self {
        let tug_dir = root.join(&layout.tug_dir);
        let aircraft_dir = root.join(&layout.aircraft_dir);
        Self {
            tug: BodyAssets {
                role: BodyRole::Primary,
                name: tug.to_string(),
                description: tug_dir.join(format!("{tug}.urdf")),
                geometry: tug_dir.join(format!("{tug}.stl")),
            },
            aircraft: BodyAssets {
                role: BodyRole::Dependent,
                name: aircraft.to_string(),
                description: aircraft_dir.join(format!("{aircraft}.urdf")),
                geometry: aircraft_dir.join(format!("{aircraft}.ply")),
            },
            output_dir: root.join(&layout.output_dir),
        }
    }

    /// Checks that both files of both bodies exist.
    pub fn verify(&self) -> Result<(), ConfigError> {
        for body in [&self.tug, &self.aircraft] {
            for path in [&body.description, &body.geometry] {
                if !path.is_file() {
                    return Err(ConfigError::MissingAsset {
                        role: body.role,
                        name: body.name.clone(),
                        path: path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Creates the output directory if it does not exist yet.
    pub fn ensure_output_dir(&self) -> Result<&Path, ConfigError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| ConfigError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })?;
        Ok(&self.output_dir)
    }
}
