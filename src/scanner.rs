//! The scan-execution port and a ray-casting range scanner.

use crate::error::ScanError;
use crate::scene::{ObjectKind, ObjectQuery, SceneHost, SceneObject};
use bevy_math::bounding::{Aabb3d, RayCast3d};
use bevy_math::{Dir3, Ray3d};
use glam::{Quat, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Everything an executor needs to run one scan.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRequest {
    /// Name of the sensor proxy object, already moved into place.
    pub sensor: String,
    pub position: Vec3,
    pub rotation: Quat,
    /// Name for the exported result and any object the scan adds to the scene.
    pub output_id: String,
}

/// What a completed scan left behind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanArtifacts {
    /// Objects present in the scene after the scan that were not there before.
    pub created_objects: Vec<String>,
    /// File the scan was exported to, if any.
    pub exported: Option<PathBuf>,
    pub point_count: usize,
}

/// Runs scans against a scene. Each call blocks until the scan is finished.
pub trait ScanExecutor {
    fn scan(
        &mut self,
        scene: &mut dyn SceneHost,
        request: &ScanRequest,
    ) -> Result<ScanArtifacts, ScanError>;
}

/// Finest horizontal resolution accepted (degrees), 36 000 rays per channel.
pub const MIN_AZIMUTH_STEP_DEG: f32 = 0.01;

/// Sampling pattern and side effects of a [`RaycastScanner`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerSettings {
    /// Horizontal angle between consecutive rays of one revolution (degrees).
    pub azimuth_step_deg: f32,
    /// Lowest channel elevation (degrees).
    pub elevation_min_deg: f32,
    /// Highest channel elevation (degrees).
    pub elevation_max_deg: f32,
    /// Number of channels spread evenly between the elevation limits.
    pub channels: u32,
    /// Hits farther than this are dropped (meters).
    pub max_range: f32,
    /// Write each cloud as `<output_id>.ply`.
    pub export: bool,
    /// Add each cloud to the scene as a point cloud object.
    pub add_to_scene: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            azimuth_step_deg: 1.0,
            elevation_min_deg: -15.0,
            elevation_max_deg: 15.0,
            channels: 16,
            max_range: 100.0,
            export: true,
            add_to_scene: true,
        }
    }
}

impl ScannerSettings {
    fn validate(&self) -> Result<(), ScanError> {
        if !(self.azimuth_step_deg >= MIN_AZIMUTH_STEP_DEG) {
            return Err(ScanError::InvalidSettings(format!(
                "azimuth step must be at least {MIN_AZIMUTH_STEP_DEG}°, got {}",
                self.azimuth_step_deg
            )));
        }
        if self.channels == 0 {
            return Err(ScanError::InvalidSettings("at least one channel is required".into()));
        }
        if !(self.max_range > 0.0) {
            return Err(ScanError::InvalidSettings(format!(
                "max range must be positive, got {}",
                self.max_range
            )));
        }
        Ok(())
    }

    fn elevations(&self) -> impl Iterator<Item = f32> + '_ {
        let span = self.elevation_max_deg - self.elevation_min_deg;
        let last = self.channels.saturating_sub(1).max(1) as f32;
        (0..self.channels).map(move |c| (self.elevation_min_deg + span * c as f32 / last).to_radians())
    }

    fn azimuths(&self) -> impl Iterator<Item = f32> + '_ {
        let count = (360.0 / self.azimuth_step_deg).ceil() as u32;
        (0..count).map(move |i| (i as f32 * self.azimuth_step_deg).to_radians())
    }
}

/// A spinning range sensor that intersects rays with the world bounds of mesh objects.
///
/// The sensor frame follows the camera convention: it looks down its local `-Z` and
/// spins about its local `+Y`. With the default sensor rotation of (90°, 0°, 90°) the
/// spin axis is world `+Z`.
#[derive(Clone, Debug)]
pub struct RaycastScanner {
    settings: ScannerSettings,
    output_dir: PathBuf,
}

impl RaycastScanner {
    pub fn new(settings: ScannerSettings, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            output_dir: output_dir.into(),
        }
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    /// Casts one full revolution from `origin` and returns the nearest hit of every ray.
    pub fn cast(&self, origin: Vec3, rotation: Quat, targets: &[Aabb3d]) -> Vec<Vec3> {
        let mut hits = Vec::new();
        for elevation in self.settings.elevations() {
            let (sin_el, cos_el) = elevation.sin_cos();
            for azimuth in self.settings.azimuths() {
                let (sin_az, cos_az) = azimuth.sin_cos();
                let local = (Vec3::X * sin_az + Vec3::NEG_Z * cos_az) * cos_el + Vec3::Y * sin_el;
                let Ok(direction) = Dir3::new(rotation * local) else {
                    continue;
                };

                let ray = RayCast3d::from_ray(Ray3d { origin, direction }, self.settings.max_range);
                let nearest = targets
                    .iter()
                    .filter_map(|aabb| ray.aabb_intersection_at(aabb))
                    .filter(|t| *t > 0.0)
                    .min_by(f32::total_cmp);

                if let Some(t) = nearest {
                    hits.push(origin + *direction * t);
                }
            }
        }
        hits
    }
}

impl ScanExecutor for RaycastScanner {
    fn scan(
        &mut self,
        scene: &mut dyn SceneHost,
        request: &ScanRequest,
    ) -> Result<ScanArtifacts, ScanError> {
        self.settings.validate()?;
        if scene.placement(&request.sensor).is_none() {
            return Err(ScanError::UnknownSensor(request.sensor.clone()));
        }

        let before: HashSet<String> = scene.object_names().into_iter().collect();

        let targets: Vec<Aabb3d> = scene
            .list_objects_matching(&ObjectQuery::meshes())
            .iter()
            .filter_map(|name| scene.world_bounds(name))
            .collect();
        let points = self.cast(request.position, request.rotation, &targets);
        debug!(
            "{}: {} hits against {} targets",
            request.output_id,
            points.len(),
            targets.len()
        );

        let exported = if self.settings.export {
            let path = self.output_dir.join(format!("{}.ply", request.output_id));
            write_ply(&path, &request.output_id, &points).map_err(|source| ScanError::Export {
                path: path.clone(),
                source,
            })?;
            Some(path)
        } else {
            None
        };

        if self.settings.add_to_scene {
            let name = unique_name(&before, &request.output_id);
            scene.spawn(SceneObject::new(name, ObjectKind::PointCloud))?;
        }

        let created_objects = scene
            .object_names()
            .into_iter()
            .filter(|name| !before.contains(name))
            .collect();

        Ok(ScanArtifacts {
            created_objects,
            exported,
            point_count: points.len(),
        })
    }
}

/// `base`, or `base.001`, `base.002`, ... if taken.
fn unique_name(taken: &HashSet<String>, base: &str) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}.{n:03}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Writes `points` as an ASCII PLY vertex cloud.
pub fn write_ply(path: &Path, comment: &str, points: &[Vec3]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "comment {comment}")?;
    writeln!(out, "element vertex {}", points.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "end_header")?;
    for p in points {
        writeln!(out, "{} {} {}", p.x, p.y, p.z)?;
    }
    out.flush()
}
