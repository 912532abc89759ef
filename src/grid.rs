//! Surface sampling and scan job planning.
//!
//! Planning is a pure function of its inputs: the same sweep, surfaces and grids
//! always produce the same jobs in the same order, so output identifiers are stable
//! across runs.

use bevy_math::bounding::Aabb3d;
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Number of grid cells along the x and y axes of a surface's top face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridResolution {
    pub nx: u32,
    pub ny: u32,
}

impl Default for GridResolution {
    fn default() -> Self {
        Self { nx: 2, ny: 2 }
    }
}

/// A sampled sensor location on a named surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub surface: String,
    pub position: Vec3,
}

/// How the sensor is held relative to each grid point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorPose {
    /// Height added above the sampled point so the sensor clears the surface (meters).
    pub z_offset: f32,
    /// Sensor orientation as XYZ Euler angles in degrees, applied X first.
    pub rotation_degrees: Vec3,
}

impl Default for SensorPose {
    fn default() -> Self {
        Self {
            z_offset: 0.1,
            rotation_degrees: Vec3::new(90.0, 0.0, 90.0),
        }
    }
}

impl SensorPose {
    /// The orientation as a quaternion (`Rz * Ry * Rx`).
    pub fn rotation(&self) -> Quat {
        let r = self.rotation_degrees;
        Quat::from_euler(
            EulerRot::ZYX,
            r.z.to_radians(),
            r.y.to_radians(),
            r.x.to_radians(),
        )
    }
}

/// One fully specified scan invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    /// `yaw_`-prefixed tag of the orientation this job belongs to.
    pub orientation_tag: String,
    /// The orientation in degrees.
    pub yaw_deg: i32,
    pub surface: String,
    /// 1-based position within the (orientation, surface) pass.
    pub index: u32,
    pub sensor_position: Vec3,
    pub sensor_rotation: Quat,
    /// Name under which the scan result is exported.
    pub output_id: String,
}

/// Tag for an orientation: `yaw_` followed by the signed angle padded to 3 characters.
///
/// The sign counts toward the width, so `-45` gives `yaw_-45` and `-5` gives `yaw_-05`.
pub fn orientation_tag(yaw_deg: i32) -> String {
    format!("yaw_{yaw_deg:03}")
}

/// Output identifier of the `index`-th job on `surface` in orientation `tag`.
pub fn output_id(tag: &str, surface: &str, index: u32) -> String {
    format!("{tag}_{surface}_scan_{index:03}")
}

/// Samples the top face of `bounds` at cell centers.
///
/// Points run along x first, then step in y. Either resolution axis being zero yields
/// no points.
///
/// `bounds` is axis-aligned. For a surface turned about z it is the box around the
/// turned face, so points near its corners can fall outside the face itself.
pub fn sample_grid(surface: &str, bounds: &Aabb3d, resolution: GridResolution) -> Vec<GridPoint> {
    let min = Vec3::from(bounds.min);
    let max = Vec3::from(bounds.max);
    let GridResolution { nx, ny } = resolution;
    if nx == 0 || ny == 0 {
        return Vec::new();
    }

    let step_x = (max.x - min.x) / nx as f32;
    let step_y = (max.y - min.y) / ny as f32;

    (0..ny)
        .flat_map(|iy| (0..nx).map(move |ix| (ix, iy)))
        .map(|(ix, iy)| GridPoint {
            surface: surface.to_string(),
            position: Vec3::new(
                min.x + (ix as f32 + 0.5) * step_x,
                min.y + (iy as f32 + 0.5) * step_y,
                max.z,
            ),
        })
        .collect()
}

/// Expands a sweep over surfaces into an ordered job list.
///
/// Order is orientation, then surface (in the order given), then grid point (in the
/// order `grid_fn` returns them). Indices restart at 1 for every orientation and
/// surface pair. `grid_fn` is called once per pair.
pub fn plan_jobs<F>(
    sweep: &[i32],
    surfaces: &[String],
    mut grid_fn: F,
    sensor: &SensorPose,
) -> Vec<ScanJob>
where
    F: FnMut(i32, &str) -> Vec<GridPoint>,
{
    let rotation = sensor.rotation();
    let lift = Vec3::Z * sensor.z_offset;
    let mut jobs = Vec::new();

    for &yaw_deg in sweep {
        let tag = orientation_tag(yaw_deg);
        for surface in surfaces {
            for (i, point) in grid_fn(yaw_deg, surface).into_iter().enumerate() {
                let index = i as u32 + 1;
                jobs.push(ScanJob {
                    orientation_tag: tag.clone(),
                    yaw_deg,
                    surface: surface.clone(),
                    index,
                    sensor_position: point.position + lift,
                    sensor_rotation: rotation,
                    output_id: output_id(&tag, surface, index),
                });
            }
        }
    }

    jobs
}
