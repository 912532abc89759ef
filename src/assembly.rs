//! Builds a fresh scene with both bodies coupled at their start positions.

use crate::align::{Coupling, align};
use crate::config::{BodyAssets, CreateConfig};
use crate::error::SceneError;
use crate::orchestrator::Body;
use crate::pose::resolve;
use crate::scene::{MemoryScene, ObjectKind, Placement, SceneHost, SceneObject};
use glam::Vec3;
use log::{info, warn};

const WALL_THICKNESS: f32 = 0.1;

/// Creates a scene holding the boundary walls, both bodies and the configured surfaces.
///
/// The aircraft is moved so its coupling link meets the tug's. If either link is
/// missing the aircraft stays at its configured start and a warning is logged.
pub fn create_scene(
    create: &CreateConfig,
    coupling: &Coupling,
    tug: (Body<'_>, &BodyAssets),
    aircraft: (Body<'_>, &BodyAssets),
) -> Result<MemoryScene, SceneError> {
    let mut scene = MemoryScene::new();

    if create.boundary_walls {
        for wall in boundary_walls(create.boundary_half_size, create.wall_height) {
            scene.spawn(wall)?;
        }
    }

    let (tug, tug_assets) = tug;
    let (aircraft, aircraft_assets) = aircraft;
    scene.spawn(
        SceneObject::new(tug.name, ObjectKind::Mesh)
            .with_placement(Placement::at(create.tug_start))
            .with_source(tug_assets.geometry.display().to_string()),
    )?;
    scene.spawn(
        SceneObject::new(aircraft.name, ObjectKind::Mesh)
            .with_placement(Placement::at(create.aircraft_start))
            .with_source(aircraft_assets.geometry.display().to_string()),
    )?;

    let tug_poses = resolve(tug.chain, create.tug_start);
    let aircraft_poses = resolve(aircraft.chain, create.aircraft_start);
    match align(&tug_poses, &aircraft_poses, coupling) {
        Ok(correction) => {
            let position = create.aircraft_start + correction;
            scene.set_placement(aircraft.name, Placement::at(position))?;
            info!("Aircraft '{}' coupled to tug at {position}", aircraft.name);
        }
        Err(skipped) => warn!(
            "Could not find '{}' or '{}' link for alignment: {skipped}",
            coupling.primary, coupling.dependent
        ),
    }

    for surface in &create.surfaces {
        scene.spawn(SceneObject::cuboid(
            surface.name.clone(),
            surface.center,
            surface.half_extents,
        ))?;
    }

    Ok(scene)
}

/// Four walls around a square of side `2 * half_size` and a floor below it.
pub fn boundary_walls(half_size: f32, height: f32) -> Vec<SceneObject> {
    let t = WALL_THICKNESS / 2.0;
    let h = height / 2.0;
    vec![
        SceneObject::cuboid("wall_north", Vec3::new(0.0, half_size, h), Vec3::new(half_size, t, h)),
        SceneObject::cuboid("wall_south", Vec3::new(0.0, -half_size, h), Vec3::new(half_size, t, h)),
        SceneObject::cuboid("wall_east", Vec3::new(half_size, 0.0, h), Vec3::new(t, half_size, h)),
        SceneObject::cuboid("wall_west", Vec3::new(-half_size, 0.0, h), Vec3::new(t, half_size, h)),
        SceneObject::cuboid("floor", Vec3::new(0.0, 0.0, -t), Vec3::new(half_size, half_size, t)),
    ]
}
