//! Drives an orientation sweep over a coupled tug and aircraft.
//!
//! The entry point is [`ScanOrchestrator`]. Give it both bodies' chains and scene
//! names plus the sweep and sensor settings, then call [`ScanOrchestrator::run`] with a
//! [`SceneHost`] and a [`ScanExecutor`].

use crate::align::align;
use crate::chain::Chain;
use crate::config::{SensorConfig, SweepConfig};
use crate::error::{AlignmentSkipped, BodyRole, DispatchFailure, SweepError};
use crate::grid::{ScanJob, orientation_tag, plan_jobs, sample_grid};
use crate::pose::{WorldPoseMap, resolve};
use crate::scanner::{ScanArtifacts, ScanExecutor, ScanRequest};
use crate::scene::{ObjectKind, ObjectQuery, Placement, SceneHost, SceneObject};
use glam::{Quat, Vec3};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// A body in the scene together with its kinematic description.
#[derive(Clone, Copy, Debug)]
pub struct Body<'c> {
    /// Object name in the scene.
    pub name: &'c str,
    pub chain: &'c Chain,
}

/// Where the orchestrator is in its sweep.
///
/// Each orientation walks `Realign → RecomputePoses → BuildJobs → DispatchJobs` and
/// returns to `Idle`; after the last orientation the machine rests in `Complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Realign { orientation: usize },
    RecomputePoses { orientation: usize },
    BuildJobs { orientation: usize },
    DispatchJobs { orientation: usize },
    Complete,
}

/// A scan that finished.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletedScan {
    pub output_id: String,
    pub artifacts: ScanArtifacts,
}

/// Outcome of one orientation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationReport {
    pub yaw_deg: i32,
    pub tag: String,
    /// Translation applied to the aircraft, if alignment succeeded.
    pub correction: Option<Vec3>,
    /// Why alignment was skipped, if it was.
    pub alignment_skipped: Option<AlignmentSkipped>,
    pub jobs_planned: usize,
    pub completed: Vec<CompletedScan>,
    pub failures: Vec<DispatchFailure>,
    /// Scene errors hit while realigning; the orientation still scans.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Outcome of a whole sweep.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Scan surfaces in the order they were visited.
    pub surfaces: Vec<String>,
    pub orientations: Vec<OrientationReport>,
}

impl SweepReport {
    pub fn jobs_planned(&self) -> usize {
        self.orientations.iter().map(|o| o.jobs_planned).sum()
    }

    pub fn completed(&self) -> usize {
        self.orientations.iter().map(|o| o.completed.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.orientations.iter().map(|o| o.failures.len()).sum()
    }
}

/// Runs the orientation sweep. The orchestrator is the only writer of body placements
/// while a sweep is in progress.
pub struct ScanOrchestrator<'c> {
    tug: Body<'c>,
    aircraft: Body<'c>,
    sweep: SweepConfig,
    sensor: SensorConfig,
    state: SweepState,
}

impl<'c> ScanOrchestrator<'c> {
    pub fn new(tug: Body<'c>, aircraft: Body<'c>, sweep: SweepConfig, sensor: SensorConfig) -> Self {
        Self {
            tug,
            aircraft,
            sweep,
            sensor,
            state: SweepState::Idle,
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Runs every orientation of the sweep in order.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::MissingBody`] if either body is absent from the scene,
    /// before anything is moved. Once the sweep has started nothing ends it early:
    /// alignment skips, scene errors and scan failures are logged and recorded in the
    /// returned report.
    pub fn run(
        &mut self,
        scene: &mut dyn SceneHost,
        executor: &mut dyn ScanExecutor,
    ) -> Result<SweepReport, SweepError> {
        self.state = SweepState::Idle;
        body_placement(scene, self.tug, BodyRole::Primary)?;
        body_placement(scene, self.aircraft, BodyRole::Dependent)?;
        info!(
            "Found tug '{}' and aircraft '{}', starting sweep over {:?}",
            self.tug.name, self.aircraft.name, self.sweep.orientations
        );

        let surfaces = self.attach_surfaces(scene);
        let mut report = SweepReport {
            surfaces: surfaces.clone(),
            orientations: Vec::new(),
        };

        let mut next = 0;
        let mut tug_poses: Option<WorldPoseMap<'c>> = None;
        let mut aircraft_poses: Option<WorldPoseMap<'c>> = None;
        let mut jobs: Vec<ScanJob> = Vec::new();
        let mut current = OrientationReport::default();

        loop {
            match self.state {
                SweepState::Idle => {
                    self.state = if next < self.sweep.orientations.len() {
                        SweepState::Realign { orientation: next }
                    } else {
                        SweepState::Complete
                    };
                }

                SweepState::Realign { orientation } => {
                    let yaw_deg = self.sweep.orientations[orientation];
                    current = OrientationReport {
                        yaw_deg,
                        tag: orientation_tag(yaw_deg),
                        ..Default::default()
                    };

                    match self.realign(scene, yaw_deg, &mut current) {
                        Ok((tug_map, aircraft_map)) => {
                            tug_poses = Some(tug_map);
                            aircraft_poses = aircraft_map;
                        }
                        Err(e) => {
                            warn!("Realignment for {} interrupted: {e}", current.tag);
                            current.errors.push(e.to_string());
                            tug_poses = None;
                            aircraft_poses = None;
                        }
                    }
                    self.state = SweepState::RecomputePoses { orientation };
                }

                SweepState::RecomputePoses { orientation } => {
                    if let Err(e) = self.recompute(scene, &mut tug_poses, &mut aircraft_poses) {
                        warn!("Could not recompute poses for {}: {e}", current.tag);
                        current.errors.push(e.to_string());
                    }
                    self.state = SweepState::BuildJobs { orientation };
                }

                SweepState::BuildJobs { orientation } => {
                    let yaw_deg = self.sweep.orientations[orientation];
                    jobs = self.build_jobs(scene, yaw_deg, &surfaces);
                    current.jobs_planned = jobs.len();
                    info!("=== Scanning with tug orientation {yaw_deg}° ({} jobs) ===", jobs.len());
                    self.state = SweepState::DispatchJobs { orientation };
                }

                SweepState::DispatchJobs { .. } => {
                    self.dispatch(scene, executor, &jobs, &mut current);
                    jobs.clear();
                    report.orientations.push(std::mem::take(&mut current));
                    next += 1;
                    self.state = SweepState::Idle;
                }

                SweepState::Complete => break,
            }
        }

        info!(
            "Sweep complete: {} of {} scans succeeded, {} failed",
            report.completed(),
            report.jobs_planned(),
            report.failed()
        );
        Ok(report)
    }

    /// Turns the tug to `yaw_deg` and pulls the aircraft onto the coupling.
    ///
    /// Returns the tug's pose map and, when the aircraft did not move, its pose map.
    fn realign(
        &self,
        scene: &mut dyn SceneHost,
        yaw_deg: i32,
        current: &mut OrientationReport,
    ) -> Result<(WorldPoseMap<'c>, Option<WorldPoseMap<'c>>), SweepError> {
        let tug_at = body_placement(scene, self.tug, BodyRole::Primary)?;
        scene.set_placement(
            self.tug.name,
            Placement {
                position: tug_at.position,
                rotation: Quat::from_rotation_z((yaw_deg as f32).to_radians()),
            },
        )?;

        // The tug moved: rebuild both maps before reading either.
        let tug_at = body_placement(scene, self.tug, BodyRole::Primary)?;
        let aircraft_at = body_placement(scene, self.aircraft, BodyRole::Dependent)?;
        let tug_map = resolve(self.tug.chain, tug_at.position);
        let aircraft_map = resolve(self.aircraft.chain, aircraft_at.position);

        match align(&tug_map, &aircraft_map, &self.sweep.coupling) {
            Ok(correction) => {
                debug!("Alignment correction for {}: {correction}", current.tag);
                scene.set_placement(
                    self.aircraft.name,
                    Placement {
                        position: aircraft_at.position + correction,
                        ..aircraft_at
                    },
                )?;
                current.correction = Some(correction);
                // Stale until recomputed.
                Ok((tug_map, None))
            }
            Err(skipped) => {
                warn!("Not able to perform realignment for {}: {skipped}", current.tag);
                current.alignment_skipped = Some(skipped);
                Ok((tug_map, Some(aircraft_map)))
            }
        }
    }

    /// Rebuilds every pose map that no longer matches its body's placement.
    fn recompute(
        &self,
        scene: &dyn SceneHost,
        tug_poses: &mut Option<WorldPoseMap<'c>>,
        aircraft_poses: &mut Option<WorldPoseMap<'c>>,
    ) -> Result<(), SweepError> {
        let tug_at = body_placement(scene, self.tug, BodyRole::Primary)?;
        let aircraft_at = body_placement(scene, self.aircraft, BodyRole::Dependent)?;
        if !tug_poses.as_ref().is_some_and(|m| m.is_current_for(tug_at.position)) {
            *tug_poses = Some(resolve(self.tug.chain, tug_at.position));
        }
        if !aircraft_poses
            .as_ref()
            .is_some_and(|m| m.is_current_for(aircraft_at.position))
        {
            *aircraft_poses = Some(resolve(self.aircraft.chain, aircraft_at.position));
        }

        if let (Some(t), Some(a)) = (tug_poses.as_ref(), aircraft_poses.as_ref())
            && let (Some(p), Some(d)) = (
                t.get(&self.sweep.coupling.primary),
                a.get(&self.sweep.coupling.dependent),
            )
        {
            debug!("Coupling gap after realignment: {}", p.distance(d));
        }
        Ok(())
    }

    /// Finds the scan surfaces and parents them to the tug so they turn with it.
    fn attach_surfaces(&self, scene: &mut dyn SceneHost) -> Vec<String> {
        let query = ObjectQuery::meshes().named_like(self.sweep.surface_pattern.clone());
        let surfaces: Vec<String> = scene
            .list_objects_matching(&query)
            .into_iter()
            .filter(|name| name != self.tug.name && name != self.aircraft.name)
            .collect();

        for name in &surfaces {
            if let Err(e) = scene.set_parent(name, self.tug.name) {
                warn!("Could not attach surface '{name}' to the tug: {e}");
            }
            if let Some(bounds) = scene.world_bounds(name) {
                debug!("Surface '{name}' bounds {:?}..{:?}", bounds.min, bounds.max);
            }
        }
        info!("Scanning {} surfaces: {:?}", surfaces.len(), surfaces);
        surfaces
    }

    fn build_jobs(&self, scene: &dyn SceneHost, yaw_deg: i32, surfaces: &[String]) -> Vec<ScanJob> {
        let grid = self.sweep.grid;
        plan_jobs(
            &[yaw_deg],
            surfaces,
            |_, surface| match scene.world_bounds(surface) {
                Some(bounds) => sample_grid(surface, &bounds, grid),
                None => {
                    warn!("Surface '{surface}' has no bounds, skipping");
                    Vec::new()
                }
            },
            &self.sensor.pose(),
        )
    }

    /// Sends jobs to the executor one at a time, recording each outcome.
    fn dispatch(
        &self,
        scene: &mut dyn SceneHost,
        executor: &mut dyn ScanExecutor,
        jobs: &[ScanJob],
        report: &mut OrientationReport,
    ) {
        let Some(first) = jobs.first() else {
            return;
        };
        if let Err(e) = self.ensure_sensor(scene, first) {
            warn!("Could not place sensor '{}': {e}", self.sensor.name);
            report.failures.extend(jobs.iter().map(|job| DispatchFailure {
                output_id: job.output_id.clone(),
                reason: e.to_string(),
            }));
            return;
        }

        let total = jobs.len();
        for (n, job) in jobs.iter().enumerate() {
            let p = job.sensor_position;
            info!(
                "[SCAN] {} | {} | {}/{} at ({:.3}, {:.3}, {:.3})",
                job.orientation_tag,
                job.surface,
                n + 1,
                total,
                p.x,
                p.y,
                p.z
            );

            let outcome = scene
                .set_placement(
                    &self.sensor.name,
                    Placement {
                        position: job.sensor_position,
                        rotation: job.sensor_rotation,
                    },
                )
                .map_err(|e| e.to_string())
                .and_then(|()| {
                    let request = ScanRequest {
                        sensor: self.sensor.name.clone(),
                        position: job.sensor_position,
                        rotation: job.sensor_rotation,
                        output_id: job.output_id.clone(),
                    };
                    executor.scan(scene, &request).map_err(|e| e.to_string())
                });

            match outcome {
                Ok(artifacts) => report.completed.push(CompletedScan {
                    output_id: job.output_id.clone(),
                    artifacts,
                }),
                Err(reason) => {
                    let failure = DispatchFailure {
                        output_id: job.output_id.clone(),
                        reason,
                    };
                    warn!("{failure}");
                    report.failures.push(failure);
                }
            }
        }
    }

    fn ensure_sensor(
        &self,
        scene: &mut dyn SceneHost,
        first: &ScanJob,
    ) -> Result<(), crate::error::SceneError> {
        let placement = Placement {
            position: first.sensor_position,
            rotation: first.sensor_rotation,
        };
        if scene.placement(&self.sensor.name).is_some() {
            return scene.set_placement(&self.sensor.name, placement);
        }
        scene.spawn(
            SceneObject::new(self.sensor.name.clone(), ObjectKind::Sensor)
                .with_placement(placement)
                .with_scale(self.sensor.scale),
        )
    }
}

fn body_placement(
    scene: &dyn SceneHost,
    body: Body<'_>,
    role: BodyRole,
) -> Result<Placement, SweepError> {
    scene.placement(body.name).ok_or_else(|| SweepError::MissingBody {
        role,
        name: body.name.to_string(),
    })
}
