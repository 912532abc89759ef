//! The scene-state port and an in-memory host.
//!
//! The orchestrator never touches scene objects directly. It asks a [`SceneHost`] for
//! placements and bounds and commands it to move, parent and spawn objects. A real
//! 3D application implements the trait over its own object model; [`MemoryScene`] is
//! the host used by the command-line tool and the tests.

use crate::error::SceneError;
use bevy_math::bounding::Aabb3d;
use glam::{Quat, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Position and orientation of an object relative to its parent (world when unparented).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Placement {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Placement {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Expresses `local`, given in this placement's frame, in the enclosing frame.
    pub fn compose(&self, local: &Placement) -> Placement {
        Placement {
            position: self.position + self.rotation * local.position,
            rotation: self.rotation * local.rotation,
        }
    }

    /// Expresses `world`, given in the enclosing frame, in this placement's frame.
    pub fn relative(&self, world: &Placement) -> Placement {
        let inv = self.rotation.inverse();
        Placement {
            position: inv * (world.position - self.position),
            rotation: inv * world.rotation,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }
}

/// What an object in the scene is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Solid geometry that scans can hit.
    Mesh,
    /// A range sensor proxy.
    Sensor,
    /// A point cloud produced by a scan.
    PointCloud,
    /// A transform with no geometry.
    Empty,
}

/// A single object owned by the scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    /// Placement relative to `parent`, or to the world when unparented.
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub parent: Option<String>,
    /// Half extents of the object's box in its own frame, if it has volume.
    #[serde(default)]
    pub half_extents: Option<Vec3>,
    /// Per-axis scale of the object. Not inherited by children.
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    /// File the object was created from, if any.
    #[serde(default)]
    pub source: Option<String>,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl SceneObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            placement: Placement::IDENTITY,
            parent: None,
            half_extents: None,
            scale: Vec3::ONE,
            source: None,
        }
    }

    /// A mesh box centred at `center`.
    pub fn cuboid(name: impl Into<String>, center: Vec3, half_extents: Vec3) -> Self {
        Self {
            placement: Placement::at(center),
            half_extents: Some(half_extents),
            ..Self::new(name, ObjectKind::Mesh)
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Filter for [`SceneHost::list_objects_matching`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectQuery {
    /// Only objects of this kind.
    pub kind: Option<ObjectKind>,
    /// Only objects whose name contains this text, ignoring ASCII case.
    pub name_contains: Option<String>,
}

impl ObjectQuery {
    pub fn meshes() -> Self {
        Self {
            kind: Some(ObjectKind::Mesh),
            name_contains: None,
        }
    }

    pub fn named_like(mut self, pattern: impl Into<String>) -> Self {
        self.name_contains = Some(pattern.into());
        self
    }

    pub fn matches(&self, object: &SceneObject) -> bool {
        if let Some(kind) = self.kind
            && kind != object.kind
        {
            return false;
        }
        match &self.name_contains {
            Some(pattern) => object
                .name
                .to_ascii_lowercase()
                .contains(&pattern.to_ascii_lowercase()),
            None => true,
        }
    }
}

/// Narrow interface to the live scene.
///
/// Names are the only handles; results are in discovery order, which the host must
/// keep stable for the duration of a sweep.
pub trait SceneHost {
    /// Local placement of an object, `None` if it does not exist.
    fn placement(&self, name: &str) -> Option<Placement>;

    /// Replaces an object's local placement.
    fn set_placement(&mut self, name: &str, placement: Placement) -> Result<(), SceneError>;

    /// Names of the objects matching `query`, in discovery order.
    fn list_objects_matching(&self, query: &ObjectQuery) -> Vec<String>;

    /// Names of all objects, in discovery order.
    fn object_names(&self) -> Vec<String> {
        self.list_objects_matching(&ObjectQuery::default())
    }

    /// World-space axis-aligned bounds of an object with volume.
    fn world_bounds(&self, name: &str) -> Option<Aabb3d>;

    /// Attaches `child` to `parent`, keeping the child's world placement.
    fn set_parent(&mut self, child: &str, parent: &str) -> Result<(), SceneError>;

    /// Adds a new object.
    fn spawn(&mut self, object: SceneObject) -> Result<(), SceneError>;
}

/// A scene held entirely in memory and persisted as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScene {
    objects: Vec<SceneObject>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a scene document.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not a valid scene document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scene: Self = serde_json::from_str(&text).map_err(|source| SceneError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded {} objects from {}", scene.objects.len(), path.display());
        Ok(scene)
    }

    /// Writes the scene document, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).map_err(|source| SceneError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    fn object_mut(&mut self, name: &str) -> Result<&mut SceneObject, SceneError> {
        self.objects
            .iter_mut()
            .find(|o| o.name == name)
            .ok_or_else(|| SceneError::UnknownObject(name.to_string()))
    }

    /// Placement of an object in world space, following its parents.
    pub fn world_placement(&self, name: &str) -> Option<Placement> {
        let object = self.object(name)?;
        let mut world = object.placement;
        let mut parent = object.parent.as_deref();
        // Bounded by the object count; a loaded document may hold a cycle.
        let mut hops = 0;
        while let Some(p) = parent
            && hops < self.objects.len()
        {
            let Some(ancestor) = self.object(p) else {
                break;
            };
            world = ancestor.placement.compose(&world);
            parent = ancestor.parent.as_deref();
            hops += 1;
        }
        Some(world)
    }

    fn is_ancestor(&self, candidate: &str, of: &str) -> bool {
        let mut current = Some(of);
        let mut hops = 0;
        while let Some(name) = current
            && hops <= self.objects.len()
        {
            if name == candidate {
                return true;
            }
            current = self.object(name).and_then(|o| o.parent.as_deref());
            hops += 1;
        }
        false
    }
}

impl SceneHost for MemoryScene {
    fn placement(&self, name: &str) -> Option<Placement> {
        self.object(name).map(|o| o.placement)
    }

    fn set_placement(&mut self, name: &str, placement: Placement) -> Result<(), SceneError> {
        self.object_mut(name)?.placement = placement;
        Ok(())
    }

    fn list_objects_matching(&self, query: &ObjectQuery) -> Vec<String> {
        self.objects
            .iter()
            .filter(|o| query.matches(o))
            .map(|o| o.name.clone())
            .collect()
    }

    fn world_bounds(&self, name: &str) -> Option<Aabb3d> {
        let object = self.object(name)?;
        let half = object.half_extents? * object.scale;
        let world = self.world_placement(name)?;

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for corner in 0..8 {
            let sign = Vec3::new(
                if corner & 1 == 0 { -1.0 } else { 1.0 },
                if corner & 2 == 0 { -1.0 } else { 1.0 },
                if corner & 4 == 0 { -1.0 } else { 1.0 },
            );
            let p = world.transform_point(half * sign);
            min = min.min(p);
            max = max.max(p);
        }

        Some(Aabb3d {
            min: min.into(),
            max: max.into(),
        })
    }

    fn set_parent(&mut self, child: &str, parent: &str) -> Result<(), SceneError> {
        if self.object(parent).is_none() {
            return Err(SceneError::UnknownObject(parent.to_string()));
        }
        if self.is_ancestor(child, parent) {
            return Err(SceneError::ParentCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }

        let child_world = self
            .world_placement(child)
            .ok_or_else(|| SceneError::UnknownObject(child.to_string()))?;
        let parent_world = self
            .world_placement(parent)
            .ok_or_else(|| SceneError::UnknownObject(parent.to_string()))?;

        let object = self.object_mut(child)?;
        object.placement = parent_world.relative(&child_world);
        object.parent = Some(parent.to_string());
        Ok(())
    }

    fn spawn(&mut self, object: SceneObject) -> Result<(), SceneError> {
        if self.object(&object.name).is_some() {
            return Err(SceneError::DuplicateObject(object.name));
        }
        self.objects.push(object);
        Ok(())
    }
}
