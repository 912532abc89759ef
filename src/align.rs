//! Translation-only coupling of two independently posed chains.

use crate::error::AlignmentSkipped;
use crate::pose::WorldPoseMap;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A physical joint between two bodies, named by one link on each side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Coupling {
    /// Link on the primary (tug) chain.
    pub primary: String,
    /// Link on the dependent (aircraft) chain that must meet `primary`.
    pub dependent: String,
}

impl Default for Coupling {
    fn default() -> Self {
        Self {
            primary: "caster".into(),
            dependent: "towbar".into(),
        }
    }
}

impl Coupling {
    pub fn new(primary: impl Into<String>, dependent: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            dependent: dependent.into(),
        }
    }
}

/// Computes the translation that brings the dependent coupling link onto the primary one.
///
/// Adding the result to the dependent body's current position makes the two coupling
/// links coincide. Rotational misalignment is not corrected.
///
/// # Errors
///
/// Returns [`AlignmentSkipped`] naming every coupling link that is absent from its map.
/// The caller must then leave the dependent body where it is.
pub fn align(
    primary: &WorldPoseMap<'_>,
    dependent: &WorldPoseMap<'_>,
    coupling: &Coupling,
) -> Result<Vec3, AlignmentSkipped> {
    match (
        primary.get(&coupling.primary),
        dependent.get(&coupling.dependent),
    ) {
        (Some(target), Some(current)) => Ok(target - current),
        (target, current) => {
            let mut missing = Vec::new();
            if target.is_none() {
                missing.push(coupling.primary.clone());
            }
            if current.is_none() {
                missing.push(coupling.dependent.clone());
            }
            Err(AlignmentSkipped { missing })
        }
    }
}
