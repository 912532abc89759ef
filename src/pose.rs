//! Forward kinematics over a [`Chain`].

use crate::chain::Chain;
use crate::error::ResolutionGap;
use glam::Vec3;

/// World-space positions of every link of a chain, for one base placement.
///
/// The map borrows its chain and remembers the base position it was computed
/// against. Once the owning body moves, the map is stale and must be rebuilt with
/// [`resolve`]; [`WorldPoseMap::is_current_for`] tells the two apart.
#[derive(Clone, Debug)]
pub struct WorldPoseMap<'a> {
    chain: &'a Chain,
    base: Vec3,
    positions: Vec<Vec3>,
}

/// Resolves every link of `chain` with the root placed at `base`.
///
/// Each link sits at its parent's position plus its own offset. Only translations
/// compose; joint rotations are not applied.
pub fn resolve(chain: &Chain, base: Vec3) -> WorldPoseMap<'_> {
    let mut positions = Vec::with_capacity(chain.len());

    // Arena order guarantees a parent is resolved before its children.
    for (i, link) in chain.links().iter().enumerate() {
        let position = match chain.parent_of(i as u32) {
            Some(parent) => positions[parent as usize] + link.offset,
            None => base,
        };
        positions.push(position);
    }

    WorldPoseMap {
        chain,
        base,
        positions,
    }
}

impl<'a> WorldPoseMap<'a> {
    /// World position of the link called `name`, if the chain has one.
    pub fn get(&self, name: &str) -> Option<Vec3> {
        self.chain
            .id_of(name)
            .map(|id| self.positions[id as usize])
    }

    /// Like [`get`](Self::get), but reports a missing link as a [`ResolutionGap`].
    pub fn require(&self, name: &str) -> Result<Vec3, ResolutionGap> {
        self.get(name).ok_or_else(|| ResolutionGap {
            chain: self.chain.name.clone(),
            link: name.to_string(),
        })
    }

    /// The base position the map was computed for.
    pub fn base(&self) -> Vec3 {
        self.base
    }

    pub fn chain(&self) -> &'a Chain {
        self.chain
    }

    /// Whether the map is still valid for a body now placed at `base`.
    pub fn is_current_for(&self, base: Vec3) -> bool {
        self.base == base
    }

    /// Iterates `(link name, world position)` in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Vec3)> + '_ {
        self.chain
            .links()
            .iter()
            .zip(&self.positions)
            .map(|(link, pos)| (link.name.as_str(), *pos))
    }
}
