use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable index of a link inside its [`Chain`] arena.
pub type LinkId = u32;

/// A single rigid link of an articulated body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Unique name within the chain.
    pub name: String,

    /// Name of the parent link, `None` for the root.
    pub parent: Option<String>,

    /// Name of the joint attaching this link to its parent.
    pub joint: Option<String>,

    /// Translation from the parent link's frame, taken from the joint origin `xyz`.
    pub offset: Vec3,

    /// Joint origin `rpy` in radians. Kept for reference; pose resolution composes
    /// translations only.
    pub rpy: Vec3,

    /// Visual geometry of the link, if the description provides one.
    pub geometry: Option<GeometryTag>,
}

impl Link {
    /// Creates a parentless link with no offset.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            joint: None,
            offset: Vec3::ZERO,
            rpy: Vec3::ZERO,
            geometry: None,
        }
    }

    /// Creates a link attached to `parent` at `offset`.
    pub fn child(name: impl Into<String>, parent: impl Into<String>, offset: Vec3) -> Self {
        Self {
            parent: Some(parent.into()),
            offset,
            ..Self::root(name)
        }
    }
}

/// A short description of a link's visual geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GeometryTag {
    /// An external mesh file.
    Mesh(String),
    /// A box with full side lengths.
    Box(Vec3),
    Cylinder { radius: f32, length: f32 },
    Sphere(f32),
}

/// An immutable rooted tree of links.
///
/// Links live in an arena ordered parents-before-children, so a single forward pass
/// over [`Chain::links`] visits every parent before any of its children. The parent of
/// each link is stored as an index into the same arena.
#[derive(Clone, Debug)]
pub struct Chain {
    /// Name of the described body (the URDF `robot` name).
    pub name: String,
    links: Vec<Link>,
    parents: Vec<Option<LinkId>>,
    index: HashMap<String, LinkId>,
}

impl Chain {
    /// Builds a chain from links already ordered parents-before-children.
    ///
    /// Callers must guarantee that the first link is the only root, that names are
    /// unique, and that every parent precedes its children. The parser upholds these;
    /// [`Chain::from_links`] is the checked entry point.
    pub(crate) fn from_sorted(name: String, links: Vec<Link>) -> Self {
        let index: HashMap<String, LinkId> = links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), i as LinkId))
            .collect();
        let parents = links
            .iter()
            .map(|l| l.parent.as_ref().and_then(|p| index.get(p).copied()))
            .collect();
        Self {
            name,
            links,
            parents,
            index,
        }
    }

    /// Builds a chain from links in any order, validating the tree structure.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names, unknown parents, missing or multiple roots, and loops.
    pub fn from_links(
        name: impl Into<String>,
        links: Vec<Link>,
    ) -> crate::error::Result<Self> {
        crate::parser::assemble(name.into(), links)
    }

    /// All links, parents before children. The root is always first.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn root(&self) -> &Link {
        &self.links[0]
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Arena index of the link called `name`.
    pub fn id_of(&self, name: &str) -> Option<LinkId> {
        self.index.get(name).copied()
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.id_of(name).map(|id| &self.links[id as usize])
    }

    /// Arena index of the parent of link `id`, `None` for the root.
    pub fn parent_of(&self, id: LinkId) -> Option<LinkId> {
        self.parents.get(id as usize).copied().flatten()
    }

    /// Number of joints between link `id` and the root.
    pub fn depth_of(&self, id: LinkId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            depth += 1;
            current = parent;
        }
        depth
    }
}

impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.links == other.links
    }
}
