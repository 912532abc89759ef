//! Error types for chain parsing, scene access, scanning and sweeps.
//!
//! Fatal conditions ([`ChainError`], [`SweepError`]) abort the phase that raised them.
//! Recoverable conditions ([`ResolutionGap`], [`AlignmentSkipped`], [`DispatchFailure`])
//! are values the caller logs and moves past.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing a link/joint description.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// A required element is missing.
    #[error("missing required element: {element} in {context}")]
    MissingElement {
        element: &'static str,
        context: String,
    },

    /// A required attribute is missing.
    #[error("missing required attribute: {attribute} on {element}")]
    MissingAttribute {
        attribute: &'static str,
        element: String,
    },

    /// An attribute is present but its value cannot be used.
    #[error("invalid value for {attribute} on {element}: {message}")]
    InvalidAttribute {
        attribute: &'static str,
        element: String,
        message: String,
    },

    /// Two links share a name.
    #[error("duplicate link name: {0}")]
    DuplicateLink(String),

    /// Two joints share a name.
    #[error("duplicate joint name: {0}")]
    DuplicateJoint(String),

    /// A joint names a link that the description never declares.
    #[error("reference to undefined link: {link} in joint {joint}")]
    UndefinedLink { link: String, joint: String },

    /// A link is the child of more than one joint.
    #[error("link '{0}' has more than one parent joint")]
    MultipleParents(String),

    /// Every link is the child of some joint.
    #[error("no root link found (all links are children of joints)")]
    NoRootLink,

    /// More than one link has no parent.
    #[error("multiple root links found: {0:?}")]
    MultipleRootLinks(Vec<String>),

    /// Links that cannot be reached from the root form a loop.
    #[error("kinematic loop detected among links: {0:?}")]
    KinematicLoop(Vec<String>),

    /// The description file could not be read.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChainError {
    pub fn missing_element(element: &'static str, context: impl Into<String>) -> Self {
        Self::MissingElement {
            element,
            context: context.into(),
        }
    }

    pub fn missing_attribute(attribute: &'static str, element: impl Into<String>) -> Self {
        Self::MissingAttribute {
            attribute,
            element: element.into(),
        }
    }

    pub fn invalid_attribute(
        attribute: &'static str,
        element: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            attribute,
            element: element.into(),
            message: message.into(),
        }
    }

    pub fn undefined_link(link: impl Into<String>, joint: impl Into<String>) -> Self {
        Self::UndefinedLink {
            link: link.into(),
            joint: joint.into(),
        }
    }
}

/// A named link is absent from a pose map.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("link '{link}' is not part of chain '{chain}'")]
pub struct ResolutionGap {
    pub chain: String,
    pub link: String,
}

/// One or both coupling links did not resolve, so no correction was computed.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("alignment skipped, unresolved coupling links: {missing:?}")]
pub struct AlignmentSkipped {
    /// Names of the coupling links that were absent from their pose maps.
    pub missing: Vec<String>,
}

/// Errors raised by a scene host.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("no object named '{0}' in the scene")]
    UnknownObject(String),

    #[error("an object named '{0}' already exists")]
    DuplicateObject(String),

    #[error("parenting '{child}' to '{parent}' would create a cycle")]
    ParentCycle { child: String, parent: String },

    #[error("I/O error on scene file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scene document {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by a scan executor for a single job.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("sensor '{0}' is not in the scene")]
    UnknownSensor(String),

    #[error("invalid scanner settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("failed to export {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A scan job that did not complete. Recorded in the sweep report; the sweep continues.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("scan job {output_id} failed: {reason}")]
pub struct DispatchFailure {
    pub output_id: String,
    pub reason: String,
}

/// Which body of the coupled pair an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyRole {
    /// The tow vehicle; its orientation is swept.
    Primary,
    /// The aircraft; it follows the primary through the coupling.
    Dependent,
}

impl std::fmt::Display for BodyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => f.write_str("tug"),
            Self::Dependent => f.write_str("aircraft"),
        }
    }
}

/// Fatal sweep errors.
#[derive(Debug, Error)]
pub enum SweepError {
    /// A body is missing from the live scene, so there is nothing to orchestrate.
    #[error("{role} body '{name}' not found in the scene")]
    MissingBody { role: BodyRole, name: String },

    /// The host refused a placement write for a body.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Errors loading the run configuration or resolving the asset layout.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{role} asset '{name}' is incomplete, missing {path}")]
    MissingAsset {
        role: BodyRole,
        name: String,
        path: PathBuf,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for chain parsing.
pub type Result<T> = std::result::Result<T, ChainError>;
