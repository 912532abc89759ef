//! # towscan
//!
//! Plans and runs synthetic range-scan sweeps of a tow vehicle coupled to an aircraft.
//!
//! Both bodies are described by URDF chains. For every tug orientation in a sweep the
//! crate resolves link positions by forward kinematics, moves the aircraft so its tow
//! bar meets the tug's caster, samples the scan surfaces into sensor grids, and hands
//! each sensor placement to a scan executor in a fixed, reproducible order.
//!
//! The 3D scene and the scanner sit behind the [`SceneHost`] and [`ScanExecutor`]
//! traits, so the same sweep can drive an in-memory scene ([`MemoryScene`] with
//! [`RaycastScanner`]) or a full 3D application.

pub mod align;
pub mod assembly;
pub mod chain;
pub mod config;
pub mod error;
pub mod grid;
pub mod orchestrator;
pub mod parser;
pub mod pose;
pub mod scanner;
pub mod scene;

pub use align::*;
pub use assembly::*;
pub use chain::*;
pub use config::*;
pub use error::{
    AlignmentSkipped, BodyRole, ChainError, ConfigError, DispatchFailure, ResolutionGap,
    ScanError, SceneError, SweepError,
};
pub use grid::*;
pub use orchestrator::*;
pub use parser::{parse_file, parse_str};
pub use pose::*;
pub use scanner::*;
pub use scene::*;
