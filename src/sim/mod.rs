//! Deterministic field simulation
//!
//! All dynamics live here. This module must be pure and deterministic:
//! - Seeded RNG only, drawn in a fixed order each frame
//! - Row-major cell iteration
//! - No rendering, file or platform dependencies

pub mod collapse;
pub mod dynamics;
pub mod field;
pub mod grid;
pub mod runner;
pub mod verdict;

pub use collapse::CollapseController;
pub use dynamics::{DynamicsRule, DynamicsStep};
pub use field::{Field, FieldKind, FieldSet};
pub use grid::Grid;
pub use runner::{Frames, RunSummary, SimulationRunner, StepResult};
pub use verdict::{Verdict, VerdictState, VerdictTracker};
