//! EchoFoam - coupled tension/coherence/wave field engine
//!
//! Core modules:
//! - `sim`: Deterministic simulation (grid operators, dynamics, collapse, verdict)
//! - `config`: Run configuration and demo presets
//! - `error`: Error types

pub mod config;
pub mod error;
pub mod sim;

pub use config::{CoherenceSeed, Config, Preset, TensionPulse};
pub use error::{EngineError, EngineResult};
pub use sim::{SimulationRunner, StepResult, Verdict, VerdictState};

/// Engine constants
pub mod consts {
    /// Default run seed
    pub const DEFAULT_SEED: u64 = 0;
    /// ψ after a collapse is uniform in [0, this)
    pub const DEFAULT_RESEED_SCALE: f64 = 0.1;
    /// Gaussian beam sharpness on the [-1, 1] coordinate box
    pub const BEAM_SHARPNESS: f64 = 20.0;
    /// χ below this marks a collapsing cell in the run summary
    pub const COLLAPSING_CHI_LEVEL: f64 = 0.2;
    /// Frame cadence for progress logging in the driver
    pub const LOG_EVERY_FRAMES: usize = 50;
}
