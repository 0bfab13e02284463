//! Falsifiability verdict state machine
//!
//! ```text
//! Pending ──(streak reaches required frames)──▶ Sustained
//!    │
//!    └──(started streak breaks | run ends)─────▶ Failed
//! ```
//!
//! Both outcomes are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::field::Field;
use crate::config::Config;

/// Hypothesis outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Verdict {
    #[default]
    Pending,
    Sustained,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pending => "Hypothesis pending",
            Verdict::Sustained => "Hypothesis sustained",
            Verdict::Failed => "Hypothesis failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Pending)
    }
}

/// Verdict plus the streak bookkeeping behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VerdictState {
    pub verdict: Verdict,
    /// Consecutive coherent frames in the current streak
    pub consecutive_coherent: u32,
    /// Frame at which a terminal verdict was reached
    pub verdict_step: Option<usize>,
}

impl VerdictState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.verdict.is_terminal()
    }
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verdict_step {
            Some(step) => write!(f, "{} at step {}", self.verdict.as_str(), step),
            None => f.write_str(self.verdict.as_str()),
        }
    }
}

/// Accumulates per-frame coherence evidence into a [`VerdictState`]
#[derive(Debug, Clone, Default)]
pub struct VerdictTracker {
    state: VerdictState,
}

impl VerdictTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> VerdictState {
        self.state
    }

    /// Observe ψ for one frame
    pub fn observe(&mut self, psi: &Field, config: &Config, frame: usize) -> VerdictState {
        let frac = psi.fraction_above(config.coherence_threshold);
        self.observe_fraction(frac, config, frame)
    }

    /// Observe a precomputed coherent fraction (0 for a collapse frame).
    /// No effect once the verdict is terminal.
    pub fn observe_fraction(&mut self, frac: f64, config: &Config, frame: usize) -> VerdictState {
        if self.state.is_terminal() {
            return self.state;
        }

        if frac >= config.coherence_fraction {
            self.state.consecutive_coherent += 1;
            if self.state.consecutive_coherent >= config.coherence_frames_required {
                self.state.verdict = Verdict::Sustained;
                self.state.verdict_step = Some(frame);
                log::info!("Coherence stabilized at step {}", frame);
            }
        } else {
            if self.state.consecutive_coherent > 0 {
                self.state.verdict = Verdict::Failed;
                self.state.verdict_step = Some(frame);
                log::info!(
                    "Coherence lost at step {} after {} coherent frames",
                    frame,
                    self.state.consecutive_coherent
                );
            }
            self.state.consecutive_coherent = 0;
        }

        self.state
    }

    /// End of run: a verdict still pending defaults to failed at `final_frame`
    pub fn finalize(&mut self, final_frame: usize) -> VerdictState {
        if !self.state.is_terminal() {
            self.state.verdict = Verdict::Failed;
            self.state.verdict_step = Some(final_frame);
            log::warn!(
                "No sustained coherence by final step {}; hypothesis presumed failed",
                final_frame
            );
        }
        self.state
    }
}
