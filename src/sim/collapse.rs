//! Tension collapse
//!
//! When any τ cell exceeds the configured threshold the coherent structure
//! is destroyed: ψ is reseeded with low-amplitude noise and τ returns to its
//! rest value. Under the beam rule χ tracks beam intensity, so it is cleared
//! too.

use rand::Rng;

use super::dynamics::DynamicsRule;
use super::field::FieldSet;
use crate::config::Config;

/// Detects threshold violations and applies the reset
#[derive(Debug, Clone, Default)]
pub struct CollapseController {
    collapses: u64,
    last_collapse: Option<usize>,
}

impl CollapseController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collapses applied so far
    pub fn collapses(&self) -> u64 {
        self.collapses
    }

    /// Frame of the most recent collapse
    pub fn last_collapse(&self) -> Option<usize> {
        self.last_collapse
    }

    /// Returns `true` (and resets the fields) iff `max(τ) > threshold`.
    /// Fields are untouched otherwise.
    pub fn check_and_apply<R: Rng + ?Sized>(
        &mut self,
        fields: &mut FieldSet,
        config: &Config,
        frame: usize,
        rng: &mut R,
    ) -> bool {
        let Some(threshold) = config.collapse_threshold else {
            return false;
        };

        let peak = fields.tau.max();
        if peak <= threshold {
            return false;
        }

        let scale = config.reseed_scale;
        for p in fields.psi.array_mut().iter_mut() {
            *p = scale * rng.random::<f64>();
        }
        fields.tau.array_mut().fill(config.collapse_baseline);
        if matches!(config.rule, DynamicsRule::RingTracking { .. }) {
            fields.chi.array_mut().fill(0.0);
        }

        self.collapses += 1;
        self.last_collapse = Some(frame);
        log::debug!(
            "Collapse #{} at frame {}: max tau {:.3} > {:.3}",
            self.collapses,
            frame,
            peak,
            threshold
        );
        true
    }
}
