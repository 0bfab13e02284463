//! Per-frame field update
//!
//! Every rule shares the τ forcing stage (Gaussian kick, damping, scheduled
//! pulses). The rules differ in how ψ and χ respond to it.

use ndarray::{ArrayD, Dimension, IxDyn, Zip};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::field::FieldSet;
use crate::config::{Config, check_finite, check_non_negative, check_unit, config_error};
use crate::error::EngineResult;

/// Field update strategy, selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum DynamicsRule {
    /// Second-order wave in χ with ψ-modulated speed
    #[default]
    Wave,
    /// χ relaxes toward ψ and is eroded by steep τ gradients
    Diffusive {
        chi_relax_rate: f64,
        gradient_penalty: f64,
    },
    /// χ grows where ψ is stable and shrinks where τ is steep
    Reinforcement {
        stability_threshold: f64,
        rate: f64,
        gradient_cutoff: f64,
    },
    /// ψ is a beam drifting one cell per frame along the last axis; its
    /// intensity deposits tension and is tracked in χ
    RingTracking {
        absorption: f64,
        nonlinear_gain: f64,
        beam_decay: f64,
    },
}

impl DynamicsRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicsRule::Wave => "wave",
            DynamicsRule::Diffusive { .. } => "diffusive",
            DynamicsRule::Reinforcement { .. } => "reinforcement",
            DynamicsRule::RingTracking { .. } => "ring-tracking",
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match *self {
            DynamicsRule::Wave => Ok(()),
            DynamicsRule::Diffusive {
                chi_relax_rate,
                gradient_penalty,
            } => {
                check_unit("chi_relax_rate", chi_relax_rate)?;
                check_non_negative("gradient_penalty", gradient_penalty)
            }
            DynamicsRule::Reinforcement {
                stability_threshold,
                rate,
                gradient_cutoff,
            } => {
                check_finite("stability_threshold", stability_threshold)?;
                check_non_negative("rate", rate)?;
                check_non_negative("gradient_cutoff", gradient_cutoff)
            }
            DynamicsRule::RingTracking {
                absorption,
                nonlinear_gain,
                beam_decay,
            } => {
                check_non_negative("absorption", absorption)?;
                check_non_negative("nonlinear_gain", nonlinear_gain)?;
                if beam_decay > 0.0 && beam_decay <= 1.0 {
                    Ok(())
                } else {
                    Err(config_error(format!(
                        "beam_decay must lie in (0, 1], got {beam_decay}"
                    )))
                }
            }
        }
    }
}

/// Advances a [`FieldSet`] one frame
///
/// Holds the scratch buffers the update needs so stepping does not allocate.
#[derive(Debug, Clone)]
pub struct DynamicsStep {
    rule: DynamicsRule,
    grad_mag: ArrayD<f64>,
    scratch: ArrayD<f64>,
}

impl DynamicsStep {
    pub fn new(config: &Config) -> EngineResult<Self> {
        config.validate()?;
        let shape = IxDyn(&config.grid_shape);
        Ok(Self {
            rule: config.rule,
            grad_mag: ArrayD::zeros(shape.clone()),
            scratch: ArrayD::zeros(shape),
        })
    }

    pub fn rule(&self) -> DynamicsRule {
        self.rule
    }

    /// |∇τ| from the most recent frame (zero before the first one, and
    /// unused by the beam rule)
    pub fn grad_mag(&self) -> &ArrayD<f64> {
        &self.grad_mag
    }

    /// Advance every field by one frame
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        fields: &mut FieldSet,
        config: &Config,
        frame: usize,
        rng: &mut R,
    ) {
        debug_assert_eq!(fields.grid().shape(), self.grad_mag.shape());
        Self::force_tension(fields, config, frame, rng);

        match self.rule {
            DynamicsRule::Wave => {
                self.update_gradient(fields);
                relax_coherence(fields, &self.grad_mag, config);
                self.propagate_wave(fields, config.wave_coupling);
            }
            DynamicsRule::Diffusive {
                chi_relax_rate,
                gradient_penalty,
            } => {
                self.update_gradient(fields);
                relax_coherence(fields, &self.grad_mag, config);
                fields.chi_prev.array_mut().assign(fields.chi.array());
                Zip::from(fields.chi.array_mut())
                    .and(fields.psi.array())
                    .and(&self.grad_mag)
                    .for_each(|c, &p, &g| {
                        let next = *c + chi_relax_rate * (p - *c) - gradient_penalty * g;
                        *c = next.clamp(0.0, 1.0);
                    });
            }
            DynamicsRule::Reinforcement {
                stability_threshold,
                rate,
                gradient_cutoff,
            } => {
                self.update_gradient(fields);
                relax_coherence(fields, &self.grad_mag, config);
                fields.chi_prev.array_mut().assign(fields.chi.array());
                Zip::from(fields.chi.array_mut())
                    .and(fields.psi.array())
                    .and(&self.grad_mag)
                    .for_each(|c, &p, &g| {
                        if p > stability_threshold {
                            *c += rate;
                        }
                        if g > gradient_cutoff {
                            *c -= rate;
                        }
                        *c = c.clamp(0.0, 1.0);
                    });
            }
            DynamicsRule::RingTracking {
                absorption,
                nonlinear_gain,
                beam_decay,
            } => self.track_beam(
                fields,
                config.intensity_threshold,
                absorption,
                nonlinear_gain,
                beam_decay,
            ),
        }
    }

    /// Stochastic τ kick, exponential damping, then any pulse due this frame
    pub fn force_tension<R: Rng + ?Sized>(
        fields: &mut FieldSet,
        config: &Config,
        frame: usize,
        rng: &mut R,
    ) {
        let amplitude = config.forcing_amplitude;
        let damping = config.damping_factor;
        for t in fields.tau.array_mut().iter_mut() {
            if amplitude != 0.0 {
                let noise: f64 = rng.sample(StandardNormal);
                *t += amplitude * noise;
            }
            *t *= damping;
        }

        for pulse in config.pulses.iter().filter(|p| p.frame == frame) {
            let center = fields.grid().center();
            let mut hit = 0;
            for (idx, t) in fields.tau.array_mut().indexed_iter_mut() {
                let inside = idx
                    .slice()
                    .iter()
                    .zip(&center)
                    .all(|(&i, &c)| i.abs_diff(c) <= pulse.half_width);
                if inside {
                    *t += pulse.amplitude;
                    hit += 1;
                }
            }
            log::debug!(
                "Tension pulse at frame {}: +{} over {} cells",
                frame,
                pulse.amplitude,
                hit
            );
        }
    }

    fn update_gradient(&mut self, fields: &FieldSet) {
        fields
            .grid()
            .gradient_magnitude_into(fields.tau.view(), self.grad_mag.view_mut());
    }

    /// `χ_new = 2χ − χ_prev + c·ψ·∇²χ`, written over `χ_prev` and swapped in
    fn propagate_wave(&mut self, fields: &mut FieldSet, coupling: f64) {
        fields
            .grid()
            .laplacian_into(fields.chi.view(), self.scratch.view_mut());

        Zip::from(fields.chi_prev.array_mut())
            .and(fields.chi.array())
            .and(fields.psi.array())
            .and(&self.scratch)
            .for_each(|n, &c, &p, &lap| *n = 2.0 * c - *n + coupling * p * lap);
        std::mem::swap(&mut fields.chi, &mut fields.chi_prev);
    }

    fn track_beam(
        &mut self,
        fields: &mut FieldSet,
        intensity_threshold: f64,
        absorption: f64,
        nonlinear_gain: f64,
        beam_decay: f64,
    ) {
        fields
            .grid()
            .roll_last_axis_into(fields.psi.view(), self.scratch.view_mut());
        fields.psi.array_mut().assign(&self.scratch);

        fields.chi_prev.array_mut().assign(fields.chi.array());
        Zip::from(fields.tau.array_mut())
            .and(fields.chi.array_mut())
            .and(fields.psi.array_mut())
            .for_each(|t, c, p| {
                let intensity = *p * *p;
                *t += absorption * intensity;
                if intensity > intensity_threshold {
                    *t += nonlinear_gain * intensity * intensity;
                }
                *c = intensity;
                *p *= beam_decay;
            });
    }
}

/// `ψ += r·(1/(1+|∇τ|) − ψ)`, optionally clamped to [0, 1]
fn relax_coherence(fields: &mut FieldSet, grad_mag: &ArrayD<f64>, config: &Config) {
    let rate = config.relax_rate;
    let clamp = config.clamp_coherence;
    Zip::from(fields.psi.array_mut())
        .and(grad_mag)
        .for_each(|p, &g| {
            *p += rate * (1.0 / (1.0 + g) - *p);
            if clamp {
                *p = p.clamp(0.0, 1.0);
            }
        });
}
