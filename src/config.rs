//! Run configuration and named presets
//!
//! A [`Config`] is validated once before a run starts and is read-only
//! afterwards. Presets reproduce the parameter sets of the individual
//! demos (cosmological, weather, laser).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{EngineError, EngineResult};
use crate::sim::DynamicsRule;

/// Named parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Preset {
    /// 2-D wave propagation, 100×100
    #[default]
    Cosmological,
    /// 3-D wave propagation, 50³
    Cosmological3d,
    /// 2-D weather with a heat pulse and χ reinforcement
    Weather,
    /// Spherical atmospheric shell, 10×32×64
    WeatherSphere,
    /// Translating beam that deposits tension until filament collapse
    Laser,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Cosmological,
        Preset::Cosmological3d,
        Preset::Weather,
        Preset::WeatherSphere,
        Preset::Laser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Cosmological => "cosmological",
            Preset::Cosmological3d => "cosmological-3d",
            Preset::Weather => "weather",
            Preset::WeatherSphere => "weather-sphere",
            Preset::Laser => "laser",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "cosmological" | "simulation" => Some(Preset::Cosmological),
            "cosmological-3d" | "simulation-3d" | "3d" => Some(Preset::Cosmological3d),
            "weather" => Some(Preset::Weather),
            "weather-sphere" | "sphere" => Some(Preset::WeatherSphere),
            "laser" | "laser-filamentation" => Some(Preset::Laser),
            _ => None,
        }
    }
}

/// Initial ψ distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum CoherenceSeed {
    /// ψ = 0 everywhere
    #[default]
    Zero,
    /// Centred Gaussian beam `exp(-sharpness * |x|²)` over [-1, 1] per axis
    Beam { sharpness: f64 },
}

/// An additive τ impulse over a centred hypercube on one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensionPulse {
    /// Frame the pulse is applied on
    pub frame: usize,
    /// Cells within this many steps of the centre on every axis are hit
    pub half_width: usize,
    pub amplitude: f64,
}

/// Every tunable constant of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grid size per axis (2 or 3 axes)
    pub grid_shape: Vec<usize>,
    /// How χ (and for beams, τ and ψ) evolve
    pub rule: DynamicsRule,

    // === Tension ===
    /// Standard deviation of the per-frame Gaussian τ forcing
    pub forcing_amplitude: f64,
    /// Multiplicative τ decay per frame, strictly inside (0, 1)
    pub damping_factor: f64,
    /// Standard deviation of the initial τ noise around the baseline
    pub initial_tension_scale: f64,
    /// Scheduled τ impulses
    pub pulses: Vec<TensionPulse>,

    // === Coherence / wave ===
    /// ψ relaxation rate toward `1 / (1 + |∇τ|)`
    pub relax_rate: f64,
    /// Clamp ψ to [0, 1] after relaxation
    pub clamp_coherence: bool,
    /// ψ-modulated wave speed for the wave rule
    pub wave_coupling: f64,
    pub initial_coherence: CoherenceSeed,

    // === Collapse ===
    /// Collapse when any τ cell exceeds this; `None` disables collapse
    pub collapse_threshold: Option<f64>,
    /// τ rest value: initial mean and post-collapse reset value
    pub collapse_baseline: f64,
    /// Post-collapse ψ is uniform in `[0, reseed_scale)`
    pub reseed_scale: f64,
    /// Beam intensity above which nonlinear τ deposition kicks in
    pub intensity_threshold: f64,

    // === Verdict ===
    /// ψ level a cell must exceed to count as coherent
    pub coherence_threshold: f64,
    /// Fraction of coherent cells for a frame to count as coherent
    pub coherence_fraction: f64,
    /// Consecutive coherent frames needed for a sustained verdict
    pub coherence_frames_required: u32,

    // === Run ===
    pub steps: usize,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_shape: vec![100, 100],
            rule: DynamicsRule::Wave,

            forcing_amplitude: 0.1,
            damping_factor: 0.995,
            initial_tension_scale: 0.1,
            pulses: Vec::new(),

            relax_rate: 0.1,
            clamp_coherence: false,
            wave_coupling: 0.2,
            initial_coherence: CoherenceSeed::Zero,

            collapse_threshold: None,
            collapse_baseline: 0.0,
            reseed_scale: DEFAULT_RESEED_SCALE,
            intensity_threshold: 0.1,

            coherence_threshold: 0.8,
            coherence_fraction: 0.6,
            coherence_frames_required: 100,

            steps: 200,
            seed: DEFAULT_SEED,
        }
    }
}

impl Config {
    /// Parameter set of one of the original demos
    pub fn from_preset(preset: Preset) -> Self {
        let base = Self::default();
        match preset {
            Preset::Cosmological => base,
            Preset::Cosmological3d => Self {
                grid_shape: vec![50, 50, 50],
                coherence_frames_required: 50,
                steps: 150,
                ..base
            },
            Preset::Weather => Self {
                grid_shape: vec![50, 50],
                rule: DynamicsRule::Reinforcement {
                    stability_threshold: 0.6,
                    rate: 0.05,
                    gradient_cutoff: 1.5,
                },
                forcing_amplitude: 0.05,
                damping_factor: 0.99,
                initial_tension_scale: 0.5,
                pulses: vec![TensionPulse {
                    frame: 50,
                    half_width: 2,
                    amplitude: 5.0,
                }],
                clamp_coherence: true,
                // stable cells are counted against the reinforcement threshold
                coherence_threshold: 0.6,
                ..base
            },
            Preset::WeatherSphere => Self {
                grid_shape: vec![10, 32, 64],
                rule: DynamicsRule::Diffusive {
                    chi_relax_rate: 0.05,
                    gradient_penalty: 0.02,
                },
                forcing_amplitude: 0.05,
                damping_factor: 0.99,
                relax_rate: 0.05,
                clamp_coherence: true,
                steps: 100,
                ..base
            },
            Preset::Laser => Self {
                grid_shape: vec![128, 128],
                rule: DynamicsRule::RingTracking {
                    absorption: 0.01,
                    nonlinear_gain: 0.05,
                    beam_decay: 0.999,
                },
                forcing_amplitude: 0.0,
                damping_factor: 0.999,
                initial_tension_scale: 0.0,
                initial_coherence: CoherenceSeed::Beam {
                    sharpness: BEAM_SHARPNESS,
                },
                collapse_threshold: Some(2.0),
                collapse_baseline: 1.0,
                steps: 400,
                ..base
            },
        }
    }

    /// Reject out-of-range values before a run starts
    pub fn validate(&self) -> EngineResult<()> {
        if !(2..=3).contains(&self.grid_shape.len()) {
            return Err(config_error(format!(
                "grid must have 2 or 3 axes, got {}",
                self.grid_shape.len()
            )));
        }
        if self.grid_shape.iter().any(|&n| n == 0) {
            return Err(config_error(format!(
                "grid dimensions must be positive, got {:?}",
                self.grid_shape
            )));
        }
        if !(self.damping_factor > 0.0 && self.damping_factor < 1.0) {
            return Err(config_error(format!(
                "damping_factor must lie in (0, 1), got {}",
                self.damping_factor
            )));
        }
        check_unit("coherence_threshold", self.coherence_threshold)?;
        check_unit("coherence_fraction", self.coherence_fraction)?;
        check_unit("relax_rate", self.relax_rate)?;
        if self.coherence_frames_required == 0 {
            return Err(config_error(
                "coherence_frames_required must be at least 1".to_string(),
            ));
        }
        check_non_negative("forcing_amplitude", self.forcing_amplitude)?;
        check_non_negative("initial_tension_scale", self.initial_tension_scale)?;
        check_non_negative("reseed_scale", self.reseed_scale)?;
        check_finite("wave_coupling", self.wave_coupling)?;
        check_finite("collapse_baseline", self.collapse_baseline)?;
        check_finite("intensity_threshold", self.intensity_threshold)?;
        if let Some(threshold) = self.collapse_threshold {
            check_finite("collapse_threshold", threshold)?;
        }
        if let CoherenceSeed::Beam { sharpness } = self.initial_coherence {
            check_non_negative("beam sharpness", sharpness)?;
        }
        for pulse in &self.pulses {
            check_finite("pulse amplitude", pulse.amplitude)?;
        }
        self.rule.validate()
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load and validate a JSON config file; missing keys take defaults
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }
}

pub(crate) fn config_error(message: String) -> EngineError {
    EngineError::Configuration(message)
}

pub(crate) fn check_unit(name: &str, value: f64) -> EngineResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(format!("{name} must lie in [0, 1], got {value}")))
    }
}

pub(crate) fn check_non_negative(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(config_error(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

pub(crate) fn check_finite(name: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(config_error(format!("{name} must be finite, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for preset in Preset::ALL {
            let config = Config::from_preset(preset);
            assert!(config.validate().is_ok(), "{} preset", preset.as_str());
            assert_eq!(Preset::from_str(preset.as_str()), Some(preset));
        }
        assert_eq!(Preset::from_str("Weather_Sphere"), Some(Preset::WeatherSphere));
        assert_eq!(Preset::from_str("tokamak"), None);
    }

    #[test]
    fn test_weather_counts_stability_at_reinforcement_threshold() {
        let config = Config::from_preset(Preset::Weather);
        let DynamicsRule::Reinforcement {
            stability_threshold,
            ..
        } = config.rule
        else {
            panic!("weather preset uses the reinforcement rule");
        };
        assert_eq!(config.coherence_threshold, stability_threshold);
        assert_eq!(config.coherence_threshold, 0.6);
    }

    #[test]
    fn test_damping_bounds() {
        for damping in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let config = Config {
                damping_factor: damping,
                ..Config::default()
            };
            assert!(
                matches!(config.validate(), Err(EngineError::Configuration(_))),
                "damping {damping} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_bad_grid() {
        let config = Config {
            grid_shape: vec![10, 0],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            grid_shape: vec![10],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_coherence_settings() {
        let bad = [
            Config {
                coherence_fraction: 1.2,
                ..Config::default()
            },
            Config {
                coherence_threshold: -0.1,
                ..Config::default()
            },
            Config {
                coherence_frames_required: 0,
                ..Config::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_json_fills_defaults() {
        let config =
            Config::from_json_str(r#"{ "grid_shape": [16, 16, 16], "seed": 9 }"#).unwrap();
        assert_eq!(config.grid_shape, vec![16, 16, 16]);
        assert_eq!(config.seed, 9);
        assert_eq!(config.damping_factor, Config::default().damping_factor);
    }

    #[test]
    fn test_json_rejects_invalid() {
        assert!(matches!(
            Config::from_json_str(r#"{ "damping_factor": 2.0 }"#),
            Err(EngineError::Configuration(_))
        ));
        assert!(matches!(
            Config::from_json_str("{ not json"),
            Err(EngineError::Json(_))
        ));
    }
}
