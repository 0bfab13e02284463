//! Frame loop
//!
//! Each frame runs dynamics, then collapse, then the verdict observation, and
//! hands the caller an owned [`StepResult`].

use std::fmt;
use std::iter::FusedIterator;

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collapse::CollapseController;
use super::dynamics::DynamicsStep;
use super::field::{Field, FieldKind, FieldSet};
use super::grid::Grid;
use super::verdict::{VerdictState, VerdictTracker};
use crate::config::Config;
use crate::consts::COLLAPSING_CHI_LEVEL;
use crate::error::EngineResult;

/// Snapshot of one frame
///
/// Holds copies of the fields, so it stays valid after the runner moves on
/// and can be sent to another thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Zero-based frame index
    pub frame: usize,
    pub tau: Field,
    pub psi: Field,
    pub chi: Field,
    pub collapsed_this_frame: bool,
    /// Fraction of ψ cells above the coherence threshold as seen by the
    /// verdict tracker (0 on a collapse frame)
    pub coherent_fraction: f64,
    /// Verdict after this frame
    pub verdict: VerdictState,
}

/// End-of-run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: usize,
    pub collapses: u64,
    pub verdict: VerdictState,
    /// Cells with ψ above the coherence threshold
    pub stable_cells: usize,
    /// Cells with χ below the collapsing level
    pub collapsing_cells: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frames: {}", self.frames)?;
        writeln!(f, "Collapses: {}", self.collapses)?;
        writeln!(f, "Stable cells: {}", self.stable_cells)?;
        writeln!(f, "Collapsing cells: {}", self.collapsing_cells)?;
        write!(f, "{}", self.verdict)
    }
}

/// Owns every piece of simulation state and drives it frame by frame
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    config: Config,
    fields: FieldSet,
    dynamics: DynamicsStep,
    collapse: CollapseController,
    tracker: VerdictTracker,
    rng: Pcg32,
    /// Index of the next frame to compute
    frame: usize,
}

impl SimulationRunner {
    /// Validate the config and lay down initial conditions
    pub fn new(config: Config) -> EngineResult<Self> {
        config.validate()?;
        let grid = Grid::new(&config.grid_shape)?;
        let mut rng = Pcg32::seed_from_u64(config.seed);
        let fields = FieldSet::initialize(&grid, &config, &mut rng);
        let dynamics = DynamicsStep::new(&config)?;

        log::info!(
            "Simulation ready: {:?} grid, {} rule, seed {}",
            config.grid_shape,
            config.rule.as_str(),
            config.seed
        );

        Ok(Self {
            config,
            fields,
            dynamics,
            collapse: CollapseController::new(),
            tracker: VerdictTracker::new(),
            rng,
            frame: 0,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        self.fields.grid()
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Latest |∇τ|, for renderers that show the gradient panel
    pub fn gradient_magnitude(&self) -> Field {
        Field::from(self.dynamics.grad_mag().clone())
    }

    pub fn verdict(&self) -> VerdictState {
        self.tracker.state()
    }

    /// Number of frames computed so far
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn collapses(&self) -> u64 {
        self.collapse.collapses()
    }

    /// Overwrite one field between frames
    pub fn set_field(&mut self, kind: FieldKind, field: Field) -> EngineResult<()> {
        self.fields.set(kind, field)
    }

    /// Compute exactly one frame
    ///
    /// The frame at index `config.steps - 1` ends the configured run and
    /// applies the end-of-run verdict default, however the frames were pulled.
    pub fn step(&mut self) -> StepResult {
        let frame = self.frame;
        self.dynamics
            .advance(&mut self.fields, &self.config, frame, &mut self.rng);
        let collapsed =
            self.collapse
                .check_and_apply(&mut self.fields, &self.config, frame, &mut self.rng);

        let coherent_fraction = if collapsed {
            0.0
        } else {
            self.fields
                .psi()
                .fraction_above(self.config.coherence_threshold)
        };
        let mut verdict = self
            .tracker
            .observe_fraction(coherent_fraction, &self.config, frame);
        if frame + 1 >= self.config.steps {
            verdict = self.tracker.finalize(frame);
        }

        self.frame += 1;
        StepResult {
            frame,
            tau: self.fields.tau().clone(),
            psi: self.fields.psi().clone(),
            chi: self.fields.chi().clone(),
            collapsed_this_frame: collapsed,
            coherent_fraction,
            verdict,
        }
    }

    /// Lazily produce the next `steps` frames
    pub fn run(&mut self, steps: usize) -> Frames<'_> {
        Frames {
            runner: self,
            remaining: steps,
        }
    }

    /// Lazily produce the configured number of frames
    pub fn frames(&mut self) -> Frames<'_> {
        let steps = self.config.steps;
        self.run(steps)
    }

    /// Run the configured frames not yet computed, discarding snapshots
    pub fn run_to_end(&mut self) -> RunSummary {
        let remaining = self.config.steps.saturating_sub(self.frame);
        self.run(remaining).for_each(drop);
        self.summary()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frame,
            collapses: self.collapse.collapses(),
            verdict: self.tracker.state(),
            stable_cells: self.fields.psi().count_above(self.config.coherence_threshold),
            collapsing_cells: self.fields.chi().count_below(COLLAPSING_CHI_LEVEL),
        }
    }
}

/// Finite, lazy sequence of frames from [`SimulationRunner::run`]
///
/// One frame is computed per `next()`. Dropping it early leaves the fields
/// in their last computed state.
#[derive(Debug)]
pub struct Frames<'a> {
    runner: &'a mut SimulationRunner,
    remaining: usize,
}

impl Iterator for Frames<'_> {
    type Item = StepResult;

    fn next(&mut self) -> Option<StepResult> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.runner.step())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}

impl FusedIterator for Frames<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preset;
    use crate::sim::verdict::Verdict;

    fn small(preset: Preset) -> Config {
        Config {
            grid_shape: vec![16, 16],
            steps: 30,
            ..Config::from_preset(preset)
        }
    }

    #[test]
    fn test_run_yields_exact_frames() {
        let mut runner = SimulationRunner::new(small(Preset::Cosmological)).unwrap();
        let frames = runner.run(12);
        assert_eq!(frames.len(), 12);
        let indices: Vec<usize> = frames.map(|r| r.frame).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert_eq!(runner.frame(), 12);
    }

    #[test]
    fn test_zero_steps() {
        let mut runner = SimulationRunner::new(small(Preset::Cosmological)).unwrap();
        assert_eq!(runner.run(0).count(), 0);
        assert_eq!(runner.verdict().verdict, Verdict::Pending);
    }

    #[test]
    fn test_early_stop_computes_nothing_more() {
        let mut runner = SimulationRunner::new(small(Preset::Cosmological)).unwrap();
        let taken: Vec<StepResult> = runner.run(100).take(3).collect();
        assert_eq!(taken.len(), 3);
        assert_eq!(runner.frame(), 3);
        assert_eq!(runner.fields().tau(), &taken[2].tau);
        // end-of-run default only applies to a completed run
        assert_eq!(runner.verdict().verdict, Verdict::Pending);
    }

    #[test]
    fn test_chunked_run_matches_whole_run() {
        let config = Config {
            grid_shape: vec![8, 8],
            forcing_amplitude: 0.0,
            initial_tension_scale: 0.0,
            relax_rate: 1.0,
            coherence_frames_required: 5,
            steps: 20,
            ..Config::default()
        };
        let mut whole = SimulationRunner::new(config.clone()).unwrap();
        whole.frames().for_each(drop);

        let mut chunked = SimulationRunner::new(config).unwrap();
        let mut seen = Vec::new();
        for _ in 0..20 {
            let result = chunked.run(1).next().unwrap();
            seen.push(result.verdict);
        }

        assert_eq!(whole.verdict().verdict, Verdict::Sustained);
        assert_eq!(chunked.verdict(), whole.verdict());
        assert_eq!(seen[0].verdict, Verdict::Pending);
        assert_eq!(seen[0].consecutive_coherent, 1);
        assert_eq!(seen[4].verdict_step, Some(4));
    }

    #[test]
    fn test_pending_chunks_fail_only_at_final_frame() {
        let config = Config {
            coherence_threshold: 1.0,
            steps: 10,
            ..small(Preset::Cosmological)
        };
        let mut runner = SimulationRunner::new(config).unwrap();
        let first: Vec<StepResult> = runner.run(4).collect();
        assert!(first.iter().all(|r| r.verdict.verdict == Verdict::Pending));

        let rest: Vec<StepResult> = runner.run(6).collect();
        assert!(rest[..5].iter().all(|r| r.verdict.verdict == Verdict::Pending));
        assert_eq!(rest[5].frame, 9);
        assert_eq!(rest[5].verdict.verdict, Verdict::Failed);
        assert_eq!(rest[5].verdict.verdict_step, Some(9));
    }

    #[test]
    fn test_frame_indices_continue_across_runs() {
        let mut runner = SimulationRunner::new(small(Preset::Cosmological)).unwrap();
        runner.run(5).for_each(drop);
        let next = runner.run(1).next().unwrap();
        assert_eq!(next.frame, 5);
    }

    #[test]
    fn test_snapshots_are_copies() {
        let mut runner = SimulationRunner::new(small(Preset::Cosmological)).unwrap();
        let first = runner.step();
        let second = runner.step();
        assert_ne!(first.tau, second.tau);
        assert_eq!(&second.tau, runner.fields().tau());
    }

    #[test]
    fn test_collapse_every_frame() {
        // Threshold below the baseline forces a collapse every frame
        let config = Config {
            collapse_threshold: Some(-1.0),
            collapse_baseline: 0.0,
            ..small(Preset::Cosmological)
        };
        let mut runner = SimulationRunner::new(config).unwrap();
        for result in runner.run(4) {
            assert!(result.collapsed_this_frame);
            assert_eq!(result.coherent_fraction, 0.0);
            assert_eq!(result.tau.max(), 0.0);
        }
        assert_eq!(runner.collapses(), 4);
    }

    #[test]
    fn test_collapse_resets_streak() {
        let config = Config {
            collapse_threshold: Some(-1.0),
            coherence_threshold: 0.0,
            coherence_fraction: 0.5,
            coherence_frames_required: 5,
            ..small(Preset::Cosmological)
        };
        let mut runner = SimulationRunner::new(config).unwrap();
        let result = runner.step();
        assert!(result.collapsed_this_frame);
        assert_eq!(result.verdict.verdict, Verdict::Pending);
        assert_eq!(result.verdict.consecutive_coherent, 0);
    }

    #[test]
    fn test_gradient_panel_matches_grid() {
        let mut runner = SimulationRunner::new(small(Preset::Weather)).unwrap();
        runner.step();
        let grad = runner.gradient_magnitude();
        let expected = runner.grid().gradient_magnitude(runner.fields().tau());
        assert_eq!(grad, expected);
    }

    #[test]
    fn test_run_to_end_stops_at_configured_frames() {
        let mut runner = SimulationRunner::new(small(Preset::Cosmological)).unwrap();
        runner.run(7).for_each(drop);
        let summary = runner.run_to_end();
        assert_eq!(summary.frames, 30);
        assert_eq!(runner.run_to_end().frames, 30);
    }

    #[test]
    fn test_weather_summary_counts_stable_cells() {
        let config = Config {
            grid_shape: vec![20, 20],
            steps: 60,
            ..Config::from_preset(Preset::Weather)
        };
        let mut runner = SimulationRunner::new(config).unwrap();
        let summary = runner.run_to_end();
        assert_eq!(summary.stable_cells, runner.fields().psi().count_above(0.6));
    }

    #[test]
    fn test_summary_counts() {
        let mut runner = SimulationRunner::new(small(Preset::Weather)).unwrap();
        let summary = runner.run_to_end();
        assert_eq!(summary.frames, 30);
        assert!(summary.verdict.is_terminal());
        assert!(summary.stable_cells <= 256);
        assert!(summary.collapsing_cells <= 256);
        let text = summary.to_string();
        assert!(text.contains("Stable cells:"));
        assert!(text.ends_with(&summary.verdict.to_string()));
    }
}
