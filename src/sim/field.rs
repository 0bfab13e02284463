//! Dense scalar fields and the τ/ψ/χ field set
//!
//! All state that evolves between frames lives in [`FieldSet`].

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Dimension, IxDyn};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::grid::Grid;
use crate::config::{CoherenceSeed, Config};
use crate::error::{EngineError, EngineResult};

/// A dense row-major N-d array of `f64`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Field {
    data: ArrayD<f64>,
}

impl Field {
    pub fn zeros(shape: &[usize]) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn filled(shape: &[usize], value: f64) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Wrap an existing row-major buffer; its length must equal the product
    /// of `shape`
    pub fn from_shape_vec(shape: &[usize], data: Vec<f64>) -> EngineResult<Self> {
        let found = data.len();
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(Self::from)
            .map_err(|_| EngineError::DimensionMismatch {
                expected: shape.to_vec(),
                found: vec![found],
            })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn array(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Mutable cell access; the shape cannot be changed through it
    #[inline]
    pub fn array_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.data.view_mut()
    }

    #[inline]
    pub fn view(&self) -> ArrayViewD<'_, f64> {
        self.data.view()
    }

    #[inline]
    pub fn view_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        self.data.view_mut()
    }

    /// Cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    pub fn into_array(self) -> ArrayD<f64> {
        self.data
    }

    /// Value at a coordinate tuple, `None` when out of range
    pub fn get(&self, coords: &[usize]) -> Option<f64> {
        if coords.len() != self.data.ndim() {
            return None;
        }
        self.data.get(coords).copied()
    }

    pub fn max(&self) -> f64 {
        self.data.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v))
    }

    pub fn min(&self) -> f64 {
        self.data.fold(f64::INFINITY, |acc, &v| acc.min(v))
    }

    pub fn mean(&self) -> f64 {
        self.data.mean().unwrap_or(0.0)
    }

    pub fn mean_abs(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.fold(0.0, |acc, v| acc + v.abs()) / self.data.len() as f64
    }

    /// Number of cells strictly above `threshold`
    pub fn count_above(&self, threshold: f64) -> usize {
        self.data.iter().filter(|v| **v > threshold).count()
    }

    /// Number of cells strictly below `threshold`
    pub fn count_below(&self, threshold: f64) -> usize {
        self.data.iter().filter(|v| **v < threshold).count()
    }

    /// Fraction of cells strictly above `threshold`
    pub fn fraction_above(&self, threshold: f64) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.count_above(threshold) as f64 / self.data.len() as f64
    }

    /// 2-D view for display: the field itself when 2-D, otherwise the slice
    /// at the middle index of the last axis (zeros if that axis is empty)
    pub fn mid_slice(&self) -> Field {
        match *self.shape() {
            [rows, cols, 0] => Field::zeros(&[rows, cols]),
            [_, _, depth] => self
                .data
                .index_axis(Axis(2), depth / 2)
                .to_owned()
                .into(),
            _ => self.clone(),
        }
    }
}

impl From<ArrayD<f64>> for Field {
    fn from(data: ArrayD<f64>) -> Self {
        Self { data }
    }
}

/// Which of the three evolving fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// τ
    Tension,
    /// ψ
    Coherence,
    /// χ
    Wave,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Tension => "tau",
            FieldKind::Coherence => "psi",
            FieldKind::Wave => "chi",
        }
    }
}

/// τ, ψ, χ plus the previous χ needed by second-order updates
#[derive(Debug, Clone)]
pub struct FieldSet {
    grid: Grid,
    pub(crate) tau: Field,
    pub(crate) psi: Field,
    pub(crate) chi: Field,
    pub(crate) chi_prev: Field,
}

impl FieldSet {
    /// All fields zero
    pub fn zeros(grid: &Grid) -> Self {
        let shape = grid.shape();
        Self {
            grid: grid.clone(),
            tau: Field::zeros(shape),
            psi: Field::zeros(shape),
            chi: Field::zeros(shape),
            chi_prev: Field::zeros(shape),
        }
    }

    /// Build from explicit arrays; every array must match the grid shape
    pub fn from_fields(
        grid: &Grid,
        tau: Field,
        psi: Field,
        chi: Field,
        chi_prev: Field,
    ) -> EngineResult<Self> {
        for field in [&tau, &psi, &chi, &chi_prev] {
            check_shape(grid, field)?;
        }
        Ok(Self {
            grid: grid.clone(),
            tau,
            psi,
            chi,
            chi_prev,
        })
    }

    /// Initial conditions from the configuration
    ///
    /// τ starts at the collapse baseline plus Gaussian noise, ψ at zero or a
    /// centred Gaussian beam, χ and its history at zero.
    pub fn initialize<R: Rng + ?Sized>(grid: &Grid, config: &Config, rng: &mut R) -> Self {
        let mut fields = Self::zeros(grid);

        let scale = config.initial_tension_scale;
        for t in fields.tau.data.iter_mut() {
            let noise: f64 = rng.sample(StandardNormal);
            *t = config.collapse_baseline + scale * noise;
        }

        if let CoherenceSeed::Beam { sharpness } = config.initial_coherence {
            let shape = grid.shape();
            let beam = ArrayD::from_shape_fn(IxDyn(shape), |idx| {
                let r2: f64 = idx
                    .slice()
                    .iter()
                    .zip(shape)
                    .map(|(&c, &n)| {
                        let x = linspace_coord(c, n);
                        x * x
                    })
                    .sum();
                (-sharpness * r2).exp()
            });
            fields.psi = Field::from(beam);
        }

        fields
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn tau(&self) -> &Field {
        &self.tau
    }

    pub fn psi(&self) -> &Field {
        &self.psi
    }

    pub fn chi(&self) -> &Field {
        &self.chi
    }

    pub fn chi_prev(&self) -> &Field {
        &self.chi_prev
    }

    pub fn get(&self, kind: FieldKind) -> &Field {
        match kind {
            FieldKind::Tension => &self.tau,
            FieldKind::Coherence => &self.psi,
            FieldKind::Wave => &self.chi,
        }
    }

    /// Mutable cell access; the shape cannot change through a view
    pub fn get_mut(&mut self, kind: FieldKind) -> ArrayViewMutD<'_, f64> {
        match kind {
            FieldKind::Tension => self.tau.array_mut(),
            FieldKind::Coherence => self.psi.array_mut(),
            FieldKind::Wave => self.chi.array_mut(),
        }
    }

    /// Replace one field wholesale
    pub fn set(&mut self, kind: FieldKind, field: Field) -> EngineResult<()> {
        check_shape(&self.grid, &field)?;
        match kind {
            FieldKind::Tension => self.tau = field,
            FieldKind::Coherence => self.psi = field,
            FieldKind::Wave => self.chi = field,
        }
        Ok(())
    }
}

fn check_shape(grid: &Grid, field: &Field) -> EngineResult<()> {
    if field.shape() != grid.shape() {
        return Err(EngineError::DimensionMismatch {
            expected: grid.shape().to_vec(),
            found: field.shape().to_vec(),
        });
    }
    Ok(())
}

/// Coordinate `c` of `n` evenly spaced samples over [-1, 1]
fn linspace_coord(c: usize, n: usize) -> f64 {
    if n < 2 {
        return -1.0;
    }
    -1.0 + 2.0 * c as f64 / (n - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_from_shape_vec_checks_length() {
        assert!(Field::from_shape_vec(&[2, 3], vec![0.0; 6]).is_ok());
        let err = Field::from_shape_vec(&[2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_get_and_stats() {
        let f = Field::from_shape_vec(&[2, 2], vec![-1.0, 0.5, 0.75, 2.0]).unwrap();
        assert_eq!(f.get(&[1, 0]), Some(0.75));
        assert_eq!(f.get(&[2, 0]), None);
        assert_eq!(f.get(&[0]), None);
        assert_eq!(f.max(), 2.0);
        assert_eq!(f.min(), -1.0);
        assert_eq!(f.mean(), 0.5625);
        assert_eq!(f.mean_abs(), 1.0625);
        assert_eq!(f.count_above(0.7), 2);
        assert_eq!(f.fraction_above(0.7), 0.5);
        assert_eq!(f.count_below(0.0), 1);
    }

    #[test]
    fn test_mid_slice_3d() {
        let data = (0..2 * 3 * 4).map(|v| v as f64).collect();
        let f = Field::from_shape_vec(&[2, 3, 4], data).unwrap();
        let slice = f.mid_slice();
        assert_eq!(slice.shape(), &[2, 3]);
        // [i, j, 2] = i*12 + j*4 + 2
        assert_eq!(slice.get(&[1, 2]), Some(22.0));
        assert_eq!(slice.get(&[0, 0]), Some(2.0));
    }

    #[test]
    fn test_mid_slice_of_empty_depth() {
        let f = Field::zeros(&[2, 2, 0]);
        let slice = f.mid_slice();
        assert_eq!(slice.shape(), &[2, 2]);
        assert!(slice.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_mid_slice_2d_is_identity() {
        let f = Field::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(f.mid_slice(), f);
    }

    #[test]
    fn test_get_mut_keeps_shape() {
        let grid = Grid::new(&[3, 4]).unwrap();
        let mut fields = FieldSet::zeros(&grid);
        fields.get_mut(FieldKind::Wave).fill(0.5);
        let mut tau = fields.get_mut(FieldKind::Tension);
        tau[IxDyn(&[2, 1])] = 3.0;
        assert_eq!(fields.chi().mean(), 0.5);
        assert_eq!(fields.tau().get(&[2, 1]), Some(3.0));
        assert_eq!(fields.tau().shape(), &[3, 4]);
    }

    #[test]
    fn test_from_fields_rejects_mismatch() {
        let grid = Grid::new(&[4, 4]).unwrap();
        let ok = Field::zeros(&[4, 4]);
        let bad = Field::zeros(&[4, 5]);
        let result = FieldSet::from_fields(&grid, ok.clone(), bad, ok.clone(), ok);
        assert!(matches!(
            result,
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_set_rejects_mismatch() {
        let grid = Grid::new(&[4, 4, 4]).unwrap();
        let mut fields = FieldSet::zeros(&grid);
        assert!(fields.set(FieldKind::Coherence, Field::filled(&[4, 4], 1.0)).is_err());
        assert!(fields.set(FieldKind::Coherence, Field::filled(&[4, 4, 4], 1.0)).is_ok());
        assert_eq!(fields.psi().mean(), 1.0);
    }

    #[test]
    fn test_initialize_beam() {
        let mut config = Config::default();
        config.grid_shape = vec![9, 9];
        config.initial_tension_scale = 0.0;
        config.collapse_baseline = 1.0;
        config.initial_coherence = CoherenceSeed::Beam { sharpness: 20.0 };
        let grid = Grid::new(&config.grid_shape).unwrap();
        let mut rng = Pcg32::seed_from_u64(7);

        let fields = FieldSet::initialize(&grid, &config, &mut rng);

        assert!(fields.tau().iter().all(|t| *t == 1.0));
        assert_eq!(fields.psi().get(&[4, 4]), Some(1.0));
        assert!(fields.psi().get(&[0, 0]).unwrap() < 1e-10);
        assert!(fields.chi().iter().all(|c| *c == 0.0));
    }
}
