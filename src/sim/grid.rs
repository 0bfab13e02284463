//! Periodic finite-difference grid
//!
//! Row-major layout, last axis fastest. Every index wraps: the neighbour of
//! index 0 along an axis is the last index on that axis and vice versa.

use ndarray::{ArrayViewD, ArrayViewMutD, Axis, Slice, Zip};
use serde::{Deserialize, Serialize};

use super::field::Field;
use crate::error::{EngineError, EngineResult};

/// A fixed 2-D or 3-D grid with periodic boundaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    shape: Vec<usize>,
    len: usize,
}

impl Grid {
    /// Build a grid; dimensionality must be 2 or 3 and every axis non-empty
    pub fn new(shape: &[usize]) -> EngineResult<Self> {
        if !(2..=3).contains(&shape.len()) {
            return Err(EngineError::Configuration(format!(
                "grid must be 2-D or 3-D, got {} dimensions",
                shape.len()
            )));
        }
        if let Some(axis) = shape.iter().position(|&n| n == 0) {
            return Err(EngineError::Configuration(format!(
                "grid axis {axis} has non-positive size"
            )));
        }

        Ok(Self {
            shape: shape.to_vec(),
            len: shape.iter().product(),
        })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of cells
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Centre cell coordinates (`n / 2` on each axis)
    pub fn center(&self) -> Vec<usize> {
        self.shape.iter().map(|&n| n / 2).collect()
    }

    /// Centered-difference gradient, one component per axis
    pub fn gradient(&self, field: &Field) -> Vec<Field> {
        debug_assert_eq!(field.shape(), self.shape());
        (0..self.ndim())
            .map(|axis| {
                let mut component = Field::zeros(&self.shape);
                zip_periodic(field.view(), component.view_mut(), axis, |o, _, p, m| {
                    *o = (p - m) * 0.5;
                });
                component
            })
            .collect()
    }

    /// Euclidean norm of the gradient at every cell
    pub fn gradient_magnitude(&self, field: &Field) -> Field {
        let mut out = Field::zeros(&self.shape);
        self.gradient_magnitude_into(field.view(), out.view_mut());
        out
    }

    /// Discrete periodic Laplacian (4-neighbour in 2-D, 6-neighbour in 3-D)
    pub fn laplacian(&self, field: &Field) -> Field {
        let mut out = Field::zeros(&self.shape);
        self.laplacian_into(field.view(), out.view_mut());
        out
    }

    /// Allocation-free [`Grid::gradient_magnitude`] into a caller buffer
    pub fn gradient_magnitude_into(
        &self,
        src: ArrayViewD<'_, f64>,
        mut out: ArrayViewMutD<'_, f64>,
    ) {
        debug_assert_eq!(src.shape(), self.shape());
        debug_assert_eq!(out.shape(), self.shape());
        out.fill(0.0);
        for axis in 0..self.ndim() {
            zip_periodic(src.view(), out.view_mut(), axis, |o, _, p, m| {
                let d = (p - m) * 0.5;
                *o += d * d;
            });
        }
        out.mapv_inplace(f64::sqrt);
    }

    /// Allocation-free [`Grid::laplacian`] into a caller buffer
    pub fn laplacian_into(&self, src: ArrayViewD<'_, f64>, mut out: ArrayViewMutD<'_, f64>) {
        debug_assert_eq!(src.shape(), self.shape());
        debug_assert_eq!(out.shape(), self.shape());
        out.fill(0.0);
        for axis in 0..self.ndim() {
            zip_periodic(src.view(), out.view_mut(), axis, |o, c, p, m| {
                *o += p + m - 2.0 * c;
            });
        }
    }

    /// Periodic shift by one cell along the last axis (`out[.., i] = src[.., i - 1]`)
    pub fn roll_last_axis_into(&self, src: ArrayViewD<'_, f64>, out: ArrayViewMutD<'_, f64>) {
        zip_periodic(src, out, self.ndim() - 1, |o, _, _, m| *o = m);
    }
}

/// `(start, end, plus_start, minus_start)` bands covering an axis of length
/// `n`, so each band reads its `+1` and `-1` neighbours as contiguous slices
fn periodic_bands(n: usize) -> impl Iterator<Item = (usize, usize, usize, usize)> {
    let bands = if n == 1 {
        [(0, 1, 0, 0), (0, 0, 0, 0), (0, 0, 0, 0)]
    } else {
        [(0, 1, 1, n - 1), (1, n - 1, 2, 0), (n - 1, n, 0, n - 2)]
    };
    bands.into_iter().filter(|(lo, hi, _, _)| hi > lo)
}

/// Visit every cell with `(out, centre, plus, minus)` along one axis
fn zip_periodic<F>(
    src: ArrayViewD<'_, f64>,
    mut out: ArrayViewMutD<'_, f64>,
    axis: usize,
    mut f: F,
) where
    F: FnMut(&mut f64, f64, f64, f64),
{
    let ax = Axis(axis);
    for (lo, hi, plus, minus) in periodic_bands(src.len_of(ax)) {
        let len = hi - lo;
        Zip::from(out.slice_axis_mut(ax, Slice::from(lo..hi)))
            .and(src.slice_axis(ax, Slice::from(lo..hi)))
            .and(src.slice_axis(ax, Slice::from(plus..plus + len)))
            .and(src.slice_axis(ax, Slice::from(minus..minus + len)))
            .for_each(|o, &c, &p, &m| f(o, c, p, m));
    }
}
