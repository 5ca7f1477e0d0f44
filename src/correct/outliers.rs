//! Hot-pixel repair: samples far from their local median are replaced by it.

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2, Axis};
use ndarray::parallel::prelude::*;
use ordered_float::OrderedFloat;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sinogram::Sinogram;
use crate::types::{Intensityf32, Ratiof32, Slice};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutlierRepair {
    /// Outliers deviate from the local median by more than this many
    /// standard deviations of the deviation map
    #[serde(default = "default_tolerance")]
    pub tolerance: Ratiof32,

    /// Also repair the first and last rows and columns
    #[serde(default = "default_edges")]
    pub edges: bool,
}

fn default_tolerance() -> Ratiof32 { 3.0 }
fn default_edges() -> bool { true }

impl Default for OutlierRepair {
    fn default() -> Self { Self { tolerance: default_tolerance(), edges: default_edges() } }
}

impl OutlierRepair {

    /// Repaired copy of `slice`. Samples that are not outliers are copied
    /// bit for bit.
    pub fn apply(&self, slice: ArrayView2<Intensityf32>) -> Result<Slice> {
        let mut out = slice.to_owned();
        self.repair(out.view_mut())?;
        Ok(out)
    }

    /// Positions that `apply` would replace
    pub fn detect(&self, slice: ArrayView2<Intensityf32>) -> Result<Vec<(usize, usize)>> {
        let repaired = self.apply(slice)?;
        Ok(slice.indexed_iter()
           .filter(|(ij, v)| repaired[*ij].to_bits() != v.to_bits())
           .map(|(ij, _)| ij)
           .collect())
    }

    /// Repair every channel slice in parallel. Returns the number of samples
    /// replaced.
    pub fn apply_to(&self, sinogram: &mut Sinogram) -> Result<usize> {
        let counts = sinogram.data_mut()
            .axis_iter_mut(Axis(2))
            .into_par_iter()
            .map(|slice| self.repair(slice))
            .collect::<Result<Vec<usize>>>()?;
        Ok(counts.into_iter().sum())
    }

    fn repair(&self, mut slice: ArrayViewMut2<Intensityf32>) -> Result<usize> {
        let (n, m) = slice.dim();
        if n < 2 || m < 2 { return Err(Error::DegenerateSlice((n, m))) }

        let original = slice.to_owned();
        let filtered = median_filter_3x3(original.view());
        let diff = &original - &filtered;
        let threshold = self.tolerance * diff.std(0.0);
        if !(threshold > 0.0) { return Ok(0) }

        let mut replaced = 0;
        let mut replace = |slice: &mut ArrayViewMut2<Intensityf32>, i: usize, j: usize, median: f32| {
            if (original[[i, j]] - median).abs() > threshold {
                slice[[i, j]] = median;
                replaced += 1;
            }
        };

        for i in 1..n-1 {
            for j in 1..m-1 {
                replace(&mut slice, i, j, filtered[[i, j]]);
            }
        }

        if self.edges {
            let (l, b) = (m - 1, n - 1);
            for i in 1..n-1 {
                replace(&mut slice, i, 0, median_of(original.slice(s![i-1..=i+1, 0..2])));
                replace(&mut slice, i, l, median_of(original.slice(s![i-1..=i+1, l-1..=l])));
            }
            for j in 1..m-1 {
                replace(&mut slice, 0, j, median_of(original.slice(s![0..2, j-1..=j+1])));
                replace(&mut slice, b, j, median_of(original.slice(s![b-1..=b, j-1..=j+1])));
            }
            for (i, j, rows, cols) in [(0, 0, 0..2, 0..2), (0, l, 0..2, l-1..m), (b, 0, b-1..n, 0..2), (b, l, b-1..n, l-1..m)] {
                replace(&mut slice, i, j, median_of(original.slice(s![rows, cols])));
            }
        }
        Ok(replaced)
    }
}

/// 3 × 3 median with the slice mirrored about its outer edges
pub fn median_filter_3x3(slice: ArrayView2<Intensityf32>) -> Array2<Intensityf32> {
    let (n, m) = slice.dim();
    let reflect = |k: isize, len: usize| -> usize {
        if k < 0 { 0 } else if k as usize >= len { len - 1 } else { k as usize }
    };
    Array2::from_shape_fn((n, m), |(i, j)| {
        let mut window = [0.0; 9];
        let mut w = 0;
        for di in -1..=1 {
            for dj in -1..=1 {
                window[w] = slice[[reflect(i as isize + di, n), reflect(j as isize + dj, m)]];
                w += 1;
            }
        }
        median(&mut window)
    })
}

fn median_of(window: ArrayView2<Intensityf32>) -> Intensityf32 {
    let mut values = window.iter().copied().collect::<Vec<_>>();
    median(&mut values)
}

/// Median; the mean of the two middle values for even counts
pub fn median(values: &mut [f32]) -> f32 {
    values.sort_unstable_by_key(|v| OrderedFloat(*v));
    let k = values.len();
    if k == 0 { return f32::NAN }
    if k % 2 == 1 { values[k / 2] }
    else          { (values[k / 2 - 1] + values[k / 2]) / 2.0 }
}
