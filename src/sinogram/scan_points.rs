//! Sinograms from scans that record rotation and translation at every sample
//! point instead of on a regular grid.

use ndarray::{Array1, Array3, Axis as ArrayAxis};
use ndhistogram::{ndhistogram, axis::{Axis, Uniform}, Histogram};

use crate::error::{Error, Result};
use crate::types::{Slice, Volume};
use super::Sinogram;

/// Patterns with the (rotation, translation) position at which each was
/// recorded
#[derive(Debug, Clone)]
pub struct ScanPoints {
    data: Volume,
    rotation: Slice,
    translation: Slice,
}

impl ScanPoints {

    pub fn new(data: Volume, rotation: Slice, translation: Slice) -> Result<Self> {
        let (n, m, _) = data.dim();
        if n == 0 { return Err(Error::EmptyAcquisition) }
        for (what, positions) in [("rotation", &rotation), ("translation", &translation)] {
            if positions.dim() != (n, m) {
                return Err(Error::ShapeMismatch { what: what.into(), expected: vec![n, m], actual: positions.shape().to_vec() })
            }
            if let Some(bad) = positions.iter().position(|v| !v.is_finite()) {
                return Err(Error::NonFiniteAngle(bad / m.max(1)))
            }
        }
        Ok(Self { data, rotation, translation })
    }

    /// Histogram every sample into a regular `(n / binning) × (m / binning)`
    /// grid spanning the recorded rotations and translations, summing the
    /// patterns that land in the same bin. Rotation bin centres become the
    /// angles of the sinogram.
    pub fn to_sinogram(&self, binning: usize) -> Result<Sinogram> {
        let (n, m, c) = self.data.dim();
        let (nb, mb) = (n / binning.max(1), m / binning.max(1));
        if binning == 0 || nb == 0 || mb == 0 {
            return Err(Error::Precondition(format!("cannot histogram {n}×{m} points with binning {binning}")))
        }
        let rot = GridAxis::spanning(&self.rotation, nb);
        let pos = GridAxis::spanning(&self.translation, mb);
        let mut hits = ndhistogram!(rot.axis.clone(), pos.axis.clone(); usize);

        let mut data = Array3::<f32>::zeros((nb, mb, c));
        for ((r, t), pattern) in self.rotation.iter()
            .zip(self.translation.iter())
            .zip(self.data.lanes(ArrayAxis(2)))
        {
            let (r, t) = (rot.clamp(*r), pos.clamp(*t));
            hits.fill(&(r, t));
            if let (Some(i), Some(j)) = (rot.bin(r), pos.bin(t)) {
                let mut target = data.slice_mut(ndarray::s![i, j, ..]);
                target += &pattern;
            }
        }

        let empty = (0..nb)
            .flat_map(|i| (0..mb).map(move |j| (i, j)))
            .filter(|&(i, j)| hits.value(&(rot.centre(i), pos.centre(j))).map_or(true, |&h| h == 0))
            .count();
        if empty > 0 {
            log::warn!("{empty} of {} sinogram bins received no scan points", nb * mb);
        }

        let angles = Array1::from_iter((0..nb).map(|i| rot.centre(i)));
        Sinogram::new(data, angles, None)
    }
}

/// Uniform binning of one recorded coordinate. Values equal to the upper
/// edge belong to the last bin.
struct GridAxis {
    axis: Uniform<f32>,
    lo: f32,
    width: f32,
    bins: usize,
}

impl GridAxis {
    fn spanning(values: &Slice, bins: usize) -> Self {
        let lo = values.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let hi = if hi > lo { hi } else { lo + 1.0 };
        let width = (hi - lo) / bins as f32;
        Self { axis: Uniform::new(bins, lo, hi), lo, width, bins }
    }

    fn clamp(&self, x: f32) -> f32 {
        let hi = self.lo + self.width * self.bins as f32;
        if x >= hi { hi - self.width / 2.0 } else { x }
    }

    /// In-range bin of `x`; the histogram axis reserves index 0 for underflow
    fn bin(&self, x: f32) -> Option<usize> {
        match self.axis.index(&x) {
            Some(k) if k >= 1 && k <= self.bins => Some(k - 1),
            _ => None,
        }
    }

    fn centre(&self, i: usize) -> f32 { self.lo + (i as f32 + 0.5) * self.width }
}
