//! Channel-stacked sinograms: construction, angular sorting, row deletion and
//! binning.

pub mod scan_points;

use std::collections::BTreeSet;

use itertools::Itertools;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayViewMut2, Axis};
use ordered_float::OrderedFloat;

use crate::error::{Error, Result};
use crate::types::{Angles, Intensityf32, Shape3_u, Slice, Volume};

/// Intensities indexed by (projection, translation, channel), the rotation
/// angle of every projection and, optionally, the beam monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sinogram {
    data: Volume,
    angles: Angles,
    monitor: Option<Slice>,
}

impl Sinogram {

    pub fn new(data: Volume, angles: Angles, monitor: Option<Slice>) -> Result<Self> {
        let (n, m, _) = data.dim();
        if n == 0 { return Err(Error::EmptyAcquisition) }
        if angles.len() != n {
            return Err(Error::AngleMismatch { angles: angles.len(), rows: n })
        }
        if let Some(bad) = angles.iter().position(|a| !a.is_finite()) {
            return Err(Error::NonFiniteAngle(bad))
        }
        if let Some(monitor) = &monitor {
            if monitor.dim() != (n, m) {
                return Err(Error::ShapeMismatch {
                    what: "monitor".into(),
                    expected: vec![n, m],
                    actual: monitor.shape().to_vec(),
                })
            }
        }
        Ok(Self { data, angles, monitor })
    }

    pub fn data   (&self) -> &Volume         { &self.data }
    pub fn angles (&self) -> &Angles         { &self.angles }
    pub fn monitor(&self) -> Option<&Slice>  { self.monitor.as_ref() }
    pub fn shape  (&self) -> Shape3_u        { self.data.dim() }

    pub fn n_projections (&self) -> usize { self.data.len_of(Axis(0)) }
    pub fn n_translations(&self) -> usize { self.data.len_of(Axis(1)) }
    pub fn n_channels    (&self) -> usize { self.data.len_of(Axis(2)) }

    /// Intensities may be corrected in place; the shape is fixed.
    pub fn data_mut(&mut self) -> &mut Volume { &mut self.data }

    pub fn channel(&self, c: usize) -> ArrayView2<Intensityf32> { self.data.index_axis(Axis(2), c) }

    pub fn channel_mut(&mut self, c: usize) -> ArrayViewMut2<Intensityf32> { self.data.index_axis_mut(Axis(2), c) }

    /// Owned copy of channel `c`, with bounds checking
    pub fn try_channel(&self, c: usize) -> Result<Slice> {
        let channels = self.n_channels();
        if c >= channels { return Err(Error::ChannelOutOfRange { channel: c, channels }) }
        Ok(self.channel(c).to_owned())
    }

    pub fn into_parts(self) -> (Volume, Angles, Option<Slice>) { (self.data, self.angles, self.monitor) }

    pub fn is_sorted(&self) -> bool {
        self.angles.iter().tuple_windows().all(|(a, b)| a <= b)
    }

    /// Reorder projections by non-decreasing angle. The sort is stable, so
    /// projections with equal angles keep their acquisition order. Every
    /// projection is kept.
    pub fn sorted(self) -> Self {
        let order = argsort(&self.angles);
        if order.iter().enumerate().all(|(i, &o)| i == o) { return self }
        log::debug!("reordering {} projections by angle", order.len());
        self.select_rows(&order)
    }

    /// Remove projections by (post-sort) index, all in one pass.
    pub fn delete_rows(&self, rows: &[usize]) -> Result<Self> {
        let n = self.n_projections();
        if let Some(&row) = rows.iter().find(|&&r| r >= n) {
            return Err(Error::RowOutOfRange { row, rows: n })
        }
        let doomed: BTreeSet<usize> = rows.iter().copied().collect();
        if doomed.is_empty() { return Ok(self.clone()) }
        let keep = (0..n).filter(|i| !doomed.contains(i)).collect_vec();
        if keep.is_empty() { return Err(Error::EmptyAcquisition) }
        log::info!("deleting projections {doomed:?}");
        Ok(self.select_rows(&keep))
    }

    /// Sum `factor × factor` blocks of (projection, translation) samples. The
    /// angle of a binned projection is the mean of its block. Samples that do
    /// not fill a whole block are dropped.
    pub fn binned(self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::Precondition("binning factor must be at least 1".into()))
        }
        if factor == 1 { return Ok(self) }
        let (n, m, c) = self.shape();
        let (nb, mb) = (n / factor, m / factor);
        if nb == 0 || mb == 0 {
            return Err(Error::Precondition(format!("cannot bin {n}×{m} samples by {factor}")))
        }
        let mut data = Array3::zeros((nb, mb, c));
        for ((i, j), mut pattern) in indexed_lanes(&mut data) {
            let block = self.data.slice(s![i*factor..(i+1)*factor, j*factor..(j+1)*factor, ..]);
            pattern += &block.sum_axis(Axis(0)).sum_axis(Axis(0));
        }
        let angles = Array1::from_iter((0..nb).map(|i| {
            self.angles.slice(s![i*factor..(i+1)*factor]).mean().unwrap_or(0.0)
        }));
        let monitor = self.monitor.map(|mon| bin_slice(&mon, factor, nb, mb));
        Sinogram::new(data, angles, monitor)
    }

    /// Pattern averaged over every (projection, translation) sample
    pub fn mean_pattern(&self) -> Array1<Intensityf32> {
        let (n, m, _) = self.shape();
        self.data.sum_axis(Axis(0)).sum_axis(Axis(0)) / (n * m) as Intensityf32
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            data:    self.data  .select(Axis(0), rows),
            angles:  self.angles.select(Axis(0), rows),
            monitor: self.monitor.as_ref().map(|m| m.select(Axis(0), rows)),
        }
    }
}

/// Data as read from a container, before it is arranged on the regular
/// (projection, translation) grid
#[derive(Debug, Clone)]
pub enum Acquisition {
    Grid(Sinogram),
    ScanPoints(scan_points::ScanPoints),
}

impl Acquisition {

    /// Regular-grid sinogram, `binning × binning` samples per bin. Grid
    /// acquisitions are sorted before binning so that blocks hold
    /// neighbouring angles.
    pub fn assemble(self, binning: usize) -> Result<Sinogram> {
        match self {
            Acquisition::Grid(sinogram) if binning == 1 => Ok(sinogram),
            Acquisition::Grid(sinogram) => sinogram.sorted().binned(binning),
            Acquisition::ScanPoints(points) => points.to_sinogram(binning),
        }
    }
}

/// Indices that would sort `values`, keeping equal values in their original
/// order
pub fn argsort(values: &Array1<f32>) -> Vec<usize> {
    let mut order = (0..values.len()).collect_vec();
    order.sort_by_key(|&i| OrderedFloat(values[i]));
    order
}

fn indexed_lanes(data: &mut Array3<f32>) -> impl Iterator<Item = ((usize, usize), ndarray::ArrayViewMut1<'_, f32>)> {
    let mb = data.len_of(Axis(1));
    data.lanes_mut(Axis(2))
        .into_iter()
        .enumerate()
        .map(move |(k, lane)| ((k / mb, k % mb), lane))
}

fn bin_slice(slice: &Array2<f32>, factor: usize, nb: usize, mb: usize) -> Array2<f32> {
    Array2::from_shape_fn((nb, mb), |(i, j)| {
        slice.slice(s![i*factor..(i+1)*factor, j*factor..(j+1)*factor]).sum()
    })
}
