//! Intensity normalisation. A zero denominator never produces NaN: whatever
//! it would have divided is left as it was and reported.

use ndarray::{ArrayViewMut2, Axis, Zip};
use ndarray::parallel::prelude::*;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sinogram::Sinogram;
use crate::types::Intensityf32;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    /// Divide each row of each channel by its sum
    RowSum,
    /// Rescale each channel to [0, 1]
    MinMax,
    /// Divide every pattern by the beam monitor reading taken with it
    Monitor,
    /// Divide each projection by its mean channel-averaged intensity
    ChannelMean,
}

/// Part of the data left untouched by a numerical guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skipped {
    Row        { channel: usize, row: usize },
    Slice      { channel: usize },
    Sample     { row: usize, translation: usize },
    Projection { row: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardReport {
    pub skipped: Vec<Skipped>,
}

impl GuardReport {
    pub fn is_empty(&self) -> bool { self.skipped.is_empty() }
    pub fn len(&self) -> usize { self.skipped.len() }
}

impl Normalization {

    pub fn apply(self, sinogram: &mut Sinogram) -> Result<GuardReport> {
        use Normalization::*;
        let skipped = match self {
            RowSum      => per_channel(sinogram, |c, slice| {
                row_sum(slice).into_iter().map(|row| Skipped::Row { channel: c, row }).collect()
            }),
            MinMax      => per_channel(sinogram, |c, slice| {
                if min_max(slice) { vec![] } else { vec![Skipped::Slice { channel: c }] }
            }),
            Monitor     => by_monitor(sinogram)?,
            ChannelMean => by_channel_mean(sinogram),
        };
        let report = GuardReport { skipped };
        if !report.is_empty() {
            log::warn!("{self:?} normalisation: {} zero denominators left unnormalised", report.len());
            log::debug!("{:?}", report.skipped);
        }
        Ok(report)
    }
}

fn per_channel<F>(sinogram: &mut Sinogram, f: F) -> Vec<Skipped>
where
    F: Fn(usize, ArrayViewMut2<Intensityf32>) -> Vec<Skipped> + Sync,
{
    sinogram.data_mut()
        .axis_iter_mut(Axis(2))
        .into_par_iter()
        .enumerate()
        .flat_map_iter(|(c, slice)| f(c, slice))
        .collect()
}

/// Divide each row by its sum. Returns the rows that sum to zero.
pub fn row_sum(mut slice: ArrayViewMut2<Intensityf32>) -> Vec<usize> {
    let mut skipped = vec![];
    for (i, mut row) in slice.outer_iter_mut().enumerate() {
        let total = row.sum();
        if usable(total) { row /= total }
        else             { skipped.push(i) }
    }
    skipped
}

/// Rescale to [0, 1]. Returns false, leaving the slice as it was, when the
/// slice is flat.
pub fn min_max(mut slice: ArrayViewMut2<Intensityf32>) -> bool {
    let min = slice.iter().copied().fold(f32::INFINITY, f32::min);
    let max = slice.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !usable(range) { return false }
    slice.mapv_inplace(|v| (v - min) / range);
    true
}

fn by_monitor(sinogram: &mut Sinogram) -> Result<Vec<Skipped>> {
    let monitor = sinogram.monitor().ok_or(Error::NoMonitor)?.clone();
    let mut skipped = vec![];
    for ((row, translation), &m) in monitor.indexed_iter() {
        if usable(m) {
            let mut pattern = sinogram.data_mut().slice_mut(ndarray::s![row, translation, ..]);
            pattern /= m;
        } else {
            skipped.push(Skipped::Sample { row, translation });
        }
    }
    Ok(skipped)
}

fn by_channel_mean(sinogram: &mut Sinogram) -> Vec<Skipped> {
    // Mean over translations of the channel-averaged intensity
    let norms = sinogram.data()
        .mean_axis(Axis(2)).and_then(|a| a.mean_axis(Axis(1)));
    let Some(norms) = norms else { return vec![] };
    let mut skipped = vec![];
    Zip::from(sinogram.data_mut().outer_iter_mut())
        .and(&norms)
        .for_each(|mut projection, &norm| {
            if usable(norm) { projection /= norm }
        });
    for (row, &norm) in norms.iter().enumerate() {
        if !usable(norm) { skipped.push(Skipped::Projection { row }) }
    }
    skipped
}

fn usable(denominator: f32) -> bool { denominator != 0.0 && denominator.is_finite() }
