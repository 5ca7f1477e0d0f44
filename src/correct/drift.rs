//! Translation drift: per-projection centre of mass and its removal.

use ndarray::{Array1, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip};
use ndarray::parallel::prelude::*;

use crate::error::{Error, Result};
use crate::sinogram::Sinogram;
use crate::types::{Intensityf32, Pixelsf32};

/// Offset of every projection's centre of mass from the middle of the scan
#[derive(Debug, Clone, PartialEq)]
pub struct DriftProfile {
    offsets: Array1<Pixelsf32>,
    skipped: Vec<usize>,
}

impl DriftProfile {

    /// Centres of mass measured in one channel of the sinogram
    pub fn estimate(sinogram: &Sinogram, reference_channel: usize) -> Result<Self> {
        let channels = sinogram.n_channels();
        if reference_channel >= channels {
            return Err(Error::ChannelOutOfRange { channel: reference_channel, channels })
        }
        Ok(Self::estimate_slice(sinogram.channel(reference_channel)))
    }

    /// `Σ x I(x) / Σ I(x) - M/2` for every row of `slice`. Rows whose
    /// intensity does not sum to a finite, non-zero value get no offset.
    pub fn estimate_slice(slice: ArrayView2<Intensityf32>) -> Self {
        let half = slice.ncols() as f32 / 2.0;
        let mut skipped = vec![];
        let offsets = slice.outer_iter().enumerate().map(|(i, row)| {
            match centre_of_mass(row) {
                Some(com) => com - half,
                None      => { skipped.push(i); 0.0 }
            }
        }).collect::<Array1<_>>();
        if !skipped.is_empty() {
            log::warn!("no drift estimate for projections {skipped:?}: zero total intensity");
        }
        Self { offsets, skipped }
    }

    pub fn offsets(&self) -> &Array1<Pixelsf32> { &self.offsets }

    /// Projections for which no centre of mass could be computed
    pub fn skipped(&self) -> &[usize] { &self.skipped }

    /// Shift every channel of projection `i` by `-offset[i]`
    pub fn apply(&self, sinogram: &mut Sinogram) -> Result<()> {
        let rows = sinogram.n_projections();
        if self.offsets.len() != rows {
            return Err(Error::ShapeMismatch { what: "drift profile".into(), expected: vec![rows], actual: vec![self.offsets.len()] })
        }
        sinogram.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(self.offsets.to_vec())
            .for_each(|(mut projection, offset)| {
                if offset == 0.0 { return }
                for lane in projection.lanes_mut(Axis(0)) {
                    shift(lane, -offset);
                }
            });
        Ok(())
    }
}

/// Move the rotation centre: every projection of every channel is shifted by
/// `-amount` samples along the translation axis, holding the edge values.
/// Projections never exchange data.
pub fn shift_rows(sinogram: &mut Sinogram, amount: Pixelsf32) {
    if amount == 0.0 { return }
    Zip::from(sinogram.data_mut().lanes_mut(Axis(1)))
        .par_for_each(|lane| shift(lane, -amount));
}

fn centre_of_mass(row: ArrayView1<Intensityf32>) -> Option<f32> {
    let total: f32 = row.sum();
    if total == 0.0 || !total.is_finite() { return None }
    let moment: f32 = row.iter().enumerate().map(|(x, &v)| x as f32 * v).sum();
    Some(moment / total)
}

/// `out[x] = in[x - amount]`, linearly interpolated; samples from beyond
/// either end take the nearest edge value
pub fn shift(mut lane: ArrayViewMut1<Intensityf32>, amount: f32) {
    let n = lane.len();
    if n == 0 || amount == 0.0 { return }
    let input = lane.to_vec();
    let last = (n - 1) as f32;
    for (x, out) in lane.iter_mut().enumerate() {
        let src = (x as f32 - amount).clamp(0.0, last);
        let i = src.floor() as usize;
        let frac = src - i as f32;
        *out = if i + 1 < n { input[i] * (1.0 - frac) + input[i + 1] * frac }
               else         { input[i] };
    }
}

#[cfg(test)]
mod test_drift {
    use super::*;
    use ndarray::{Array2, Array3};
    use float_eq::assert_float_eq;

    fn gaussian(m: usize, centre: f32) -> Array1<f32> {
        Array1::from_iter((0..m).map(|x| (-(x as f32 - centre).powi(2) / (2.0 * 2.0_f32.powi(2))).exp()))
    }

    fn drifting(offsets: &[f32], m: usize, c: usize) -> Sinogram {
        let n = offsets.len();
        let half = m as f32 / 2.0;
        let mut data = Array3::zeros((n, m, c));
        for (i, d) in offsets.iter().enumerate() {
            let row = gaussian(m, half + d);
            for k in 0..c {
                data.slice_mut(ndarray::s![i, .., k]).assign(&(&row * (k + 1) as f32));
            }
        }
        Sinogram::new(data, Array1::zeros(n), None).unwrap()
    }

    #[test]
    fn centred_rows_have_no_drift() {
        let sino = drifting(&[0.0, 0.0, 0.0], 64, 1);
        let profile = DriftProfile::estimate(&sino, 0).unwrap();
        for o in profile.offsets() {
            assert_float_eq!(*o, 0.0, abs <= 1e-4);
        }
    }

    #[test]
    fn zero_offset_leaves_rows_bit_identical() {
        let mut sino = drifting(&[0.5, 1.5], 16, 2);
        let before = sino.clone();
        let profile = DriftProfile { offsets: Array1::zeros(2), skipped: vec![] };
        profile.apply(&mut sino).unwrap();
        assert_eq!(sino, before);
    }

    #[test]
    fn known_drift_is_recovered_and_removed() -> Result<()> {
        let offsets = [-3.0, 2.5, 0.0, 4.25, -1.5];
        let mut sino = drifting(&offsets, 64, 3);
        let profile = DriftProfile::estimate(&sino, 1)?;
        for (measured, expected) in profile.offsets().iter().zip(offsets) {
            assert_float_eq!(*measured, expected, abs <= 1e-3);
        }
        profile.apply(&mut sino)?;
        for c in 0..3 {
            let after = DriftProfile::estimate_slice(sino.channel(c));
            for o in after.offsets() {
                assert_float_eq!(*o, 0.0, abs <= 0.05);
            }
        }
        Ok(())
    }

    #[test]
    fn empty_rows_are_skipped() {
        let mut slice = Array2::ones((3, 4));
        slice.row_mut(1).fill(0.0);
        let profile = DriftProfile::estimate_slice(slice.view());
        assert_eq!(profile.skipped(), &[1]);
        assert_eq!(profile.offsets()[1], 0.0);
        // Uniform row of 4: centre of mass 1.5, middle 2
        assert_float_eq!(profile.offsets()[0], -0.5, ulps <= 1);
    }

    #[test]
    fn reference_channel_out_of_range() {
        let sino = drifting(&[0.0], 8, 2);
        assert!(matches!(DriftProfile::estimate(&sino, 2), Err(Error::ChannelOutOfRange { channel: 2, channels: 2 })));
    }

    #[test]
    fn profile_length_checked() {
        let mut sino = drifting(&[0.0, 0.0], 8, 1);
        let profile = DriftProfile { offsets: Array1::ones(3), skipped: vec![] };
        assert!(profile.apply(&mut sino).is_err());
    }

    #[test]
    fn shift_holds_edges() {
        let mut lane = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        shift(lane.view_mut(), 1.0);
        assert_eq!(lane.to_vec(), vec![1.0, 1.0, 2.0, 3.0]);
        shift(lane.view_mut(), -0.5);
        assert_eq!(lane.to_vec(), vec![1.0, 1.5, 2.5, 3.0]);
    }

    #[test]
    fn constant_row_shift() {
        let data = Array3::from_shape_fn((4, 3, 1), |(i, j, _)| (10 * i + j) as f32);
        let mut sino = Sinogram::new(data, Array1::zeros(4), None).unwrap();
        shift_rows(&mut sino, 0.5);
        for i in 0..4 {
            let base = (10 * i) as f32;
            assert_eq!(sino.data().slice(ndarray::s![i, .., 0]).to_vec(), vec![base + 0.5, base + 1.5, base + 2.0]);
        }
    }

    #[test]
    fn row_shift_moves_peaks_along_translations_only() {
        // One peak per projection at translation 4
        let data = Array3::from_shape_fn((5, 9, 2), |(_, j, _)| if j == 4 { 1.0 } else { 0.0 });
        let mut sino = Sinogram::new(data, Array1::linspace(0.0, 180.0, 5), None).unwrap();
        shift_rows(&mut sino, 1.0);
        for i in 0..5 {
            for k in 0..2 {
                let lane = sino.data().slice(ndarray::s![i, .., k]).to_vec();
                let mut expected = vec![0.0; 9];
                expected[3] = 1.0;
                assert_eq!(lane, expected, "projection {i}, channel {k}");
            }
        }
    }
}
