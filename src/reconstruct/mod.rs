//! Filtered back-projection, one channel (or window of channels) at a time.

pub mod filter;
pub mod mask;
pub mod radon;
pub mod window;

use std::f64::consts::PI;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::scan::{AxisUnit, ChannelAxis};
use crate::sinogram::Sinogram;
use crate::types::{Anglef32, Slice};

pub use filter::Filter;
pub use mask::CircularMask;
pub use window::{ChannelSelection, Window};

use filter::FourierFilter;
use radon::detector_offset;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reconstructor {
    pub filter: Filter,
    /// Side of the square image; the number of translations if not given
    pub output_size: Option<usize>,
    pub mask: Option<CircularMask>,
}

impl Reconstructor {

    /// Check the arguments of `reconstruct` without doing any work
    pub fn check(&self, projections: usize, translations: usize, angles: usize) -> Result<usize> {
        if projections == 0 {
            return Err(Error::Precondition("no projections to back-project".into()))
        }
        if angles != projections {
            return Err(Error::Precondition(format!("{angles} angles for {projections} projections")))
        }
        if translations < 2 {
            return Err(Error::Precondition(format!("{translations} translations: need at least 2")))
        }
        match self.output_size.unwrap_or(translations) {
            0 => Err(Error::Precondition("output size must be positive".into())),
            size => Ok(size),
        }
    }

    /// Image from a (projection, translation) sinogram and the angle of
    /// every projection in degrees. Pixels outside the inscribed circle are
    /// zero before the optional support mask is applied.
    pub fn reconstruct(&self, sinogram: ArrayView2<f32>, angles: ArrayView1<Anglef32>) -> Result<Slice> {
        let (n, m) = sinogram.dim();
        let size = self.check(n, m, angles.len())?;

        // Projections are zero-padded to the diagonal of the square they
        // were inscribed in, keeping their centres aligned
        let diagonal = (std::f64::consts::SQRT_2 * m as f64).ceil() as usize;
        let before = diagonal / 2 - m / 2;
        let fourier = FourierFilter::new(self.filter, diagonal);
        let filtered = sinogram.outer_iter().map(|projection| {
            let padded = std::iter::repeat(0.0).take(before)
                .chain(projection.iter().copied())
                .chain(std::iter::repeat(0.0))
                .take(diagonal);
            fourier.apply(padded)
        }).collect::<Vec<_>>();

        let mut accumulated = Array2::<f64>::zeros((size, size));
        let radius = (size / 2) as f32;
        let centre = (diagonal / 2) as f32;
        let last = diagonal - 1;
        for (projection, angle) in filtered.iter().zip(angles) {
            let trig = angle.to_radians().sin_cos();
            for ((i, j), pixel) in accumulated.indexed_iter_mut() {
                let t = detector_offset(i as f32 - radius, j as f32 - radius, trig) + centre;
                if t < 0.0 || t > last as f32 { continue }
                let k = t.floor() as usize;
                let frac = (t - k as f32) as f64;
                *pixel += if k < last { projection[k] * (1.0 - frac) + projection[k + 1] * frac }
                          else        { projection[last] };
            }
        }

        let scale = PI / (2.0 * n as f64);
        let r2 = radius * radius;
        let mut image = Array2::from_shape_fn((size, size), |(i, j)| {
            let (r, c) = (i as f32 - radius, j as f32 - radius);
            if r * r + c * c > r2 { 0.0 } else { (accumulated[[i, j]] * scale) as f32 }
        });
        if let Some(mask) = &self.mask { mask.apply(&mut image) }
        Ok(image)
    }
}

/// Reconstructed images stacked along the third axis, with the axis value
/// each of them represents
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedVolume {
    pub data: Array3<f32>,
    pub unit: AxisUnit,
    pub values: Array1<f32>,
}

impl ReconstructedVolume {
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
    pub fn image(&self, k: usize) -> ArrayView2<f32> { self.data.index_axis(Axis(2), k) }
}

/// Reconstruct every selected channel or window on `pool`. `done` is called
/// with the index of each image as it is finished.
pub fn reconstruct_volume(
    sinogram: &Sinogram,
    axis: &ChannelAxis,
    selection: &ChannelSelection,
    reconstructor: &Reconstructor,
    pool: &WorkerPool,
    done: &(dyn Fn(usize) + Sync),
) -> Result<ReconstructedVolume> {
    let (n, m, _) = sinogram.shape();
    if axis.len() != sinogram.n_channels() {
        return Err(Error::ShapeMismatch { what: "channel axis".into(), expected: vec![sinogram.n_channels()], actual: vec![axis.len()] })
    }
    let size = reconstructor.check(n, m, sinogram.angles().len())?;
    let selected = selection.resolve(axis);
    if selected.is_empty() {
        return Err(Error::Precondition("no channels selected".into()))
    }
    log::info!("reconstructing {} images of {size}×{size} with {} workers", selected.len(), pool.workers());

    let images = pool.map_indexed(selected.len(), |k| {
        let slice = window::merged(sinogram, &selected[k].channels);
        let image = reconstructor.reconstruct(slice.view(), sinogram.angles().view())?;
        done(k);
        Ok(image)
    })?;
    let views = images.iter().map(|i| i.view()).collect::<Vec<_>>();
    let data = ndarray::stack(Axis(2), &views)
        .map_err(|e| Error::Precondition(e.to_string()))?;
    Ok(ReconstructedVolume {
        data,
        unit: axis.unit(),
        values: selected.iter().map(|s| s.value).collect(),
    })
}

#[cfg(test)]
mod test_reconstruct {
    use super::*;
    use crate::phantom::Phantom;
    use float_eq::assert_float_eq;
    use rstest::rstest;

    fn angles(n: usize) -> Array1<f32> { Array1::from_iter((0..n).map(|i| i as f32 * 180.0 / n as f32)) }

    /// Pearson correlation and RMS difference over pixels inside `mask`
    fn compare(a: &Slice, b: &Slice, mask: &CircularMask) -> (f32, f32) {
        let size = a.nrows();
        let pairs = a.indexed_iter()
            .filter(|(ij, _)| mask.contains(size, *ij))
            .map(|(ij, &x)| (x, b[ij]))
            .collect::<Vec<_>>();
        let k = pairs.len() as f32;
        let (ma, mb) = pairs.iter().fold((0.0, 0.0), |(sa, sb), (x, y)| (sa + x / k, sb + y / k));
        let (mut cov, mut va, mut vb, mut se) = (0.0, 0.0, 0.0, 0.0);
        for (x, y) in &pairs {
            cov += (x - ma) * (y - mb);
            va  += (x - ma).powi(2);
            vb  += (y - mb).powi(2);
            se  += (x - y).powi(2);
        }
        (cov / (va * vb).sqrt(), (se / k).sqrt())
    }

    #[test]
    fn phantom_round_trip() -> Result<()> {
        let size = 128;
        let phantom = Phantom::shepp_logan().scaled(0.85);
        let truth = phantom.raster(size);
        let angles = angles(180);
        let sinogram = phantom.sinogram(angles.view(), size);
        let image = Reconstructor::default().reconstruct(sinogram.view(), angles.view())?;
        assert_eq!(image.dim(), (size, size));
        let (correlation, rmse) = compare(&image, &truth, &CircularMask { fraction: 0.9 });
        assert!(correlation > 0.9, "correlation {correlation}");
        assert!(rmse < 0.2, "rmse {rmse}");
        Ok(())
    }

    #[test]
    fn forward_projector_round_trip() -> Result<()> {
        let size = 48;
        let truth = Phantom::shepp_logan().scaled(0.85).raster(size);
        let angles = angles(120);
        let sinogram = radon::project(truth.view(), angles.view(), size)?;
        let image = Reconstructor::default().reconstruct(sinogram.view(), angles.view())?;
        let (correlation, _) = compare(&image, &truth, &CircularMask { fraction: 0.9 });
        assert!(correlation > 0.85, "correlation {correlation}");
        Ok(())
    }

    #[test]
    fn outside_the_circle_is_zero() -> Result<()> {
        let sinogram = Array2::ones((30, 20));
        let image = Reconstructor::default().reconstruct(sinogram.view(), angles(30).view())?;
        assert_eq!(image[[0, 0]], 0.0);
        assert_eq!(image[[19, 0]], 0.0);
        Ok(())
    }

    #[test]
    fn mask_fills_with_mean() -> Result<()> {
        let sinogram = Array2::ones((30, 20));
        let masked = Reconstructor { mask: Some(CircularMask::default()), ..Default::default() };
        let image = masked.reconstruct(sinogram.view(), angles(30).view())?;
        assert_ne!(image[[0, 0]], 0.0);
        assert_float_eq!(image[[0, 0]], image[[19, 19]], ulps <= 1);
        Ok(())
    }

    #[rstest(/**/ n, m, n_angles, size,
             case(10, 20,  9, None   ), // angles do not match projections
             case(10,  1, 10, None   ), // too few translations
             case(10, 20, 10, Some(0)), // empty output
             case( 0, 20,  0, None   ), // nothing to back-project
    )]
    fn preconditions(n: usize, m: usize, n_angles: usize, size: Option<usize>) {
        let r = Reconstructor { output_size: size, ..Default::default() }
            .reconstruct(Array2::ones((n, m)).view(), angles(n_angles).view());
        assert!(matches!(r, Err(Error::Precondition(_))));
    }

    #[test]
    fn output_size_is_configurable() -> Result<()> {
        let r = Reconstructor { output_size: Some(12), ..Default::default() };
        let image = r.reconstruct(Array2::ones((8, 20)).view(), angles(8).view())?;
        assert_eq!(image.dim(), (12, 12));
        Ok(())
    }

    #[test]
    fn volume_keeps_channel_order() -> Result<()> {
        use crate::scan::AxisUnit;
        use std::sync::atomic::{AtomicUsize, Ordering};
        let (n, m, c) = (36, 24, 5);
        let phantom = Phantom::shepp_logan().scaled(0.8);
        let base = phantom.sinogram(angles(n).view(), m);
        // Channel k is the phantom scaled by k + 1
        let data = Array3::from_shape_fn((n, m, c), |(i, j, k)| base[[i, j]] * (k + 1) as f32);
        let sinogram = Sinogram::new(data, angles(n), None)?;
        let axis = ChannelAxis::linspace(AxisUnit::TwoTheta, 1.0, 5.0, c);
        let pool = WorkerPool::new(3)?;
        let finished = AtomicUsize::new(0);
        let volume = reconstruct_volume(&sinogram, &axis, &ChannelSelection::All, &Reconstructor::default(), &pool,
                                        &|_| { finished.fetch_add(1, Ordering::SeqCst); })?;
        assert_eq!(finished.load(Ordering::SeqCst), c);
        assert_eq!(volume.data.dim(), (m, m, c));
        assert_eq!(volume.values.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let first = volume.image(0).to_owned();
        for k in 1..c {
            let scaled = &first * (k + 1) as f32;
            for (a, b) in volume.image(k).iter().zip(scaled.iter()) {
                assert_float_eq!(*a, *b, abs <= 1e-3);
            }
        }
        Ok(())
    }

    #[test]
    fn volume_preconditions_fail_before_dispatch() -> Result<()> {
        let sinogram = Sinogram::new(Array3::ones((4, 1, 2)), angles(4), None)?;
        let axis = ChannelAxis::indices(2);
        let pool = WorkerPool::new(2)?;
        let r = reconstruct_volume(&sinogram, &axis, &ChannelSelection::All, &Reconstructor::default(), &pool, &|_| ());
        assert!(matches!(r, Err(Error::Precondition(_))));
        Ok(())
    }
}
