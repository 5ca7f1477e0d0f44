use float_eq::assert_float_eq;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use pretty_assertions::assert_eq;

use xrdct::config::pipeline::Config;
use xrdct::correct::drift::{shift, DriftProfile};
use xrdct::correct::{LogEntry, Outcome, Stage};
use xrdct::io::{xy, Saved};
use xrdct::phantom::Phantom;
use xrdct::pipeline::{Pipeline, RunContext};
use xrdct::scan::{AxisUnit, ChannelAxis};
use xrdct::sinogram::{Acquisition, Sinogram};
use xrdct::Result;

const M: usize = 48;
const N: usize = 72;

/// Angles over 180° in a scrambled acquisition order
fn scrambled_angles() -> Array1<f32> {
    Array1::from_iter((0..N).map(|i| ((i * 29) % N) as f32 * 180.0 / N as f32))
}

fn correlation(a: ArrayView2<f32>, b: ArrayView2<f32>) -> f32 {
    let (ma, mb) = (a.mean().unwrap_or(0.0), b.mean().unwrap_or(0.0));
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - ma) * (y - mb);
        va  += (x - ma).powi(2);
        vb  += (y - mb).powi(2);
    }
    cov / (va * vb).sqrt()
}

fn config(dir: &std::path::Path, corrections: &str) -> Config {
    let text = format!(r#"
        [input]
        file = "{}"
        [output]
        directory = "{}"
        {corrections}
    "#, dir.join("phantom.h5").display(), dir.join("results").display());
    let config: Config = toml::from_str(&text).unwrap();
    config.validate().unwrap();
    config
}

/// Channel 0 sees only air; channels 1 and 2 see the phantom with weights 1
/// and 2 on top of the air. A few hot pixels are added to channel 2.
fn acquisition(air: &Array1<f32>) -> (Sinogram, Phantom) {
    let phantom = Phantom::shepp_logan().scaled(0.8);
    let angles = scrambled_angles();
    let projections = phantom.sinogram(angles.view(), M);
    let mut data = Array3::from_shape_fn((N, M, 3), |(i, j, k)| projections[[i, j]] * k as f32 + air[k]);
    for (i, j) in [(5, 20), (40, 30), (66, 10)] {
        data[[i, j, 2]] = 1e4;
    }
    (Sinogram::new(data, angles, None).unwrap(), phantom)
}

#[test]
fn corrected_scan_reconstructs_the_phantom() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let air = Array1::from(vec![2.0, 3.0, 4.0]);
    let air_path = dir.path().join("air.xy");
    let axis = ChannelAxis::linspace(AxisUnit::TwoTheta, 1.0, 3.0, 3);
    xy::write(&air_path, "tth(deg)", axis.values().view(), air.view())?;

    let config = config(dir.path(), &format!(r#"
        [corrections]
        outliers = {{ tolerance = 3.0 }}
        air = {{ pattern = "{}", anchor = 0 }}
    "#, air_path.display()));
    let pipeline = Pipeline::new(&config)?;
    assert_eq!(pipeline.chain().stages(), vec![Stage::Outliers, Stage::Air]);

    let context = RunContext::new(3, false)?;
    let (raw, phantom) = acquisition(&air);
    let state = pipeline.correct(Acquisition::Grid(raw), &context)?;
    let stages = state.log().iter().map(|LogEntry { stage, .. }| *stage).collect::<Vec<_>>();
    assert_eq!(stages, vec![Stage::Sort, Stage::Outliers, Stage::Air]);
    assert!(matches!(state.log()[1].outcome, Outcome::Repaired(n) if n >= 3));

    let sinogram = state.sinogram();
    assert!(sinogram.is_sorted());
    assert!(sinogram.data().iter().all(|&v| v < 1e3), "hot pixels survived");
    // Air is gone: the blank channel is zero and the others are the phantom
    assert!(sinogram.channel(0).iter().all(|&v| v.abs() < 1e-4));
    let expected = phantom.sinogram(sinogram.angles().view(), M);
    assert_float_eq!(sinogram.channel(1)[[10, 24]], expected[[10, 24]], rmax <= 0.05);

    let finished = pipeline.finish(sinogram, &axis, &context, &|_| ())?;
    assert!(finished.failure.is_none());
    let volume = finished.volume.unwrap();
    assert_eq!(volume.data.dim(), (M, M, 3));
    assert_eq!(volume.values.to_vec(), vec![1.0, 2.0, 3.0]);

    // Corrected data reconstruct like data that never needed correcting
    let clean = phantom.sinogram(sinogram.angles().view(), M) * 2.0;
    let baseline = config.reconstruction.reconstructor(1).reconstruct(clean.view(), sinogram.angles().view())?;
    let inner = s![8..40, 8..40];
    let r = correlation(volume.image(2).slice(inner), baseline.slice(inner));
    assert!(r > 0.95, "correlation {r}");

    assert_eq!(finished.pattern, Some(Saved::Written(dir.path().join("results/phantom_sum.xy"))));
    Ok(())
}

#[test]
fn existing_outputs_are_kept_unless_overwriting() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = config(dir.path(), "[reconstruction]\nenabled = false");
    let axis = ChannelAxis::indices(3);
    let (raw, _) = acquisition(&Array1::zeros(3));
    let sinogram = Pipeline::new(&config)?.correct(Acquisition::Grid(raw), &RunContext::new(1, false)?)?.into_sinogram();

    let first = Pipeline::new(&config)?.finish(&sinogram, &axis, &RunContext::new(1, false)?, &|_| ())?;
    assert!(matches!(first.pattern, Some(Saved::Written(_))));
    assert!(first.volume.is_none());

    let second = Pipeline::new(&config)?.finish(&sinogram, &axis, &RunContext::new(1, false)?, &|_| ())?;
    assert!(matches!(second.pattern, Some(Saved::Skipped(_))));

    config.output.overwrite = true;
    let third = Pipeline::new(&config)?.finish(&sinogram, &axis, &RunContext::new(1, true)?, &|_| ())?;
    assert!(matches!(third.pattern, Some(Saved::Written(_))));
    Ok(())
}

#[test]
fn drift_correction_recentres_every_projection() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path(), "[corrections]\ndrift = { reference_channel = 1 }");
    let phantom = Phantom::shepp_logan().scaled(0.6);
    let angles = Array1::from_iter((0..N).map(|i| i as f32 * 180.0 / N as f32));
    let clean = phantom.sinogram(angles.view(), M);
    let centred = DriftProfile::estimate_slice(clean.view());

    // Every projection wanders sideways by up to three samples
    let mut drifted = Array2::zeros((N, M));
    for (i, (row, mut out)) in clean.outer_iter().zip(drifted.outer_iter_mut()).enumerate() {
        let mut moved = row.to_owned();
        shift(moved.view_mut(), 3.0 * (i as f32 * 0.3).sin() - centred.offsets()[i]);
        out.assign(&moved);
    }
    let data = ndarray::stack(Axis(2), &[drifted.view(), drifted.view()]).unwrap();
    let raw = Sinogram::new(data, angles, None)?;

    let state = Pipeline::new(&config)?.correct(Acquisition::Grid(raw), &RunContext::new(2, false)?)?;
    let after = DriftProfile::estimate(state.sinogram(), 1)?;
    for &offset in after.offsets() {
        assert!(offset.abs() < 0.1, "residual drift {offset}");
    }
    Ok(())
}

#[test]
fn scan_points_are_binned_onto_a_grid() -> Result<()> {
    use xrdct::sinogram::scan_points::ScanPoints;
    // Rotation and translation recorded at every point of a 2N × 2M raster
    let (n, m) = (2 * N, 2 * M);
    let rotation    = Array2::from_shape_fn((n, m), |(i, _)| i as f32 * 180.0 / n as f32);
    let translation = Array2::from_shape_fn((n, m), |(_, j)| j as f32);
    let data = Array3::from_shape_fn((n, m, 1), |(i, j, _)| if (i + j) % 2 == 0 { 1.0 } else { 0.0 });
    let points = ScanPoints::new(data, rotation, translation)?;
    let sinogram = Acquisition::ScanPoints(points).assemble(2)?;
    assert_eq!(sinogram.shape(), (N, M, 1));
    // Each 2×2 block holds two lit points
    assert!(sinogram.data().iter().all(|&v| v == 2.0));
    Ok(())
}
