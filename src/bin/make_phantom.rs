/// Write a synthetic XRD-CT acquisition: a Shepp-Logan phantom whose
/// ellipses carry different diffraction patterns, scanned at shuffled angles.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use ndarray::{Array1, Array2, Array3};

use xrdct::io::{hdf5::write_scan, xy};
use xrdct::phantom::{Ellipse, Phantom};
use xrdct::scan::{AxisUnit, ChannelAxis};
use xrdct::utils::timing::Progress;

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "make_phantom", about = "Write a synthetic XRD-CT scan")]
struct Cli {
    /// HDF5 file to create
    #[clap(short, long, default_value = "data/phantom.h5")]
    out: PathBuf,

    /// Number of translations per projection
    #[clap(short = 'm', long, default_value = "64")]
    translations: usize,

    /// Number of projections over 180°
    #[clap(short = 'n', long, default_value = "90")]
    projections: usize,

    /// Number of channels in every pattern
    #[clap(short, long, default_value = "100")]
    channels: usize,

    /// Also write a flat air-scatter pattern, add it to every sample and
    /// save it here
    #[clap(long)]
    air: Option<PathBuf>,
}

/// Gaussian peak on the 2θ axis
fn peak(axis: &Array1<f32>, centre: f32, sigma: f32) -> Array1<f32> {
    axis.mapv(|x| (-(x - centre).powi(2) / (2.0 * sigma * sigma)).exp())
}

/// `0..n` visited with a stride coprime to `n`
fn shuffled(n: usize) -> Vec<usize> {
    fn gcd(a: usize, b: usize) -> usize { if b == 0 { a } else { gcd(b, a % b) } }
    let stride = (n / 3 + 1..n).find(|&s| gcd(s, n) == 1).unwrap_or(1);
    (0..n).map(|i| (i * stride) % n).collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Cli::parse();
    let Cli { translations: m, projections: n, channels: c, .. } = args;
    let mut progress = Progress::new();

    let axis = ChannelAxis::linspace(AxisUnit::TwoTheta, 1.0, 10.0, c);
    let angles = Array1::from_iter(shuffled(n).into_iter().map(|i| i as f32 * 180.0 / n as f32));

    // Every ellipse is a separate phase with its own peak
    progress.start("Projecting phantom");
    let ellipses = Phantom::shepp_logan().scaled(0.85).ellipses().to_vec();
    let mut data = Array3::<f32>::zeros((n, m, c));
    for (k, ellipse) in ellipses.iter().enumerate() {
        let phase = Phantom::new(vec![Ellipse { intensity: ellipse.intensity.abs(), ..*ellipse }]);
        let sinogram = phase.sinogram(angles.view(), m);
        let pattern = peak(axis.values(), 1.5 + 0.8 * k as f32, 0.1);
        for ((i, j), &weight) in sinogram.indexed_iter() {
            if weight == 0.0 { continue }
            let mut lane = data.slice_mut(ndarray::s![i, j, ..]);
            lane.scaled_add(weight, &pattern);
        }
    }
    progress.done();

    if let Some(path) = &args.air {
        let air = Array1::from_elem(c, 0.5);
        for mut lane in data.lanes_mut(ndarray::Axis(2)) { lane += &air }
        xy::write(path, AxisUnit::TwoTheta.label(), axis.values().view(), air.view())?;
        println!("Wrote air pattern to {}", path.display());
    }

    progress.start(&format!("Writing {}", args.out.display()));
    if let Some(dir) = args.out.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    write_scan(&args.out, &data, &angles, &axis, Some(&Array2::ones((n, m))))?;
    progress.done();
    Ok(())
}
