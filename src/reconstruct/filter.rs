//! Frequency-domain filters for filtered back-projection

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Filter {
    #[default]
    Ramp,
    SheppLogan,
    Cosine,
    Hamming,
    Hann,
    /// Unfiltered back-projection
    None,
}

/// Length to which projections of `n` samples are zero-padded before
/// filtering: a power of two, at least 64 and at least twice `n`
pub fn padded_length(n: usize) -> usize {
    (2 * n).next_power_of_two().max(64)
}

impl Filter {

    /// Real frequency response for a transform of length `size`, in FFT order
    pub fn response(self, size: usize) -> Vec<f64> {
        let mut response = ramp(size);
        match self {
            Filter::Ramp => {}
            Filter::SheppLogan => {
                for (k, r) in response.iter_mut().enumerate().skip(1) {
                    let omega = PI * fftfreq(k, size);
                    *r *= omega.sin() / omega;
                }
            }
            Filter::Cosine => {
                let window = (0..size).map(|k| (PI * k as f64 / size as f64).sin()).collect::<Vec<_>>();
                multiply(&mut response, &fftshift(&window));
            }
            Filter::Hamming => multiply(&mut response, &fftshift(&cosine_window(size, 0.54, 0.46))),
            Filter::Hann    => multiply(&mut response, &fftshift(&cosine_window(size, 0.5 , 0.5 ))),
            Filter::None    => response.iter_mut().for_each(|r| *r = 1.0),
        }
        response
    }
}

/// Spatial-domain ramp sampled to avoid the DC offset of a discretised
/// `|ω|`, transformed to the frequency domain
fn ramp(size: usize) -> Vec<f64> {
    let half = size / 2;
    let odd = (1..=half).step_by(2).chain((1..half).rev().step_by(2));
    let mut f = vec![Complex64::new(0.0, 0.0); size];
    f[0].re = 0.25;
    for (slot, n) in f.iter_mut().skip(1).step_by(2).zip(odd) {
        slot.re = -1.0 / (PI * n as f64).powi(2);
    }
    FftPlanner::new().plan_fft_forward(size).process(&mut f);
    f.iter().map(|c| 2.0 * c.re).collect()
}

fn fftfreq(k: usize, n: usize) -> f64 {
    let k = if k < (n + 1) / 2 { k as f64 } else { k as f64 - n as f64 };
    k / n as f64
}

fn fftshift(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    (0..n).map(|k| values[(k + n / 2) % n]).collect()
}

/// `alpha - beta cos(2πk / (n-1))`: Hamming and Hann windows
fn cosine_window(n: usize, alpha: f64, beta: f64) -> Vec<f64> {
    if n == 1 { return vec![1.0] }
    (0..n).map(|k| alpha - beta * (2.0 * PI * k as f64 / (n - 1) as f64).cos()).collect()
}

fn multiply(response: &mut [f64], window: &[f64]) {
    response.iter_mut().zip(window).for_each(|(r, w)| *r *= w);
}

/// Zero-pads projections, filters them and returns the filtered samples
pub struct FourierFilter {
    size: usize,
    response: Vec<f64>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for FourierFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FourierFilter")
            .field("size", &self.size)
            .finish()
    }
}

impl FourierFilter {

    /// Filter for projections of `n` samples
    pub fn new(filter: Filter, n: usize) -> Self {
        let size = padded_length(n);
        let mut planner = FftPlanner::new();
        Self {
            size,
            response: filter.response(size),
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    pub fn size(&self) -> usize { self.size }

    /// Filtered copy of `projection`, of the same length
    pub fn apply(&self, projection: impl Iterator<Item = f32>) -> Vec<f64> {
        let mut buffer = vec![Complex64::new(0.0, 0.0); self.size];
        let mut n = 0;
        for (slot, value) in buffer.iter_mut().zip(projection) {
            slot.re = value as f64;
            n += 1;
        }
        self.forward.process(&mut buffer);
        for (b, r) in buffer.iter_mut().zip(&self.response) {
            *b *= r;
        }
        self.inverse.process(&mut buffer);
        let norm = self.size as f64;
        buffer[..n].iter().map(|c| c.re / norm).collect()
    }
}
