//! Ellipse phantoms with exact projections, for synthetic scans and for
//! testing reconstructions.

use ndarray::{Array2, ArrayView1};

use crate::types::{Anglef32, Slice};

/// Ellipse in coordinates where the reconstruction circle has radius 1 and
/// `y` points up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub intensity: f32,
    pub centre: (f32, f32),
    /// Semi-axes along `x` and `y` before rotation
    pub axes: (f32, f32),
    /// Anticlockwise rotation, in degrees
    pub rotation: Anglef32,
}

impl Ellipse {

    fn contains(&self, x: f32, y: f32) -> bool {
        let (s, c) = self.rotation.to_radians().sin_cos();
        let (dx, dy) = (x - self.centre.0, y - self.centre.1);
        let u =  dx * c + dy * s;
        let v = -dx * s + dy * c;
        let (a, b) = self.axes;
        (u / a).powi(2) + (v / b).powi(2) <= 1.0
    }

    /// Length of the chord at signed distance `t` from the origin,
    /// perpendicular to the direction `theta` (radians), times the intensity
    fn line_integral(&self, theta: f32, t: f32) -> f32 {
        let (a, b) = self.axes;
        let (st, ct) = theta.sin_cos();
        let (sp, cp) = (theta - self.rotation.to_radians()).sin_cos();
        let a2 = (a * cp).powi(2) + (b * sp).powi(2);
        let s = t - (self.centre.0 * ct + self.centre.1 * st);
        if s * s >= a2 { return 0.0 }
        2.0 * self.intensity * a * b * (a2 - s * s).sqrt() / a2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phantom {
    ellipses: Vec<Ellipse>,
}

impl Phantom {

    pub fn new(ellipses: Vec<Ellipse>) -> Self { Self { ellipses } }

    /// Shepp-Logan head phantom with the higher-contrast intensities of the
    /// modified version
    pub fn shepp_logan() -> Self {
        let e = |intensity, x, y, a, b, rotation| Ellipse { intensity, centre: (x, y), axes: (a, b), rotation };
        Self::new(vec![
            e( 1.0,  0.0 ,  0.0   , 0.69  , 0.92 ,   0.0),
            e(-0.8,  0.0 , -0.0184, 0.6624, 0.874,   0.0),
            e(-0.2,  0.22,  0.0   , 0.11  , 0.31 , -18.0),
            e(-0.2, -0.22,  0.0   , 0.16  , 0.41 ,  18.0),
            e( 0.1,  0.0 ,  0.35  , 0.21  , 0.25 ,   0.0),
            e( 0.1,  0.0 ,  0.1   , 0.046 , 0.046,   0.0),
            e( 0.1,  0.0 , -0.1   , 0.046 , 0.046,   0.0),
            e( 0.1, -0.08, -0.605 , 0.046 , 0.023,   0.0),
            e( 0.1,  0.0 , -0.606 , 0.023 , 0.023,   0.0),
            e( 0.1,  0.06, -0.605 , 0.023 , 0.046,   0.0),
        ])
    }

    /// Shrink (or grow) every ellipse about the origin
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.ellipses.into_iter().map(|e| Ellipse {
            centre: (e.centre.0 * factor, e.centre.1 * factor),
            axes:   (e.axes.0   * factor, e.axes.1   * factor),
            ..e
        }).collect())
    }

    pub fn ellipses(&self) -> &[Ellipse] { &self.ellipses }

    /// `size × size` image sampled at pixel centres; row 0 is the top
    pub fn raster(&self, size: usize) -> Slice {
        let radius = (size / 2) as f32;
        Array2::from_shape_fn((size, size), |(i, j)| {
            let (x, y) = ((j as f32 - radius) / radius, (radius - i as f32) / radius);
            self.ellipses.iter().filter(|e| e.contains(x, y)).map(|e| e.intensity).sum()
        })
    }

    /// Exact line integrals in pixel units, one projection per angle
    /// (degrees), `translations` samples per projection centred on
    /// `translations / 2`
    pub fn sinogram(&self, angles: ArrayView1<Anglef32>, translations: usize) -> Slice {
        let radius = (translations / 2) as f32;
        Array2::from_shape_fn((angles.len(), translations), |(i, j)| {
            let theta = angles[i].to_radians();
            let t = (j as f32 - radius) / radius;
            radius * self.ellipses.iter().map(|e| e.line_integral(theta, t)).sum::<f32>()
        })
    }
}
