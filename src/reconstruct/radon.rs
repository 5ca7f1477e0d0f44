//! Forward projection matching the back-projector's geometry

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};
use crate::types::{Anglef32, Slice};

/// Detector coordinate of the image pixel at offset (`row`, `col`) from the
/// rotation centre, for a projection at `angle` radians
#[inline]
pub(crate) fn detector_offset(row: f32, col: f32, (sin, cos): (f32, f32)) -> f32 {
    col * cos - row * sin
}

/// Sinogram of `image` (square) with `translations` detector samples per
/// projection. Each pixel inside the inscribed circle is spread over the two
/// nearest detector samples with linear weights.
pub fn project(image: ArrayView2<f32>, angles: ArrayView1<Anglef32>, translations: usize) -> Result<Slice> {
    let (rows, cols) = image.dim();
    if rows != cols {
        return Err(Error::ShapeMismatch { what: "image".into(), expected: vec![rows, rows], actual: vec![rows, cols] })
    }
    let radius = (rows / 2) as f32;
    let centre = (translations / 2) as f32;
    let mut sinogram = Array2::zeros((angles.len(), translations));
    for (mut projection, angle) in sinogram.outer_iter_mut().zip(angles) {
        let trig = angle.to_radians().sin_cos();
        for ((i, j), &v) in image.indexed_iter() {
            if v == 0.0 { continue }
            let (r, c) = (i as f32 - radius, j as f32 - radius);
            if r * r + c * c > radius * radius { continue }
            let t = detector_offset(r, c, trig) + centre;
            let k = t.floor();
            let frac = t - k;
            let k = k as isize;
            for (bin, w) in [(k, 1.0 - frac), (k + 1, frac)] {
                if bin >= 0 && (bin as usize) < translations {
                    projection[bin as usize] += v * w;
                }
            }
        }
    }
    Ok(sinogram)
}

#[cfg(test)]
mod test_radon {
    use super::*;
    use ndarray::Array1;
    use float_eq::assert_float_eq;

    #[test]
    fn centre_pixel_projects_to_centre() -> Result<()> {
        let mut image = Array2::zeros((9, 9));
        image[[4, 4]] = 2.0;
        let angles = Array1::linspace(0.0, 170.0, 18);
        let sino = project(image.view(), angles.view(), 9)?;
        for projection in sino.outer_iter() {
            assert_float_eq!(projection[4], 2.0, abs <= 1e-5);
            assert_float_eq!(projection.sum(), 2.0, abs <= 1e-5);
        }
        Ok(())
    }

    #[test]
    fn off_centre_pixel_moves_with_angle() -> Result<()> {
        let mut image = Array2::zeros((9, 9));
        image[[4, 6]] = 1.0; // two columns right of centre
        let angles = Array1::from(vec![0.0, 90.0, 180.0]);
        let sino = project(image.view(), angles.view(), 9)?;
        assert_float_eq!(sino[[0, 6]], 1.0, abs <= 1e-5);
        assert_float_eq!(sino[[1, 4]], 1.0, abs <= 1e-5);
        assert_float_eq!(sino[[2, 2]], 1.0, abs <= 1e-5);
        Ok(())
    }

    #[test]
    fn mass_is_conserved() -> Result<()> {
        let image = Array2::from_shape_fn((16, 16), |(i, j)| {
            let (r, c) = (i as f32 - 8.0, j as f32 - 8.0);
            if r * r + c * c < 25.0 { 1.0 } else { 0.0 }
        });
        let angles = Array1::linspace(0.0, 179.0, 30);
        let sino = project(image.view(), angles.view(), 16)?;
        for projection in sino.outer_iter() {
            assert_float_eq!(projection.sum(), image.sum(), rmax <= 1e-5);
        }
        Ok(())
    }

    #[test]
    fn image_must_be_square() {
        let image = Array2::<f32>::zeros((4, 5));
        assert!(project(image.view(), Array1::zeros(1).view(), 4).is_err());
    }
}
