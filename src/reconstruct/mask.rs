use serde::Deserialize;

use crate::types::{Ratiof32, Slice};

/// Replaces everything outside a centred circle with the image mean
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CircularMask {
    /// Radius as a fraction of half the image width
    pub fraction: Ratiof32,
}

impl Default for CircularMask {
    fn default() -> Self { Self { fraction: 0.9 } }
}

impl CircularMask {

    pub fn apply(&self, image: &mut Slice) {
        let Some(mean) = image.mean() else { return };
        let (rows, cols) = image.dim();
        let (ci, cj) = (rows as f32 / 2.0, cols as f32 / 2.0);
        let radius = self.fraction * rows.min(cols) as f32 / 2.0;
        for ((i, j), v) in image.indexed_iter_mut() {
            let (di, dj) = (i as f32 - ci, j as f32 - cj);
            if di * di + dj * dj > radius * radius { *v = mean }
        }
    }

    pub fn contains(&self, size: usize, (i, j): (usize, usize)) -> bool {
        let c = size as f32 / 2.0;
        let (di, dj) = (i as f32 - c, j as f32 - c);
        let radius = self.fraction * c;
        di * di + dj * dj <= radius * radius
    }
}

#[cfg(test)]
mod test_mask {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn outside_takes_mean() {
        let mut image = Array2::from_shape_fn((10, 10), |(i, j)| (i * 10 + j) as f32);
        let mean = image.mean().unwrap();
        let inside = image[[5, 5]];
        let mask = CircularMask::default();
        mask.apply(&mut image);
        assert_eq!(image[[0, 0]], mean);
        assert_eq!(image[[9, 9]], mean);
        assert_eq!(image[[5, 5]], inside);
        assert!(mask.contains(10, (5, 5)));
        assert!(!mask.contains(10, (0, 0)));
    }

    #[test]
    fn full_mask_keeps_inscribed_circle() {
        let mut image = Array2::from_elem((8, 8), 1.0);
        image[[4, 4]] = 9.0;
        CircularMask { fraction: 1.0 }.apply(&mut image);
        assert_eq!(image[[4, 4]], 9.0);
    }
}
