//! Subtraction of a measured background pattern, scaled to match each sample
//! at an anchor channel.

use std::path::Path;

use ndarray::{Array1, Axis, Zip};

use crate::error::{Error, Result};
use crate::io::xy;
use crate::sinogram::Sinogram;
use crate::types::Intensityf32;

/// Two-column pattern: axis value and intensity
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePattern {
    x: Array1<f32>,
    intensity: Array1<Intensityf32>,
}

impl ReferencePattern {

    pub fn new(x: Array1<f32>, intensity: Array1<Intensityf32>) -> Result<Self> {
        if x.len() != intensity.len() {
            return Err(Error::ShapeMismatch { what: "pattern intensity".into(), expected: vec![x.len()], actual: vec![intensity.len()] })
        }
        Ok(Self { x, intensity })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let (x, intensity) = xy::read(path)?;
        Self::new(x, intensity)
    }

    pub fn x        (&self) -> &Array1<f32>          { &self.x }
    pub fn intensity(&self) -> &Array1<Intensityf32> { &self.intensity }
    pub fn len      (&self) -> usize                 { self.x.len() }
    pub fn is_empty (&self) -> bool                  { self.x.is_empty() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSubtraction {
    pub pattern: ReferencePattern,
    pub anchor: usize,
}

impl BackgroundSubtraction {

    /// `s[i,j,:] -= ref[:] * s[i,j,a] / ref[a]` for every sample. After this
    /// every sample is zero at the anchor channel.
    pub fn apply(&self, sinogram: &mut Sinogram) -> Result<()> {
        let channels = sinogram.n_channels();
        let reference = &self.pattern.intensity;
        if reference.len() != channels {
            return Err(Error::PatternLength { pattern: reference.len(), channels })
        }
        if self.anchor >= channels {
            return Err(Error::ChannelOutOfRange { channel: self.anchor, channels })
        }
        let at_anchor = reference[self.anchor];
        if at_anchor == 0.0 || !at_anchor.is_finite() {
            return Err(Error::ZeroAnchor { anchor: self.anchor })
        }
        let anchor = self.anchor;
        Zip::from(sinogram.data_mut().lanes_mut(Axis(2)))
            .par_for_each(|mut pattern| {
                let scale = pattern[anchor] / at_anchor;
                pattern.scaled_add(-scale, reference);
            });
        Ok(())
    }
}
