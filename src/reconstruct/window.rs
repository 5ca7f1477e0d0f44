//! Which channels are reconstructed, and how windows of channels are merged
//! into one sinogram.

use std::ops::Range;

use ndarray::{s, Axis};
use serde::Deserialize;

use crate::scan::ChannelAxis;
use crate::sinogram::Sinogram;
use crate::types::Slice;

/// Band of the channel axis, in physical units
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Window {
    pub centre: f32,
    /// Half-width; falls back to the selection's common width
    pub width: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSelection {
    /// Every channel on its own
    All,
    Windows { windows: Vec<Window>, width: f32 },
}

/// Channels feeding one reconstructed image, and the axis value reported
/// for it
#[derive(Debug, Clone, PartialEq)]
pub struct Selected {
    pub channels: Range<usize>,
    pub value: f32,
}

impl ChannelSelection {

    pub fn resolve(&self, axis: &ChannelAxis) -> Vec<Selected> {
        match self {
            ChannelSelection::All => axis.values().iter().enumerate()
                .map(|(c, &value)| Selected { channels: c..c + 1, value })
                .collect(),
            ChannelSelection::Windows { windows, width } => windows.iter()
                .map(|w| Selected {
                    channels: axis.window(w.centre, w.width.unwrap_or(*width)),
                    value: w.centre,
                })
                .collect(),
        }
    }
}

/// Mean over `channels` of the channel slices of `sinogram`
pub fn merged(sinogram: &Sinogram, channels: &Range<usize>) -> Slice {
    if channels.len() == 1 { return sinogram.channel(channels.start).to_owned() }
    sinogram.data()
        .slice(s![.., .., channels.clone()])
        .mean_axis(Axis(2))
        .unwrap_or_else(|| sinogram.channel(channels.start).to_owned())
}
