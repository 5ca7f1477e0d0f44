//! What a scan looks like: its channel axis and the validated description of
//! where its data live.

use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use ordered_float::OrderedFloat;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::Shape3_u;

/// Physical quantity carried by the third (channel) axis of an acquisition
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AxisUnit {
    /// Scattering angle 2θ in degrees (XRD-CT)
    #[default]
    TwoTheta,
    /// Momentum transfer (PDF-CT)
    Q,
    /// Photon energy in keV (XRF-CT)
    Energy,
    /// Bare channel index
    Channel,
}

impl AxisUnit {
    /// Name of the dataset holding axis values next to saved volumes
    pub fn dataset_name(self) -> &'static str {
        match self {
            AxisUnit::TwoTheta => "tth",
            AxisUnit::Q        => "q",
            AxisUnit::Energy   => "energy",
            AxisUnit::Channel  => "channel",
        }
    }

    /// Column heading in exported patterns
    pub fn label(self) -> &'static str {
        match self {
            AxisUnit::TwoTheta => "tth(deg)",
            AxisUnit::Q        => "q(nm^-1)",
            AxisUnit::Energy   => "E(keV)",
            AxisUnit::Channel  => "channel",
        }
    }
}

/// Physical value of every channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAxis {
    unit: AxisUnit,
    values: Array1<f32>,
}

impl ChannelAxis {

    pub fn new(unit: AxisUnit, values: Array1<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::ShapeMismatch { what: "channel axis".into(), expected: vec![1], actual: vec![0] })
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Pattern { path: "<channel axis>".into(), line: 0, reason: "non-finite axis value".into() })
        }
        Ok(Self { unit, values })
    }

    /// `n` channels labelled by their index
    pub fn indices(n: usize) -> Self {
        Self { unit: AxisUnit::Channel, values: Array1::from_iter((0..n).map(|i| i as f32)) }
    }

    /// `n` channels evenly spread over `[min, max]`
    pub fn linspace(unit: AxisUnit, min: f32, max: f32, n: usize) -> Self {
        Self { unit, values: Array1::linspace(min, max, n) }
    }

    pub fn unit  (&self) -> AxisUnit      { self.unit }
    pub fn values(&self) -> &Array1<f32>  { &self.values }
    pub fn len   (&self) -> usize         { self.values.len() }
    pub fn is_empty(&self) -> bool        { self.values.is_empty() }

    pub fn min(&self) -> f32 { self.values.iter().copied().fold(f32::INFINITY, f32::min) }
    pub fn max(&self) -> f32 { self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max) }

    /// Channels per physical unit, assuming even spacing
    pub fn density(&self) -> f32 {
        let span = self.max() - self.min();
        if span > 0.0 { self.len() as f32 / span } else { 0.0 }
    }

    /// Index of the channel whose value is closest to `value`
    pub fn nearest(&self, value: f32) -> usize {
        self.values.iter()
            .enumerate()
            .min_by_key(|(_, v)| OrderedFloat((*v - value).abs()))
            .map_or(0, |(i, _)| i)
    }

    /// Physical half-width converted to a whole number of channels
    pub fn channels_in(&self, width: f32) -> usize {
        (self.density() * width.max(0.0)).round() as usize
    }

    /// Channels averaged for a window centred on `centre` with half-width
    /// `width`: `[idx - w, idx + w)`, clamped to the axis and never empty.
    pub fn window(&self, centre: f32, width: f32) -> Range<usize> {
        let idx = self.nearest(centre);
        let w = self.channels_in(width);
        let lo = idx.saturating_sub(w);
        let hi = (idx + w).min(self.len());
        if hi > lo { lo..hi } else { idx..idx + 1 }
    }
}

/// How the rotation angle was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// One angle per projection; translations form a regular grid
    Grid,
    /// Rotation and translation recorded for every sample point
    ScanPoints,
}

/// Location of the datasets making up a scan inside its container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub data: String,
    pub angles: String,
    pub axis: Option<String>,
    pub monitor: Option<String>,
    pub translations: Option<String>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            data: "data/data".into(),
            angles: "data/theta".into(),
            axis: Some("data/dataX".into()),
            monitor: None,
            translations: None,
        }
    }
}

/// Validated description of a scan. Produced once by discovery; there is no
/// way to modify it afterwards.
#[derive(Debug, Clone)]
pub struct ScanDescriptor {
    source: PathBuf,
    layout: Layout,
    shape: Shape3_u,
    geometry: Geometry,
    axis: ChannelAxis,
    monitor: bool,
}

/// Shapes found in a container, to be checked against each other
#[derive(Debug, Clone, Default)]
pub struct FoundShapes {
    pub data: Vec<usize>,
    pub angles: Vec<usize>,
    pub translations: Option<Vec<usize>>,
    pub monitor: Option<Vec<usize>>,
}

impl ScanDescriptor {

    /// Check that all shapes agree. Every inconsistency is an input error.
    pub fn new(source: &Path, layout: Layout, shapes: FoundShapes, axis: Option<ChannelAxis>) -> Result<Self> {
        let FoundShapes { data, angles, translations, monitor } = shapes;
        let shape = match data[..] {
            [0, _, _]                       => return Err(Error::EmptyAcquisition),
            [n, m, c] if m > 0 && c > 0     => (n, m, c),
            _ => return Err(Error::ShapeMismatch { what: layout.data.clone(), expected: vec![0, 0, 0], actual: data }),
        };
        let (n, m, c) = shape;
        let geometry = match angles[..] {
            [a] if a == n => Geometry::Grid,
            [a]           => return Err(Error::AngleMismatch { angles: a, rows: n }),
            [a, b] if a == n && b == m => {
                match translations {
                    Some(t) if t == [n, m] => Geometry::ScanPoints,
                    Some(t) => return Err(mismatch("translations", &[n, m], t)),
                    None    => return Err(mismatch("translations", &[n, m], vec![])),
                }
            }
            _ => return Err(mismatch(&layout.angles, &[n], angles)),
        };
        if let Some(s) = &monitor {
            if s[..] != [n, m] { return Err(mismatch("monitor", &[n, m], s.clone())) }
        }
        let axis = match axis {
            Some(axis) if axis.len() == c => axis,
            Some(axis) => return Err(mismatch("channel axis", &[c], vec![axis.len()])),
            None       => ChannelAxis::indices(c),
        };
        Ok(Self { source: source.to_path_buf(), layout, shape, geometry, axis, monitor: monitor.is_some() })
    }

    pub fn source  (&self) -> &Path        { &self.source }
    pub fn layout  (&self) -> &Layout      { &self.layout }
    pub fn shape   (&self) -> Shape3_u     { self.shape }
    pub fn geometry(&self) -> Geometry     { self.geometry }
    pub fn axis    (&self) -> &ChannelAxis { &self.axis }
    pub fn has_monitor(&self) -> bool      { self.monitor }
}

fn mismatch(what: &str, expected: &[usize], actual: Vec<usize>) -> Error {
    Error::ShapeMismatch { what: what.into(), expected: expected.to_vec(), actual }
}
