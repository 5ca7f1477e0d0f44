//! Configuration file parser for the correction and reconstruction pipeline

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, de};

use crate::correct::{check_order, Stage, DEFAULT_ORDER};
use crate::correct::normalize::Normalization;
use crate::correct::outliers::OutlierRepair;
use crate::error::{Error, Result};
use crate::reconstruct::{ChannelSelection, CircularMask, Filter, Reconstructor, Window};
use crate::scan::{AxisUnit, Layout};
use crate::types::{Pixelsf32, Ratiof32};
use crate::utils::parse_list;

/// Rows may be given as a TOML array or as a comma-separated string, as on
/// the command line
fn deserialize_rows<'d, D>(deserializer: D) -> std::result::Result<Vec<usize>, D::Error>
where
    D: Deserializer<'d>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Rows { List(Vec<usize>), Text(String) }

    match Rows::deserialize(deserializer)? {
        Rows::List(rows) => Ok(rows),
        Rows::Text(text) => parse_list(&text).map_err(de::Error::custom),
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub input: Input,

    #[serde(default)]
    pub output: Output,

    #[serde(default)]
    pub corrections: Corrections,

    #[serde(default)]
    pub assembly: Assembly,

    #[serde(default)]
    pub reconstruction: Reconstruction,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Input {
    pub file: PathBuf,

    #[serde(default = "default_data")]
    pub data: String,

    #[serde(default = "default_angles")]
    pub angles: String,

    /// Physical value of every channel; channel indices are used if absent
    #[serde(default = "default_axis")]
    pub axis: Option<String>,

    #[serde(default)]
    pub axis_unit: AxisUnit,

    /// Beam monitor, (projections, translations)
    pub monitor: Option<String>,

    /// Translation of every sample point, for scans with per-point rotation
    pub translations: Option<String>,
}

fn default_data  () -> String         { "data/data" .into() }
fn default_angles() -> String         { "data/theta".into() }
fn default_axis  () -> Option<String> { Some("data/dataX".into()) }

impl Input {
    pub fn layout(&self) -> Layout {
        Layout {
            data: self.data.clone(),
            angles: self.angles.clone(),
            axis: self.axis.clone(),
            monitor: self.monitor.clone(),
            translations: self.translations.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SinogramLayout {
    /// One 2D dataset per channel
    #[default]
    Sliced,
    /// A single 3D dataset
    Stacked,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Output {
    /// Defaults to `results` next to the input file
    pub directory: Option<PathBuf>,

    /// Prefix of every output file; defaults to the input file's stem
    pub stem: Option<String>,

    #[serde(default = "yes")]
    pub sinogram: bool,

    #[serde(default)]
    pub sinogram_layout: SinogramLayout,

    /// Export the pattern averaged over the whole scan
    #[serde(default = "yes")]
    pub pattern: bool,

    #[serde(default)]
    pub overwrite: bool,
}

fn yes() -> bool { true }

impl Default for Output {
    fn default() -> Self {
        Self { directory: None, stem: None, sinogram: true, sinogram_layout: SinogramLayout::default(), pattern: true, overwrite: false }
    }
}

/// Names of the files a run writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub stem: String,
    pub sinogram: PathBuf,
    pub reconstruction: PathBuf,
    pub pattern: PathBuf,
}

impl Output {
    pub fn paths(&self, input: &Path) -> OutputPaths {
        let directory = self.directory.clone().unwrap_or_else(|| {
            input.parent().unwrap_or(Path::new(".")).join("results")
        });
        let stem = self.stem.clone().unwrap_or_else(|| {
            input.file_stem().map_or("scan".into(), |s| s.to_string_lossy().into_owned())
        });
        OutputPaths {
            sinogram:       directory.join(format!("{stem}_corrected.h5")),
            reconstruction: directory.join(format!("{stem}_reconstructed.h5")),
            pattern:        directory.join(format!("{stem}_sum.xy")),
            stem,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Corrections {
    /// Order in which the configured stages run; stages without a
    /// configuration are left out
    #[serde(default = "default_order")]
    pub order: Vec<Stage>,

    #[serde(default)]
    #[serde(deserialize_with = "deserialize_rows")]
    pub delete_rows: Vec<usize>,

    pub outliers: Option<OutlierRepair>,

    pub normalize: Option<Normalization>,

    pub air: Option<Background>,

    pub extra: Option<Background>,

    pub drift: Option<Drift>,

    pub row_shift: Option<Pixelsf32>,
}

fn default_order() -> Vec<Stage> { DEFAULT_ORDER.to_vec() }

impl Default for Corrections {
    fn default() -> Self {
        Self {
            order: default_order(),
            delete_rows: vec![],
            outliers: None,
            normalize: None,
            air: None,
            extra: None,
            drift: None,
            row_shift: None,
        }
    }
}

impl Corrections {
    /// Whether `stage` has been given anything to do
    pub fn configures(&self, stage: Stage) -> bool {
        match stage {
            Stage::Sort       => true,
            Stage::DeleteRows => !self.delete_rows.is_empty(),
            Stage::Outliers   => self.outliers .is_some(),
            Stage::Normalize  => self.normalize.is_some(),
            Stage::Air        => self.air      .is_some(),
            Stage::Extra      => self.extra    .is_some(),
            Stage::Drift      => self.drift    .is_some(),
            Stage::RowShift   => self.row_shift.is_some(),
        }
    }

    /// Configured stages in their configured order
    pub fn active(&self) -> Vec<Stage> {
        self.order.iter().copied().filter(|&s| self.configures(s)).collect()
    }
}

/// Background pattern and the channel at which it is scaled to each sample
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Background {
    pub pattern: PathBuf,
    pub anchor: usize,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Drift {
    pub reference_channel: usize,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Assembly {
    #[serde(default = "default_binning")]
    pub binning: usize,
}

fn default_binning() -> usize { 1 }

impl Default for Assembly {
    fn default() -> Self { Self { binning: default_binning() } }
}

/// `mask = false`, `mask = true` (default fraction) or `mask = 0.8`
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
pub enum MaskSetting {
    Enabled(bool),
    Fraction(Ratiof32),
}

impl Default for MaskSetting {
    fn default() -> Self { MaskSetting::Enabled(true) }
}

impl MaskSetting {
    pub fn mask(self) -> Option<CircularMask> {
        match self {
            MaskSetting::Enabled(false)    => None,
            MaskSetting::Enabled(true)     => Some(CircularMask::default()),
            MaskSetting::Fraction(fraction) => Some(CircularMask { fraction }),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Reconstruction {
    #[serde(default = "yes")]
    pub enabled: bool,

    #[serde(default)]
    pub filter: Filter,

    /// Side of the reconstructed images, counted on the unbinned translation
    /// grid; the number of translations by default
    pub size: Option<usize>,

    #[serde(default)]
    pub mask: MaskSetting,

    /// Reconstruct these windows instead of every channel
    #[serde(default)]
    pub windows: Vec<Window>,

    /// Half-width of windows that do not give their own
    #[serde(default = "default_window_width")]
    pub window_width: f32,

    pub threads: Option<usize>,
}

fn default_window_width() -> f32 { 0.05 }

impl Default for Reconstruction {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: Filter::default(),
            size: None,
            mask: MaskSetting::default(),
            windows: vec![],
            window_width: default_window_width(),
            threads: None,
        }
    }
}

impl Reconstruction {

    /// Back-projector for sinograms assembled with `binning` translations
    /// per sample. An explicit size shrinks with the grid.
    pub fn reconstructor(&self, binning: usize) -> Reconstructor {
        let output_size = self.size.map(|size| (size / binning.max(1)).max(1));
        Reconstructor { filter: self.filter, output_size, mask: self.mask.mask() }
    }

    pub fn selection(&self) -> ChannelSelection {
        if self.windows.is_empty() { ChannelSelection::All }
        else { ChannelSelection::Windows { windows: self.windows.clone(), width: self.window_width } }
    }
}

impl Config {

    /// Semantic checks that TOML parsing cannot express. Every problem is
    /// reported, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = check_order(&self.corrections.order).problems;
        // Only orders that will actually run are worth a warning
        for w in check_order(&self.corrections.active()).warnings { log::warn!("{w}") }
        for stage in [Stage::DeleteRows, Stage::Outliers, Stage::Normalize, Stage::Air, Stage::Extra, Stage::Drift, Stage::RowShift] {
            if self.corrections.configures(stage) && !self.corrections.order.contains(&stage) {
                log::warn!("`{stage}` is configured but not in `corrections.order`: it will not run");
            }
        }
        if let Some(o) = &self.corrections.outliers {
            if !(o.tolerance > 0.0) { problems.push(format!("outliers.tolerance must be positive, got {}", o.tolerance)) }
        }
        if let Some(shift) = self.corrections.row_shift {
            if !shift.is_finite() { problems.push("row_shift must be finite".into()) }
        }
        if self.assembly.binning == 0 { problems.push("assembly.binning must be at least 1".into()) }
        let r = &self.reconstruction;
        if r.size == Some(0) { problems.push("reconstruction.size must be positive".into()) }
        if r.threads == Some(0) { problems.push("reconstruction.threads must be positive".into()) }
        if let MaskSetting::Fraction(f) = r.mask {
            if !(f > 0.0 && f <= 1.0) { problems.push(format!("reconstruction.mask must be in (0, 1], got {f}")) }
        }
        if !(r.window_width >= 0.0) { problems.push("reconstruction.window_width must not be negative".into()) }
        for (k, w) in r.windows.iter().enumerate() {
            if w.width.map_or(false, |w| !(w >= 0.0)) { problems.push(format!("reconstruction.windows[{k}].width must not be negative")) }
            if !w.centre.is_finite() { problems.push(format!("reconstruction.windows[{k}].centre must be finite")) }
        }
        if problems.is_empty() { Ok(()) } else { Err(Error::Config(problems)) }
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}
