//! The correction chain applied to a sorted sinogram before reconstruction.

pub mod background;
pub mod drift;
pub mod normalize;
pub mod outliers;

use std::fmt;

use itertools::Itertools;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::sinogram::Sinogram;
use crate::types::Pixelsf32;

use background::BackgroundSubtraction;
use drift::DriftProfile;
use normalize::{GuardReport, Normalization, Skipped};
use outliers::OutlierRepair;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Always first, never configured
    Sort,
    DeleteRows,
    Outliers,
    Normalize,
    Air,
    Extra,
    Drift,
    RowShift,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Stage::*;
        let name = match self {
            Sort       => "sort",
            DeleteRows => "delete-rows",
            Outliers   => "outliers",
            Normalize  => "normalize",
            Air        => "air",
            Extra      => "extra",
            Drift      => "drift",
            RowShift   => "row-shift",
        };
        f.write_str(name)
    }
}

pub const DEFAULT_ORDER: [Stage; 7] = [
    Stage::DeleteRows, Stage::Outliers, Stage::Normalize,
    Stage::Air, Stage::Extra, Stage::Drift, Stage::RowShift,
];

/// Problems that make an order unusable, and warnings about orders that are
/// allowed but probably unintended
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrderCheck {
    pub problems: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn check_order(order: &[Stage]) -> OrderCheck {
    let mut check = OrderCheck::default();
    let position = |stage| order.iter().position(|&s| s == stage);
    if order.contains(&Stage::Sort) {
        check.problems.push("`sort` is always applied first and cannot be ordered".into());
    }
    for stage in order.iter().duplicates() {
        check.problems.push(format!("stage `{stage}` appears more than once"));
    }
    if let (Some(drift), Some(delete)) = (position(Stage::Drift), position(Stage::DeleteRows)) {
        if drift < delete {
            check.problems.push("`drift` must come after `delete-rows`: deleted rows would bias the drift profile".into());
        }
    }
    if let (Some(drift), Some(outliers)) = (position(Stage::Drift), position(Stage::Outliers)) {
        if drift < outliers {
            check.warnings.push("`drift` runs before `outliers`: hot pixels will bias the centre of mass".into());
        }
    }
    check
}

/// One configured correction
#[derive(Debug, Clone)]
pub enum Correction {
    DeleteRows(Vec<usize>),
    Outliers(OutlierRepair),
    Normalize(Normalization),
    Air(BackgroundSubtraction),
    Extra(BackgroundSubtraction),
    Drift { reference_channel: usize },
    RowShift(Pixelsf32),
}

impl Correction {
    pub fn stage(&self) -> Stage {
        match self {
            Correction::DeleteRows(_) => Stage::DeleteRows,
            Correction::Outliers(_)   => Stage::Outliers,
            Correction::Normalize(_)  => Stage::Normalize,
            Correction::Air(_)        => Stage::Air,
            Correction::Extra(_)      => Stage::Extra,
            Correction::Drift { .. }  => Stage::Drift,
            Correction::RowShift(_)   => Stage::RowShift,
        }
    }
}

/// Corrections in the order in which they will be applied
#[derive(Debug, Clone, Default)]
pub struct Chain(Vec<Correction>);

impl Chain {
    pub fn new(corrections: Vec<Correction>) -> Result<Self> {
        let order = corrections.iter().map(Correction::stage).collect_vec();
        let OrderCheck { problems, warnings } = check_order(&order);
        for w in warnings { log::warn!("{w}") }
        if !problems.is_empty() { return Err(Error::Config(problems)) }
        Ok(Self(corrections))
    }

    pub fn stages(&self) -> Vec<Stage> { self.0.iter().map(Correction::stage).collect() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = &Correction> { self.0.iter() }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    /// Samples replaced by outlier repair
    Repaired(usize),
    /// Applied except where a numerical guard tripped
    Guarded(GuardReport),
    /// Not applied at all
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub stage: Stage,
    pub outcome: Outcome,
}

/// A sorted sinogram and the record of what has been done to it
#[derive(Debug, Clone)]
pub struct CorrectionState {
    sinogram: Sinogram,
    log: Vec<LogEntry>,
}

impl CorrectionState {

    pub fn new(raw: Sinogram) -> Self {
        let was_sorted = raw.is_sorted();
        let sinogram = raw.sorted();
        let outcome = if was_sorted { Outcome::Skipped("already sorted".into()) } else { Outcome::Applied };
        Self { sinogram, log: vec![LogEntry { stage: Stage::Sort, outcome }] }
    }

    pub fn sinogram(&self) -> &Sinogram { &self.sinogram }
    pub fn into_sinogram(self) -> Sinogram { self.sinogram }
    pub fn log(&self) -> &[LogEntry] { &self.log }

    /// Apply one correction. Numerical guards that defeat a whole stage
    /// are recorded as skipped; every other error is returned.
    pub fn apply(mut self, correction: &Correction) -> Result<Self> {
        let stage = correction.stage();
        let outcome = match self.run(correction) {
            Ok(outcome) => outcome,
            Err(e) if e.is_recoverable() => {
                log::warn!("skipping {stage}: {e}");
                Outcome::Skipped(e.to_string())
            }
            Err(e) => return Err(e),
        };
        log::debug!("{stage}: {outcome:?}");
        self.log.push(LogEntry { stage, outcome });
        Ok(self)
    }

    pub fn apply_chain(self, chain: &Chain) -> Result<Self> {
        chain.iter().try_fold(self, |state, c| state.apply(c))
    }

    fn run(&mut self, correction: &Correction) -> Result<Outcome> {
        use Correction::*;
        Ok(match correction {
            DeleteRows(rows) => {
                self.sinogram = self.sinogram.delete_rows(rows)?;
                Outcome::Applied
            }
            Outliers(repair) => Outcome::Repaired(repair.apply_to(&mut self.sinogram)?),
            Normalize(n)     => guarded(n.apply(&mut self.sinogram)?),
            Air(b) | Extra(b) => { b.apply(&mut self.sinogram)?; Outcome::Applied }
            Drift { reference_channel } => {
                let profile = DriftProfile::estimate(&self.sinogram, *reference_channel)?;
                profile.apply(&mut self.sinogram)?;
                guarded(GuardReport {
                    skipped: profile.skipped().iter().map(|&row| Skipped::Projection { row }).collect()
                })
            }
            RowShift(amount) => { drift::shift_rows(&mut self.sinogram, *amount); Outcome::Applied }
        })
    }
}

fn guarded(report: GuardReport) -> Outcome {
    if report.is_empty() { Outcome::Applied } else { Outcome::Guarded(report) }
}
