//! One run: assemble, correct, save, reconstruct, save.
//!
//! Everything a stage needs from outside (worker pool, overwrite policy) is
//! in the `RunContext` it is handed.

use std::path::Path;

use crate::config::pipeline::{Config, Corrections, OutputPaths};
use crate::correct::{Chain, Correction, CorrectionState, LogEntry, Stage};
use crate::correct::background::{BackgroundSubtraction, ReferencePattern};
use crate::error::{ErrorKind, Result, Error};
use crate::io::{xy, OutputPolicy, Saved};
use crate::pool::WorkerPool;
use crate::reconstruct::{reconstruct_volume, ReconstructedVolume};
use crate::scan::ChannelAxis;
use crate::sinogram::{Acquisition, Sinogram};

pub struct RunContext {
    pub pool: WorkerPool,
    pub output: OutputPolicy,
}

impl RunContext {
    pub fn new(workers: usize, overwrite: bool) -> Result<Self> {
        Ok(Self { pool: WorkerPool::new(workers)?, output: OutputPolicy { overwrite } })
    }
}

/// The configured corrections, in order, with their reference patterns
/// loaded
pub fn build_chain(corrections: &Corrections) -> Result<Chain> {
    let background = |b: &crate::config::pipeline::Background| -> Result<BackgroundSubtraction> {
        Ok(BackgroundSubtraction { pattern: ReferencePattern::read(&b.pattern)?, anchor: b.anchor })
    };
    let c = corrections;
    let mut chain = vec![];
    for stage in c.active() {
        let correction = match stage {
            Stage::Sort       => None,
            Stage::DeleteRows => Some(Correction::DeleteRows(c.delete_rows.clone())),
            Stage::Outliers   => c.outliers .map(Correction::Outliers),
            Stage::Normalize  => c.normalize.map(Correction::Normalize),
            Stage::Air        => c.air  .as_ref().map(background).transpose()?.map(Correction::Air),
            Stage::Extra      => c.extra.as_ref().map(background).transpose()?.map(Correction::Extra),
            Stage::Drift      => c.drift.map(|d| Correction::Drift { reference_channel: d.reference_channel }),
            Stage::RowShift   => c.row_shift.map(Correction::RowShift),
        };
        chain.extend(correction);
    }
    Chain::new(chain)
}

/// What became of the steps after correction
#[derive(Debug, Default)]
pub struct Finished {
    pub pattern: Option<Saved>,
    pub volume: Option<ReconstructedVolume>,
    /// Why reconstruction was abandoned; the corrected sinogram is unaffected
    pub failure: Option<Error>,
}

pub struct Pipeline<'c> {
    config: &'c Config,
    chain: Chain,
    paths: OutputPaths,
}

impl<'c> Pipeline<'c> {

    pub fn new(config: &'c Config) -> Result<Self> {
        let chain = build_chain(&config.corrections)?;
        let paths = config.output.paths(&config.input.file);
        Ok(Self { config, chain, paths })
    }

    pub fn chain(&self) -> &Chain        { &self.chain }
    pub fn paths(&self) -> &OutputPaths  { &self.paths }

    /// Assemble the regular-grid sinogram, sort it and apply the correction
    /// chain on the context's workers
    pub fn correct(&self, acquisition: Acquisition, context: &RunContext) -> Result<CorrectionState> {
        let raw = acquisition.assemble(self.config.assembly.binning)?;
        let (n, m, c) = raw.shape();
        log::info!("sinogram: {n} projections × {m} translations × {c} channels");
        context.pool.install(|| CorrectionState::new(raw).apply_chain(&self.chain))
    }

    /// Export the averaged pattern and reconstruct. A reconstruction that
    /// cannot start is reported in `failure`; every other error is returned.
    pub fn finish(
        &self,
        sinogram: &Sinogram,
        axis: &ChannelAxis,
        context: &RunContext,
        done: &(dyn Fn(usize) + Sync),
    ) -> Result<Finished> {
        let mut finished = Finished::default();
        if self.config.output.pattern {
            finished.pattern = Some(export_pattern(&self.paths.pattern, sinogram, axis, &context.output)?);
        }
        let settings = &self.config.reconstruction;
        if !settings.enabled {
            log::info!("reconstruction disabled");
            return Ok(finished)
        }
        let reconstructor = settings.reconstructor(self.config.assembly.binning);
        match reconstruct_volume(sinogram, axis, &settings.selection(), &reconstructor, &context.pool, done) {
            Ok(volume) => finished.volume = Some(volume),
            Err(e) if e.kind() == ErrorKind::Precondition => {
                log::error!("reconstruction abandoned: {e}");
                finished.failure = Some(e);
            }
            Err(e) => return Err(e),
        }
        Ok(finished)
    }

    /// Correct, save and reconstruct the scan named in the configuration
    #[cfg(feature = "hdf5")]
    pub fn run(&self, context: &RunContext, done: &(dyn Fn(usize) + Sync)) -> Result<Summary> {
        use crate::io::hdf5;
        let input = &self.config.input;
        let output = &self.config.output;
        let descriptor = hdf5::discover(&input.file, input.layout(), input.axis_unit)?;
        let acquisition = hdf5::load(&descriptor)?;
        let state = self.correct(acquisition, context)?;
        let sinogram = state.sinogram();
        let axis = descriptor.axis();

        let mut saved = vec![];
        if output.sinogram {
            saved.push(context.output.save(&self.paths.sinogram, |path| {
                hdf5::write_sinogram(path, sinogram, axis, &self.paths.stem, output.sinogram_layout)
            })?);
        }
        let finished = self.finish(sinogram, axis, context, done)?;
        saved.extend(finished.pattern);
        if let Some(volume) = &finished.volume {
            saved.push(context.output.save(&self.paths.reconstruction, |path| hdf5::write_volume(path, volume))?);
        }
        Ok(Summary {
            log: state.log().to_vec(),
            saved,
            images: finished.volume.as_ref().map_or(0, ReconstructedVolume::len),
            failure: finished.failure,
        })
    }
}

/// Record of a completed run
#[derive(Debug)]
pub struct Summary {
    pub log: Vec<LogEntry>,
    pub saved: Vec<Saved>,
    pub images: usize,
    pub failure: Option<Error>,
}

/// Scan-averaged pattern as two-column text
pub fn export_pattern(path: &Path, sinogram: &Sinogram, axis: &ChannelAxis, policy: &OutputPolicy) -> Result<Saved> {
    let pattern = sinogram.mean_pattern();
    policy.save(path, |path| xy::write(path, axis.unit().label(), axis.values().view(), pattern.view()))
}

#[cfg(test)]
mod test_pipeline {
    use super::*;
    use crate::config::pipeline::{Background, Input};
    use crate::correct::Outcome;
    use ndarray::{Array1, Array3};

    fn config(toml: &str) -> Config {
        let text = format!("[input]\nfile = \"scan.h5\"\n{toml}");
        let config: Config = toml::from_str(&text).unwrap();
        config.validate().unwrap();
        config
    }

    #[test]
    fn chain_follows_configured_order() -> Result<()> {
        let c = config(r#"
            [corrections]
            order = ["normalize", "delete-rows", "row-shift"]
            normalize = "min-max"
            delete_rows = [0]
            row_shift = 0.25
        "#);
        let chain = build_chain(&c.corrections)?;
        assert_eq!(chain.stages(), vec![Stage::Normalize, Stage::DeleteRows, Stage::RowShift]);
        Ok(())
    }

    #[test]
    fn background_patterns_are_loaded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("air.xy");
        xy::write(&path, "tth(deg)", Array1::from(vec![1.0, 2.0]).view(), Array1::from(vec![4.0, 2.0]).view())?;
        let corrections = Corrections { air: Some(Background { pattern: path, anchor: 1 }), ..Default::default() };
        let chain = build_chain(&corrections)?;
        match chain.iter().next() {
            Some(Correction::Air(b)) => assert_eq!(b.pattern.intensity().to_vec(), vec![4.0, 2.0]),
            other => panic!("expected air subtraction, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_pattern_is_an_input_error() {
        let corrections = Corrections {
            extra: Some(Background { pattern: "/no/such/pattern.xy".into(), anchor: 0 }),
            ..Default::default()
        };
        assert!(matches!(build_chain(&corrections).map_err(|e| e.kind()), Err(ErrorKind::Input)));
    }

    #[test]
    fn precondition_failure_keeps_the_run_going() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut c = config("[reconstruction]\nsize = 8");
        c.output.directory = Some(dir.path().to_path_buf());
        c.input = Input { file: dir.path().join("one.h5"), ..c.input };
        let pipeline = Pipeline::new(&c)?;
        // A single translation cannot be reconstructed
        let raw = Sinogram::new(Array3::ones((4, 1, 3)), Array1::from(vec![0.0, 45.0, 90.0, 135.0]), None)?;
        let context = RunContext::new(2, false)?;
        let state = pipeline.correct(Acquisition::Grid(raw), &context)?;
        let finished = pipeline.finish(state.sinogram(), &ChannelAxis::indices(3), &context, &|_| ())?;
        assert!(matches!(finished.failure, Some(Error::Precondition(_))));
        assert!(finished.volume.is_none());
        assert!(matches!(finished.pattern, Some(Saved::Written(_))));
        assert!(dir.path().join("one_sum.xy").exists());
        Ok(())
    }

    #[test]
    fn guarded_normalization_is_logged() -> Result<()> {
        let c = config("[corrections]\nnormalize = \"row-sum\"");
        let pipeline = Pipeline::new(&c)?;
        let mut data = Array3::ones((2, 3, 2));
        data.slice_mut(ndarray::s![1, .., 0]).fill(0.0);
        let raw = Sinogram::new(data, Array1::from(vec![0.0, 90.0]), None)?;
        let state = pipeline.correct(Acquisition::Grid(raw), &RunContext::new(1, false)?)?;
        let last = state.log().last().cloned();
        assert!(matches!(last, Some(LogEntry { stage: Stage::Normalize, outcome: Outcome::Guarded(_) })), "{last:?}");
        Ok(())
    }

    #[test]
    fn corrections_run_on_the_context_workers() -> Result<()> {
        let c = config(r#"
            [corrections]
            outliers = { tolerance = 2.0 }
            normalize = "row-sum"
            row_shift = 0.5
        "#);
        let pipeline = Pipeline::new(&c)?;
        let angles = Array1::from_iter((0..12).map(|i| i as f32 * 15.0));
        let mut data = Array3::from_shape_fn((12, 16, 4), |(i, j, k)| 1.0 + ((i * 7 + j * 3 + k) % 5) as f32);
        data[[3, 8, 1]] = 500.0;
        let raw = Sinogram::new(data, angles, None)?;

        let single = RunContext::new(1, false)?;
        assert_eq!(single.pool.install(rayon::current_num_threads), 1);
        let one = pipeline.correct(Acquisition::Grid(raw.clone()), &single)?;
        let many = pipeline.correct(Acquisition::Grid(raw), &RunContext::new(4, false)?)?;
        assert_eq!(one.log(), many.log());
        assert_eq!(one.sinogram().data(), many.sinogram().data());
        Ok(())
    }
}
