//! Errors raised by the correction and reconstruction pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// How an error should be treated by whoever drives the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input: fatal, nothing is written
    Input,
    /// Zero denominators and similar: skip the affected row/stage, keep going
    NumericalGuard,
    /// Reconstruction cannot proceed with these arguments: fatal for that step only
    Precondition,
    /// Output already exists and may not be overwritten: warn and skip
    Resource,
    /// One unit of parallel work failed: abort the whole run
    Worker,
    /// Configuration rejected at load time
    Config,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{angles} angles given for {rows} projections")]
    AngleMismatch { angles: usize, rows: usize },

    #[error("acquisition contains no projections")]
    EmptyAcquisition,

    #[error("non-finite rotation angle at projection {0}")]
    NonFiniteAngle(usize),

    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch { what: String, expected: Vec<usize>, actual: Vec<usize> },

    #[error("cannot delete row {row}: sinogram has {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("malformed pattern file {path:?}, line {line}: {reason}")]
    Pattern { path: PathBuf, line: usize, reason: String },

    #[error("reference pattern is zero at anchor channel {anchor}")]
    ZeroAnchor { anchor: usize },

    #[error("slice of shape {0:?} is too small to filter")]
    DegenerateSlice((usize, usize)),

    #[error("channel {channel} out of range: {channels} channels")]
    ChannelOutOfRange { channel: usize, channels: usize },

    #[error("reference pattern has {pattern} points but sinogram has {channels} channels")]
    PatternLength { pattern: usize, channels: usize },

    #[error("no beam monitor recorded for this scan")]
    NoMonitor,

    #[error("reconstruction: {0}")]
    Precondition(String),

    #[error("{0:?} exists; set `overwrite` to replace it")]
    OutputExists(PathBuf),

    #[error("channel {channel} failed: {source}")]
    Worker { channel: usize, source: Box<Error> },

    #[error("channels missing after merge: {0:?}")]
    MissingChannels(Vec<usize>),

    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    Config(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[cfg(feature = "hdf5")]
    #[error(transparent)]
    Hdf5(#[from] hdf5::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            AngleMismatch { .. } | EmptyAcquisition | NonFiniteAngle(_) | ShapeMismatch { .. } |
            RowOutOfRange { .. } | Pattern { .. } | NoMonitor | Io(_)     => ErrorKind::Input,
            #[cfg(feature = "hdf5")] Hdf5(_)                              => ErrorKind::Input,
            ZeroAnchor { .. } | DegenerateSlice(_)                        => ErrorKind::NumericalGuard,
            ChannelOutOfRange { .. } | PatternLength { .. } | Precondition(_) => ErrorKind::Precondition,
            OutputExists(_)                                               => ErrorKind::Resource,
            Worker { .. } | MissingChannels(_) | ThreadPool(_)            => ErrorKind::Worker,
            Config(_) | Toml(_)                                           => ErrorKind::Config,
        }
    }

    /// Errors after which the run may carry on, having skipped something.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::NumericalGuard | ErrorKind::Resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest(/**/ error, kind,
             case(Error::AngleMismatch { angles: 3, rows: 4 },         ErrorKind::Input),
             case(Error::ZeroAnchor { anchor: 96 },                    ErrorKind::NumericalGuard),
             case(Error::Precondition("size".into()),                  ErrorKind::Precondition),
             case(Error::OutputExists("x.h5".into()),                  ErrorKind::Resource),
             case(Error::MissingChannels(vec![2]),                     ErrorKind::Worker),
             case(Error::Config(vec!["a".into(), "b".into()]),         ErrorKind::Config),
    )]
    fn classification(error: Error, kind: ErrorKind) {
        assert_eq!(error.kind(), kind);
    }

    #[test]
    fn worker_error_wraps_cause() {
        let e = Error::Worker { channel: 7, source: Box::new(Error::Precondition("boom".into())) };
        assert_eq!(e.to_string(), "channel 7 failed: reconstruction: boom");
        assert!(!e.is_recoverable());
    }

    #[test]
    fn config_error_lists_every_problem() {
        let e = Error::Config(vec!["first".into(), "second".into()]);
        let text = e.to_string();
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }
}
