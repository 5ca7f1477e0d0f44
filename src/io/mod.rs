pub mod xy;

#[cfg(feature = "hdf5")]
pub mod hdf5;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Whether existing outputs may be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputPolicy {
    pub overwrite: bool,
}

/// Outcome of a save that was allowed to proceed or politely declined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saved {
    Written(PathBuf),
    Skipped(PathBuf),
}

impl OutputPolicy {

    pub fn check(&self, path: &Path) -> Result<()> {
        if path.exists() && !self.overwrite { Err(Error::OutputExists(path.to_path_buf())) }
        else                                { Ok(()) }
    }

    /// Call `write` with `path` unless the policy forbids it, in which case
    /// the save is skipped with a warning. Missing parent directories are
    /// created.
    pub fn save<F>(&self, path: &Path, write: F) -> Result<Saved>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        match self.check(path) {
            Err(e) if e.is_recoverable() => {
                log::warn!("{e}");
                return Ok(Saved::Skipped(path.to_path_buf()))
            }
            other => other?,
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        write(path)?;
        log::info!("wrote {}", path.display());
        Ok(Saved::Written(path.to_path_buf()))
    }
}
