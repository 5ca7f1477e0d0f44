use indicatif::{ProgressBar, ProgressStyle};

/// Count of reconstructed images. The number to expect is only known once
/// the scan has been opened.
pub (super) struct Progress(ProgressBar);

impl Progress {

    pub (super) fn new() -> Self {
        let bar = ProgressBar::no_length();
        bar.set_style(ProgressStyle::default_spinner()
                      .template("{spinner} Reconstructing: [{elapsed_precise}] {pos} images")
                      .unwrap_or_else(|_| ProgressStyle::default_spinner())
        );
        bar.tick();
        Self(bar)
    }

    pub (super) fn image_done(&self, _index: usize) { self.0.inc(1) }

    pub (super) fn finish(&self) { self.0.finish_and_clear() }
}
