use std::path::PathBuf;

/// Command line interface for `xrdct` executable
#[derive(clap::Parser, Debug, Clone)]
#[clap(
    name = "xrdct",
    about = "Correct XRD-CT sinograms and reconstruct them by filtered back-projection",
)]
pub (super) struct Cli {
    /// TOML file describing input, corrections and reconstruction
    pub config: PathBuf,

    /// Replace existing output files
    #[clap(short = 'R', long)]
    pub overwrite: bool,

    /// Number of worker threads [default: $SLURM_CPUS_ON_NODE, else all cores]
    #[clap(short = 'j', long)]
    pub threads: Option<usize>,

    /// Directory for output files, overriding the configuration
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Projections to delete, e.g. `180,179`, overriding the configuration
    #[clap(long, value_delimiter = ',')]
    pub delete: Vec<usize>,

    /// Stop after saving the corrected sinogram
    #[clap(long)]
    pub no_reconstruct: bool,
}

