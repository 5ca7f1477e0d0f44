mod types;
pub use types::*;

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod config;
pub mod correct;
pub mod io;
pub mod phantom;
pub mod pipeline;
pub mod pool;
pub mod reconstruct;
pub mod scan;
pub mod sinogram;
pub mod utils;
