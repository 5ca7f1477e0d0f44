use ndarray::{Array1, Array2, Array3};

pub type Intensityf32 = f32;
pub type Anglef32     = f32; // degrees
pub type Pixelsf32    = f32; // offsets along the translation axis, in samples
pub type Ratiof32     = f32;

#[allow(non_camel_case_types)] pub type Shape3_u = (usize, usize, usize);

/// One channel of a sinogram: (projection, translation)
pub type Slice = Array2<Intensityf32>;

/// Channel-stacked sinogram data: (projection, translation, channel)
pub type Volume = Array3<Intensityf32>;

pub type Angles = Array1<Anglef32>;
