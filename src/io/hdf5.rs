/// Read scans from, and write results to, HDF5 containers

use std::path::Path;

use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::Result;
use crate::reconstruct::ReconstructedVolume;
use crate::scan::{AxisUnit, ChannelAxis, FoundShapes, Geometry, Layout, ScanDescriptor};
use crate::sinogram::{scan_points::ScanPoints, Acquisition, Sinogram};
use crate::config::pipeline::SinogramLayout;

/// Group holding the reconstructed images and their axis
pub const ENTRY: &str = "entry_0000";

/// Find the datasets named in `layout` and check that they fit together.
/// A missing channel axis falls back to channel indices.
pub fn discover(path: &Path, layout: Layout, unit: AxisUnit) -> Result<ScanDescriptor> {
    let file = hdf5::File::open(path)?;
    let shape_of = |name: &str| -> Result<Vec<usize>> { Ok(file.dataset(name)?.shape()) };
    let shapes = FoundShapes {
        data: shape_of(&layout.data)?,
        angles: shape_of(&layout.angles)?,
        translations: layout.translations.as_deref().map(shape_of).transpose()?,
        monitor:      layout.monitor     .as_deref().map(shape_of).transpose()?,
    };
    let axis = match &layout.axis {
        Some(name) if file.link_exists(name) => {
            let values = file.dataset(name)?.read_1d::<f32>()?;
            Some(ChannelAxis::new(unit, values)?)
        }
        Some(name) => {
            log::warn!("{}: no channel axis at `{name}`, using channel numbers", path.display());
            None
        }
        None => None,
    };
    let descriptor = ScanDescriptor::new(path, layout, shapes, axis)?;
    let (n, m, c) = descriptor.shape();
    log::info!("{}: {n} projections × {m} translations × {c} channels ({:?})", path.display(), descriptor.geometry());
    Ok(descriptor)
}

/// Read everything `descriptor` describes
pub fn load(descriptor: &ScanDescriptor) -> Result<Acquisition> {
    let file = hdf5::File::open(descriptor.source())?;
    let layout = descriptor.layout();
    let data = file.dataset(&layout.data)?.read::<f32, ndarray::Ix3>()?;
    Ok(match descriptor.geometry() {
        Geometry::Grid => {
            let angles = file.dataset(&layout.angles)?.read_1d::<f32>()?;
            let monitor = match &layout.monitor {
                Some(name) => Some(file.dataset(name)?.read_2d::<f32>()?),
                None => None,
            };
            Acquisition::Grid(Sinogram::new(data, angles, monitor)?)
        }
        Geometry::ScanPoints => {
            let rotation = file.dataset(&layout.angles)?.read_2d::<f32>()?;
            let translations = layout.translations.as_deref().unwrap_or_default();
            let translation = file.dataset(translations)?.read_2d::<f32>()?;
            Acquisition::ScanPoints(ScanPoints::new(data, rotation, translation)?)
        }
    })
}

/// Corrected sinogram with its angles. `Sliced` writes one
/// `data/<stem>_NNNNN` dataset per channel, `Stacked` a single `data/<stem>`.
pub fn write_sinogram(path: &Path, sinogram: &Sinogram, axis: &ChannelAxis, stem: &str, layout: SinogramLayout) -> Result<()> {
    let file = hdf5::File::create(path)?;
    let group = file.create_group("data")?;
    match layout {
        SinogramLayout::Stacked => {
            group.new_dataset_builder().with_data(sinogram.data()).create(stem)?;
        }
        SinogramLayout::Sliced => {
            for (c, slice) in sinogram.data().axis_iter(Axis(2)).enumerate() {
                group.new_dataset_builder()
                    .with_data(&slice.to_owned())
                    .create(format!("{stem}_{c:05}").as_str())?;
            }
        }
    }
    group.new_dataset_builder().with_data(sinogram.angles()).create("theta")?;
    group.new_dataset_builder().with_data(axis.values()).create(axis.unit().dataset_name())?;
    Ok(())
}

/// Images under `entry_0000/data`, (rows, cols, images), and the axis value
/// of every image next to them
pub fn write_volume(path: &Path, volume: &ReconstructedVolume) -> Result<()> {
    let file = hdf5::File::create(path)?;
    let entry = file.create_group(ENTRY)?;
    entry.new_dataset_builder().with_data(&volume.data).create("data")?;
    entry.new_dataset_builder().with_data(&volume.values).create(volume.unit.dataset_name())?;
    Ok(())
}

pub fn read_volume(path: &Path, unit: AxisUnit) -> Result<(Array3<f32>, Array1<f32>)> {
    let file = hdf5::File::open(path)?;
    let data = file.dataset(&format!("{ENTRY}/data"))?.read::<f32, ndarray::Ix3>()?;
    let values = file.dataset(&format!("{ENTRY}/{}", unit.dataset_name()))?.read_1d::<f32>()?;
    Ok((data, values))
}

/// Raw acquisition in the default layout, as written by a beamline
pub fn write_scan(path: &Path, data: &Array3<f32>, angles: &Array1<f32>, axis: &ChannelAxis, monitor: Option<&Array2<f32>>) -> Result<()> {
    let layout = Layout::default();
    let file = hdf5::File::create(path)?;
    file.create_group("data")?;
    file.new_dataset_builder().with_data(data).create(layout.data.as_str())?;
    file.new_dataset_builder().with_data(angles).create(layout.angles.as_str())?;
    if let Some(name) = &layout.axis {
        file.new_dataset_builder().with_data(axis.values()).create(name.as_str())?;
    }
    if let Some(monitor) = monitor {
        file.new_dataset_builder().with_data(monitor).create("data/monitor")?;
    }
    Ok(())
}
