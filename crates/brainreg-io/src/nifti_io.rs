use anyhow::{Result, Context, bail};
use burn::tensor::backend::Backend;
use nifti::{NiftiHeader, NiftiObject, ReaderOptions, IntoNdArray};
use nifti::writer::WriterOptions;
use ndarray::{Array3, Axis, Ix3};
use brainreg_core::filter::resample_to_output;
use brainreg_core::image::Image;
use brainreg_core::spatial::{Point3, Spacing3, Direction3, Vector3, spacing_approx_eq};
use brainreg_core::tensor::{to_host_vec, volume_from_vec};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Spatial unit stored in the NIfTI `xyzt_units` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpatialUnit {
    Unknown,
    Meter,
    #[default]
    Millimeter,
    Micron,
}

impl SpatialUnit {
    /// NIfTI-1 unit code.
    pub fn code(self) -> u8 {
        match self {
            SpatialUnit::Unknown => 0,
            SpatialUnit::Meter => 1,
            SpatialUnit::Millimeter => 2,
            SpatialUnit::Micron => 3,
        }
    }

    /// Decode the spatial bits of `xyzt_units`.
    pub fn from_code(xyzt_units: u8) -> Self {
        match xyzt_units & 0x07 {
            1 => SpatialUnit::Meter,
            2 => SpatialUnit::Millimeter,
            3 => SpatialUnit::Micron,
            _ => SpatialUnit::Unknown,
        }
    }
}

/// Spatial metadata of a loaded volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// Array shape `[Z, Y, X]`.
    pub shape: [usize; 3],
    pub origin: Point3,
    pub spacing: Spacing3,
    pub direction: Direction3,
    pub unit: SpatialUnit,
}

impl VolumeMetadata {
    fn of<B: Backend>(image: &Image<B, 3>, unit: SpatialUnit) -> Self {
        Self {
            shape: image.shape(),
            origin: *image.origin(),
            spacing: *image.spacing(),
            direction: *image.direction(),
            unit,
        }
    }
}

/// Which geometry the written file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFrame {
    /// Discard the image geometry: the data is written on the unit grid
    /// (identity affine, before any spacing change).
    #[default]
    Identity,
    /// Keep the image origin, spacing and direction.
    Image,
}

impl OutputFrame {
    fn sform_code(self) -> i16 {
        match self {
            OutputFrame::Identity => 2, // aligned
            OutputFrame::Image => 1,    // scanner
        }
    }
}

/// Options for [`write_volume`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NiftiWriteOptions {
    /// Target voxel spacing. The volume is resampled first when its spacing differs.
    pub voxel_size: Option<Spacing3>,
    pub unit: SpatialUnit,
    pub frame: OutputFrame,
}

impl Default for NiftiWriteOptions {
    fn default() -> Self {
        Self {
            voxel_size: Some(Spacing3::new(1.0, 1.0, 1.0)),
            unit: SpatialUnit::Millimeter,
            frame: OutputFrame::Identity,
        }
    }
}

impl NiftiWriteOptions {
    /// Keep the image geometry and spacing as they are.
    pub fn preserve_geometry() -> Self {
        Self {
            voxel_size: None,
            unit: SpatialUnit::Millimeter,
            frame: OutputFrame::Image,
        }
    }

    pub fn with_voxel_size(mut self, voxel_size: Spacing3) -> Self {
        self.voxel_size = Some(voxel_size);
        self
    }

    pub fn with_unit(mut self, unit: SpatialUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_frame(mut self, frame: OutputFrame) -> Self {
        self.frame = frame;
        self
    }
}

/// Read a `.nii` / `.nii.gz` volume.
///
/// Trailing singleton axes are squeezed until three remain. The returned image
/// stores its data as `[Z, Y, X]`; geometry comes from the sform, then the
/// qform, then `pixdim` alone.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<(Image<B, 3>, VolumeMetadata)> {
    let path = path.as_ref();
    let obj = ReaderOptions::new().read_file(path).context("Failed to read NIfTI file")?;
    let header = obj.header().clone();
    let unit = SpatialUnit::from_code(header.xyzt_units);
    let (origin, spacing, direction) = header_geometry(&header);

    let mut array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;

    while array.ndim() > 3 && array.shape()[array.ndim() - 1] == 1 {
        let last = array.ndim() - 1;
        array = array.index_axis_move(Axis(last), 0);
    }

    if array.ndim() < 3 {
        bail!("Expected a 3D NIfTI volume, found {} dimensions", array.ndim());
    }
    if array.ndim() > 3 {
        bail!("Expected a 3D NIfTI volume, found {} non-singleton dimensions", array.ndim());
    }

    let array = array.into_dimensionality::<Ix3>().context("Failed to view volume as 3D")?;
    let (nx, ny, nz) = array.dim();
    if nx * ny * nz == 0 {
        bail!("NIfTI volume is empty: {}x{}x{}", nx, ny, nz);
    }

    // NIfTI arrays index as [x, y, z]; iterate in [z, y, x] row-major order
    let values: Vec<f32> = array.permuted_axes([2, 1, 0]).iter().copied().collect();
    let tensor = volume_from_vec::<B>(values, [nz, ny, nx], device);

    let image = Image::new(tensor, origin, spacing, direction);
    let metadata = VolumeMetadata::of(&image, unit);
    Ok((image, metadata))
}

/// Write an image to a NIfTI file, creating the parent directory if needed.
///
/// The frame decides which geometry is written. When `voxel_size` is set and
/// differs from the image spacing, the volume is resampled onto a grid of that
/// spacing covering the same physical extent. `pixdim` and `xyzt_units` are set
/// from the result; the file is gzip-compressed when the path ends in `.gz`.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>, options: &NiftiWriteOptions) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    let framed = match options.frame {
        OutputFrame::Identity => image.on_unit_grid(),
        OutputFrame::Image => image.clone(),
    };

    let output = match options.voxel_size {
        Some(target) if !spacing_approx_eq(framed.spacing(), &target, 1e-6) => resample_to_output(&framed, target),
        _ => framed,
    };

    let [nz, ny, nx] = output.shape();
    let values = to_host_vec(output.data().clone());
    let array = Array3::from_shape_vec((nz, ny, nx), values)
        .context("Failed to create ndarray")?
        .permuted_axes([2, 1, 0]);

    let header = build_header(&output, options);

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .context("Failed to write NIfTI file")?;

    Ok(())
}

fn build_header<B: Backend>(image: &Image<B, 3>, options: &NiftiWriteOptions) -> NiftiHeader {
    let spacing = image.spacing();
    let direction = image.direction();
    let origin = image.origin();

    let mut header = NiftiHeader::default();
    header.pixdim[0] = 1.0;
    for i in 0..3 {
        header.pixdim[i + 1] = spacing[i] as f32;
    }
    header.xyzt_units = options.unit.code();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    let row = |r: usize| -> [f32; 4] {
        [
            (direction[(r, 0)] * spacing[0]) as f32,
            (direction[(r, 1)] * spacing[1]) as f32,
            (direction[(r, 2)] * spacing[2]) as f32,
            origin[r] as f32,
        ]
    };
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.sform_code = options.frame.sform_code();
    header.qform_code = 0;

    header
}

fn header_geometry(header: &NiftiHeader) -> (Point3, Spacing3, Direction3) {
    let affine: [[f32; 4]; 3] = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();

        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };

        let r11 = a * a + b * b - c * c - d * d;
        let r12 = 2.0 * b * c - 2.0 * a * d;
        let r13 = 2.0 * b * d + 2.0 * a * c;

        let r21 = 2.0 * b * c + 2.0 * a * d;
        let r22 = a * a + c * c - b * b - d * d;
        let r23 = 2.0 * c * d - 2.0 * a * b;

        let r31 = 2.0 * b * d - 2.0 * a * c;
        let r32 = 2.0 * c * d + 2.0 * a * b;
        let r33 = a * a + d * d - c * c - b * b;

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [r11 * dx, r12 * dy, r13 * dz, header.quatern_x],
            [r21 * dx, r22 * dy, r23 * dz, header.quatern_y],
            [r31 * dx, r32 * dy, r33 * dz, header.quatern_z],
        ]
    } else {
        let positive = |v: f32| if v > 0.0 { v } else { 1.0 };
        [
            [positive(header.pixdim[1]), 0.0, 0.0, 0.0],
            [0.0, positive(header.pixdim[2]), 0.0, 0.0],
            [0.0, 0.0, positive(header.pixdim[3]), 0.0],
        ]
    };

    let origin = Point3::new(affine[0][3] as f64, affine[1][3] as f64, affine[2][3] as f64);

    let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
    let mut spacing = Spacing3::new(1.0, 1.0, 1.0);
    let mut columns = [Vector3::zeros(); 3];
    for c in 0..3 {
        let column = Vector3::new(affine[0][c] as f64, affine[1][c] as f64, affine[2][c] as f64);
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[c] = norm;
            columns[c] = column / norm;
        } else {
            columns[c] = axes[c];
        }
    }

    (origin, spacing, Matrix3::from_columns(&columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_volume_basic() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // Logical index [x, y, z] with X=3, Y=4, Z=5
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let (image, metadata) = read_volume::<TestBackend, _>(&file_path, &device)?;

        assert_eq!(image.shape(), [5, 4, 3]);
        assert_eq!(metadata.shape, [5, 4, 3]);

        let values = to_host_vec(image.data().clone());
        // [z=1, y=2, x=1] -> 1 + 20 + 100
        assert_eq!(values[1 * 12 + 2 * 3 + 1], 121.0);
        assert_eq!(values[59], 2.0 + 30.0 + 400.0);

        Ok(())
    }

    #[test]
    fn test_squeezes_trailing_singletons() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("four_d.nii");

        let array = ndarray::Array4::<f32>::from_elem((4, 3, 2, 1), 7.0);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let (image, _) = read_volume::<TestBackend, _>(&file_path, &device)?;
        assert_eq!(image.shape(), [2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_rejects_two_dimensional_volume() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("flat.nii");

        let array = ndarray::Array2::<f32>::zeros((4, 3));
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let result = read_volume::<TestBackend, _>(&file_path, &device);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_four_non_singleton_dimensions() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("series.nii");

        let array = ndarray::Array4::<f32>::zeros((4, 3, 2, 2));
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        assert!(read_volume::<TestBackend, _>(&file_path, &device).is_err());
        Ok(())
    }

    #[test]
    fn test_spatial_unit_codes() {
        assert_eq!(SpatialUnit::from_code(2), SpatialUnit::Millimeter);
        assert_eq!(SpatialUnit::from_code(2 | 8), SpatialUnit::Millimeter);
        assert_eq!(SpatialUnit::from_code(0), SpatialUnit::Unknown);
        assert_eq!(SpatialUnit::Micron.code(), 3);
    }
}
