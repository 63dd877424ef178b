//! DICOM series to NIfTI conversion.

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use brainreg_core::image::Image;
use brainreg_core::spatial::{Direction3, Point3};
use std::path::Path;

use crate::dicom_io::read_dicom_series;
use crate::nifti_io::{write_volume, NiftiWriteOptions};

/// Whether `path` names a NIfTI file (`.nii` or `.nii.gz`).
pub fn is_nifti_path<P: AsRef<Path>>(path: P) -> bool {
    let name = path.as_ref().to_string_lossy().to_ascii_lowercase();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// Convert the DICOM series in `dicom_dir` to a NIfTI file at `output`.
///
/// DICOM geometry is LPS; the written sform is RAS, so the x and y axes are
/// negated. The output is gzip-compressed when `output` ends in `.gz`.
pub fn convert_dicom_to_nifti<B: Backend, P: AsRef<Path>, Q: AsRef<Path>>(
    dicom_dir: P,
    output: Q,
    device: &B::Device,
) -> Result<Image<B, 3>> {
    let image = read_dicom_series::<B, _>(dicom_dir.as_ref(), device)
        .context("Failed to read DICOM series")?;
    let image = lps_to_ras(&image);

    write_volume(output.as_ref(), &image, &NiftiWriteOptions::preserve_geometry())?;
    tracing::info!(
        output = %output.as_ref().display(),
        shape = ?image.shape(),
        "converted DICOM series to NIfTI"
    );
    Ok(image)
}

fn lps_to_ras<B: Backend>(image: &Image<B, 3>) -> Image<B, 3> {
    let flip = Direction3::from_diagonal(&nalgebra::Vector3::new(-1.0, -1.0, 1.0));
    let origin = image.origin();
    Image::new(
        image.data().clone(),
        Point3::new(-origin.x, -origin.y, origin.z),
        *image.spacing(),
        flip * image.direction(),
    )
}
