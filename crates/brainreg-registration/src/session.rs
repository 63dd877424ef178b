//! Pairwise registration sessions.
//!
//! A session loads a fixed and a moving volume from disk, registers the
//! moving volume onto the fixed grid and optionally writes the result.

use std::path::{Path, PathBuf};

use burn::tensor::Tensor;
use burn::tensor::backend::AutodiffBackend;
use brainreg_core::filter::ResampleImageFilter;
use brainreg_core::image::Image;
use brainreg_core::interpolation::LinearInterpolator;
use brainreg_core::transform::RigidTransform;
use brainreg_io::{read_volume, write_volume, NiftiWriteOptions, OutputFrame, VolumeMetadata};

use crate::config::RegistrationConfig;
use crate::error::{RegistrationError, Result};
use crate::initializer::CenteredTransformInitializer;
use crate::preprocess::{normalize, resize};
use crate::registration::{OptimizationReport, Registration};

/// Register `moving` onto the grid of `fixed`.
///
/// The moving volume is resized to the fixed shape, both are z-score
/// normalized and placed on the unit grid, and the optimized transform is
/// used to resample the moving volume onto the fixed grid (linear
/// interpolation, background `0.0`). The returned image is on the unit grid
/// with the fixed shape.
pub fn register_images<B: AutodiffBackend>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    config: &RegistrationConfig,
) -> Result<(Image<B, 3>, OptimizationReport)> {
    config.validate()?;

    let resized = resize(fixed.shape(), moving)?;
    let fixed = normalize(fixed)?.on_unit_grid();
    let moving = normalize(&resized)?.on_unit_grid();

    let initial = CenteredTransformInitializer::geometry(&fixed, &moving);
    let report = Registration::<B>::new(config.clone()).optimize(&fixed, &moving, initial)?;

    let aligned = resample_moving(&fixed, &moving, &report);
    Ok((aligned, report))
}

/// Apply the final transform outside the autodiff graph.
fn resample_moving<B: AutodiffBackend>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    report: &OptimizationReport,
) -> Image<B, 3> {
    let fixed_inner = inner_image(fixed);
    let moving_inner = inner_image(moving);
    let device = moving_inner.data().device();

    let parameters = &report.final_parameters;
    let transform = RigidTransform::<B::InnerBackend>::from_parameters(
        &parameters.to_array(),
        &parameters.center,
        &device,
    );

    let resampled = ResampleImageFilter::new_from_reference(&fixed_inner, transform, LinearInterpolator::new())
        .with_default_pixel_value(0.0)
        .apply(&moving_inner);

    Image::new(
        Tensor::from_inner(resampled.data().clone()),
        *resampled.origin(),
        *resampled.spacing(),
        *resampled.direction(),
    )
}

fn inner_image<B: AutodiffBackend>(image: &Image<B, 3>) -> Image<B::InnerBackend, 3> {
    Image::new(image.data().clone().inner(), *image.origin(), *image.spacing(), *image.direction())
}

/// Result of a registration session.
#[derive(Debug, Clone)]
pub struct RegisteredVolume<B: AutodiffBackend> {
    /// Moving volume resampled onto the fixed grid.
    pub image: Image<B, 3>,
    pub report: OptimizationReport,
    pub fixed_metadata: VolumeMetadata,
    pub moving_metadata: VolumeMetadata,
}

/// One pairwise alignment of a moving volume file to a fixed volume file.
pub struct RegistrationSession<B: AutodiffBackend> {
    fixed_path: PathBuf,
    moving_path: PathBuf,
    config: RegistrationConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> RegistrationSession<B> {
    pub fn new(
        fixed_path: impl Into<PathBuf>,
        moving_path: impl Into<PathBuf>,
        config: RegistrationConfig,
        device: B::Device,
    ) -> Self {
        Self {
            fixed_path: fixed_path.into(),
            moving_path: moving_path.into(),
            config,
            device,
        }
    }

    pub fn fixed_path(&self) -> &Path {
        &self.fixed_path
    }

    pub fn moving_path(&self) -> &Path {
        &self.moving_path
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Load both volumes, register and optionally save the result.
    pub fn execute(&self, save_path: Option<&Path>) -> Result<RegisteredVolume<B>> {
        tracing::info!(
            fixed = %self.fixed_path.display(),
            moving = %self.moving_path.display(),
            "registering"
        );

        let (fixed, fixed_metadata) = self.load(&self.fixed_path)?;
        let (moving, moving_metadata) = self.load(&self.moving_path)?;

        let (image, report) = register_images(&fixed, &moving, &self.config)?;
        tracing::info!(
            final_metric = report.final_metric,
            stop_condition = %report.stop_condition,
            "registered {}",
            self.moving_path.display()
        );

        let volume = RegisteredVolume {
            image,
            report,
            fixed_metadata,
            moving_metadata,
        };

        if let Some(path) = save_path {
            self.save(&volume, path)?;
        }

        Ok(volume)
    }

    /// Write a registered volume with the target spacing and unit.
    pub fn save(&self, volume: &RegisteredVolume<B>, path: &Path) -> Result<()> {
        write_volume(path, &volume.image, &self.write_options())
            .map_err(|e| RegistrationError::io(format!("{e:#}")))?;
        tracing::info!(path = %path.display(), "saved registered volume");
        Ok(())
    }

    /// NIfTI options used by [`save`](Self::save).
    pub fn write_options(&self) -> NiftiWriteOptions {
        NiftiWriteOptions::default()
            .with_voxel_size(self.config.output_spacing)
            .with_unit(self.config.output_unit)
            .with_frame(OutputFrame::Identity)
    }

    fn load(&self, path: &Path) -> Result<(Image<B, 3>, VolumeMetadata)> {
        read_volume::<B, _>(path, &self.device).map_err(|e| RegistrationError::format(format!("{e:#}")))
    }
}
