//! Multi-modality registration pipeline.
//!
//! T1CE is registered to the atlas first. T1, T2 and FLAIR are then
//! registered to the aligned T1CE volume, whose path is carried in the
//! [`PipelineContext`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brainreg_io::{convert_dicom_to_nifti, is_nifti_path};
use brainreg_registration::{RegistrationConfig, RegistrationSession, StopCondition};
use burn::tensor::backend::AutodiffBackend;

/// File name of the atlas copy in the output directory.
pub const ATLAS_FILE_NAME: &str = "sri24.nii";

/// MRI modality handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    T1,
    T1ce,
    T2,
    Flair,
}

impl Modality {
    /// Registration order: T1CE must come first.
    pub const ORDER: [Modality; 4] = [Modality::T1ce, Modality::T1, Modality::T2, Modality::Flair];

    pub fn name(self) -> &'static str {
        match self {
            Modality::T1 => "t1",
            Modality::T1ce => "t1ce",
            Modality::T2 => "t2",
            Modality::Flair => "flair",
        }
    }

    /// File name of the registered volume.
    pub fn output_file_name(self) -> String {
        match self {
            Modality::T1ce => "t1ce_to_sri24.nii.gz".to_string(),
            other => format!("{}_to_t1ce.nii.gz", other.name()),
        }
    }

    /// File name of a DICOM series converted to NIfTI.
    pub fn converted_file_name(self) -> String {
        format!("{}.nii.gz", self.name())
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().to_uppercase())
    }
}

/// Input volume per modality. `None` means the modality was not given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineInputs {
    pub t1: Option<PathBuf>,
    pub t1ce: Option<PathBuf>,
    pub t2: Option<PathBuf>,
    pub flair: Option<PathBuf>,
}

impl PipelineInputs {
    pub fn get(&self, modality: Modality) -> Option<&Path> {
        match modality {
            Modality::T1 => self.t1.as_deref(),
            Modality::T1ce => self.t1ce.as_deref(),
            Modality::T2 => self.t2.as_deref(),
            Modality::Flair => self.flair.as_deref(),
        }
    }
}

/// State passed from one pipeline step to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineContext {
    pub output_dir: PathBuf,
    /// Atlas copy in the output directory.
    pub atlas: PathBuf,
    /// Registered T1CE volume, once that step has succeeded.
    pub aligned_t1ce: Option<PathBuf>,
}

impl PipelineContext {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            atlas: output_dir.join(ATLAS_FILE_NAME),
            output_dir,
            aligned_t1ce: None,
        }
    }

    /// Fixed volume a modality is registered to, if available.
    pub fn fixed_for(&self, modality: Modality) -> Option<&Path> {
        match modality {
            Modality::T1ce => Some(self.atlas.as_path()),
            _ => self.aligned_t1ce.as_deref(),
        }
    }

    pub fn output_path(&self, modality: Modality) -> PathBuf {
        self.output_dir.join(modality.output_file_name())
    }
}

/// Result of one modality step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed {
        output: PathBuf,
        final_metric: f64,
        stop_condition: StopCondition,
    },
    Skipped { reason: String },
    Failed { error: String },
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

/// Outcome of every modality, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSummary {
    pub steps: Vec<(Modality, StepOutcome)>,
}

impl PipelineSummary {
    pub fn outcome(&self, modality: Modality) -> Option<&StepOutcome> {
        self.steps.iter().find(|(m, _)| *m == modality).map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|(_, outcome)| outcome.is_failed()).count()
    }
}

/// Converts and registers all given modalities.
pub struct Pipeline<B: AutodiffBackend> {
    inputs: PipelineInputs,
    atlas: PathBuf,
    config: RegistrationConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> Pipeline<B> {
    pub fn new(inputs: PipelineInputs, atlas: impl Into<PathBuf>, config: RegistrationConfig, device: B::Device) -> Self {
        Self {
            inputs,
            atlas: atlas.into(),
            config,
            device,
        }
    }

    /// Run every step. Only setup failures (output directory, atlas copy)
    /// are returned as errors; step failures are recorded in the summary.
    ///
    /// All DICOM inputs are converted before any registration starts, so a
    /// converted volume is left in the output directory even when its
    /// registration is later skipped.
    pub fn run(&self, output_dir: &Path) -> Result<PipelineSummary> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        let mut context = PipelineContext::new(output_dir);
        if self.atlas != context.atlas {
            fs::copy(&self.atlas, &context.atlas)
                .with_context(|| format!("Failed to copy atlas {}", self.atlas.display()))?;
            tracing::info!(atlas = %context.atlas.display(), "copied atlas");
        }

        let prepared: Vec<(Modality, std::result::Result<PathBuf, String>)> = Modality::ORDER
            .into_iter()
            .filter_map(|modality| {
                let input = self.inputs.get(modality)?;
                let result = self
                    .prepare_input(modality, input, output_dir)
                    .map_err(|e| format!("{e:#}"));
                Some((modality, result))
            })
            .collect();

        let mut summary = PipelineSummary::default();
        for modality in Modality::ORDER {
            let input = prepared.iter().find(|(m, _)| *m == modality).map(|(_, r)| r);
            let outcome = self.run_step(modality, input, &mut context);
            match &outcome {
                StepOutcome::Completed { output, final_metric, stop_condition } => tracing::info!(
                    modality = %modality,
                    output = %output.display(),
                    final_metric,
                    "{}",
                    stop_condition.description()
                ),
                StepOutcome::Skipped { reason } => {
                    tracing::warn!(modality = %modality, "skipped: {}", reason)
                }
                StepOutcome::Failed { error } => {
                    tracing::error!(modality = %modality, "failed: {}", error)
                }
            }
            summary.steps.push((modality, outcome));
        }

        Ok(summary)
    }

    fn run_step(
        &self,
        modality: Modality,
        input: Option<&std::result::Result<PathBuf, String>>,
        context: &mut PipelineContext,
    ) -> StepOutcome {
        let moving = match input {
            None => {
                return StepOutcome::Skipped {
                    reason: "no input given".to_string(),
                }
            }
            Some(Err(error)) => return StepOutcome::Failed { error: error.clone() },
            Some(Ok(path)) => path.clone(),
        };
        let Some(fixed) = context.fixed_for(modality).map(Path::to_path_buf) else {
            return StepOutcome::Skipped {
                reason: "T1CE registration did not complete".to_string(),
            };
        };

        let output = context.output_path(modality);
        let session = RegistrationSession::<B>::new(fixed, moving, self.config.clone(), self.device.clone());
        match session.execute(Some(&output)) {
            Ok(volume) => {
                if modality == Modality::T1ce {
                    context.aligned_t1ce = Some(output.clone());
                }
                StepOutcome::Completed {
                    output,
                    final_metric: volume.report.final_metric,
                    stop_condition: volume.report.stop_condition,
                }
            }
            Err(e) => StepOutcome::Failed { error: e.to_string() },
        }
    }

    /// NIfTI inputs are used as given; DICOM directories are converted into
    /// the output directory first.
    fn prepare_input(&self, modality: Modality, input: &Path, output_dir: &Path) -> Result<PathBuf> {
        if input.is_dir() {
            let converted = output_dir.join(modality.converted_file_name());
            convert_dicom_to_nifti::<B, _, _>(input, &converted, &self.device)
                .with_context(|| format!("Failed to convert DICOM directory {}", input.display()))?;
            return Ok(converted);
        }

        if !input.exists() {
            anyhow::bail!("Input {} does not exist", input.display());
        }
        if !is_nifti_path(input) {
            tracing::warn!(input = %input.display(), "input does not have a .nii or .nii.gz extension");
        }
        Ok(input.to_path_buf())
    }
}
