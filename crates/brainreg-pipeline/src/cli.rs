//! Command-line interface.

use std::ffi::OsString;
use std::path::PathBuf;

use brainreg_core::spatial::Spacing3;
use brainreg_registration::{RegistrationConfig, SamplingStrategy};
use clap::Parser;

/// Default location of the SRI-24 atlas.
pub const DEFAULT_ATLAS: &str = "resources/sri24/spgr_unstrip.nii";

/// Single-dash multi-letter flags accepted for compatibility, and the long
/// flag each one stands for.
const LEGACY_FLAGS: [(&str, &str); 4] = [
    ("-t1", "--t1"),
    ("-t2", "--t2"),
    ("-fl", "--flair"),
    ("-t1ce", "--t1ce"),
];

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "brainreg")]
#[command(about = "Convert and register T1, T1CE, T2 and FLAIR brain MRI volumes to the SRI-24 atlas")]
pub struct Cli {
    /// T1 volume (.nii / .nii.gz) or DICOM series directory
    #[arg(long)]
    pub t1: Option<PathBuf>,

    /// T2 volume or DICOM series directory
    #[arg(long)]
    pub t2: Option<PathBuf>,

    /// FLAIR volume or DICOM series directory
    #[arg(long)]
    pub flair: Option<PathBuf>,

    /// Contrast-enhanced T1 volume or DICOM series directory
    #[arg(long)]
    pub t1ce: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// SRI-24 atlas volume
    #[arg(long, default_value = DEFAULT_ATLAS)]
    pub atlas: PathBuf,

    /// Seed for voxel sampling (unseeded by default)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum optimizer iterations per registration
    #[arg(long, default_value_t = 300)]
    pub iterations: usize,

    /// Fraction of fixed voxels sampled per iteration, in (0, 1]
    #[arg(long, default_value_t = 0.03)]
    pub sampling_percentage: f64,

    /// Histogram bins of the mutual information metric
    #[arg(long, default_value_t = 50)]
    pub bins: usize,

    /// Isotropic voxel size of the saved volumes
    #[arg(long, default_value_t = 1.0)]
    pub voxel_size: f64,
}

impl Cli {
    /// Parse arguments, accepting the legacy single-dash modality flags.
    pub fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(rewrite_legacy_flags(args))
    }

    /// Like [`parse_args`](Self::parse_args) but returns parse errors.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(rewrite_legacy_flags(args))
    }

    /// Registration settings selected on the command line.
    pub fn registration_config(&self) -> RegistrationConfig {
        let mut config = RegistrationConfig::new()
            .with_iterations(self.iterations)
            .with_sampling(SamplingStrategy::Random { percentage: self.sampling_percentage })
            .with_histogram_bins(self.bins)
            .with_output_spacing(Spacing3::new(self.voxel_size, self.voxel_size, self.voxel_size));
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

/// Rewrite `-t1`, `-t2`, `-fl` and `-t1ce` (also in `-flag=value` form) to
/// their long equivalents. Everything else passes through unchanged.
pub fn rewrite_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let (flag, value) = match text.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (text, None),
            };

            match LEGACY_FLAGS.iter().find(|(legacy, _)| *legacy == flag) {
                Some((_, long)) => match value {
                    Some(value) => OsString::from(format!("{}={}", long, value)),
                    None => OsString::from(*long),
                },
                None => arg,
            }
        })
        .collect()
}
