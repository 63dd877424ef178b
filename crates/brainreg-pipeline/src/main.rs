use anyhow::{bail, Result};
use brainreg_pipeline::{Cli, Pipeline, PipelineInputs};
use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use tracing_subscriber::EnvFilter;

type Backend = Autodiff<NdArray<f32>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse_args(std::env::args_os());
    let config = cli.registration_config();
    config.validate()?;

    let inputs = PipelineInputs {
        t1: cli.t1.clone(),
        t1ce: cli.t1ce.clone(),
        t2: cli.t2.clone(),
        flair: cli.flair.clone(),
    };

    let pipeline = Pipeline::<Backend>::new(inputs, &cli.atlas, config, Default::default());
    let summary = pipeline.run(&cli.output)?;

    let failures = summary.failures();
    if failures > 0 {
        bail!("{} registration step(s) failed", failures);
    }
    Ok(())
}
