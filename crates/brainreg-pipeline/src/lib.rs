pub mod cli;
pub mod pipeline;

pub use cli::{rewrite_legacy_flags, Cli, DEFAULT_ATLAS};
pub use pipeline::{
    Modality, Pipeline, PipelineContext, PipelineInputs, PipelineSummary, StepOutcome, ATLAS_FILE_NAME,
};
