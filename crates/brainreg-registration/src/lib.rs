pub mod config;
pub mod error;
pub mod initializer;
pub mod metric;
pub mod observer;
pub mod optimizer;
pub mod preprocess;
pub mod registration;
pub mod session;
pub mod validation;

pub use config::{GradientDescentConfig, LearningRateEstimation, RegistrationConfig, SamplingStrategy};
pub use error::{RegistrationError, Result};
pub use initializer::CenteredTransformInitializer;
pub use preprocess::{normalize, resize};
pub use observer::{IterationLog, IterationObserver, IterationRecord};
pub use registration::{ConvergenceWarning, OptimizationReport, Registration, StopCondition};
pub use session::{register_images, RegisteredVolume, RegistrationSession};
pub use validation::ConvergenceMonitor;
