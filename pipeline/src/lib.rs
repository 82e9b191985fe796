pub mod error;
pub mod kernel;
pub mod pipeline;
pub mod route;
pub mod source;
pub mod strategy;

pub use error::{PipelineErr, Result};
pub use kernel::{PooledLookupStep, pooled_lookup};
pub use pipeline::{SparseDistPipeline, StepOutcome};
pub use route::Router;
pub use source::{BatchSource, InMemorySource};
pub use strategy::StepStrategy;
