use comms::RoutedBatch;
use sharding::ShardedEmbeddingTable;

use crate::error::Result;

/// Abstraction over the per-step compute executed on a rank's shards.
///
/// Implementations encapsulate all model-, loss- and optimizer-specific
/// logic: the forward pass over the pooled lookups, the backward pass, and
/// the optimizer update. The pipeline treats this trait as a black box that
/// maps (local shards, routed ids) to a step loss.
///
/// This trait is the *compute policy boundary*: it is the only interface the
/// pipeline requires to drive training. Everything numerical lives behind
/// implementations of it.
pub trait StepStrategy: Send {
    /// Executes one training step's forward/backward/update.
    ///
    /// # Arguments
    /// * `tables` - The shards this rank materialized, in input table order.
    /// * `batch` - The sparse ids routed to this rank for the step.
    ///
    /// # Returns
    /// The step's loss on success.
    ///
    /// # Panics
    /// Implementations should not panic; they should report failures via
    /// `PipelineErr`.
    fn step(&mut self, tables: &[ShardedEmbeddingTable], batch: &RoutedBatch) -> Result<f32>;
}
