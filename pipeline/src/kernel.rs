//! Dense pooled-lookup reference kernel.

use comms::RoutedBatch;
use ndarray::{Array1, ArrayView2};
use sharding::{PoolingMode, ShardedEmbeddingTable};

use crate::{
    error::{PipelineErr, Result},
    strategy::StepStrategy,
};

/// Looks up `ids` in the shard's local weights and pools them into a single
/// `local_cols`-wide vector.
///
/// Ids whose rows live on a sibling shard of the same table are skipped; with
/// sum pooling the partial results of all shards add up to the global pooled
/// value. `weights` scales each id's row (empty means unweighted).
///
/// # Errors
/// - `MissingWeights` when the table was sharded without an initial tensor.
/// - `Compute` when the weight buffer does not match the shard shape.
pub fn pooled_lookup(
    table: &ShardedEmbeddingTable,
    ids: &[u64],
    weights: &[f32],
) -> Result<Vec<f32>> {
    let values = table
        .local_weights
        .as_deref()
        .ok_or_else(|| PipelineErr::MissingWeights {
            table: table.name.clone(),
        })?;

    let view = ArrayView2::from_shape((table.local_rows, table.local_cols), values).map_err(
        |e| PipelineErr::Compute {
            table: table.name.clone(),
            detail: e.to_string(),
        },
    )?;

    let mut pooled = Array1::<f32>::zeros(table.local_cols);
    let mut hits = 0usize;

    for (i, &id) in ids.iter().enumerate() {
        let Some(row) = table.local_row(id) else {
            continue;
        };

        let scale = weights.get(i).copied().unwrap_or(1.0);
        pooled.scaled_add(scale, &view.row(row));
        hits += 1;
    }

    if table.pooling == PoolingMode::Mean && hits > 0 {
        pooled /= hits as f32;
    }

    Ok(pooled.to_vec())
}

/// Reference step strategy: runs the pooled lookups for every local shard
/// and reports the mean pooled value as the step "loss".
///
/// Stands in for a real model's forward/backward/update in the demo driver
/// and the tests; training systems plug their own `StepStrategy` in.
#[derive(Debug, Clone, Copy, Default)]
pub struct PooledLookupStep;

impl StepStrategy for PooledLookupStep {
    fn step(&mut self, tables: &[ShardedEmbeddingTable], batch: &RoutedBatch) -> Result<f32> {
        let mut total = 0.0f32;
        let mut count = 0usize;

        for table in tables {
            let Some(routed) = batch.ids_for(&table.name) else {
                continue;
            };

            let pooled = pooled_lookup(table, &routed.ids, &routed.weights)?;
            total += pooled.iter().sum::<f32>();
            count += pooled.len();
        }

        if count == 0 {
            return Ok(0.0);
        }
        Ok(total / count as f32)
    }
}
