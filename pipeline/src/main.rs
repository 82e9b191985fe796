use std::env;

use comms::{LocalFabric, SparseBatch, SparseFeature};
use futures::future::try_join_all;
use log::{info, warn};
use rand::Rng;

use pipeline::{
    InMemorySource, PipelineErr, PooledLookupStep, Router, SparseDistPipeline, StepOutcome,
};
use sharding::{
    ComputeKernel, DataType, ParameterSharding, PoolingMode, ShardMetadata, ShardingPlan,
    ShardingType, TableConfig, shard_tables,
};

const DEFAULT_WORLD_SIZE: usize = 2;
const DEFAULT_STEPS: usize = 5;
const BATCH_SAMPLES: usize = 4;
const IDS_PER_SAMPLE: usize = 2;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Even row partition of `rows` across all ranks.
fn row_wise_everywhere(rows: usize, cols: usize, world_size: usize) -> ParameterSharding {
    let base = rows / world_size;
    let rem = rows % world_size;

    let mut shards = Vec::with_capacity(world_size);
    let mut start = 0;
    for rank in 0..world_size {
        let len = base + usize::from(rank < rem);
        shards.push(ShardMetadata::new([start, 0], [len, cols], rank));
        start += len;
    }

    ParameterSharding {
        sharding_type: ShardingType::RowWise,
        compute_kernel: ComputeKernel::Fused,
        ranks: (0..world_size).collect(),
        shards,
    }
}

fn table_config(name: &str, rows: usize, cols: usize, feature: &str) -> TableConfig {
    TableConfig {
        name: name.into(),
        num_embeddings: rows,
        embedding_dim: cols,
        pooling: PoolingMode::Sum,
        is_weighted: false,
        has_feature_processor: false,
        feature_names: vec![feature.into()],
        data_type: DataType::F32,
    }
}

fn random_ids(rng: &mut impl Rng, limit: u64) -> Vec<u64> {
    (0..BATCH_SAMPLES * IDS_PER_SAMPLE)
        .map(|_| rng.random_range(0..limit))
        .collect()
}

fn synthetic_batch(rng: &mut impl Rng, users_rows: u64, ads_rows: u64) -> SparseBatch {
    let lengths = vec![IDS_PER_SAMPLE as u32; BATCH_SAMPLES];

    SparseBatch::new(vec![
        SparseFeature::new("user_id", random_ids(rng, users_rows), lengths.clone()),
        SparseFeature::new("ad_id", random_ids(rng, ads_rows), lengths),
    ])
}

#[tokio::main]
async fn main() -> Result<(), PipelineErr> {
    env_logger::init();

    let world_size = env_usize("WORLD_SIZE", DEFAULT_WORLD_SIZE);
    let steps = env_usize("STEPS", DEFAULT_STEPS);
    let mut rng = rand::rng();

    let configs = [
        table_config("users", 64, 8, "user_id"),
        table_config("ads", 32, 4, "ad_id"),
    ];

    let mut plan = ShardingPlan::new();
    plan.insert("users", row_wise_everywhere(64, 8, world_size));
    plan.insert(
        "ads",
        ParameterSharding {
            sharding_type: ShardingType::TableWise,
            compute_kernel: ComputeKernel::Dense,
            ranks: vec![0],
            shards: vec![ShardMetadata::new([0, 0], [32, 4], 0)],
        },
    );

    let inits: Vec<Vec<f32>> = configs
        .iter()
        .map(|c| (0..c.dense_len()).map(|_| rng.random::<f32>()).collect())
        .collect();

    let assignments: Vec<_> = plan
        .assignments(&configs)?
        .into_iter()
        .zip(&inits)
        .map(|(a, init)| a.with_init(init))
        .collect();

    let tables_per_rank = shard_tables(&assignments, world_size)?;
    let router = Router::new(&assignments, world_size)?;
    let fabric = LocalFabric::new(world_size);

    info!(world_size = world_size, steps = steps; "sharded plan resolved, starting ranks");

    let mut handles = Vec::with_capacity(world_size);
    for (rank, tables) in tables_per_rank.into_iter().enumerate() {
        let batches: Vec<SparseBatch> =
            (0..steps).map(|_| synthetic_batch(&mut rng, 64, 32)).collect();

        let ctx = fabric.context(rank);
        let router = router.clone();
        let source = InMemorySource::new(batches);

        handles.push(tokio::spawn(async move {
            let mut pipeline =
                SparseDistPipeline::new(ctx, router, tables, source, PooledLookupStep);

            loop {
                match pipeline.advance().await? {
                    StepOutcome::Pending => {}
                    StepOutcome::Step(loss) => {
                        info!(rank = rank, step = pipeline.step(), loss = loss as f64; "step done");
                    }
                    StepOutcome::Done => break,
                }
            }

            Ok::<usize, PipelineErr>(pipeline.step())
        }));
    }

    let results = try_join_all(handles)
        .await
        .map_err(|e| PipelineErr::Io(std::io::Error::other(e)))?;

    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(completed) => info!(rank = rank, steps = completed; "rank finished"),
            Err(e) => {
                warn!(rank = rank; "rank failed: {e}");
                return Err(e);
            }
        }
    }

    Ok(())
}
