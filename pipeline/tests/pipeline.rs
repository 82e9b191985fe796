//! End-to-end pipeline runs over an in-process fabric.

use std::sync::{Arc, Mutex};

use comms::{
    Awaitable, CommContext, CommErr, LocalFabric, RoutedBatch, SparseBatch, SparseBucketed,
    SparseFeature,
};
use pipeline::{
    InMemorySource, PipelineErr, PooledLookupStep, Result, Router, SparseDistPipeline,
    StepOutcome, StepStrategy,
};
use sharding::{
    ComputeKernel, DataType, ParameterSharding, PoolingMode, ShardMetadata, ShardingType,
    TableAssignment, TableConfig, shard_tables,
};

fn config(name: &str, rows: usize, cols: usize, feature: &str) -> TableConfig {
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

fn table_wise(rows: usize, cols: usize, rank: usize) -> ParameterSharding {
    ParameterSharding {
        sharding_type: ShardingType::TableWise,
        compute_kernel: ComputeKernel::Dense,
        ranks: vec![rank],
        shards: vec![ShardMetadata::new([0, 0], [rows, cols], rank)],
    }
}

fn ad_batch(ids: Vec<u64>) -> SparseBatch {
    let len = ids.len() as u32;
    SparseBatch::new(vec![SparseFeature::new("ad_id", ids, vec![len])])
}

/// Records the ids routed to one rank for the "emb" table, step by step.
#[derive(Clone, Default)]
struct RecordingStep {
    seen: Arc<Mutex<Vec<Vec<u64>>>>,
}

impl StepStrategy for RecordingStep {
    fn step(&mut self, _: &[sharding::ShardedEmbeddingTable], batch: &RoutedBatch) -> Result<f32> {
        let ids = batch
            .ids_for("emb")
            .map(|routed| routed.ids.clone())
            .unwrap_or_default();
        self.seen.lock().unwrap().push(ids);
        Ok(0.0)
    }
}

/// A context whose exchanges always fail after the handle is handed out.
struct FailingCtx;

impl CommContext for FailingCtx {
    fn world_size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn exchange_sparse(&self, _: SparseBucketed) -> Awaitable<RoutedBatch> {
        let (resolver, handle) = Awaitable::pending();
        resolver.fail(CommErr::Lost);
        handle
    }
}

#[tokio::test]
async fn table_wise_two_rank_three_step_run() {
    let cfg = config("ads", 1000, 16, "ad_id");
    let ps = table_wise(1000, 16, 0);
    let init = vec![1.0f32; cfg.dense_len()];
    let assignments = vec![TableAssignment::new(&cfg, &ps).with_init(&init)];

    let mut per_rank = shard_tables(&assignments, 2).unwrap();
    let router = Router::new(&assignments, 2).unwrap();
    let fabric = LocalFabric::new(2);

    assert_eq!(per_rank[0].len(), 1);
    assert!(per_rank[1].is_empty());

    let rank1_tables = per_rank.pop().unwrap();
    let rank0_tables = per_rank.pop().unwrap();

    let rank1_router = router.clone();
    let rank1_ctx = fabric.context(1);
    let rank1 = tokio::spawn(async move {
        let source = InMemorySource::new(vec![
            ad_batch(vec![10, 20]),
            ad_batch(vec![30, 40]),
            ad_batch(vec![50, 999]),
        ]);
        let mut pipeline =
            SparseDistPipeline::new(rank1_ctx, rank1_router, rank1_tables, source, PooledLookupStep);
        pipeline.run_to_completion().await
    });

    let source = InMemorySource::new(vec![
        ad_batch(vec![0, 1]),
        ad_batch(vec![2, 3]),
        ad_batch(vec![4, 5]),
    ]);
    let mut pipeline =
        SparseDistPipeline::new(fabric.context(0), router, rank0_tables, source, PooledLookupStep);

    let mut outcomes = Vec::new();
    loop {
        let outcome = pipeline.advance().await.unwrap();
        assert!(pipeline.outstanding() <= 1);
        if outcome == StepOutcome::Done {
            break;
        }
        outcomes.push(outcome);
    }

    // Warmup, then three computed steps. Every step pools four all-ones rows
    // per column on rank 0, so each loss is exactly 4.
    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[0], StepOutcome::Pending);
    for outcome in &outcomes[1..] {
        assert_eq!(*outcome, StepOutcome::Step(4.0));
    }
    assert_eq!(pipeline.step(), 3);

    // Rank 1 holds no shard of the table, so its losses are empty pools.
    let rank1_losses = rank1.await.unwrap().unwrap();
    assert_eq!(rank1_losses, vec![0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn exhaustion_drains_the_final_handle() {
    let cfg = config("ads", 8, 2, "ad_id");
    let ps = table_wise(8, 2, 0);
    let init = vec![0.5f32; cfg.dense_len()];
    let assignments = vec![TableAssignment::new(&cfg, &ps).with_init(&init)];

    let tables = shard_tables(&assignments, 1).unwrap().remove(0);
    let router = Router::new(&assignments, 1).unwrap();
    let fabric = LocalFabric::new(1);

    let source = InMemorySource::new(vec![ad_batch(vec![0, 7])]);
    let mut pipeline =
        SparseDistPipeline::new(fabric.context(0), router, tables, source, PooledLookupStep);

    assert_eq!(pipeline.advance().await.unwrap(), StepOutcome::Pending);
    assert_eq!(pipeline.outstanding(), 1);

    // The source is now empty, but the warmup exchange is still in flight:
    // it must be computed before the pipeline reports completion.
    assert_eq!(pipeline.advance().await.unwrap(), StepOutcome::Step(1.0));
    assert_eq!(pipeline.outstanding(), 0);

    assert_eq!(pipeline.advance().await.unwrap(), StepOutcome::Done);
    assert_eq!(pipeline.advance().await.unwrap(), StepOutcome::Done);
}

#[tokio::test]
async fn exchange_failure_surfaces_at_the_next_wait() {
    let cfg = config("ads", 8, 2, "ad_id");
    let ps = table_wise(8, 2, 0);
    let assignments = vec![TableAssignment::new(&cfg, &ps)];

    let tables = shard_tables(&assignments, 1).unwrap().remove(0);
    let router = Router::new(&assignments, 1).unwrap();

    let source = InMemorySource::new(vec![ad_batch(vec![0]), ad_batch(vec![1])]);
    let mut pipeline =
        SparseDistPipeline::new(FailingCtx, router, tables, source, PooledLookupStep);

    // Issuing the doomed exchange succeeds; the failure is only observable
    // once the next call waits on its handle.
    assert_eq!(pipeline.advance().await.unwrap(), StepOutcome::Pending);

    let err = pipeline.advance().await.unwrap_err();
    assert!(matches!(err, PipelineErr::Comm(CommErr::Lost)));
    assert_eq!(pipeline.step(), 0);
}

#[tokio::test]
async fn shutdown_drains_the_in_flight_exchange() {
    let cfg = config("ads", 8, 2, "ad_id");
    let ps = table_wise(8, 2, 0);
    let init = vec![1.0f32; cfg.dense_len()];
    let assignments = vec![TableAssignment::new(&cfg, &ps).with_init(&init)];

    let tables = shard_tables(&assignments, 1).unwrap().remove(0);
    let router = Router::new(&assignments, 1).unwrap();
    let fabric = LocalFabric::new(1);

    let source = InMemorySource::new(vec![ad_batch(vec![3])]);
    let mut pipeline =
        SparseDistPipeline::new(fabric.context(0), router, tables, source, PooledLookupStep);

    assert_eq!(pipeline.advance().await.unwrap(), StepOutcome::Pending);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn column_wise_routes_every_id_to_each_owner() {
    // 8x128 table split into four 32-column shards alternating between two
    // ranks. Every owner holds a slice of every row, so both ranks must see
    // the full id list each step.
    let cfg = config("emb", 8, 128, "emb_id");
    let ps = ParameterSharding {
        sharding_type: ShardingType::ColumnWise,
        compute_kernel: ComputeKernel::Dense,
        ranks: vec![0, 1, 0, 1],
        shards: vec![
            ShardMetadata::new([0, 0], [8, 32], 0),
            ShardMetadata::new([0, 32], [8, 32], 1),
            ShardMetadata::new([0, 64], [8, 32], 0),
            ShardMetadata::new([0, 96], [8, 32], 1),
        ],
    };
    let assignments = vec![TableAssignment::new(&cfg, &ps)];

    let mut per_rank = shard_tables(&assignments, 2).unwrap();
    let router = Router::new(&assignments, 2).unwrap();
    let fabric = LocalFabric::new(2);

    let rank1_tables = per_rank.pop().unwrap();
    let rank0_tables = per_rank.pop().unwrap();
    assert_eq!(rank0_tables.len(), 2);
    assert_eq!(rank1_tables.len(), 2);

    let batch = SparseBatch::new(vec![SparseFeature::new("emb_id", vec![1, 5, 1], vec![3])]);

    let recorder0 = RecordingStep::default();
    let recorder1 = RecordingStep::default();

    let rank1_router = router.clone();
    let rank1_ctx = fabric.context(1);
    let rank1_step = recorder1.clone();
    let rank1_batch = batch.clone();
    let rank1 = tokio::spawn(async move {
        let source = InMemorySource::new(vec![rank1_batch]);
        let mut pipeline =
            SparseDistPipeline::new(rank1_ctx, rank1_router, rank1_tables, source, rank1_step);
        pipeline.run_to_completion().await
    });

    let source = InMemorySource::new(vec![batch]);
    let mut pipeline = SparseDistPipeline::new(
        fabric.context(0),
        router,
        rank0_tables,
        source,
        recorder0.clone(),
    );
    pipeline.run_to_completion().await.unwrap();
    rank1.await.unwrap().unwrap();

    // Both ranks issued the same batch, so each owner received two copies.
    let seen0 = recorder0.seen.lock().unwrap();
    let seen1 = recorder1.seen.lock().unwrap();
    assert_eq!(seen0.as_slice(), &[vec![1, 5, 1, 1, 5, 1]]);
    assert_eq!(seen1.as_slice(), &[vec![1, 5, 1, 1, 5, 1]]);
}
