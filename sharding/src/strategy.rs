//! Placement resolution: turning `(config, plan)` pairs into per-rank tables.
//!
//! One shared routine drives all three sharding types; the variants differ
//! only in their layout rule (checked by `GlobalTableMetadata::validated`)
//! and in how a shard's metadata translates into a local `[rows, cols]`
//! shape.

use std::sync::Arc;

use log::debug;

use crate::{
    config::{ParameterSharding, ShardingType, TableConfig},
    error::{Result, ShardingErr},
    metadata::ShardMetadata,
    table::ShardedEmbeddingTable,
};

use crate::metadata::GlobalTableMetadata;

/// One table's sharding input: its config, the planner's placement and an
/// optional initial tensor (row-major `[num_embeddings x embedding_dim]`).
#[derive(Debug, Clone, Copy)]
pub struct TableAssignment<'a> {
    pub config: &'a TableConfig,
    pub sharding: &'a ParameterSharding,
    pub init: Option<&'a [f32]>,
}

impl<'a> TableAssignment<'a> {
    pub fn new(config: &'a TableConfig, sharding: &'a ParameterSharding) -> Self {
        Self {
            config,
            sharding,
            init: None,
        }
    }

    pub fn with_init(mut self, init: &'a [f32]) -> Self {
        self.init = Some(init);
        self
    }
}

impl ShardingType {
    /// The local `[rows, cols]` shape a shard materializes under this layout.
    fn local_size(self, config: &TableConfig, shard: &ShardMetadata) -> [usize; 2] {
        match self {
            ShardingType::TableWise => [config.num_embeddings, config.embedding_dim],
            ShardingType::RowWise => [shard.shard_sizes[0], config.embedding_dim],
            ShardingType::ColumnWise => [config.num_embeddings, shard.shard_sizes[1]],
        }
    }
}

/// Resolves every table's placement into the per-rank lists of tables to
/// materialize.
///
/// A pure transform: no communication is issued, only metadata and (when an
/// initial tensor is given) the local slice of its values. The output has
/// `world_size` entries; entry `r` holds every `ShardedEmbeddingTable` rank
/// `r` owns, in input table order. That ordering is load-bearing: downstream
/// compute iterates these lists positionally against the feature lookups.
///
/// # Arguments
/// * `assignments` - One entry per table, in model order.
/// * `world_size` - Number of participating ranks.
///
/// # Errors
/// Any malformed placement fails the whole resolution eagerly; see
/// `ShardingErr` for the individual invariants.
pub fn shard_tables(
    assignments: &[TableAssignment<'_>],
    world_size: usize,
) -> Result<Vec<Vec<ShardedEmbeddingTable>>> {
    let mut tables_per_rank: Vec<Vec<ShardedEmbeddingTable>> =
        (0..world_size).map(|_| Vec::new()).collect();

    for assignment in assignments {
        let config = assignment.config;
        let sharding = assignment.sharding;

        validate_placement(config, sharding, world_size)?;

        if let Some(init) = assignment.init
            && init.len() != config.dense_len()
        {
            return Err(ShardingErr::InitSizeMismatch {
                table: config.name.clone(),
                got: init.len(),
                expected: config.dense_len(),
            });
        }

        let global = Arc::new(GlobalTableMetadata::validated(
            &config.name,
            [config.num_embeddings, config.embedding_dim],
            sharding.shards.clone(),
            sharding.sharding_type,
        )?);

        debug!(
            table = config.name.as_str(),
            shards = sharding.shards.len();
            "resolved table placement"
        );

        for (&rank, shard) in sharding.ranks.iter().zip(&sharding.shards) {
            let [local_rows, local_cols] = sharding.sharding_type.local_size(config, shard);

            let local_weights = assignment
                .init
                .map(|init| slice_rect(init, config.embedding_dim, shard.shard_offsets, [local_rows, local_cols]));

            tables_per_rank[rank].push(ShardedEmbeddingTable::new(
                config,
                local_rows,
                local_cols,
                sharding.compute_kernel,
                *shard,
                Arc::clone(&global),
                local_weights,
            ));
        }
    }

    Ok(tables_per_rank)
}

/// Eager checks that do not depend on the layout rule.
fn validate_placement(
    config: &TableConfig,
    sharding: &ParameterSharding,
    world_size: usize,
) -> Result<()> {
    if sharding.ranks.len() != sharding.shards.len() {
        return Err(ShardingErr::RanksShardsMismatch {
            table: config.name.clone(),
            ranks: sharding.ranks.len(),
            shards: sharding.shards.len(),
        });
    }

    for (i, (&rank, shard)) in sharding.ranks.iter().zip(&sharding.shards).enumerate() {
        if rank >= world_size {
            return Err(ShardingErr::RankOutOfRange {
                table: config.name.clone(),
                rank,
                world_size,
            });
        }
        if shard.rank != rank {
            return Err(ShardingErr::OwnerMismatch {
                table: config.name.clone(),
                index: i,
                rank,
                shard_rank: shard.rank,
            });
        }
    }

    Ok(())
}

/// Copies the `[rows x cols]` rectangle at `offsets` out of a row-major
/// buffer with row stride `stride`.
fn slice_rect(src: &[f32], stride: usize, offsets: [usize; 2], sizes: [usize; 2]) -> Box<[f32]> {
    let [row0, col0] = offsets;
    let [rows, cols] = sizes;

    let mut out = Vec::with_capacity(rows * cols);
    for row in row0..row0 + rows {
        let start = row * stride + col0;
        out.extend_from_slice(&src[start..start + cols]);
    }
    out.into_boxed_slice()
}
