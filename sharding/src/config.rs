//! Table-authoring and plan input types.
//!
//! `TableConfig` is created once at model-authoring time and read-only
//! thereafter; `ParameterSharding` is the planner's placement decision for one
//! table. Both are inputs consumed by `shard_tables`, never produced here.

use serde::{Deserialize, Serialize};

use crate::metadata::ShardMetadata;

/// How looked-up rows of one sample are combined. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolingMode {
    Sum,
    Mean,
}

/// Storage element type of a table. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    F32,
    F16,
}

/// The enumerated lookup-execution strategy for a shard. Opaque to the engine;
/// resolved from the plan and carried through to the compute layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeKernel {
    Dense,
    Fused,
    Quantized,
}

/// How a table is split across ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingType {
    /// The whole table lives on one rank.
    TableWise,
    /// Shards partition the rows; every shard spans the full width.
    RowWise,
    /// Shards partition the columns; every shard spans the full height.
    ColumnWise,
}

/// The logical description of one embedding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub num_embeddings: usize,
    pub embedding_dim: usize,
    pub pooling: PoolingMode,
    pub is_weighted: bool,
    pub has_feature_processor: bool,
    /// The sparse features that look up into this table.
    pub feature_names: Vec<String>,
    pub data_type: DataType,
}

impl TableConfig {
    /// Total value count of the full `[rows x cols]` table.
    #[inline]
    pub fn dense_len(&self) -> usize {
        self.num_embeddings * self.embedding_dim
    }
}

/// The planner's placement decision for one table.
///
/// `ranks[i]` owns `shards[i]`. Duplicate rank ids are allowed; such a rank
/// simply accumulates several shards of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSharding {
    pub sharding_type: ShardingType,
    pub compute_kernel: ComputeKernel,
    pub ranks: Vec<usize>,
    pub shards: Vec<ShardMetadata>,
}
