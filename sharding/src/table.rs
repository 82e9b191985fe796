use std::sync::Arc;

use crate::{
    config::{ComputeKernel, DataType, PoolingMode, TableConfig},
    metadata::{GlobalTableMetadata, ShardMetadata},
};

/// One table shard a rank materializes locally.
///
/// Carries the logical table's config fields, the local shard shape, this
/// rank's own shard metadata and the shared global metadata, so global
/// addressing is reconstructable without asking any other rank. Immutable for
/// the lifetime of the training job; owned exclusively by the materializing
/// rank.
#[derive(Debug, Clone)]
pub struct ShardedEmbeddingTable {
    pub name: String,
    pub num_embeddings: usize,
    pub embedding_dim: usize,
    pub pooling: PoolingMode,
    pub is_weighted: bool,
    pub has_feature_processor: bool,
    pub feature_names: Vec<String>,
    pub data_type: DataType,
    /// Rows of the local fragment.
    pub local_rows: usize,
    /// Columns of the local fragment.
    pub local_cols: usize,
    pub compute_kernel: ComputeKernel,
    pub local_metadata: ShardMetadata,
    pub global_metadata: Arc<GlobalTableMetadata>,
    /// The local rectangle of the initial tensor, row-major
    /// `[local_rows x local_cols]`. Absent for metadata-only sharding.
    pub local_weights: Option<Box<[f32]>>,
}

impl ShardedEmbeddingTable {
    pub(crate) fn new(
        config: &TableConfig,
        local_rows: usize,
        local_cols: usize,
        compute_kernel: ComputeKernel,
        local_metadata: ShardMetadata,
        global_metadata: Arc<GlobalTableMetadata>,
        local_weights: Option<Box<[f32]>>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            num_embeddings: config.num_embeddings,
            embedding_dim: config.embedding_dim,
            pooling: config.pooling,
            is_weighted: config.is_weighted,
            has_feature_processor: config.has_feature_processor,
            feature_names: config.feature_names.clone(),
            data_type: config.data_type,
            local_rows,
            local_cols,
            compute_kernel,
            local_metadata,
            global_metadata,
            local_weights,
        }
    }

    /// Number of values in the local fragment.
    #[inline]
    pub fn local_len(&self) -> usize {
        self.local_rows * self.local_cols
    }

    /// Maps a global row id to the local row index, if this shard holds it.
    #[inline]
    pub fn local_row(&self, global_row: u64) -> Option<usize> {
        let row = global_row as usize;
        let start = self.local_metadata.shard_offsets[0];
        let end = start + self.local_rows;
        (start..end).contains(&row).then(|| row - start)
    }
}
