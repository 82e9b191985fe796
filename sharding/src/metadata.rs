//! Shard and global-table metadata.
//!
//! A `GlobalTableMetadata` is only ever constructed through `validated`, so a
//! value in hand is proof that its shards partition the table under the
//! declared layout. Both types are read-only after construction and freely
//! shared across ranks.

use serde::{Deserialize, Serialize};

use crate::{
    config::ShardingType,
    error::{Result, ShardingErr},
};

/// One physical rectangular fragment of a table.
///
/// `shard_offsets` / `shard_sizes` are `[row, col]` pairs into the owning
/// table's `[rows x cols]` matrix. `rank` owns the fragment exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMetadata {
    pub shard_offsets: [usize; 2],
    pub shard_sizes: [usize; 2],
    pub rank: usize,
}

impl ShardMetadata {
    pub fn new(shard_offsets: [usize; 2], shard_sizes: [usize; 2], rank: usize) -> Self {
        Self {
            shard_offsets,
            shard_sizes,
            rank,
        }
    }

    /// Exclusive end offsets of the fragment, per axis.
    #[inline]
    pub fn ends(&self) -> [usize; 2] {
        [
            self.shard_offsets[0] + self.shard_sizes[0],
            self.shard_offsets[1] + self.shard_sizes[1],
        ]
    }
}

/// The global shape of a logical table and the full list of its shards.
///
/// Shared read-only by every `ShardedEmbeddingTable` derived from the same
/// logical table, so any rank can reconstruct global addressing from its
/// local shard alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTableMetadata {
    /// `[num_embeddings, embedding_dim]`.
    pub size: [usize; 2],
    pub shards: Vec<ShardMetadata>,
}

impl GlobalTableMetadata {
    /// Builds the metadata after checking the layout rule for `layout`.
    ///
    /// The shards must be mutually disjoint along the sharded axis and cover
    /// the full table with no gaps; the non-sharded axis must always be
    /// spanned completely. Table-wise layouts require exactly one shard
    /// covering the whole table.
    ///
    /// # Arguments
    /// * `table` - The table name, used to attribute errors.
    /// * `size` - The full `[rows, cols]` shape.
    /// * `shards` - The plan's shard list, in plan order.
    /// * `layout` - The sharding type whose layout rule applies.
    ///
    /// # Errors
    /// A `ShardingErr` naming the violated invariant. Construction failing
    /// here stops the job before any communication is issued.
    pub fn validated(
        table: &str,
        size: [usize; 2],
        shards: Vec<ShardMetadata>,
        layout: ShardingType,
    ) -> Result<Self> {
        match layout {
            ShardingType::TableWise => {
                if shards.len() != 1 {
                    return Err(ShardingErr::ShardCount {
                        table: table.into(),
                        got: shards.len(),
                        expected: 1,
                    });
                }
                // The single shard must span both axes entirely.
                check_full_span(table, &shards, size, 0)?;
                check_full_span(table, &shards, size, 1)?;
            }
            ShardingType::RowWise => {
                check_full_span(table, &shards, size, 1)?;
                check_partition(table, &shards, size, 0)?;
            }
            ShardingType::ColumnWise => {
                check_full_span(table, &shards, size, 0)?;
                check_partition(table, &shards, size, 1)?;
            }
        }

        Ok(Self { size, shards })
    }

    /// The shards owned by `rank`, in plan order.
    pub fn shards_on(&self, rank: usize) -> impl Iterator<Item = &ShardMetadata> {
        self.shards.iter().filter(move |s| s.rank == rank)
    }
}

/// Checks that every shard spans `0..size[axis]` on the non-sharded axis.
fn check_full_span(
    table: &str,
    shards: &[ShardMetadata],
    size: [usize; 2],
    axis: usize,
) -> Result<()> {
    for shard in shards {
        if shard.shard_offsets[axis] != 0 || shard.shard_sizes[axis] != size[axis] {
            return Err(ShardingErr::ShardSpan {
                table: table.into(),
                axis,
                got: [shard.shard_offsets[axis], shard.shard_sizes[axis]],
                expected: [0, size[axis]],
            });
        }
    }
    Ok(())
}

/// Checks that the shards' spans on `axis` are disjoint and exhaustive.
fn check_partition(
    table: &str,
    shards: &[ShardMetadata],
    size: [usize; 2],
    axis: usize,
) -> Result<()> {
    let mut spans: Vec<(usize, usize)> = shards
        .iter()
        .map(|s| (s.shard_offsets[axis], s.shard_sizes[axis]))
        .collect();
    spans.sort_unstable();

    let mut cursor = 0;
    for (offset, len) in spans {
        if offset < cursor {
            return Err(ShardingErr::ShardOverlap {
                table: table.into(),
                axis,
                offset,
            });
        }
        if offset > cursor {
            return Err(ShardingErr::CoverageMismatch {
                table: table.into(),
                axis,
                expected: cursor,
                got: offset,
            });
        }
        cursor = offset + len;
    }

    if cursor != size[axis] {
        return Err(ShardingErr::CoverageMismatch {
            table: table.into(),
            axis,
            expected: size[axis],
            got: cursor,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_shard(start: usize, rows: usize, cols: usize, rank: usize) -> ShardMetadata {
        ShardMetadata::new([start, 0], [rows, cols], rank)
    }

    #[test]
    fn table_wise_requires_single_full_shard() {
        let meta = GlobalTableMetadata::validated(
            "ads",
            [100, 8],
            vec![ShardMetadata::new([0, 0], [100, 8], 3)],
            ShardingType::TableWise,
        )
        .unwrap();

        assert_eq!(meta.size, [100, 8]);
        assert_eq!(meta.shards_on(3).count(), 1);
        assert_eq!(meta.shards_on(0).count(), 0);
    }

    #[test]
    fn table_wise_rejects_partial_shard() {
        let err = GlobalTableMetadata::validated(
            "ads",
            [100, 8],
            vec![ShardMetadata::new([0, 0], [50, 8], 0)],
            ShardingType::TableWise,
        )
        .unwrap_err();

        assert!(matches!(err, ShardingErr::ShardSpan { axis: 0, .. }));
    }

    #[test]
    fn row_wise_accepts_exact_partition() {
        let meta = GlobalTableMetadata::validated(
            "ads",
            [10, 4],
            vec![row_shard(0, 4, 4, 0), row_shard(4, 3, 4, 1), row_shard(7, 3, 4, 2)],
            ShardingType::RowWise,
        )
        .unwrap();

        let reconstructed: usize = meta.shards.iter().map(|s| s.shard_sizes[0]).sum();
        assert_eq!(reconstructed, 10);
    }

    #[test]
    fn row_wise_rejects_overlap() {
        let err = GlobalTableMetadata::validated(
            "ads",
            [10, 4],
            vec![row_shard(0, 6, 4, 0), row_shard(4, 6, 4, 1)],
            ShardingType::RowWise,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ShardingErr::ShardOverlap { axis: 0, offset: 4, .. }
        ));
    }

    #[test]
    fn row_wise_rejects_gap() {
        let err = GlobalTableMetadata::validated(
            "ads",
            [10, 4],
            vec![row_shard(0, 4, 4, 0), row_shard(6, 4, 4, 1)],
            ShardingType::RowWise,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ShardingErr::CoverageMismatch {
                axis: 0,
                expected: 4,
                got: 6,
                ..
            }
        ));
    }

    #[test]
    fn row_wise_rejects_short_coverage() {
        let err = GlobalTableMetadata::validated(
            "ads",
            [10, 4],
            vec![row_shard(0, 4, 4, 0), row_shard(4, 4, 4, 1)],
            ShardingType::RowWise,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ShardingErr::CoverageMismatch {
                axis: 0,
                expected: 10,
                got: 8,
                ..
            }
        ));
    }

    #[test]
    fn column_wise_requires_full_height() {
        let err = GlobalTableMetadata::validated(
            "ads",
            [10, 8],
            vec![ShardMetadata::new([2, 0], [8, 8], 0)],
            ShardingType::ColumnWise,
        )
        .unwrap_err();

        assert!(matches!(err, ShardingErr::ShardSpan { axis: 0, .. }));
    }

    #[test]
    fn column_wise_accepts_unordered_shard_list() {
        // Validation must not depend on plan order.
        let meta = GlobalTableMetadata::validated(
            "ads",
            [10, 8],
            vec![
                ShardMetadata::new([0, 4], [10, 4], 1),
                ShardMetadata::new([0, 0], [10, 4], 0),
            ],
            ShardingType::ColumnWise,
        )
        .unwrap();

        assert_eq!(meta.shards.len(), 2);
    }
}
