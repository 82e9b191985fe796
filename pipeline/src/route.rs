//! Bucketing a batch's sparse ids by the ranks that own the relevant shards.

use std::collections::HashMap;

use comms::{SparseBatch, SparseBucketed};
use sharding::{ShardingType, TableAssignment};

use crate::error::{PipelineErr, Result};

/// Per-table destination rule.
#[derive(Debug, Clone)]
enum RouteRule {
    /// Every owning rank needs all of the table's ids (table-wise sharding
    /// has one owner; column-wise owners each hold a column slice of every
    /// row).
    Owners(Vec<usize>),
    /// Row-wise: the id's row decides the owner. `(start, end, rank)`
    /// entries, sorted by `start`, partitioning `0..num_embeddings`.
    RowRanges(Vec<(usize, usize, usize)>),
}

#[derive(Debug, Clone)]
struct TableRoute {
    name: String,
    rows: usize,
    rule: RouteRule,
}

/// Maps each feature of a batch to destination-rank buckets, using the same
/// `(config, placement)` pairs the sharding strategy consumed.
#[derive(Debug, Clone)]
pub struct Router {
    world_size: usize,
    tables: Vec<TableRoute>,
    /// feature name -> index into `tables` (input table order).
    features: HashMap<String, usize>,
}

impl Router {
    /// Builds the routing rules for every table.
    ///
    /// # Arguments
    /// * `assignments` - The same per-table inputs given to `shard_tables`,
    ///   in the same order; routed output is keyed by table name.
    /// * `world_size` - Number of participating ranks.
    ///
    /// # Errors
    /// `PipelineErr::DuplicateFeature` when two tables claim one feature.
    pub fn new(assignments: &[TableAssignment<'_>], world_size: usize) -> Result<Self> {
        let mut tables = Vec::with_capacity(assignments.len());
        let mut features = HashMap::new();

        for (index, assignment) in assignments.iter().enumerate() {
            let config = assignment.config;
            let sharding = assignment.sharding;

            let rule = match sharding.sharding_type {
                ShardingType::TableWise | ShardingType::ColumnWise => {
                    let mut owners = sharding.ranks.clone();
                    owners.sort_unstable();
                    owners.dedup();
                    RouteRule::Owners(owners)
                }
                ShardingType::RowWise => {
                    let mut ranges: Vec<_> = sharding
                        .shards
                        .iter()
                        .map(|s| {
                            (
                                s.shard_offsets[0],
                                s.shard_offsets[0] + s.shard_sizes[0],
                                s.rank,
                            )
                        })
                        .collect();
                    ranges.sort_unstable();
                    RouteRule::RowRanges(ranges)
                }
            };

            for feature in &config.feature_names {
                if features.insert(feature.clone(), index).is_some() {
                    return Err(PipelineErr::DuplicateFeature {
                        feature: feature.clone(),
                    });
                }
            }

            tables.push(TableRoute {
                name: config.name.clone(),
                rows: config.num_embeddings,
                rule,
            });
        }

        Ok(Self {
            world_size,
            tables,
            features,
        })
    }

    /// Splits `batch` into one bucket per destination rank.
    ///
    /// # Errors
    /// - `UnknownFeature` for a feature no table claims.
    /// - `IdOutOfRange` for an id beyond its table's rows.
    pub fn bucket(&self, batch: &SparseBatch) -> Result<SparseBucketed> {
        let mut out = SparseBucketed::empty(self.world_size);

        for feature in &batch.features {
            let &table_ix = self.features.get(&feature.name).ok_or_else(|| {
                PipelineErr::UnknownFeature {
                    feature: feature.name.clone(),
                }
            })?;
            let table = &self.tables[table_ix];

            match &table.rule {
                RouteRule::Owners(owners) => {
                    // The owner holds every row, so ids are only validated
                    // here, never at lookup time.
                    if let Some(&id) = feature.ids.iter().find(|&&id| id as usize >= table.rows) {
                        return Err(PipelineErr::IdOutOfRange {
                            table: table.name.clone(),
                            id,
                            rows: table.rows,
                        });
                    }

                    for &owner in owners {
                        let slot = out.buckets[owner].entry(&table.name);
                        slot.ids.extend_from_slice(&feature.ids);
                        slot.weights.extend_from_slice(&feature.weights);
                    }
                }
                RouteRule::RowRanges(ranges) => {
                    for (i, &id) in feature.ids.iter().enumerate() {
                        let owner = owner_of(ranges, id).ok_or_else(|| {
                            PipelineErr::IdOutOfRange {
                                table: table.name.clone(),
                                id,
                                rows: table.rows,
                            }
                        })?;

                        let slot = out.buckets[owner].entry(&table.name);
                        slot.ids.push(id);
                        if let Some(&w) = feature.weights.get(i) {
                            slot.weights.push(w);
                        }
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Finds the rank owning `id`'s row, by binary search over sorted ranges.
fn owner_of(ranges: &[(usize, usize, usize)], id: u64) -> Option<usize> {
    let row = id as usize;
    let ix = ranges.partition_point(|&(start, _, _)| start <= row);
    let &(start, end, rank) = ranges.get(ix.checked_sub(1)?)?;
    (row >= start && row < end).then_some(rank)
}
