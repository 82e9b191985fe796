use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire sharding module.
pub type Result<T> = std::result::Result<T, ShardingErr>;

/// Plan and placement configuration failures.
///
/// All of these indicate a bad sharding plan. They are detected eagerly while
/// resolving placements, before any communication is issued, and each names
/// the offending table and the invariant it violates.
#[derive(Debug)]
pub enum ShardingErr {
    RanksShardsMismatch {
        table: String,
        ranks: usize,
        shards: usize,
    },
    RankOutOfRange {
        table: String,
        rank: usize,
        world_size: usize,
    },
    ShardCount {
        table: String,
        got: usize,
        expected: usize,
    },
    ShardSpan {
        table: String,
        axis: usize,
        got: [usize; 2],
        expected: [usize; 2],
    },
    ShardOverlap {
        table: String,
        axis: usize,
        offset: usize,
    },
    CoverageMismatch {
        table: String,
        axis: usize,
        expected: usize,
        got: usize,
    },
    InitSizeMismatch {
        table: String,
        got: usize,
        expected: usize,
    },
    OwnerMismatch {
        table: String,
        index: usize,
        rank: usize,
        shard_rank: usize,
    },
    UnplacedTable {
        table: String,
    },
}

impl Display for ShardingErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShardingErr::RanksShardsMismatch {
                table,
                ranks,
                shards,
            } => format!(
                "Table {table} declares {ranks} ranks but {shards} shards, the lists must pair up one to one"
            ),
            ShardingErr::RankOutOfRange {
                table,
                rank,
                world_size,
            } => format!(
                "Table {table} places a shard on rank {rank}, valid ranks are 0..{world_size}"
            ),
            ShardingErr::ShardCount {
                table,
                got,
                expected,
            } => format!(
                "Table {table} has {got} shards, its sharding layout requires exactly {expected}"
            ),
            ShardingErr::ShardSpan {
                table,
                axis,
                got,
                expected,
            } => format!(
                "Table {table} has a shard spanning {}..{} on axis {axis}, its layout requires the full {}..{} span",
                got[0],
                got[0] + got[1],
                expected[0],
                expected[0] + expected[1],
            ),
            ShardingErr::ShardOverlap {
                table,
                axis,
                offset,
            } => format!(
                "Table {table} has overlapping shards on axis {axis}, a shard starts at {offset} before the previous one ends"
            ),
            ShardingErr::CoverageMismatch {
                table,
                axis,
                expected,
                got,
            } => format!(
                "Table {table} shards leave a gap on axis {axis}, expected the next shard at offset {expected} but found {got}"
            ),
            ShardingErr::InitSizeMismatch {
                table,
                got,
                expected,
            } => format!(
                "Table {table} initial tensor has {got} values, its [rows x cols] shape requires {expected}"
            ),
            ShardingErr::OwnerMismatch {
                table,
                index,
                rank,
                shard_rank,
            } => format!(
                "Table {table} assigns position {index} to rank {rank} but its shard metadata claims rank {shard_rank}"
            ),
            ShardingErr::UnplacedTable { table } => {
                format!("Table {table} has no placement in the sharding plan")
            }
        };

        write!(f, "{s}")
    }
}

impl Error for ShardingErr {}
