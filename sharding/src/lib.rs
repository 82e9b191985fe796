pub mod config;
pub mod error;
pub mod metadata;
pub mod plan;
pub mod strategy;
pub mod table;

pub use config::{ComputeKernel, DataType, ParameterSharding, PoolingMode, ShardingType, TableConfig};
pub use error::{Result, ShardingErr};
pub use metadata::{GlobalTableMetadata, ShardMetadata};
pub use plan::ShardingPlan;
pub use strategy::{TableAssignment, shard_tables};
pub use table::ShardedEmbeddingTable;
