use std::collections::HashMap;

use crate::{
    config::{ParameterSharding, TableConfig},
    error::{Result, ShardingErr},
    strategy::TableAssignment,
};

/// The planner's output: a fully-resolved placement per table name.
///
/// Consumed, never produced, by this crate. Every table that is about to be
/// sharded must have an entry; lookups for unplaced tables fail so a partial
/// plan is caught before any communication is issued.
#[derive(Debug, Clone, Default)]
pub struct ShardingPlan {
    tables: HashMap<String, ParameterSharding>,
}

impl ShardingPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the placement decision for `table`, replacing any previous one.
    pub fn insert(&mut self, table: impl Into<String>, sharding: ParameterSharding) {
        self.tables.insert(table.into(), sharding);
    }

    /// Looks up the placement for `table`.
    ///
    /// # Errors
    /// `ShardingErr::UnplacedTable` when the plan has no entry.
    pub fn get(&self, table: &str) -> Result<&ParameterSharding> {
        self.tables.get(table).ok_or_else(|| ShardingErr::UnplacedTable {
            table: table.into(),
        })
    }

    /// Pairs every config with its placement, preserving config order.
    ///
    /// The resulting assignments carry no initial tensors; attach them with
    /// `TableAssignment::with_init` where needed.
    ///
    /// # Errors
    /// `ShardingErr::UnplacedTable` for the first config without an entry.
    pub fn assignments<'a>(
        &'a self,
        configs: &'a [TableConfig],
    ) -> Result<Vec<TableAssignment<'a>>> {
        configs
            .iter()
            .map(|config| Ok(TableAssignment::new(config, self.get(&config.name)?)))
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
