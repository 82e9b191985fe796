//! The sparse-feature value types exchanged between ranks.

/// One sparse feature of a training batch: a jagged list of embedding ids.
///
/// `lengths[i]` is the number of ids contributed by sample `i`; the ids of
/// all samples are concatenated in `ids`. `weights` is either empty or has
/// one entry per id (weighted features).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparseFeature {
    pub name: String,
    pub ids: Vec<u64>,
    pub lengths: Vec<u32>,
    pub weights: Vec<f32>,
}

impl SparseFeature {
    /// Creates an unweighted feature.
    ///
    /// # Panics
    /// - if `lengths` does not sum to `ids.len()`
    pub fn new(name: impl Into<String>, ids: Vec<u64>, lengths: Vec<u32>) -> Self {
        let total: u32 = lengths.iter().sum();
        assert_eq!(total as usize, ids.len(), "lengths must sum to ids.len()");
        Self {
            name: name.into(),
            ids,
            lengths,
            weights: Vec::new(),
        }
    }

    /// Attaches per-id sample weights.
    ///
    /// # Panics
    /// - if `weights.len() != ids.len()`
    pub fn with_weights(mut self, weights: Vec<f32>) -> Self {
        assert_eq!(
            weights.len(),
            self.ids.len(),
            "one weight per id is required"
        );
        self.weights = weights;
        self
    }

    #[inline]
    pub fn is_weighted(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Number of samples in this feature.
    #[inline]
    pub fn stride(&self) -> usize {
        self.lengths.len()
    }
}

/// One training step's sparse inputs, before redistribution.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparseBatch {
    pub features: Vec<SparseFeature>,
}

impl SparseBatch {
    pub fn new(features: Vec<SparseFeature>) -> Self {
        Self { features }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.iter().all(|f| f.ids.is_empty())
    }
}

/// The ids of one table that ended up on the local rank after an exchange.
///
/// Keyed by table name: a rank materializes only a subset of the logical
/// tables, so positional indices would not line up across ranks.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoutedIds {
    pub table: String,
    pub ids: Vec<u64>,
    /// Empty unless the source feature was weighted.
    pub weights: Vec<f32>,
}

/// The result of a sparse all-to-all, as seen by one rank: for every table
/// the rank holds a shard of, the ids it must look up, merged across all
/// source ranks.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoutedBatch {
    pub tables: Vec<RoutedIds>,
}

impl RoutedBatch {
    /// Returns the bucket for `table`, creating an empty one if absent.
    pub fn entry(&mut self, table: &str) -> &mut RoutedIds {
        if let Some(pos) = self.tables.iter().position(|t| t.table == table) {
            return &mut self.tables[pos];
        }

        self.tables.push(RoutedIds {
            table: table.into(),
            ids: Vec::new(),
            weights: Vec::new(),
        });
        self.tables.last_mut().unwrap()
    }

    /// Returns the routed ids for `table`, if any arrived.
    pub fn ids_for(&self, table: &str) -> Option<&RoutedIds> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Folds another rank's contribution into this batch, table by table.
    pub fn merge(&mut self, other: RoutedBatch) {
        for incoming in other.tables {
            let slot = self.entry(&incoming.table);
            slot.ids.extend(incoming.ids);
            slot.weights.extend(incoming.weights);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.ids.is_empty())
    }
}

/// A batch bucketed by destination rank, ready to be exchanged.
///
/// `buckets[d]` holds everything the issuing rank wants delivered to rank `d`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SparseBucketed {
    pub buckets: Vec<RoutedBatch>,
}

impl SparseBucketed {
    /// Creates `world_size` empty buckets.
    pub fn empty(world_size: usize) -> Self {
        Self {
            buckets: vec![RoutedBatch::default(); world_size],
        }
    }
}
