use std::collections::VecDeque;

use comms::SparseBatch;

use crate::error::Result;

/// The external data source feeding the pipeline.
///
/// Produces a lazy sequence of training batches, finite or infinite.
/// Exhaustion is signalled with `Ok(None)` and is not an error; `Err` is
/// reserved for real source failures.
#[allow(unused)]
#[trait_variant::make(BatchSource: Send)]
pub trait LocalBatchSource {
    /// Fetches the next batch, suspending if the source is not ready yet.
    async fn next_batch(&mut self) -> Result<Option<SparseBatch>>;
}

/// A finite, preloaded batch queue. Deterministic and test-friendly.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    batches: VecDeque<SparseBatch>,
}

impl InMemorySource {
    pub fn new(batches: impl IntoIterator<Item = SparseBatch>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl BatchSource for InMemorySource {
    async fn next_batch(&mut self) -> Result<Option<SparseBatch>> {
        Ok(self.batches.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comms::SparseFeature;

    #[tokio::test]
    async fn drains_in_order_then_signals_exhaustion() {
        let one = SparseBatch::new(vec![SparseFeature::new("f", vec![1], vec![1])]);
        let two = SparseBatch::new(vec![SparseFeature::new("f", vec![2], vec![1])]);

        let mut source = InMemorySource::new([one.clone(), two.clone()]);
        assert_eq!(source.remaining(), 2);

        assert_eq!(BatchSource::next_batch(&mut source).await.unwrap(), Some(one));
        assert_eq!(BatchSource::next_batch(&mut source).await.unwrap(), Some(two));
        assert_eq!(BatchSource::next_batch(&mut source).await.unwrap(), None);
        // Exhaustion is stable, not a one-shot signal.
        assert_eq!(BatchSource::next_batch(&mut source).await.unwrap(), None);
    }
}
