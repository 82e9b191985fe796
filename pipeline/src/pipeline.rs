//! The double-buffered training pipeline.

use comms::{Awaitable, CommContext, RoutedBatch};
use log::{debug, warn};
use sharding::ShardedEmbeddingTable;

use crate::{
    error::Result,
    route::Router,
    source::BatchSource,
    strategy::StepStrategy,
};

/// What one `advance` call accomplished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Warmup: communication for the first batch was issued, nothing was
    /// ready to compute yet.
    Pending,
    /// One full training step ran; carries its loss.
    Step(f32),
    /// The data source is exhausted and every in-flight exchange has been
    /// drained. Terminal.
    Done,
}

/// Per-rank training pipeline overlapping input redistribution with compute.
///
/// Each `advance` call issues the sparse all-to-all for the *next* batch
/// before computing on the batch whose exchange was issued by the previous
/// call, hiding one step's communication latency behind one step's compute.
/// The lookahead is fixed at one: between calls, at most one exchange handle
/// is retained unresolved, which bounds buffering to a single batch.
///
/// The pipeline never terminates on its own; it reports `Done` once the
/// source is exhausted and the final retained handle has been drained.
pub struct SparseDistPipeline<C, S, T> {
    ctx: C,
    source: S,
    strategy: T,
    router: Router,
    tables: Vec<ShardedEmbeddingTable>,
    in_flight: Option<Awaitable<RoutedBatch>>,
    step: usize,
}

impl<C, S, T> SparseDistPipeline<C, S, T>
where
    C: CommContext,
    S: BatchSource,
    T: StepStrategy,
{
    /// Creates an idle pipeline for one rank.
    ///
    /// # Arguments
    /// * `ctx` - The rank's communication context.
    /// * `router` - Routing rules built from the same assignments that
    ///   produced `tables`.
    /// * `tables` - The shards this rank materialized (`shard_tables` output
    ///   for this rank).
    /// * `source` - The external batch source.
    /// * `strategy` - The forward/backward/update computation.
    pub fn new(ctx: C, router: Router, tables: Vec<ShardedEmbeddingTable>, source: S, strategy: T) -> Self {
        Self {
            ctx,
            source,
            strategy,
            router,
            tables,
            in_flight: None,
            step: 0,
        }
    }

    /// Completed training steps so far.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of unresolved exchange handles currently retained. Never
    /// exceeds one.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.in_flight.is_some() as usize
    }

    /// Advances the pipeline by one call.
    ///
    /// Fetches the next batch (suspending if the source is not ready),
    /// issues its redistribution, then waits on the previous call's exchange
    /// and runs the step compute on its result.
    ///
    /// # Errors
    /// A failed exchange surfaces here, at the wait point of the handle the
    /// *previous* call issued; the error carries the transport failure
    /// untouched. No retry happens internally; the pipeline state stays
    /// consistent so the caller can retry the step or `shutdown` cleanly.
    pub async fn advance(&mut self) -> Result<StepOutcome> {
        let issued = match self.source.next_batch().await? {
            Some(batch) => {
                let buckets = self.router.bucket(&batch)?;
                debug!(rank = self.ctx.rank(), step = self.step; "issuing sparse all-to-all");
                Some(self.ctx.exchange_sparse(buckets))
            }
            None => None,
        };

        let prev = self.in_flight.take();
        self.in_flight = issued;

        match prev {
            Some(handle) => {
                let routed = handle.wait().await?;
                let loss = self.strategy.step(&self.tables, &routed)?;

                debug!(rank = self.ctx.rank(), step = self.step, loss = loss as f64; "completed step");
                self.step += 1;
                Ok(StepOutcome::Step(loss))
            }
            None if self.in_flight.is_some() => Ok(StepOutcome::Pending),
            None => Ok(StepOutcome::Done),
        }
    }

    /// Drives `advance` until `Done`, collecting every step's loss.
    pub async fn run_to_completion(&mut self) -> Result<Vec<f32>> {
        let mut losses = Vec::new();
        loop {
            match self.advance().await? {
                StepOutcome::Pending => {}
                StepOutcome::Step(loss) => losses.push(loss),
                StepOutcome::Done => return Ok(losses),
            }
        }
    }

    /// Tears the pipeline down, draining any in-flight exchange first.
    ///
    /// Every participant of an all-to-all must complete its side, so the
    /// retained handle is resolved before the context is dropped; its result
    /// is discarded.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.in_flight.take() {
            debug!(rank = self.ctx.rank(); "draining in-flight exchange before teardown");
            if let Err(e) = handle.wait().await {
                warn!(rank = self.ctx.rank(); "in-flight exchange failed while draining: {e}");
            }
        }
    }
}
