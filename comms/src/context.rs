//! Communication context: rank identity plus the sparse all-to-all primitive.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use log::debug;
use parking_lot::Mutex;

use crate::{
    awaitable::{Awaitable, Resolver},
    batch::{RoutedBatch, SparseBucketed},
    error::CommErr,
};

/// The process-group identity and collective primitive a rank operates with.
///
/// Created once at job start and passed explicitly through every sharding and
/// pipeline call; nothing in this crate reaches for global state.
pub trait CommContext {
    fn world_size(&self) -> usize;

    fn rank(&self) -> usize;

    /// Issues the sparse-id all-to-all without blocking.
    ///
    /// `buckets` must hold one destination bucket per rank. Every rank must
    /// eventually issue its matching exchange for the same round; the returned
    /// handle resolves once all peers have contributed. Failures, including a
    /// malformed bucket list, surface at the handle's wait point.
    fn exchange_sparse(&self, buckets: SparseBucketed) -> Awaitable<RoutedBatch>;
}

/// State of one all-to-all round, keyed by round number.
struct Round {
    contributions: usize,
    inbox: Vec<RoutedBatch>,
    waiters: Vec<Option<Resolver<RoutedBatch>>>,
}

impl Round {
    fn new(world_size: usize) -> Self {
        Self {
            contributions: 0,
            inbox: vec![RoutedBatch::default(); world_size],
            waiters: (0..world_size).map(|_| None).collect(),
        }
    }
}

struct FabricState {
    world_size: usize,
    rounds: Mutex<HashMap<u64, Round>>,
}

/// An in-process all-to-all fabric connecting every rank of one job.
///
/// Each rank holds a `LocalContext` onto the shared state; a round resolves
/// for everyone once the last participant posts its buckets. Used by the demo
/// driver and the integration tests; a real deployment substitutes the
/// collective layer behind the same `CommContext` trait.
#[derive(Clone)]
pub struct LocalFabric {
    state: Arc<FabricState>,
}

impl LocalFabric {
    /// Creates a fabric for `world_size` ranks.
    pub fn new(world_size: usize) -> Self {
        assert!(world_size > 0, "world_size must be > 0");
        Self {
            state: Arc::new(FabricState {
                world_size,
                rounds: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates the context for `rank`.
    ///
    /// # Panics
    /// If `rank` is not in `[0, world_size)`.
    pub fn context(&self, rank: usize) -> LocalContext {
        assert!(rank < self.state.world_size, "rank out of range");
        LocalContext {
            rank,
            round: AtomicU64::new(0),
            state: Arc::clone(&self.state),
        }
    }
}

/// One rank's handle onto a `LocalFabric`.
pub struct LocalContext {
    rank: usize,
    round: AtomicU64,
    state: Arc<FabricState>,
}

impl CommContext for LocalContext {
    fn world_size(&self) -> usize {
        self.state.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn exchange_sparse(&self, buckets: SparseBucketed) -> Awaitable<RoutedBatch> {
        let round_id = self.round.fetch_add(1, Ordering::Relaxed);
        let (resolver, handle) = Awaitable::pending();

        let world_size = self.state.world_size;
        if buckets.buckets.len() != world_size {
            resolver.fail(CommErr::BucketCountMismatch {
                got: buckets.buckets.len(),
                expected: world_size,
            });
            return handle;
        }

        debug!(rank = self.rank, round = round_id; "posting sparse all-to-all");

        let mut rounds = self.state.rounds.lock();
        let round = rounds
            .entry(round_id)
            .or_insert_with(|| Round::new(world_size));

        for (dest, bucket) in buckets.buckets.into_iter().enumerate() {
            round.inbox[dest].merge(bucket);
        }

        // A replaced resolver belongs to a stale duplicate context for this
        // rank; dropping it reports `Lost` on that handle.
        round.waiters[self.rank] = Some(resolver);
        round.contributions += 1;

        if round.contributions == world_size {
            // SAFETY: The round was inserted above if it was missing.
            let round = rounds.remove(&round_id).unwrap();
            drop(rounds);

            debug!(round = round_id; "all ranks posted, resolving round");

            for (result, waiter) in round.inbox.into_iter().zip(round.waiters) {
                if let Some(waiter) = waiter {
                    waiter.resolve(result);
                }
            }
        }

        handle
    }
}
