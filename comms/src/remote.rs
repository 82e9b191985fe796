//! The sparse all-to-all over wire-framed peer links.
//!
//! One `RemoteContext` per rank, one full-duplex link per peer. Every bucket
//! of an exchange travels as a `Command::Bucket` header followed by the
//! zero-copy id (and optionally sample-weight) payload frames; a
//! `Command::EndOfRound` closes the peer's contribution. The matching
//! `LocalFabric` in `context` keeps the same round semantics in-process.

use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    awaitable::{Awaitable, Resolver},
    batch::{RoutedBatch, RoutedIds, SparseBucketed},
    context::CommContext,
    error::CommErr,
    msg::{Command, Msg, Payload},
    receiver::WireReceiver,
    sender::WireSender,
};

/// Frames queued for one peer's writer task.
enum OutFrame {
    Bucket { round: u64, bucket: RoutedIds },
    EndOfRound { round: u64 },
}

/// State of one all-to-all round, as seen by the local rank.
struct Round {
    contributions: usize,
    inbox: RoutedBatch,
    resolver: Option<Resolver<RoutedBatch>>,
}

impl Round {
    fn new() -> Self {
        Self {
            contributions: 0,
            inbox: RoutedBatch::default(),
            resolver: None,
        }
    }
}

struct MeshState {
    world_size: usize,
    rounds: Mutex<HashMap<u64, Round>>,
}

impl MeshState {
    /// Folds one participant's buckets into a round and resolves the round
    /// once every participant has contributed.
    ///
    /// The local rank passes its resolver along with its own bucket; peer
    /// contributions arrive from the link readers with `None`.
    fn contribute(
        &self,
        round_id: u64,
        contribution: RoutedBatch,
        resolver: Option<Resolver<RoutedBatch>>,
    ) {
        let mut rounds = self.rounds.lock();
        let round = rounds.entry(round_id).or_insert_with(Round::new);

        round.inbox.merge(contribution);
        round.contributions += 1;
        if let Some(resolver) = resolver {
            round.resolver = Some(resolver);
        }

        if round.contributions == self.world_size {
            // SAFETY: The round was inserted above if it was missing.
            let round = rounds.remove(&round_id).unwrap();
            drop(rounds);

            debug!(round = round_id; "all participants posted, resolving round");

            if let Some(resolver) = round.resolver {
                resolver.resolve(round.inbox);
            }
        }
    }

    /// Fails every pending round. Called once a link dies: the mesh cannot
    /// complete any round anymore.
    fn poison(&self) {
        let rounds: Vec<Round> = self.rounds.lock().drain().map(|(_, r)| r).collect();
        for round in rounds {
            if let Some(resolver) = round.resolver {
                resolver.fail(CommErr::Lost);
            }
        }
    }
}

/// A rank's communication context over established peer connections.
///
/// The caller dials or accepts one ordered byte stream per peer (TCP in a
/// deployment, `tokio::io::duplex` in tests) and hands the halves over; the
/// context spawns a reader and a writer task per link and runs the exchange
/// protocol on top of the wire codec.
pub struct RemoteContext {
    rank: usize,
    round: AtomicU64,
    peers: HashMap<usize, mpsc::UnboundedSender<OutFrame>>,
    state: Arc<MeshState>,
}

impl RemoteContext {
    /// Creates the context for `rank` from one `(peer, reader, writer)` link
    /// per other rank.
    ///
    /// # Panics
    /// If `rank` is out of range, a link names `rank` itself or an
    /// out-of-range peer, or the links do not cover every other rank exactly
    /// once.
    pub fn new<R, W>(rank: usize, world_size: usize, links: Vec<(usize, R, W)>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        assert!(rank < world_size, "rank out of range");
        assert_eq!(links.len(), world_size - 1, "one link per peer is required");

        let state = Arc::new(MeshState {
            world_size,
            rounds: Mutex::new(HashMap::new()),
        });
        let mut peers = HashMap::new();

        for (peer, rx, tx) in links {
            assert!(peer < world_size && peer != rank, "invalid peer rank {peer}");

            let (wire_rx, wire_tx) = crate::channel(rx, tx);
            let (frames_tx, frames_rx) = mpsc::unbounded_channel();
            assert!(
                peers.insert(peer, frames_tx).is_none(),
                "duplicate link for peer {peer}"
            );

            tokio::spawn(async move {
                if let Err(e) = write_loop(wire_tx, frames_rx).await {
                    warn!(peer = peer; "link writer failed: {e}");
                }
            });

            let reader_state = Arc::clone(&state);
            tokio::spawn(async move {
                if let Err(e) = read_loop(wire_rx, &reader_state).await {
                    warn!(peer = peer; "link reader failed: {e}");
                }
                reader_state.poison();
            });
        }

        Self {
            rank,
            round: AtomicU64::new(0),
            peers,
            state,
        }
    }
}

impl CommContext for RemoteContext {
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

        debug!(rank = self.rank, round = round_id; "posting sparse all-to-all over the mesh");

        let mut own = RoutedBatch::default();
        let mut delivered = true;

        for (dest, bucket) in buckets.buckets.into_iter().enumerate() {
            if dest == self.rank {
                own = bucket;
                continue;
            }

            let link = &self.peers[&dest];
            for routed in bucket.tables {
                delivered &= link
                    .send(OutFrame::Bucket {
                        round: round_id,
                        bucket: routed,
                    })
                    .is_ok();
            }
            delivered &= link.send(OutFrame::EndOfRound { round: round_id }).is_ok();
        }

        // A closed channel means the peer's writer already died; the round
        // can never complete.
        if !delivered {
            resolver.fail(CommErr::Lost);
            return handle;
        }

        self.state.contribute(round_id, own, Some(resolver));
        handle
    }
}

/// One received frame, copied out of the receive buffer.
enum Frame {
    Bucket {
        round: u64,
        table: String,
        weighted: bool,
    },
    EndOfRound {
        round: u64,
    },
    Ids(Vec<u64>),
    Weights(Vec<f32>),
    Disconnect,
    Err(String),
}

async fn next_frame<R>(rx: &mut WireReceiver<R>, buf: &mut Vec<u64>) -> io::Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let msg: Msg<'_> = rx.recv_into(buf).await?;

    Ok(match msg {
        Msg::Control(Command::Bucket {
            round,
            table,
            weighted,
        }) => Frame::Bucket {
            round,
            table,
            weighted,
        },
        Msg::Control(Command::EndOfRound { round }) => Frame::EndOfRound { round },
        Msg::Control(Command::Disconnect) => Frame::Disconnect,
        Msg::Data(Payload::Ids(ids)) => Frame::Ids(ids.to_vec()),
        Msg::Data(Payload::SampleWeights(weights)) => Frame::Weights(weights.to_vec()),
        Msg::Err(detail) => Frame::Err(detail.into_owned()),
    })
}

fn protocol_violation(expected: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Peer broke the exchange protocol, expected {expected}"),
    )
}

/// Reassembles one peer's per-round contributions and feeds them into the
/// shared round state.
async fn read_loop<R>(mut rx: WireReceiver<R>, state: &MeshState) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut rounds: HashMap<u64, RoutedBatch> = HashMap::new();
    let mut buf: Vec<u64> = Vec::new();

    loop {
        match next_frame(&mut rx, &mut buf).await? {
            Frame::Bucket {
                round,
                table,
                weighted,
            } => {
                let ids = match next_frame(&mut rx, &mut buf).await? {
                    Frame::Ids(ids) => ids,
                    _ => return Err(protocol_violation("an ids payload")),
                };
                let weights = if weighted {
                    match next_frame(&mut rx, &mut buf).await? {
                        Frame::Weights(weights) => weights,
                        _ => return Err(protocol_violation("a sample-weight payload")),
                    }
                } else {
                    Vec::new()
                };

                let slot = rounds.entry(round).or_default().entry(&table);
                slot.ids.extend(ids);
                slot.weights.extend(weights);
            }
            Frame::EndOfRound { round } => {
                let contribution = rounds.remove(&round).unwrap_or_default();
                state.contribute(round, contribution, None);
            }
            Frame::Disconnect => return Ok(()),
            Frame::Err(detail) => return Err(io::Error::other(detail)),
            Frame::Ids(_) | Frame::Weights(_) => {
                return Err(protocol_violation("a bucket header"));
            }
        }
    }
}

/// Drains queued frames onto the wire; announces the disconnect once the
/// owning context goes away.
async fn write_loop<W>(
    mut tx: WireSender<W>,
    mut frames: mpsc::UnboundedReceiver<OutFrame>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        match frame {
            OutFrame::Bucket { round, bucket } => {
                let weighted = !bucket.weights.is_empty();
                tx.send(&Msg::Control(Command::Bucket {
                    round,
                    table: bucket.table.clone(),
                    weighted,
                }))
                .await?;
                tx.send(&Msg::Data(Payload::Ids(&bucket.ids))).await?;
                if weighted {
                    tx.send(&Msg::Data(Payload::SampleWeights(&bucket.weights)))
                        .await?;
                }
            }
            OutFrame::EndOfRound { round } => {
                tx.send(&Msg::Control(Command::EndOfRound { round })).await?;
            }
        }
    }

    tx.send(&Msg::Control(Command::Disconnect)).await
}
