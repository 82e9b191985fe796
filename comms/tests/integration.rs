use std::borrow::Cow;

use comms::msg::{Command, Msg, Payload};
use comms::{CommContext, CommErr, RemoteContext, SparseBucketed};
use tokio::io;

#[tokio::test]
async fn ids_payload_round_trips_over_duplex() {
    const SIZE: usize = 4096;

    let ids: Vec<u64> = vec![3, 141, 592, 653, u64::MAX];
    let msg = Msg::Data(Payload::Ids(&ids));

    let (one, two) = io::duplex(SIZE);

    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);
    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let got: Msg = rx.recv_into(&mut buf).await.unwrap();

    match got {
        Msg::Data(Payload::Ids(got_ids)) => assert_eq!(got_ids, ids.as_slice()),
        other => panic!("unexpected msg: {other:?}"),
    }
}

#[tokio::test]
async fn sample_weights_round_trip_over_duplex() {
    const SIZE: usize = 1024;

    let weights = [0.25_f32, 1.5, -3.0];
    let msg = Msg::Data(Payload::SampleWeights(&weights));

    let (one, two) = io::duplex(SIZE);

    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);
    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let got: Msg = rx.recv_into(&mut buf).await.unwrap();

    match got {
        Msg::Data(Payload::SampleWeights(got_weights)) => {
            assert_eq!(got_weights, weights.as_slice())
        }
        other => panic!("unexpected msg: {other:?}"),
    }
}

#[tokio::test]
async fn control_and_error_frames_round_trip() {
    const SIZE: usize = 1024;

    let (one, two) = io::duplex(SIZE);

    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&Msg::Control(Command::Bucket {
        round: 7,
        table: "users".into(),
        weighted: true,
    }))
    .await
    .unwrap();
    tx.send(&Msg::Err(Cow::Borrowed("shard owner went away")))
        .await
        .unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u64> = Vec::new();
    let got: Msg = rx.recv_into(&mut buf).await.unwrap();
    match got {
        Msg::Control(Command::Bucket {
            round,
            table,
            weighted,
        }) => {
            assert_eq!(round, 7);
            assert_eq!(table, "users");
            assert!(weighted);
        }
        other => panic!("unexpected msg: {other:?}"),
    }

    let mut buf: Vec<u64> = Vec::new();
    let got: Msg = rx.recv_into(&mut buf).await.unwrap();
    match got {
        Msg::Err(detail) => assert_eq!(detail, "shard owner went away"),
        other => panic!("unexpected msg: {other:?}"),
    }
}

/// Builds a fully-linked two-rank mesh over one duplex connection.
fn two_rank_mesh() -> (RemoteContext, RemoteContext) {
    let (one, two) = io::duplex(4096);

    let (rx0, tx0) = io::split(one);
    let (rx1, tx1) = io::split(two);

    (
        RemoteContext::new(0, 2, vec![(1, rx0, tx0)]),
        RemoteContext::new(1, 2, vec![(0, rx1, tx1)]),
    )
}

#[tokio::test]
async fn remote_mesh_exchanges_sparse_ids() {
    let (r0, r1) = two_rank_mesh();

    // Rank 0 keeps ids [1] and sends [2] to rank 1; rank 1 mirrors.
    let mut out0 = SparseBucketed::empty(2);
    out0.buckets[0].entry("users").ids.push(1);
    out0.buckets[1].entry("users").ids.push(2);

    let mut out1 = SparseBucketed::empty(2);
    out1.buckets[0].entry("users").ids.push(3);
    out1.buckets[1].entry("users").ids.push(4);

    let h0 = r0.exchange_sparse(out0);
    let h1 = r1.exchange_sparse(out1);

    let got0 = h0.wait().await.unwrap();
    let got1 = h1.wait().await.unwrap();

    // Local and wire contributions land in scheduling order; sort to compare.
    let mut ids0 = got0.ids_for("users").unwrap().ids.clone();
    let mut ids1 = got1.ids_for("users").unwrap().ids.clone();
    ids0.sort_unstable();
    ids1.sort_unstable();

    assert_eq!(ids0, vec![1, 3]);
    assert_eq!(ids1, vec![2, 4]);
}

#[tokio::test]
async fn remote_mesh_carries_sample_weights() {
    let (r0, r1) = two_rank_mesh();

    let mut out0 = SparseBucketed::empty(2);
    {
        let slot = out0.buckets[1].entry("clicks");
        slot.ids.extend([11, 12]);
        slot.weights.extend([0.5, 2.0]);
    }

    let h0 = r0.exchange_sparse(out0);
    let h1 = r1.exchange_sparse(SparseBucketed::empty(2));

    h0.wait().await.unwrap();
    let got1 = h1.wait().await.unwrap();

    let routed = got1.ids_for("clicks").unwrap();
    assert_eq!(routed.ids, vec![11, 12]);
    assert_eq!(routed.weights, vec![0.5, 2.0]);
}

#[tokio::test]
async fn remote_mesh_runs_multiple_rounds_per_link() {
    let (r0, r1) = two_rank_mesh();

    for step in 0..3_u64 {
        let mut out0 = SparseBucketed::empty(2);
        out0.buckets[1].entry("users").ids.push(step);
        let mut out1 = SparseBucketed::empty(2);
        out1.buckets[0].entry("users").ids.push(100 + step);

        let h0 = r0.exchange_sparse(out0);
        let h1 = r1.exchange_sparse(out1);

        let got0 = h0.wait().await.unwrap();
        let got1 = h1.wait().await.unwrap();

        assert_eq!(got0.ids_for("users").unwrap().ids, vec![100 + step]);
        assert_eq!(got1.ids_for("users").unwrap().ids, vec![step]);
    }
}

#[tokio::test]
async fn lost_peer_fails_pending_exchanges() {
    let (r0, r1) = two_rank_mesh();

    let mut out0 = SparseBucketed::empty(2);
    out0.buckets[1].entry("users").ids.push(1);
    let handle = r0.exchange_sparse(out0);

    // Rank 1 goes away without ever posting; its writer announces the
    // disconnect and rank 0's round can no longer complete.
    drop(r1);

    assert!(matches!(handle.wait().await, Err(CommErr::Lost)));
}

#[tokio::test]
async fn remote_bucket_count_mismatch_fails_at_wait_point() {
    let (r0, _r1) = two_rank_mesh();

    let handle = r0.exchange_sparse(SparseBucketed::empty(3));
    assert!(matches!(
        handle.wait().await,
        Err(CommErr::BucketCountMismatch {
            got: 3,
            expected: 2
        })
    ));
}
