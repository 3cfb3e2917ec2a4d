//! End-to-end `Scheduler` scenarios driven entirely through the
//! `Transport`/`SinkPort` seam, with no live chain or database: S1 (happy
//! path), S2 (ordering under concurrency), S3 (duplicate-height
//! idempotence), S5 (strict-policy abort), S6 (cancellation mid-flight
//! draining). Retry-budget exhaustion (S4) lives entirely inside the
//! concrete `ChainTransport::invoke` loop, which the `Transport` trait
//! deliberately doesn't expose to the scheduler — that path is covered by
//! `transport::retry`'s unit tests instead of being faked here.

mod support;

use std::sync::Arc;
use std::time::Duration;

use cosmos_extractor::config::FailurePolicy;
use cosmos_extractor::denom::DenomResolver;
use cosmos_extractor::descriptors::DescriptorResolver;
use cosmos_extractor::error::{SchedulerError, TransportError};
use cosmos_extractor::scheduler::{Scheduler, SchedulerConfig};
use cosmos_extractor::transport::Transport;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use support::{block_request_bytes, block_response, descriptors, tx_request_bytes, tx_response, FakeSink, FakeTransport};

const CHAIN_ID: &str = "test-1";

fn base_config(concurrency: usize, failure_policy: FailurePolicy) -> SchedulerConfig {
    SchedulerConfig { concurrency, failure_policy, cancellation_grace: Duration::from_millis(200) }
}

/// Registers a fully-formed `GetBlockByHeight` + one `GetTx` response pair
/// for `height`, so `Scheduler::process_height_inner` completes without
/// error.
async fn seed_height(transport: &FakeTransport, descriptors: &DescriptorResolver, height: u64) {
    let pool = descriptors.pool();
    let (block_bytes, tx_hashes) = block_response(pool, height, CHAIN_ID, 1);
    transport.queue(
        "/cosmos.base.tendermint.v1beta1.Service/GetBlockByHeight",
        block_request_bytes(descriptors, height).await,
        Ok(block_bytes),
    );

    let tx_bytes = tx_response(pool, "cosmos1sender", "cosmos1receiver", "uatom", "100", false);
    transport.queue(
        "/cosmos.tx.v1beta1.Service/GetTx",
        tx_request_bytes(descriptors, &tx_hashes[0]).await,
        Ok(tx_bytes),
    );
}

#[tokio::test]
async fn s1_happy_path_commits_single_height() {
    let descriptors = descriptors();
    let transport = FakeTransport::new();
    seed_height(&transport, &descriptors, 100).await;

    let transport: Arc<dyn Transport> = Arc::new(transport);
    let descriptors = Arc::new(descriptors);
    let denoms = DenomResolver::new(transport.clone(), descriptors.clone(), CHAIN_ID.to_string(), None);
    let sink = FakeSink::new();

    let (tx, rx) = mpsc::channel(4);
    tx.send(100).await.unwrap();
    drop(tx);

    let scheduler = Scheduler::new(
        transport.as_ref(),
        descriptors.as_ref(),
        &denoms,
        &sink,
        base_config(1, FailurePolicy::Strict),
        None,
    );
    let result = scheduler.run(rx, 100, CancellationToken::new()).await;

    assert_eq!(result.unwrap(), 100);
    assert_eq!(*sink.committed.lock().unwrap(), vec![100]);
}

#[tokio::test]
async fn s2_out_of_order_arrivals_commit_strictly_in_order() {
    let descriptors = descriptors();
    let transport = FakeTransport::new();
    for height in [101, 102, 103] {
        seed_height(&transport, &descriptors, height).await;
    }

    let transport: Arc<dyn Transport> = Arc::new(transport);
    let descriptors = Arc::new(descriptors);
    let denoms = DenomResolver::new(transport.clone(), descriptors.clone(), CHAIN_ID.to_string(), None);
    let sink = FakeSink::new();

    let (tx, rx) = mpsc::channel(4);
    for height in [103u64, 101, 102] {
        tx.send(height).await.unwrap();
    }
    drop(tx);

    let scheduler = Scheduler::new(
        transport.as_ref(),
        descriptors.as_ref(),
        &denoms,
        &sink,
        base_config(3, FailurePolicy::Strict),
        None,
    );
    let result = scheduler.run(rx, 101, CancellationToken::new()).await;

    assert_eq!(result.unwrap(), 103);
    assert_eq!(*sink.committed.lock().unwrap(), vec![101, 102, 103]);
}

#[tokio::test]
async fn s3_duplicate_height_is_committed_exactly_once() {
    let descriptors = descriptors();
    let transport = FakeTransport::new();
    // Queue the response twice: the reorder buffer dedupes on the commit
    // side, so both workers still need a response to complete.
    seed_height(&transport, &descriptors, 1).await;
    seed_height(&transport, &descriptors, 1).await;

    let transport: Arc<dyn Transport> = Arc::new(transport);
    let descriptors = Arc::new(descriptors);
    let denoms = DenomResolver::new(transport.clone(), descriptors.clone(), CHAIN_ID.to_string(), None);
    let sink = FakeSink::new();

    let (tx, rx) = mpsc::channel(4);
    tx.send(1).await.unwrap();
    tx.send(1).await.unwrap();
    drop(tx);

    let scheduler = Scheduler::new(
        transport.as_ref(),
        descriptors.as_ref(),
        &denoms,
        &sink,
        base_config(2, FailurePolicy::Strict),
        None,
    );
    let result = scheduler.run(rx, 1, CancellationToken::new()).await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(*sink.committed.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn s5_strict_policy_aborts_on_unrecoverable_fetch_failure() {
    let descriptors = descriptors();
    let transport = FakeTransport::new();
    transport.queue(
        "/cosmos.base.tendermint.v1beta1.Service/GetBlockByHeight",
        block_request_bytes(&descriptors, 50).await,
        Err(TransportError::Status(tonic::Status::internal("node fell over"))),
    );

    let transport: Arc<dyn Transport> = Arc::new(transport);
    let descriptors = Arc::new(descriptors);
    let denoms = DenomResolver::new(transport.clone(), descriptors.clone(), CHAIN_ID.to_string(), None);
    let sink = FakeSink::new();

    let (tx, rx) = mpsc::channel(4);
    tx.send(50).await.unwrap();
    drop(tx);

    let scheduler = Scheduler::new(
        transport.as_ref(),
        descriptors.as_ref(),
        &denoms,
        &sink,
        base_config(1, FailurePolicy::Strict),
        None,
    );
    let err = scheduler.run(rx, 50, CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SchedulerError::Unrecoverable(h) if h.0 == 50));
    assert!(sink.committed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn s6_cancellation_drains_in_flight_heights_before_returning() {
    let descriptors = descriptors();
    let transport = FakeTransport::new();
    for height in [1, 2] {
        seed_height(&transport, &descriptors, height).await;
    }
    // Height 3's block fetch is slow enough to still be in flight when the
    // token is cancelled, exercising the grace-window drain rather than an
    // instant exit.
    {
        let pool = descriptors.pool();
        let (block_bytes, tx_hashes) = block_response(pool, 3, CHAIN_ID, 1);
        transport.queue_delayed(
            "/cosmos.base.tendermint.v1beta1.Service/GetBlockByHeight",
            block_request_bytes(&descriptors, 3).await,
            Ok(block_bytes),
            Duration::from_millis(40),
        );
        let tx_bytes = tx_response(pool, "cosmos1sender", "cosmos1receiver", "uatom", "100", false);
        transport.queue(
            "/cosmos.tx.v1beta1.Service/GetTx",
            tx_request_bytes(&descriptors, &tx_hashes[0]).await,
            Ok(tx_bytes),
        );
    }

    let transport: Arc<dyn Transport> = Arc::new(transport);
    let descriptors = Arc::new(descriptors);
    let denoms = DenomResolver::new(transport.clone(), descriptors.clone(), CHAIN_ID.to_string(), None);
    let sink = FakeSink::new();

    let (tx, rx) = mpsc::channel(4);
    for height in [1u64, 2, 3] {
        tx.send(height).await.unwrap();
    }
    drop(tx);

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(
        transport.as_ref(),
        descriptors.as_ref(),
        &denoms,
        &sink,
        base_config(3, FailurePolicy::Strict),
        None,
    );

    // Both futures run cooperatively on this task: the cancel timer fires
    // while `run` is still awaiting height 3's delayed response.
    let (result, _) = tokio::join!(scheduler.run(rx, 1, cancel.clone()), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });

    match result {
        Err(SchedulerError::Cancelled { last_committed }) => assert_eq!(last_committed, 3),
        other => panic!("expected Cancelled, got {other:?}"),
    }
    assert_eq!(*sink.committed.lock().unwrap(), vec![1, 2, 3]);
}
