//! Link loss is terminal: the router closes the transport and exits, even in
//! the middle of a paced reply.

mod common;

use std::time::Duration;

use common::{test_config, Harness};
use meshai::bot::RouterExit;
use meshai::mesh::{LossOutcome, TransportEvent};

#[tokio::test]
async fn loss_after_ready_closes_transport() {
    let mut h = Harness::start().await;
    h.handshake().await;
    h.text("!a", "/ping").await;
    h.wait_for_sends(1).await;

    assert_eq!(h.lose_connection().await, RouterExit::ConnectionLost(LossOutcome::Shutdown));
    assert!(h.transport.is_closed());
}

#[tokio::test]
async fn loss_before_handshake_also_stops() {
    let mut h = Harness::start().await;
    assert_eq!(
        h.lose_connection().await,
        RouterExit::ConnectionLost(LossOutcome::ShutdownBeforeReady)
    );
    assert!(h.transport.is_closed());
}

#[tokio::test]
async fn loss_event_through_the_queue_api_is_honored() {
    let mut h = Harness::start().await;
    h.handshake().await;
    h.text("!a", "/ping").await;
    h.wait_for_sends(1).await;
    h.deliver(TransportEvent::ConnectionLost).await;
    assert_eq!(h.finish().await, RouterExit::ConnectionLost(LossOutcome::Shutdown));
}

#[tokio::test]
async fn loss_interrupts_paced_reply() {
    let mut config = test_config();
    config.transport.max_chunk_bytes = 10;
    config.transport.chunk_gap_ms = 60_000;
    let mut h = Harness::start_with(config, None).await;
    h.provider.push_answer("a reply long enough to need several slices");
    h.handshake().await;
    h.text("!a", "/ask go").await;
    h.wait_for_sends(1).await;

    let exit = tokio::time::timeout(Duration::from_secs(5), h.lose_connection())
        .await
        .expect("loss preempts the pacing delay");
    assert_eq!(exit, RouterExit::ConnectionLost(LossOutcome::Shutdown));
    assert_eq!(h.transport.sent().len(), 1);
    assert!(h.transport.is_closed());
}
