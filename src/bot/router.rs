//! Event routing: the single consumer between the transport and the commands.
//!
//! Transports push events through an [`EventSender`], from async code or from
//! a foreign OS thread. Handshakes and texts go through a bounded FIFO queue
//! so their relative order is kept (a text that arrives before the handshake
//! is dropped as not-ready). Connection loss bypasses the queue on a
//! [`Notify`] so it preempts both queued events and the command in flight.
//!
//! [`EventRouter::run`] processes one command to completion before reading
//! the next event. That serializes every store mutation and every paced reply
//! across all users.

use log::{debug, info, trace, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use super::{BotContext, CommandDispatcher};
use crate::errors::QueueClosed;
use crate::mesh::{ConnectionTracker, LossOutcome, Packet, TransportEvent};

/// Producer half handed to transports.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<TransportEvent>,
    lost: Arc<Notify>,
}

impl EventSender {
    /// Enqueue from async code, waiting for room when the queue is full.
    pub async fn deliver(&self, event: TransportEvent) -> Result<(), QueueClosed> {
        if let TransportEvent::ConnectionLost = event {
            self.connection_lost();
            return Ok(());
        }
        self.tx.send(event).await.map_err(|_| QueueClosed)
    }

    /// Enqueue from a thread outside the runtime. Must not be called from async code.
    pub fn blocking_deliver(&self, event: TransportEvent) -> Result<(), QueueClosed> {
        if let TransportEvent::ConnectionLost = event {
            self.connection_lost();
            return Ok(());
        }
        self.tx.blocking_send(event).map_err(|_| QueueClosed)
    }

    /// Report link loss. Safe from any context; never blocks.
    pub fn connection_lost(&self) {
        self.lost.notify_one();
    }
}

/// Why [`EventRouter::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    /// The transport reported loss; the transport has been closed.
    ConnectionLost(LossOutcome),
    /// Every [`EventSender`] was dropped.
    QueueClosed,
    /// Ctrl-C.
    Interrupted,
}

/// Admission decision for one inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Dispatch(String),
    Undecodable,
    NotReady,
    NotAddressed,
}

enum Next {
    Event(TransportEvent),
    Lost,
    Interrupted,
    SignalUnavailable,
    Closed,
}

pub struct EventRouter {
    ctx: BotContext,
    dispatcher: CommandDispatcher,
    tracker: ConnectionTracker,
    rx: mpsc::Receiver<TransportEvent>,
    lost: Arc<Notify>,
    handle_signals: bool,
}

impl EventRouter {
    pub fn new(ctx: BotContext, capacity: usize) -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let lost = Arc::new(Notify::new());
        let dispatcher = CommandDispatcher::new(ctx.store.clone(), ctx.command_prefix.clone());
        let router = Self {
            ctx,
            dispatcher,
            tracker: ConnectionTracker::new(),
            rx,
            lost: lost.clone(),
            handle_signals: false,
        };
        (router, EventSender { tx, lost })
    }

    /// Also stop on Ctrl-C. Off by default so embedded routers leave signals alone.
    pub fn with_signal_handling(mut self) -> Self {
        self.handle_signals = true;
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Decide whether a packet reaches the command layer: decode, then readiness, then addressing.
    pub fn admit(&self, packet: &Packet) -> Admission {
        let text = match std::str::from_utf8(&packet.payload) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "Dropping undecodable payload from {} ({} bytes): {}",
                    packet.origin_user_id,
                    packet.payload.len(),
                    e
                );
                return Admission::Undecodable;
            }
        };
        let Some(me) = self.tracker.identity() else {
            debug!("Not ready; dropping text from {}", packet.origin_user_id);
            return Admission::NotReady;
        };
        let for_my_user = packet.dest_user_id == me.user_id;
        let for_my_node = packet.dest_node_id == me.node_id;
        if !for_my_user && !for_my_node {
            trace!(
                "Text from {} for {}/{} is not ours",
                packet.origin_user_id,
                packet.dest_user_id,
                packet.dest_node_id
            );
            return Admission::NotAddressed;
        }
        Admission::Dispatch(text.to_string())
    }

    /// Consume events until loss, interruption, or every sender is gone.
    pub async fn run(mut self) -> RouterExit {
        info!("Event router running");
        loop {
            let next = tokio::select! {
                biased;
                _ = self.lost.notified() => Next::Lost,
                res = tokio::signal::ctrl_c(), if self.handle_signals => match res {
                    Ok(()) => Next::Interrupted,
                    Err(e) => {
                        warn!("Ctrl-C handler unavailable: {}", e);
                        Next::SignalUnavailable
                    }
                },
                ev = self.rx.recv() => match ev {
                    Some(ev) => Next::Event(ev),
                    None => Next::Closed,
                },
            };

            let event = match next {
                Next::Event(event) => event,
                Next::Lost => return self.shutdown().await,
                Next::Interrupted => return self.interrupted().await,
                Next::SignalUnavailable => {
                    self.handle_signals = false;
                    continue;
                }
                Next::Closed => {
                    info!("Event queue closed; router stopping");
                    return RouterExit::QueueClosed;
                }
            };

            match event {
                TransportEvent::IdentityEstablished(identity) => self.tracker.identity_established(identity),
                // Senders divert loss to the notify; one that reaches the
                // queue anyway still ends the run.
                TransportEvent::ConnectionLost => return self.shutdown().await,
                TransportEvent::TextReceived(packet) => {
                    let Admission::Dispatch(text) = self.admit(&packet) else {
                        continue;
                    };
                    let work = self.dispatcher.execute(
                        &self.ctx.sender,
                        &text,
                        &packet.origin_user_id,
                        &packet.dest_user_id,
                    );
                    let preempted = tokio::select! {
                        biased;
                        _ = self.lost.notified() => Some(Next::Lost),
                        Ok(()) = tokio::signal::ctrl_c(), if self.handle_signals => Some(Next::Interrupted),
                        _ = work => None,
                    };
                    match preempted {
                        Some(Next::Lost) => {
                            warn!("Connection lost while serving {}; abandoning command", packet.origin_user_id);
                            return self.shutdown().await;
                        }
                        Some(_) => return self.interrupted().await,
                        None => {}
                    }
                }
            }
        }
    }

    async fn interrupted(&mut self) -> RouterExit {
        info!("Received shutdown signal");
        if let Err(e) = self.ctx.transport.close().await {
            warn!("Transport close failed: {}", e);
        }
        RouterExit::Interrupted
    }

    async fn shutdown(&mut self) -> RouterExit {
        let outcome = self.tracker.connection_lost();
        if let Err(e) = self.ctx.transport.close().await {
            warn!("Transport close failed: {}", e);
        }
        info!("Transport closed ({:?})", outcome);
        RouterExit::ConnectionLost(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mesh::mock::MockTransport;
    use crate::mesh::Identity;
    use crate::provider::scripted::ScriptedProvider;
    use crate::storage::{ProviderConfig, SessionStore};

    async fn router() -> (EventRouter, EventSender, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(
            dir.path().join("history.json"),
            ProviderConfig::default(),
            Arc::new(ScriptedProvider::new()),
            175,
        )
        .await
        .unwrap();
        let ctx = BotContext::new(&Config::default(), Arc::new(store), Arc::new(MockTransport::new()));
        let (router, events) = EventRouter::new(ctx, 8);
        (router, events, dir)
    }

    fn me() -> Identity {
        Identity {
            node_id: 7,
            user_id: "!00000007".into(),
            long_name: String::new(),
            short_name: String::new(),
            hardware_model: String::new(),
            public_key: String::new(),
        }
    }

    #[tokio::test]
    async fn admission_order_is_decode_ready_address() {
        let (mut router, _events, _dir) = router().await;
        let bad = Packet {
            payload: vec![0xff, 0xfe],
            ..Packet::text("!a", 1, "!00000007", 7, "")
        };
        assert_eq!(router.admit(&bad), Admission::Undecodable);
        assert_eq!(router.admit(&Packet::text("!a", 1, "!00000007", 7, "/ping")), Admission::NotReady);

        router.tracker.identity_established(me());
        assert_eq!(
            router.admit(&Packet::text("!a", 1, "!00000007", 99, "/ping")),
            Admission::Dispatch("/ping".into())
        );
        assert_eq!(
            router.admit(&Packet::text("!a", 1, "!other", 7, "/ping")),
            Admission::Dispatch("/ping".into())
        );
        assert_eq!(router.admit(&Packet::text("!a", 1, "!other", 8, "/ping")), Admission::NotAddressed);
    }

    #[tokio::test]
    async fn loss_event_skips_the_queue() {
        let (router, events, _dir) = router().await;
        events.deliver(TransportEvent::IdentityEstablished(me())).await.unwrap();
        events.deliver(TransportEvent::ConnectionLost).await.unwrap();
        assert_eq!(router.run().await, RouterExit::ConnectionLost(LossOutcome::ShutdownBeforeReady));
    }

    #[tokio::test]
    async fn queued_loss_after_handshake_still_shuts_down() {
        let (router, events, _dir) = router().await;
        events.tx.send(TransportEvent::IdentityEstablished(me())).await.unwrap();
        events.tx.send(TransportEvent::ConnectionLost).await.unwrap();
        assert_eq!(router.run().await, RouterExit::ConnectionLost(LossOutcome::Shutdown));
    }

    #[tokio::test]
    async fn dropping_senders_stops_router() {
        let (router, events, _dir) = router().await;
        drop(events);
        assert_eq!(router.run().await, RouterExit::QueueClosed);
    }

    #[tokio::test]
    async fn deliver_after_router_gone_reports_closed() {
        let (router, events, _dir) = router().await;
        drop(router);
        assert!(events.deliver(TransportEvent::IdentityEstablished(me())).await.is_err());
    }
}
