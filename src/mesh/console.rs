//! JSON-lines transport on stdin/stdout.
//!
//! Stands in for the radio link when running the binary: an external bridge
//! (or a person with a terminal) writes one event per line to stdin and reads
//! one send per line from stdout. Logs go to stderr, so stdout carries only
//! sends.
//!
//! Input lines:
//!
//! ```text
//! {"event":"established","identity":{"node_id":305419896,"user_id":"!12345678","long_name":"Mesh AI"}}
//! {"event":"text","packet":{"origin_user_id":"!aabbccdd","origin_node_id":1,"dest_user_id":"!12345678","dest_node_id":305419896,"payload":"/ping"}}
//! {"event":"lost"}
//! ```
//!
//! `payload` may also be an array of byte values. End of input counts as
//! connection loss.
//!
//! Output lines: `{"to":"!aabbccdd","text":"pong"}`

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Identity, MeshTransport, Packet, TransportEvent};
use crate::bot::EventSender;
use crate::errors::TransportError;
use crate::logutil::escape_log;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum WireEvent {
    Established { identity: Identity },
    Lost,
    Text { packet: WirePacket },
}

#[derive(Debug, Deserialize)]
struct WirePacket {
    origin_user_id: String,
    dest_user_id: String,
    origin_node_id: u32,
    dest_node_id: u32,
    payload: WirePayload,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Serialize)]
struct WireSend<'a> {
    to: &'a str,
    text: &'a str,
}

/// Parse one input line into a transport event.
pub fn parse_event_line(line: &str) -> Result<TransportEvent, serde_json::Error> {
    let wire: WireEvent = serde_json::from_str(line)?;
    Ok(match wire {
        WireEvent::Established { identity } => TransportEvent::IdentityEstablished(identity),
        WireEvent::Lost => TransportEvent::ConnectionLost,
        WireEvent::Text { packet } => TransportEvent::TextReceived(Packet {
            origin_user_id: packet.origin_user_id,
            dest_user_id: packet.dest_user_id,
            origin_node_id: packet.origin_node_id,
            dest_node_id: packet.dest_node_id,
            payload: match packet.payload {
                WirePayload::Text(s) => s.into_bytes(),
                WirePayload::Bytes(b) => b,
            },
        }),
    })
}

pub struct ConsoleTransport {
    out: Mutex<tokio::io::Stdout>,
    closed: AtomicBool,
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
            closed: AtomicBool::new(false),
        }
    }

    /// Read stdin on a dedicated OS thread and hand every event to the router.
    ///
    /// The thread only enqueues; it never touches bot state.
    pub fn spawn_reader(events: EventSender) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("console-reader".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let line = match line {
                        Ok(l) => l,
                        Err(e) => {
                            warn!("stdin read error: {}", e);
                            break;
                        }
                    };
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match parse_event_line(trimmed) {
                        Ok(event) => {
                            if events.blocking_deliver(event).is_err() {
                                debug!("Router stopped; console reader exiting");
                                return;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed event line '{}': {}", escape_log(trimmed), e),
                    }
                }
                info!("stdin closed; reporting connection loss");
                events.connection_lost();
            })
    }
}

#[async_trait]
impl MeshTransport for ConsoleTransport {
    async fn send_text(&self, to_user: &str, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut line = serde_json::to_string(&WireSend { to: to_user, text }).map_err(|e| {
            TransportError::Send {
                to: to_user.to_string(),
                reason: e.to_string(),
            }
        })?;
        line.push('\n');
        let mut out = self.out.lock().await;
        let send_err = |e: std::io::Error| TransportError::Send {
            to: to_user.to_string(),
            reason: e.to_string(),
        };
        out.write_all(line.as_bytes()).await.map_err(send_err)?;
        out.flush().await.map_err(send_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        let mut out = self.out.lock().await;
        let _ = out.flush().await;
        Ok(())
    }
}
