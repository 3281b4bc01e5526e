//! # Mesh Transport Boundary
//!
//! Types and traits that separate the bot core from the radio link. The link
//! itself (serial framing, handshake, protobuf decoding) lives outside this
//! crate; what the core sees is:
//!
//! - a stream of [`TransportEvent`]s (handshake, loss, inbound text), and
//! - a send primitive, the [`MeshTransport`] trait.
//!
//! On top of those this module provides the [`ConnectionTracker`] that gates
//! readiness on the identity handshake and the [`ChunkedSender`] that splits
//! and paces replies so they fit the radio frame and duty cycle.
//!
//! ## Transports
//!
//! - [`console`] - JSON lines on stdin/stdout, used by the `meshai` binary
//! - [`mock`] - in-memory recorder used by the test suite

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

pub mod console;
pub mod mock;
pub mod sender;
pub mod state;

pub use sender::{split_utf8, ChunkedSender};
pub use state::{ConnectionState, ConnectionTracker, LossOutcome};

/// This bot's own identity as reported by the radio during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub node_id: u32,
    pub user_id: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub hardware_model: String,
    #[serde(default)]
    pub public_key: String,
}

/// One inbound text packet. Consumed exactly once by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub origin_user_id: String,
    pub dest_user_id: String,
    pub origin_node_id: u32,
    pub dest_node_id: u32,
    /// Raw payload bytes; UTF-8 text is expected but not guaranteed.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Convenience constructor for a UTF-8 payload.
    pub fn text(
        origin_user_id: impl Into<String>,
        origin_node_id: u32,
        dest_user_id: impl Into<String>,
        dest_node_id: u32,
        text: &str,
    ) -> Self {
        Self {
            origin_user_id: origin_user_id.into(),
            dest_user_id: dest_user_id.into(),
            origin_node_id,
            dest_node_id,
            payload: text.as_bytes().to_vec(),
        }
    }
}

/// Events raised by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    IdentityEstablished(Identity),
    ConnectionLost,
    TextReceived(Packet),
}

/// Send primitive of the radio link.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Send one payload-sized text to a user. Must not split or pace; the caller does.
    async fn send_text(&self, to_user: &str, text: &str) -> Result<(), TransportError>;

    /// Release the underlying link. Called once during shutdown.
    async fn close(&self) -> Result<(), TransportError>;
}
