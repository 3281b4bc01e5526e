//! Connection readiness tracking.
//!
//! The radio reports our own identity once the handshake completes; until then
//! (and after the link drops) every inbound text is dropped. Loss is terminal:
//! there is no reconnect path, so once `connection_lost` has been seen the
//! tracker never becomes ready again.

use log::{info, warn};

use super::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Ready,
}

/// What the caller must do after the link is reported lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossOutcome {
    /// We were ready: close the transport and end the process.
    Shutdown,
    /// The link dropped before any handshake; nothing was being served.
    ShutdownBeforeReady,
}

#[derive(Debug, Default)]
pub struct ConnectionTracker {
    identity: Option<Identity>,
    lost: bool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        if self.identity.is_some() && !self.lost {
            ConnectionState::Ready
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Identity captured at the most recent handshake, while ready.
    pub fn identity(&self) -> Option<&Identity> {
        if self.lost {
            None
        } else {
            self.identity.as_ref()
        }
    }

    /// Record the handshake identity. A later handshake overwrites the earlier one.
    /// Ignored after loss.
    pub fn identity_established(&mut self, identity: Identity) {
        if self.lost {
            warn!(
                "Ignoring handshake for node {} after connection loss",
                identity.node_id
            );
            return;
        }
        info!(
            "Connection established: node {} user {} ({} / {}) hw={}",
            identity.node_id,
            identity.user_id,
            identity.long_name,
            identity.short_name,
            identity.hardware_model
        );
        self.identity = Some(identity);
    }

    /// Mark the link lost. Readiness is false from this call on.
    pub fn connection_lost(&mut self) -> LossOutcome {
        let was_ready = self.is_ready();
        self.lost = true;
        warn!("Connection lost");
        if was_ready {
            LossOutcome::Shutdown
        } else {
            LossOutcome::ShutdownBeforeReady
        }
    }
}
