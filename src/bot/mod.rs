//! # Bot Core
//!
//! Everything between a transport event and a reply on the air:
//!
//! - [`router`] owns the event queue, connection readiness and addressing, and
//!   runs exactly one command at a time.
//! - [`commands`] parses slash-commands into a closed [`Verb`] set and renders
//!   handler results (or typed errors) into reply text.
//!
//! Shared collaborators are gathered once at startup into a [`BotContext`] and
//! handed to the router; nothing in this module reaches for global state.

use std::sync::Arc;

use crate::config::Config;
use crate::mesh::{ChunkedSender, MeshTransport};
use crate::storage::SessionStore;

pub mod commands;
pub mod router;

pub use commands::{Command, CommandDispatcher, Verb};
pub use router::{Admission, EventRouter, EventSender, RouterExit};

/// Collaborators built at startup and threaded through the bot.
#[derive(Clone)]
pub struct BotContext {
    pub store: Arc<SessionStore>,
    pub transport: Arc<dyn MeshTransport>,
    pub sender: ChunkedSender,
    pub command_prefix: String,
}

impl BotContext {
    pub fn new(config: &Config, store: Arc<SessionStore>, transport: Arc<dyn MeshTransport>) -> Self {
        let sender = ChunkedSender::new(
            transport.clone(),
            config.transport.max_chunk_bytes,
            config.transport.chunk_gap(),
        );
        Self {
            store,
            transport,
            sender,
            command_prefix: config.bot.command_prefix.clone(),
        }
    }
}
