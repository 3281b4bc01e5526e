//! # Meshai - Conversational Assistant for Mesh Radio Networks
//!
//! Meshai answers slash-commands sent over a mesh radio network. Each user gets
//! a persisted conversation history and their own completion-provider settings;
//! answers are cut to the radio frame size and paced to respect the duty cycle.
//!
//! ## Features
//!
//! - **Commands**: `/ping`, `/help`, `/ask <text>`, `/clear`, `/set <model|sk-key|url>`.
//! - **Per-user sessions**: ordered history plus model/key/endpoint overrides, stored as JSON and
//!   migrated automatically from the older history-only format.
//! - **Radio-friendly replies**: UTF-8 safe slicing to the transport payload limit with a fixed gap between slices.
//! - **Serialized processing**: one command at a time from a bounded event queue; connection loss preempts everything.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use meshai::bot::{BotContext, EventRouter};
//! use meshai::config::Config;
//! use meshai::mesh::console::ConsoleTransport;
//! use meshai::storage::SessionStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let provider = meshai::provider::from_config(&config)?;
//!     let store = SessionStore::load(
//!         &config.storage.store_file,
//!         config.provider_defaults(),
//!         provider,
//!         config.bot.reply_max_chars,
//!     )
//!     .await?;
//!     let transport = Arc::new(ConsoleTransport::new());
//!     let ctx = BotContext::new(&config, Arc::new(store), transport);
//!     let (router, events) = EventRouter::new(ctx, config.transport.event_queue_capacity);
//!     ConsoleTransport::spawn_reader(events)?;
//!     router.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bot`] - event router, command dispatcher and the shared context
//! - [`mesh`] - transport boundary, readiness tracking and the chunked sender
//! - [`storage`] - per-user session persistence
//! - [`provider`] - completion backends
//! - [`config`] - configuration management and validation
//! - [`errors`] - typed failures
//! - [`validation`] / [`logutil`] - text helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Transport     │ ← events in, sends out
//! └─────────────────┘
//!          │ bounded queue
//! ┌─────────────────┐
//! │   EventRouter   │ ← readiness, addressing
//! └─────────────────┘
//!          │
//! ┌─────────────────┐      ┌──────────────┐
//! │ CommandDispatch │ ───→ │  Provider    │
//! └─────────────────┘      └──────────────┘
//!          │
//! ┌─────────────────┐
//! │  SessionStore   │ ← JSON on disk
//! └─────────────────┘
//! ```

pub mod bot;
pub mod config;
pub mod errors;
pub mod logutil;
pub mod mesh;
pub mod provider;
pub mod storage;
pub mod validation;
