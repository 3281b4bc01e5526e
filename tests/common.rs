//! Test utilities & fixtures.
//! Runs a real router against the in-memory transport, the scripted provider
//! and a store file in a temp dir.
#![allow(dead_code)] // each test binary uses a different subset

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use meshai::bot::{BotContext, EventRouter, EventSender, RouterExit};
use meshai::config::Config;
use meshai::mesh::mock::MockTransport;
use meshai::mesh::{Identity, Packet, TransportEvent};
use meshai::provider::scripted::ScriptedProvider;
use meshai::provider::CompletionProvider;
use meshai::storage::{ProviderConfig, SessionStore};

pub const BOT_USER: &str = "!0000abcd";
pub const BOT_NODE: u32 = 0xabcd;

pub fn bot_identity() -> Identity {
    Identity {
        node_id: BOT_NODE,
        user_id: BOT_USER.to_string(),
        long_name: "Mesh AI".to_string(),
        short_name: "MAI".to_string(),
        hardware_model: "HELTEC_V3".to_string(),
        public_key: String::new(),
    }
}

pub fn defaults() -> ProviderConfig {
    ProviderConfig {
        model: "default-model".to_string(),
        api_key: "sk-default-key".to_string(),
        base_url: "https://default.example/v1".to_string(),
    }
}

/// Default config with pacing turned off so tests run fast.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.transport.chunk_gap_ms = 0;
    config
}

pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<SessionStore>,
    pub store_path: PathBuf,
    events: Option<EventSender>,
    router: Option<tokio::task::JoinHandle<RouterExit>>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(test_config(), None).await
    }

    /// Start with `contents` already in the store file.
    pub async fn start_with_store(contents: &str) -> Self {
        Self::start_with(test_config(), Some(contents)).await
    }

    pub async fn start_with(config: Config, store_contents: Option<&str>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store_path = dir.path().join("history.json");
        if let Some(contents) = store_contents {
            std::fs::write(&store_path, contents).expect("seed store");
        }
        let transport = Arc::new(MockTransport::new());
        let provider = Arc::new(ScriptedProvider::new());
        let backend: Arc<dyn CompletionProvider> = provider.clone();
        let store = Arc::new(
            SessionStore::load(&store_path, defaults(), backend, config.bot.reply_max_chars)
                .await
                .expect("load store"),
        );
        let ctx = BotContext::new(&config, store.clone(), transport.clone());
        let (router, events) = EventRouter::new(ctx, config.transport.event_queue_capacity);
        let router = tokio::spawn(router.run());
        Self {
            transport,
            provider,
            store,
            store_path,
            events: Some(events),
            router: Some(router),
            _dir: dir,
        }
    }

    pub async fn deliver(&self, event: TransportEvent) {
        self.events
            .as_ref()
            .expect("router still accepting events")
            .deliver(event)
            .await
            .expect("router alive");
    }

    /// Another producer handle, e.g. for a transport thread.
    pub fn sender(&self) -> EventSender {
        self.events.clone().expect("router still accepting events")
    }

    pub async fn handshake(&self) {
        self.deliver(TransportEvent::IdentityEstablished(bot_identity())).await;
    }

    /// Direct message from `from` to the bot's user id.
    pub async fn text(&self, from: &str, body: &str) {
        self.deliver(TransportEvent::TextReceived(Packet::text(from, 1, BOT_USER, BOT_NODE, body)))
            .await;
    }

    pub async fn packet(&self, packet: Packet) {
        self.deliver(TransportEvent::TextReceived(packet)).await;
    }

    /// Poll until at least `n` sends were recorded; panics after five seconds.
    pub async fn wait_for_sends(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.transport.sent().len() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} sends, saw {:?}",
                n,
                self.transport.sent()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop feeding events and wait for the router to drain the queue and exit.
    pub async fn finish(&mut self) -> RouterExit {
        self.events.take();
        let handle = self.router.take().expect("router already finished");
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("router exits")
            .expect("router task")
    }

    /// Report connection loss and wait for the router to exit.
    pub async fn lose_connection(&mut self) -> RouterExit {
        if let Some(events) = &self.events {
            events.connection_lost();
        }
        self.finish().await
    }

    pub fn replies_to(&self, user: &str) -> Vec<String> {
        self.transport.sent_to(user)
    }

    pub fn store_file(&self) -> Option<String> {
        std::fs::read_to_string(&self.store_path).ok()
    }
}
