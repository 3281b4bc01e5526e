//! # Storage Module - Session Persistence Layer
//!
//! Every user who talks to the bot gets a [`Session`]: the ordered chat
//! history plus the provider settings that user chose with `/set`. All sessions
//! live in one JSON file, rewritten whole after every mutation.
//!
//! ## File Format
//!
//! ```json
//! {
//!   "!aabbccdd": {
//!     "history": [
//!       { "role": "user", "content": "hello" },
//!       { "role": "assistant", "content": "Hi! How can I help?" }
//!     ],
//!     "config": { "model": "…", "api_key": "…", "base_url": "…" }
//!   }
//! }
//! ```
//!
//! Older files stored only the history array per user
//! (`{ "!aabbccdd": [ {"role": …, "content": …} ] }`). Those entries are
//! migrated on load to the shape above with a copy of the process defaults
//! as their config, and the file is rewritten in the current shape.
//!
//! ## Consistency
//!
//! - One async mutex guards the whole map; each operation holds it across its
//!   load/mutate/persist sequence, including the provider call in [`SessionStore::ask`].
//! - Memory and disk never diverge: if a provider call or a write fails, the
//!   affected session is restored to exactly what it was before the operation.
//! - Writes take an exclusive `fs2` lock on the destination, write a temp file
//!   next to it and rename it into place.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::{AskError, ProviderError, StoreError};
use crate::logutil::escape_log;
use crate::provider::CompletionProvider;
use crate::validation::truncate_chars;

use fs2::FileExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation. Never edited after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Provider settings for one session. Empty fields mean "use the default".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
}

impl ProviderConfig {
    /// Copy of `self` with every empty field taken from `defaults`.
    pub fn filled_from(&self, defaults: &ProviderConfig) -> ProviderConfig {
        fn pick(own: &str, fallback: &str) -> String {
            if own.is_empty() {
                fallback.to_string()
            } else {
                own.to_string()
            }
        }
        ProviderConfig {
            model: pick(&self.model, &defaults.model),
            api_key: pick(&self.api_key, &defaults.api_key),
            base_url: pick(&self.base_url, &defaults.base_url),
        }
    }

    /// Overwrite only the fields named in `patch`.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(api_key) = &patch.api_key {
            self.api_key = api_key.clone();
        }
        if let Some(base_url) = &patch.base_url {
            self.base_url = base_url.clone();
        }
    }
}

/// Which provider setting a `/set` value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Model,
    ApiKey,
    BaseUrl,
}

impl ConfigField {
    /// Name shown to users in confirmations.
    pub fn label(self) -> &'static str {
        match self {
            ConfigField::Model => "Model",
            ConfigField::ApiKey => "API key",
            ConfigField::BaseUrl => "Endpoint",
        }
    }
}

/// Partial provider config; `None` fields are left untouched by a merge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigPatch {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ConfigPatch {
    pub fn single(field: ConfigField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            ConfigField::Model => Self {
                model: value,
                ..Self::default()
            },
            ConfigField::ApiKey => Self {
                api_key: value,
                ..Self::default()
            },
            ConfigField::BaseUrl => Self {
                base_url: value,
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub history: Vec<Turn>,
    #[serde(default)]
    pub config: ProviderConfig,
}

impl Session {
    fn fresh(defaults: &ProviderConfig) -> Self {
        Self {
            history: Vec::new(),
            config: defaults.clone(),
        }
    }
}

/// Either on-disk shape of a session entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredSession {
    Legacy(Vec<Turn>),
    Current(Session),
}

/// Durable per-user histories and provider configs.
pub struct SessionStore {
    path: PathBuf,
    defaults: ProviderConfig,
    provider: Arc<dyn CompletionProvider>,
    reply_max_chars: usize,
    sessions: Mutex<BTreeMap<String, Session>>,
}

impl SessionStore {
    /// Load the store file at `path`. A missing file yields an empty store.
    ///
    /// Legacy entries are migrated and the migrated store is written back.
    pub async fn load(
        path: impl AsRef<Path>,
        defaults: ProviderConfig,
        provider: Arc<dyn CompletionProvider>,
        reply_max_chars: usize,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let (sessions, migrated) = Self::read_sessions(&path, &defaults).await?;
        info!(
            "Loaded {} session(s) from {} (provider: {})",
            sessions.len(),
            path.display(),
            provider.name()
        );
        let store = Self {
            path,
            defaults,
            provider,
            reply_max_chars,
            sessions: Mutex::new(sessions),
        };
        if migrated > 0 {
            let sessions = store.sessions.lock().await;
            match store.persist(&sessions) {
                Ok(()) => info!("Migrated {} legacy session(s) to the current format", migrated),
                Err(e) => warn!(
                    "Migrated {} legacy session(s) in memory but could not rewrite {}: {}",
                    migrated,
                    store.path.display(),
                    e
                ),
            }
        }
        Ok(store)
    }

    async fn read_sessions(
        path: &Path,
        defaults: &ProviderConfig,
    ) -> Result<(BTreeMap<String, Session>, usize), StoreError> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No store file at {}; starting empty", path.display());
                return Ok((BTreeMap::new(), 0));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        // Guard against leading NULs left by an interrupted write
        let cleaned = data.trim_start_matches('\0');
        if cleaned.trim().is_empty() {
            return Ok((BTreeMap::new(), 0));
        }
        let raw: BTreeMap<String, StoredSession> = serde_json::from_str(cleaned)?;
        let mut migrated = 0usize;
        let sessions = raw
            .into_iter()
            .map(|(user, stored)| {
                let session = match stored {
                    StoredSession::Legacy(history) => {
                        migrated += 1;
                        Session {
                            history,
                            config: defaults.clone(),
                        }
                    }
                    StoredSession::Current(mut session) => {
                        session.config = session.config.filled_from(defaults);
                        session
                    }
                };
                (user, session)
            })
            .collect();
        Ok((sessions, migrated))
    }

    /// Per-user turn counts of the file at `path`, plus how many entries are
    /// still in the legacy shape. Never writes.
    pub async fn inspect(path: impl AsRef<Path>) -> Result<(Vec<(String, usize)>, usize), StoreError> {
        let (sessions, legacy) = Self::read_sessions(path.as_ref(), &ProviderConfig::default()).await?;
        let counts = sessions
            .into_iter()
            .map(|(user, s)| (user, s.history.len()))
            .collect();
        Ok((counts, legacy))
    }

    /// Process-wide provider defaults.
    pub fn defaults(&self) -> &ProviderConfig {
        &self.defaults
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reply_max_chars(&self) -> usize {
        self.reply_max_chars
    }

    /// Snapshot of one user's session, with its config default-filled.
    pub async fn session(&self, user_id: &str) -> Option<Session> {
        let sessions = self.sessions.lock().await;
        sessions.get(user_id).map(|s| Session {
            history: s.history.clone(),
            config: s.config.filled_from(&self.defaults),
        })
    }

    /// `(user_id, turn count)` for every stored session.
    pub async fn summary(&self) -> Vec<(String, usize)> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|(user, s)| (user.clone(), s.history.len()))
            .collect()
    }

    /// Append `text` as a user turn, ask the provider, append its (truncated)
    /// answer, persist, and return the answer.
    ///
    /// On any failure the session is left exactly as it was before the call.
    pub async fn ask(&self, user_id: &str, text: &str) -> Result<String, AskError> {
        let mut sessions = self.sessions.lock().await;
        let previous = sessions.get(user_id).cloned();

        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session::fresh(&self.defaults));
        session.history.push(Turn::user(text));
        let history = session.history.clone();
        let config = session.config.filled_from(&self.defaults);

        debug!(
            "Asking {} for {} (model={}, turns={}): '{}'",
            self.provider.name(),
            user_id,
            config.model,
            history.len(),
            escape_log(text)
        );

        let answer = match self.provider.complete(&history, &config).await {
            Ok(answer) if answer.trim().is_empty() => Err(ProviderError::EmptyAnswer),
            Ok(answer) => Ok(truncate_chars(answer.trim(), self.reply_max_chars).to_string()),
            Err(e) => Err(e),
        };
        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                Self::restore(&mut sessions, user_id, previous);
                return Err(AskError::Provider(e));
            }
        };

        if let Some(session) = sessions.get_mut(user_id) {
            session.history.push(Turn::assistant(answer.clone()));
        }
        if let Err(e) = self.persist(&sessions) {
            Self::restore(&mut sessions, user_id, previous);
            return Err(AskError::Store(e));
        }
        info!(
            "Answered {} ({} chars, history now {} turns)",
            user_id,
            answer.chars().count(),
            sessions.get(user_id).map(|s| s.history.len()).unwrap_or(0)
        );
        Ok(answer)
    }

    /// Merge `patch` over the user's config (creating the session if needed),
    /// persist, and return the effective config.
    pub async fn set_config(&self, user_id: &str, patch: &ConfigPatch) -> Result<ProviderConfig, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let previous = sessions.get(user_id).cloned();

        let session = sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Session::fresh(&self.defaults));
        session.config.apply(patch);
        let effective = session.config.filled_from(&self.defaults);

        if let Err(e) = self.persist(&sessions) {
            Self::restore(&mut sessions, user_id, previous);
            return Err(e);
        }
        debug!("Updated provider config for {}", user_id);
        Ok(effective)
    }

    /// Remove the user's session. Returns whether one existed; a missing
    /// session is not an error and leaves the file untouched.
    pub async fn clear(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let Some(removed) = sessions.remove(user_id) else {
            debug!("Clear for {}: no session", user_id);
            return Ok(false);
        };
        if let Err(e) = self.persist(&sessions) {
            sessions.insert(user_id.to_string(), removed);
            return Err(e);
        }
        info!("Cleared session for {} ({} turns)", user_id, removed.history.len());
        Ok(true)
    }

    fn restore(sessions: &mut BTreeMap<String, Session>, user_id: &str, previous: Option<Session>) {
        match previous {
            Some(session) => {
                sessions.insert(user_id.to_string(), session);
            }
            None => {
                sessions.remove(user_id);
            }
        }
    }

    fn persist(&self, sessions: &BTreeMap<String, Session>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(sessions)?;
        Self::write_file_locked(&self.path, &content)
    }

    /// Replace `path` with `content`: lock the destination, write a sibling
    /// temp file, rename it over the destination.
    fn write_file_locked(path: &Path, content: &str) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Held until the rename lands; released on drop.
        let guard = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        guard.lock_exclusive().map_err(|source| StoreError::Lock {
            path: path.display().to_string(),
            source,
        })?;

        let staged = Self::staging_path(dir, path);
        if let Err(e) = Self::write_synced(&staged, content) {
            let _ = std::fs::remove_file(&staged);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&staged, path) {
            let _ = std::fs::remove_file(&staged);
            return Err(e.into());
        }
        if let Ok(d) = std::fs::File::open(dir) {
            let _ = d.sync_all();
        }
        Ok(())
    }

    fn staging_path(dir: &Path, path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        dir.join(format!(".{}.{}.partial", name, std::process::id()))
    }

    fn write_synced(path: &Path, content: &str) -> std::io::Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()
    }
}
