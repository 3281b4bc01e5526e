//! Slash-command parsing and handling.
//!
//! A payload is `<prefix><verb>[ <rest>]`, split on the first space. Verbs
//! match case-insensitively against the closed [`Verb`] set; anything else
//! that carries the prefix is logged and ignored, and payloads without the
//! prefix are not commands at all.
//!
//! Handlers return `Result<String, CommandError>`. [`render_error`] is the one
//! place where failures become user-visible text, so provider and storage
//! details stay in the log and never reach the radio.

use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::errors::CommandError;
use crate::logutil::escape_log;
use crate::mesh::ChunkedSender;
use crate::storage::{ConfigField, ConfigPatch, SessionStore};
use crate::validation::{classify_set_value, sanitize_prompt};

pub const PONG: &str = "pong";
pub const HELP_TEXT: &str = "Commands: /ping /help /ask <text> /clear /set <model|sk-key|url>";
pub const ASK_USAGE: &str = "Usage: /ask <question>";
pub const SET_USAGE: &str = "Usage: /set <model | sk-key | https://endpoint>";
pub const CLEARED: &str = "History cleared";
pub const PROVIDER_APOLOGY: &str = "Sorry, the assistant is unavailable right now. Please try again later.";
pub const PERSISTENCE_FAILURE: &str = "Sorry, that could not be saved. Nothing was changed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Ping,
    Help,
    Ask,
    Clear,
    Set,
}

impl Verb {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ping" => Some(Verb::Ping),
            "help" => Some(Verb::Help),
            "ask" => Some(Verb::Ask),
            "clear" => Some(Verb::Clear),
            "set" => Some(Verb::Set),
            _ => None,
        }
    }
}

/// Outcome of parsing one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// A recognized verb and everything after the first space (possibly empty).
    Known { verb: Verb, rest: &'a str },
    /// Carries the prefix but names no verb we handle.
    Unknown(&'a str),
    /// Plain text; not addressed to the command layer.
    NotCommand,
}

impl<'a> Command<'a> {
    pub fn parse(payload: &'a str, prefix: &str) -> Self {
        let (head, rest) = match payload.split_once(' ') {
            Some((head, rest)) => (head, rest),
            None => (payload, ""),
        };
        let Some(name) = head.strip_prefix(prefix) else {
            return Command::NotCommand;
        };
        match Verb::parse(name) {
            Some(verb) => Command::Known { verb, rest },
            None => Command::Unknown(head),
        }
    }
}

/// Turns command payloads into replies, mutating the session store on the way.
#[derive(Clone)]
pub struct CommandDispatcher {
    store: Arc<SessionStore>,
    prefix: String,
}

impl CommandDispatcher {
    pub fn new(store: Arc<SessionStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Interpret `payload` from `origin_user` and produce the reply text, if any.
    ///
    /// Every successful mutation has been persisted by the time this returns.
    pub async fn dispatch(&self, payload: &str, origin_user: &str, dest_user: &str) -> Option<String> {
        let (verb, rest) = match Command::parse(payload, &self.prefix) {
            Command::Known { verb, rest } => (verb, rest),
            Command::Unknown(head) => {
                info!("Ignoring unknown command '{}' from {}", escape_log(head), origin_user);
                return None;
            }
            Command::NotCommand => {
                debug!("Non-command text from {} to {} ignored", origin_user, dest_user);
                return None;
            }
        };
        debug!("{:?} from {} to {}", verb, origin_user, dest_user);
        let result = match verb {
            Verb::Ping => Ok(PONG.to_string()),
            Verb::Help => Ok(HELP_TEXT.to_string()),
            Verb::Ask => self.ask(origin_user, rest).await,
            Verb::Clear => self.clear(origin_user).await,
            Verb::Set => self.set(origin_user, rest).await,
        };
        Some(result.unwrap_or_else(|e| render_error(verb, origin_user, e)))
    }

    /// Dispatch and deliver the reply to `origin_user` through `sender`.
    pub async fn execute(&self, sender: &ChunkedSender, payload: &str, origin_user: &str, dest_user: &str) {
        let Some(reply) = self.dispatch(payload, origin_user, dest_user).await else {
            return;
        };
        if let Err(e) = sender.send(&reply, origin_user).await {
            warn!("Reply to {} not fully delivered: {}", origin_user, e);
        }
    }

    async fn ask(&self, user: &str, rest: &str) -> Result<String, CommandError> {
        let prompt = sanitize_prompt(rest.trim());
        if prompt.trim().is_empty() {
            return Err(CommandError::Usage(ASK_USAGE));
        }
        Ok(self.store.ask(user, prompt.trim()).await?)
    }

    async fn clear(&self, user: &str) -> Result<String, CommandError> {
        self.store.clear(user).await?;
        Ok(CLEARED.to_string())
    }

    async fn set(&self, user: &str, rest: &str) -> Result<String, CommandError> {
        let mut tokens = rest.split_whitespace();
        let (Some(value), None) = (tokens.next(), tokens.next()) else {
            return Err(CommandError::Usage(SET_USAGE));
        };
        let field = classify_set_value(value);
        self.store
            .set_config(user, &ConfigPatch::single(field, value))
            .await?;
        info!("{} changed for {}", field.label(), user);
        Ok(set_confirmation(field, value))
    }
}

/// Confirmation for `/set`. Secret keys are never echoed back.
pub fn set_confirmation(field: ConfigField, value: &str) -> String {
    match field {
        ConfigField::ApiKey => format!("{} updated", field.label()),
        ConfigField::Model | ConfigField::BaseUrl => format!("{} set to {}", field.label(), value),
    }
}

/// Map a handler failure to reply text, logging what the user does not see.
pub fn render_error(verb: Verb, user: &str, err: CommandError) -> String {
    match err {
        CommandError::Usage(hint) => {
            debug!("{:?} usage error from {}", verb, user);
            hint.to_string()
        }
        CommandError::Provider(e) => {
            error!("{:?} for {} failed at the provider: {}", verb, user, e);
            PROVIDER_APOLOGY.to_string()
        }
        CommandError::Persistence(e) => {
            error!("{:?} for {} could not persist: {}", verb, user, e);
            PERSISTENCE_FAILURE.to_string()
        }
    }
}
