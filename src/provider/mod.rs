//! Completion backends.
//!
//! The bot core only needs one operation from a backend: given the ordered
//! history of a session and that session's effective provider config, produce
//! the next assistant answer or fail. [`CompletionProvider`] is that seam.
//!
//! - [`OpenAiProvider`] - OpenAI-compatible `/chat/completions` over HTTPS (feature `openai`)
//! - [`EchoProvider`] - offline; answers with the last user turn
//! - [`scripted::ScriptedProvider`] - canned answers and failures for tests

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, ProviderKind};
use crate::errors::ProviderError;
use crate::storage::{ProviderConfig, Role, Turn};

#[cfg(feature = "openai")]
mod openai;
pub mod scripted;

#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

/// A request/reply completion engine. May fail; never retried by the core.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Produce the next assistant answer for `history` using `config`.
    async fn complete(&self, history: &[Turn], config: &ProviderConfig) -> Result<String, ProviderError>;
}

/// Offline backend that repeats the most recent user turn.
#[derive(Debug, Default)]
pub struct EchoProvider;

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, history: &[Turn], _config: &ProviderConfig) -> Result<String, ProviderError> {
        history
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.clone())
            .ok_or(ProviderError::EmptyAnswer)
    }
}

/// Build the backend selected in the configuration.
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    match config.provider.kind {
        ProviderKind::Echo => Ok(Arc::new(EchoProvider)),
        #[cfg(feature = "openai")]
        ProviderKind::Openai => Ok(Arc::new(OpenAiProvider::new(config.provider.max_tokens))),
        #[cfg(not(feature = "openai"))]
        ProviderKind::Openai => Err(anyhow::anyhow!(
            "provider.kind = \"openai\" requires the 'openai' feature"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_repeats_last_user_turn() {
        let history = vec![
            Turn::user("first"),
            Turn::assistant("reply"),
            Turn::user("second"),
        ];
        let answer = EchoProvider
            .complete(&history, &ProviderConfig::default())
            .await
            .unwrap();
        assert_eq!(answer, "second");
    }

    #[tokio::test]
    async fn echo_without_user_turn_fails() {
        let result = EchoProvider.complete(&[], &ProviderConfig::default()).await;
        assert!(matches!(result, Err(ProviderError::EmptyAnswer)));
    }

    #[test]
    fn config_selects_echo() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Echo;
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.name(), "echo");
    }
}
