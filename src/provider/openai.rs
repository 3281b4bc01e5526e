//! OpenAI-compatible chat completion client.
//!
//! Works with any endpoint that speaks the `/chat/completions` dialect
//! (OpenAI, OpenRouter and its proxies, local servers). The endpoint, model and
//! key come from the calling session's [`ProviderConfig`], so each user can
//! point the bot at a different backend. No request timeout is applied.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use super::CompletionProvider;
use crate::errors::ProviderError;
use crate::logutil::redact_secret;
use crate::storage::{ProviderConfig, Turn};

pub struct OpenAiProvider {
    client: reqwest::Client,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_tokens,
        }
    }

    /// Endpoint for a configured base URL, tolerating a trailing slash.
    pub fn completions_url(base_url: &str) -> String {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, history: &[Turn], config: &ProviderConfig) -> Result<String, ProviderError> {
        let url = Self::completions_url(&config.base_url);
        debug!(
            "Completion request: url={} model={} key={} turns={}",
            url,
            config.model,
            redact_secret(&config.api_key),
            history.len()
        );

        let body = CompletionRequest {
            model: &config.model,
            messages: history,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        first_answer(parsed)
    }
}

/// Trimmed content of the first choice; blank content counts as no answer.
fn first_answer(parsed: CompletionResponse) -> Result<String, ProviderError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(ProviderError::EmptyAnswer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(
            OpenAiProvider::completions_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAiProvider::completions_url("https://api.example.com/v1"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn request_body_uses_history_turns() {
        let history = vec![Turn::user("hi"), Turn::assistant("hello")];
        let body = CompletionRequest {
            model: "m",
            messages: &history,
            max_tokens: 200,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["max_tokens"], 200);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn response_without_choices_decodes() {
        let parsed: CompletionResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(parsed.choices.is_empty());
        assert!(matches!(first_answer(parsed), Err(ProviderError::EmptyAnswer)));
    }

    #[test]
    fn first_choice_is_trimmed() {
        let parsed: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  hi there\n"}},{"message":{"content":"no"}}]}"#)
                .unwrap();
        assert_eq!(first_answer(parsed).unwrap(), "hi there");
    }

    #[test]
    fn blank_or_null_content_is_no_answer() {
        for body in [
            r#"{"choices":[{"message":{"content":"   \n "}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
        ] {
            let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
            assert!(matches!(first_answer(parsed), Err(ProviderError::EmptyAnswer)));
        }
    }
}
