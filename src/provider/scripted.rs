//! Scripted completion backend for tests: canned answers, injected failures,
//! and a record of every call it received.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::CompletionProvider;
use crate::errors::ProviderError;
use crate::storage::{ProviderConfig, Turn};

/// One recorded call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history: Vec<Turn>,
    pub config: ProviderConfig,
}

/// Answers from a queue; falls back to `"reply <n>"` when the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next call.
    pub fn push_answer(&self, answer: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(answer.into()));
        }
    }

    /// Make the next call fail with a request error carrying `reason`.
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(reason.into()));
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls().pop()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, history: &[Turn], config: &ProviderConfig) -> Result<String, ProviderError> {
        let n = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| ProviderError::Request("poisoned".into()))?;
            calls.push(RecordedCall {
                history: history.to_vec(),
                config: config.clone(),
            });
            calls.len()
        };
        let next = self
            .script
            .lock()
            .map_err(|_| ProviderError::Request("poisoned".into()))?
            .pop_front();
        match next {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(reason)) => Err(ProviderError::Request(reason)),
            None => Ok(format!("reply {}", n)),
        }
    }
}
