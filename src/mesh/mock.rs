//! In-memory transport that records every send. Used by the test suite.

use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::MeshTransport;
use crate::errors::TransportError;

const NEVER_FAIL: usize = usize::MAX;

#[derive(Debug)]
pub struct MockTransport {
    sent: Mutex<Vec<(String, String)>>,
    fail_after: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_after: AtomicUsize::new(NEVER_FAIL),
            closed: AtomicBool::new(false),
        }
    }

    /// Make every send after the first `n` successful ones fail.
    pub fn fail_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// `(to_user, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Texts sent to one user, in order.
    pub fn sent_to(&self, user: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == user)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeshTransport for MockTransport {
    async fn send_text(&self, to_user: &str, text: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut sent = self.sent.lock().map_err(|_| TransportError::Closed)?;
        if sent.len() >= self.fail_after.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                to: to_user.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        debug!("Mock send to {}: {} bytes", to_user, text.len());
        sent.push((to_user.to_string(), text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
