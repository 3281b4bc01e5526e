//! Splitting and pacing of outgoing replies.
//!
//! A reply longer than one radio payload is cut into UTF-8 safe slices and sent
//! one after another with a fixed gap, so a single long answer does not trip
//! the radio's duty-cycle limit. Delivery is best-effort: a failed slice aborts
//! the remainder, and slices already on air stay there.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::MeshTransport;
use crate::errors::TransportError;
use crate::logutil::escape_log;

/// Split `text` into consecutive slices of at most `max_bytes` bytes without
/// cutting a codepoint. Concatenating the slices reproduces `text`.
///
/// ASCII text yields exactly `ceil(len / max_bytes)` slices. When a codepoint
/// straddles the bound the slice ends before it; a bound smaller than the
/// codepoint itself still takes that whole codepoint so progress is guaranteed.
pub fn split_utf8(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(1);
    let mut slices = Vec::with_capacity(text.len() / max_bytes + 1);
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_bytes {
            slices.push(remaining);
            break;
        }
        let mut end = max_bytes;
        while end > 0 && !remaining.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }
        let (head, tail) = remaining.split_at(end);
        slices.push(head);
        remaining = tail;
    }
    slices
}

/// Sends replies as paced, size-bounded slices over a [`MeshTransport`].
#[derive(Clone)]
pub struct ChunkedSender {
    transport: Arc<dyn MeshTransport>,
    max_chunk_bytes: usize,
    pacing: Duration,
}

impl ChunkedSender {
    pub fn new(transport: Arc<dyn MeshTransport>, max_chunk_bytes: usize, pacing: Duration) -> Self {
        Self {
            transport,
            max_chunk_bytes,
            pacing,
        }
    }

    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Send `text` to `to_user`, pausing the pacing interval between slices.
    ///
    /// Returns the number of slices sent. On failure, slices after the failing
    /// one are not attempted.
    pub async fn send(&self, text: &str, to_user: &str) -> Result<usize, TransportError> {
        let slices = split_utf8(text, self.max_chunk_bytes);
        let total = slices.len();
        for (idx, slice) in slices.into_iter().enumerate() {
            if idx > 0 {
                sleep(self.pacing).await;
            }
            if let Err(e) = self.transport.send_text(to_user, slice).await {
                warn!(
                    "Send to {} failed on slice {}/{}; dropping the remaining {}: {}",
                    to_user,
                    idx + 1,
                    total,
                    total - idx - 1,
                    e
                );
                return Err(e);
            }
            debug!(
                "Sent slice {}/{} to {}: '{}'",
                idx + 1,
                total,
                to_user,
                escape_log(slice)
            );
        }
        Ok(total)
    }
}
