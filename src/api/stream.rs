//! Incremental reading of the chat reply body.
//!
//! The reply is an opaque text stream terminated by connection close: no framing,
//! no delimiters, no structured events. Chunks are decoded and concatenated as-is.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::ApiError;

/// A reply body read one chunk at a time.
#[async_trait]
pub trait ChatStream: Send {
    /// Next chunk of the body, or `Ok(None)` once the body has ended.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ApiError>;
}

/// Chat stream backed by a live HTTP response.
pub struct HttpChatStream {
    response: reqwest::Response,
}

impl HttpChatStream {
    /// Wrap a response whose headers have already arrived.
    #[must_use]
    pub const fn new(response: reqwest::Response) -> Self {
        Self { response }
    }
}

#[async_trait]
impl ChatStream for HttpChatStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ApiError> {
        Ok(self.response.chunk().await?)
    }
}

/// Streaming UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until its remaining
/// bytes arrive. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Decode as much of `chunk` (plus any held-back bytes) as forms complete text.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    if let Some(bad) = e.error_len() {
                        out.push(char::REPLACEMENT_CHARACTER);
                        self.pending.drain(..valid + bad);
                    } else {
                        // Incomplete trailing sequence: wait for the next chunk.
                        self.pending.drain(..valid);
                        break;
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    /// Whether bytes are waiting for the rest of a character.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
