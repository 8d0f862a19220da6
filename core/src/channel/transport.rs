//! Control channel abstraction: cursor-based receive, attachment fetch with a
//! hard size ceiling, best-effort send. Implemented by channel::telegram; the
//! trait seam keeps the rest of the crate transport-agnostic and testable.

use async_trait::async_trait;
use thiserror::Error;

/// Hard ceiling on attachment transfers (Telegram bot file download limit).
pub const MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The source-reported attachment size exceeds the transfer ceiling.
    /// Raised before any bytes move.
    #[error("attachment too large: {size} bytes (limit {limit})")]
    SizeExceeded { size: u64, limit: u64 },
    /// Network or API failure. Read call sites retry; write call sites give up.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Watermark position in the message stream. Advanced monotonically by the
/// intake loop after each observed message, parsed or not; never rewound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(pub i32);

impl Cursor {
    pub const START: Cursor = Cursor(0);

    /// Move the floor past the given message identifier. No-op if already past.
    pub fn advance_past(&mut self, update_id: i32) {
        if update_id + 1 > self.0 {
            self.0 = update_id + 1;
        }
    }
}

/// Source-side attachment metadata, as reported by the channel before fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub file_id: String,
    pub size_bytes: u64,
    /// Original file name when the channel reports one; used to keep the
    /// extension on the scratch copy.
    pub file_name: Option<String>,
}

/// One message observed on the channel. Produced for every update so the
/// cursor can advance past non-command traffic too.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub update_id: i32,
    /// Chat the message arrived in; None for update kinds that carry no chat.
    pub sender: Option<i64>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub video: Option<MediaAttachment>,
}

impl RawMessage {
    /// Text and caption joined for grammar rules that scan both.
    pub fn combined_text(&self) -> String {
        match (self.text.as_deref(), self.caption.as_deref()) {
            (Some(t), Some(c)) => format!("{} {}", t, c),
            (Some(t), None) => t.to_string(),
            (None, Some(c)) => c.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Send/receive/ack primitives of the external message transport.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// One long-poll fetch of messages at or past the cursor. Never returns a
    /// message with identifier below the cursor. Caller loops.
    async fn receive_since(&self, cursor: Cursor) -> Result<Vec<RawMessage>, ChannelError>;

    /// One non-blocking drain used to initialize the cursor at the current
    /// stream tail, so commands issued before the run never replay into it.
    async fn receive_tail(&self) -> Result<Vec<RawMessage>, ChannelError> {
        self.receive_since(Cursor::START).await
    }

    /// Download an attachment's bytes. Fails with SizeExceeded before any
    /// transfer when the source-reported size is over MAX_ATTACHMENT_BYTES.
    async fn fetch_attachment(&self, attachment: &MediaAttachment)
        -> Result<Vec<u8>, ChannelError>;

    /// Send a text message to the operator. Best effort at every call site.
    async fn send(&self, text: &str) -> Result<(), ChannelError>;
}
