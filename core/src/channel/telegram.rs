//! Telegram control channel: all teloxide usage is confined here. Long-poll
//! receive via getUpdates with an explicit offset, attachment download via
//! getFile, plain send_message for reports. Everything above this module sees
//! only the transport trait.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, UpdateKind};

use crate::channel::transport::{
    ChannelError, ControlChannel, Cursor, MediaAttachment, RawMessage, MAX_ATTACHMENT_BYTES,
};
use crate::log::prefix;

pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

/// Long-poll window for receive_since, in seconds.
const POLL_TIMEOUT_SECS: u32 = 20;

pub struct TelegramChannel {
    bot: Bot,
    chat: ChatId,
    token: String,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat: ChatId(chat_id),
            token: token.to_string(),
        }
    }

    /// Pre-flight: raw getMe over plain HTTP first (catches blocked networks
    /// with a clearer error than the client library), then through the bot.
    pub async fn check(&self) -> Result<(), ChannelError> {
        let url = format!("{}{}/getMe", TELEGRAM_API_BASE, self.token);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ChannelError::Transport(format!("http client: {}", e)))?;
        let res = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(format!("Telegram API unreachable: {}", e)))?;
        if !res.status().is_success() {
            return Err(ChannelError::Transport(format!(
                "getMe returned status {}",
                res.status()
            )));
        }
        let body = res
            .text()
            .await
            .map_err(|e| ChannelError::Transport(format!("read body: {}", e)))?;
        let _: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            ChannelError::Transport(format!("getMe invalid JSON (raw: {} bytes)", body.len()))
        })?;

        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| ChannelError::Transport(format!("get_me: {}", e)))?;
        let name = me.user.username.as_deref().unwrap_or("(no username)");
        eprintln!(
            "{} event=bot_started bot=@{} chat_id={}",
            prefix("telegram"),
            name,
            self.chat.0
        );
        Ok(())
    }
}

/// Every update becomes a RawMessage, content-bearing or not, so the cursor
/// can advance past update kinds this bot does not handle.
fn convert(update: Update) -> RawMessage {
    let update_id = update.id.0 as i32;
    let mut raw = RawMessage {
        update_id,
        sender: None,
        text: None,
        caption: None,
        video: None,
    };
    let UpdateKind::Message(msg) = update.kind else {
        return raw;
    };
    raw.sender = Some(msg.chat.id.0);
    raw.text = msg.text().map(|t| t.to_string());
    raw.caption = msg.caption().map(|c| c.to_string());
    if let Some(video) = msg.video() {
        raw.video = Some(MediaAttachment {
            file_id: video.file.id.0.clone(),
            size_bytes: video.file.size as u64,
            file_name: video.file_name.clone(),
        });
    } else if let Some(doc) = msg.document() {
        // Video sent as a file attachment.
        let is_video = doc
            .mime_type
            .as_ref()
            .map(|m| m.essence_str().starts_with("video/"))
            .unwrap_or(false);
        if is_video {
            raw.video = Some(MediaAttachment {
                file_id: doc.file.id.0.clone(),
                size_bytes: doc.file.size as u64,
                file_name: doc.file_name.clone(),
            });
        }
    }
    raw
}

#[async_trait]
impl ControlChannel for TelegramChannel {
    async fn receive_since(&self, cursor: Cursor) -> Result<Vec<RawMessage>, ChannelError> {
        let updates = self
            .bot
            .get_updates()
            .offset(cursor.0)
            .timeout(POLL_TIMEOUT_SECS)
            .await
            .map_err(|e| ChannelError::Transport(format!("get_updates: {}", e)))?;
        Ok(updates.into_iter().map(convert).collect())
    }

    /// Newest update only (offset -1), used once at startup to position the
    /// cursor past everything sent before the run.
    async fn receive_tail(&self) -> Result<Vec<RawMessage>, ChannelError> {
        let updates = self
            .bot
            .get_updates()
            .offset(-1)
            .timeout(0)
            .await
            .map_err(|e| ChannelError::Transport(format!("get_updates: {}", e)))?;
        Ok(updates.into_iter().map(convert).collect())
    }

    async fn fetch_attachment(
        &self,
        attachment: &MediaAttachment,
    ) -> Result<Vec<u8>, ChannelError> {
        if attachment.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(ChannelError::SizeExceeded {
                size: attachment.size_bytes,
                limit: MAX_ATTACHMENT_BYTES,
            });
        }
        let file = self
            .bot
            .get_file(FileId(attachment.file_id.clone()))
            .await
            .map_err(|e| ChannelError::Transport(format!("get_file: {}", e)))?;
        // The API may report a larger size than the message metadata did.
        let size = file.meta.size as u64;
        if size > MAX_ATTACHMENT_BYTES {
            return Err(ChannelError::SizeExceeded {
                size,
                limit: MAX_ATTACHMENT_BYTES,
            });
        }
        let mut buf = std::io::Cursor::new(Vec::with_capacity(size as usize));
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .map_err(|e| ChannelError::Transport(format!("download: {}", e)))?;
        let bytes = buf.into_inner();
        eprintln!(
            "{} event=downloaded file_id={} bytes={}",
            prefix("telegram"),
            attachment.file_id,
            bytes.len()
        );
        Ok(bytes)
    }

    async fn send(&self, text: &str) -> Result<(), ChannelError> {
        let text = truncate_to_max(text);
        self.bot
            .send_message(self.chat, text.as_ref())
            .await
            .map_err(|e| ChannelError::Transport(format!("send_message: {}", e)))?;
        Ok(())
    }
}

fn truncate_to_max(text: &str) -> std::borrow::Cow<'_, str> {
    if text.len() <= TELEGRAM_MAX_MESSAGE_LEN {
        return std::borrow::Cow::Borrowed(text);
    }
    let mut end = TELEGRAM_MAX_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(text[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let short = "hello";
        assert_eq!(truncate_to_max(short), "hello");
        // A multi-byte char straddling the limit is dropped whole.
        let long = format!("{}яяя", "a".repeat(TELEGRAM_MAX_MESSAGE_LEN - 1));
        let out = truncate_to_max(&long);
        assert!(out.len() <= TELEGRAM_MAX_MESSAGE_LEN);
        assert!(out.chars().all(|c| c == 'a'));
    }
}
