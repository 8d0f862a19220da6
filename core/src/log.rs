//! Unified log format: [OkPoster][area] key=value ...
//! Everything goes to stderr; operator-facing errors are additionally mirrored
//! to the control channel at the call site (best effort).

const CONTENT_LOG_MAX_LEN: usize = 120;

/// Log prefix: [OkPoster][{area}] (e.g. "channel", "auth", "publish", "run").
#[inline]
pub fn prefix(area: &str) -> String {
    format!("[OkPoster][{}]", area)
}

/// Truncate message content for logging (avoid huge dumps).
#[inline]
pub fn truncate_content(content: &str, max_len: usize) -> std::borrow::Cow<'_, str> {
    if content.len() <= max_len {
        std::borrow::Cow::Borrowed(content)
    } else {
        let cut = content
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        std::borrow::Cow::Owned(format!("{}... ({} bytes)", &content[..cut], content.len()))
    }
}

#[inline]
pub fn truncate_content_default(content: &str) -> std::borrow::Cow<'_, str> {
    truncate_content(content, CONTENT_LOG_MAX_LEN)
}
