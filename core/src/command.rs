//! Command grammar for the control channel. Free-text chat is expected noise:
//! parsing never fails, an unmatched message is simply not a command.
//!
//! Markers (case-insensitive): `#группы` destination list, `#пост` publish,
//! `#код` (or a bare 4-6 digit token) one-time code.

use std::sync::LazyLock;

use regex::Regex;

use crate::channel::{MediaAttachment, RawMessage};

static GROUPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^#(?:группы|groups)\s+(.+)$").unwrap());
static GROUP_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://ok\.ru/group/\d+/?").unwrap());
static POST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^#(?:пост|post)\s*(.*)$").unwrap());
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:#(?:код|code)\s*)?(\d{4,6})$").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

/// One publish destination: a group URL, unique within a list, order kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
}

impl Destination {
    /// The post-composition view for this group.
    pub fn post_url(&self) -> String {
        format!("{}/post", self.url.trim_end_matches('/'))
    }

    /// Short identifier for logs and snapshot labels (the numeric group id).
    pub fn slug(&self) -> String {
        self.url
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
    }
}

/// Payload request extracted from a `#пост` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCommand {
    pub caption: String,
    /// Attached media; takes precedence over any link found in the text.
    pub media: Option<MediaAttachment>,
    /// Content link, present only when there is no attachment.
    pub link: Option<String>,
}

/// A structured work item parsed from one raw message. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Destinations(Vec<Destination>),
    Publish(PublishCommand),
    Code(String),
}

/// Parse one raw message into a command, or None when it matches no rule.
pub fn parse(msg: &RawMessage) -> Option<Command> {
    let text = msg.text.as_deref().unwrap_or("").trim();
    let caption = msg.caption.as_deref().unwrap_or("").trim();

    if let Some(m) = CODE_RE.captures(text) {
        return Some(Command::Code(m[1].to_string()));
    }

    if let Some(m) = GROUPS_RE.captures(text) {
        return parse_destinations(&m[1]);
    }

    // The post marker may sit in the text or, for media messages, the caption.
    let post = POST_RE
        .captures(text)
        .or_else(|| POST_RE.captures(caption))?;
    let rest = post[1].trim().to_string();

    if let Some(att) = &msg.video {
        return Some(Command::Publish(PublishCommand {
            caption: rest,
            media: Some(att.clone()),
            link: None,
        }));
    }

    // No attachment: the first URL-shaped token anywhere in the combined text
    // becomes the content link and is stripped from the caption.
    let combined = format!("{} {} {}", text, caption, rest);
    let link = URL_RE.find(&combined)?.as_str().to_string();
    let caption = strip_markers(&rest.replace(&link, ""));
    Some(Command::Publish(PublishCommand {
        caption,
        media: None,
        link: Some(link),
    }))
}

fn parse_destinations(tail: &str) -> Option<Command> {
    let mut urls: Vec<String> = Vec::new();
    for m in GROUP_URL_RE.find_iter(tail) {
        let url = m.as_str().to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    if urls.is_empty() {
        return None;
    }
    Some(Command::Destinations(
        urls.into_iter().map(|url| Destination { url }).collect(),
    ))
}

/// Collapse whitespace left behind by link removal and drop stray markers.
fn strip_markers(s: &str) -> String {
    s.split_whitespace()
        .filter(|w| !w.eq_ignore_ascii_case("#пост") && !w.eq_ignore_ascii_case("#post"))
        .collect::<Vec<_>>()
        .join(" ")
}
