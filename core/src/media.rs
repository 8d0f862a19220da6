//! Content resolver: turns a publish command into a concrete payload, fetching
//! the attachment through the control channel into run-scoped scratch storage.
//! The scratch directory is removed when the guard drops, on every exit path.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::channel::transport::{ChannelError, ControlChannel, MAX_ATTACHMENT_BYTES};
use crate::command::PublishCommand;
use crate::log::prefix;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("attachment too large: {size} bytes (limit {limit})")]
    SizeExceeded { size: u64, limit: u64 },
    #[error("attachment download failed: {0}")]
    Download(ChannelError),
    #[error("scratch storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("publish command carries neither attachment nor link")]
    Empty,
}

/// Run-scoped scratch directory. Dropping the guard deletes the directory and
/// everything in it.
pub struct Scratch {
    dir: tempfile::TempDir,
}

impl Scratch {
    pub fn new(root: Option<&Path>) -> std::io::Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("okposter-");
            b
        };
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// The concrete content to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Local file downloaded from the channel, inside the scratch dir.
    MediaFile { path: PathBuf, size_bytes: u64 },
    /// Remote link pasted into the composer.
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub caption: String,
    pub source: Source,
}

/// Resolve a publish command to a payload. The size ceiling is enforced from
/// the source-reported size, before any bytes move.
pub async fn resolve<C: ControlChannel>(
    channel: &C,
    command: PublishCommand,
    scratch: &Scratch,
) -> Result<Payload, ResolveError> {
    if let Some(attachment) = command.media {
        if attachment.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(ResolveError::SizeExceeded {
                size: attachment.size_bytes,
                limit: MAX_ATTACHMENT_BYTES,
            });
        }
        eprintln!(
            "{} event=fetch file_id={} size={}",
            prefix("media"),
            attachment.file_id,
            attachment.size_bytes
        );
        let bytes = channel
            .fetch_attachment(&attachment)
            .await
            .map_err(|e| match e {
                ChannelError::SizeExceeded { size, limit } => {
                    ResolveError::SizeExceeded { size, limit }
                }
                other => ResolveError::Download(other),
            })?;
        let name = attachment
            .file_name
            .as_deref()
            .map(sanitize_file_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "video.mp4".to_string());
        let path = scratch.path().join(name);
        tokio::fs::write(&path, &bytes).await?;
        eprintln!(
            "{} event=fetched path={} bytes={}",
            prefix("media"),
            path.display(),
            bytes.len()
        );
        return Ok(Payload {
            caption: command.caption,
            source: Source::MediaFile {
                path,
                size_bytes: bytes.len() as u64,
            },
        });
    }

    if let Some(link) = command.link {
        return Ok(Payload {
            caption: command.caption,
            source: Source::Link(link),
        });
    }

    Err(ResolveError::Empty)
}

/// Keep the base name only; the channel reports attacker-controllable names.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
