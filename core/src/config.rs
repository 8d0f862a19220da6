//! Process configuration from environment variables. Four values are required;
//! startup fails with a list of whichever are missing.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {0}")]
    Missing(String),
    #[error("TELEGRAM_USER_ID is not a numeric chat id: {0:?}")]
    BadChatId(String),
}

/// Run configuration. Built once at startup, passed by reference into the run.
#[derive(Debug, Clone)]
pub struct Config {
    /// ok.ru account email (OK_EMAIL).
    pub email: String,
    /// ok.ru account password (OK_PASSWORD).
    pub password: String,
    /// Telegram bot token (TELEGRAM_BOT_TOKEN).
    pub bot_token: String,
    /// The one chat id whose messages are accepted as commands (TELEGRAM_USER_ID).
    pub authorized_chat: i64,
    /// Optional root for run-scoped scratch storage (TEMP_VIDEO_DIR). Default: system temp.
    pub scratch_root: Option<PathBuf>,
    /// Where diagnostic snapshots are written (SNAPSHOT_DIR). Default: current directory.
    pub snapshot_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str| -> String {
            match std::env::var(name) {
                Ok(v) if !v.trim().is_empty() => v,
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let email = required("OK_EMAIL");
        let password = required("OK_PASSWORD");
        let bot_token = required("TELEGRAM_BOT_TOKEN");
        let chat = required("TELEGRAM_USER_ID");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing.join(", ")));
        }

        let authorized_chat: i64 = chat
            .trim()
            .parse()
            .map_err(|_| ConfigError::BadChatId(chat.clone()))?;

        let scratch_root = std::env::var("TEMP_VIDEO_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let snapshot_dir = std::env::var("SNAPSHOT_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            email,
            password,
            bot_token,
            authorized_chat,
            scratch_root,
            snapshot_dir,
        })
    }
}
