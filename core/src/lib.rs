//! OkPoster core: Telegram control channel, command grammar, session auth,
//! per-destination publish orchestrator, headless browser driver. No UI, no HTTP.

pub mod auth;
#[cfg(feature = "browser")]
pub mod browser;
pub mod channel;
pub mod command;
pub mod config;
pub mod driver;
pub mod log;
pub mod media;
pub mod poll;
pub mod publish;
pub mod run;

#[cfg(test)]
pub(crate) mod testing;
