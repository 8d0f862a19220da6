//! Cursor-ordered command intake: the single consumer of the control channel.
//! Owns the cursor (sole writer), filters by the authorized sender, parses each
//! message and hands out the first command accepted by the caller's filter.
//! Messages consumed before a match never replay; messages after it stay in the
//! stream for the next wait.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::channel::transport::{ChannelError, ControlChannel, Cursor};
use crate::command::{self, Command, Destination, PublishCommand};
use crate::log::{prefix, truncate_content_default};

/// Default spacing between receive calls while waiting for a command.
pub const COMMAND_POLL: Duration = Duration::from_secs(5);
/// Overall budget for the one-time-code wait.
pub const CODE_TIMEOUT: Duration = Duration::from_secs(120);
/// Log a "still waiting" line every this many polls.
const WAIT_LOG_EVERY: u32 = 12;
/// Attempts at the startup tail read before giving up on the channel.
const TAIL_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("timed out waiting for a command from the control channel")]
    TimedOut,
    /// The startup tail read never succeeded. Starting without it would let
    /// commands sent before the run replay into it, so this aborts instead.
    #[error("control channel unavailable at startup: {0}")]
    Unavailable(ChannelError),
}

pub struct Intake<C> {
    channel: Arc<C>,
    cursor: Cursor,
    authorized: i64,
}

impl<C: ControlChannel> Intake<C> {
    /// Initialize the cursor at the current tail of the stream, discarding all
    /// prior messages so commands issued before the run never replay into it.
    /// The tail read is retried a bounded number of times; if it never
    /// succeeds the run aborts rather than starting at the stream floor and
    /// replaying stale commands.
    pub async fn start(channel: Arc<C>, authorized: i64) -> Result<Self, IntakeError> {
        let mut cursor = Cursor::START;
        let backlog = {
            let mut attempt = 0;
            loop {
                match channel.receive_tail().await {
                    Ok(b) => break b,
                    Err(e) => {
                        attempt += 1;
                        eprintln!(
                            "{} event=tail_init error={} attempt={}",
                            prefix("channel"),
                            e,
                            attempt
                        );
                        if attempt >= TAIL_ATTEMPTS {
                            return Err(IntakeError::Unavailable(e));
                        }
                        tokio::time::sleep(COMMAND_POLL).await;
                    }
                }
            }
        };
        for msg in &backlog {
            cursor.advance_past(msg.update_id);
        }
        if !backlog.is_empty() {
            eprintln!(
                "{} event=tail_init discarded={} cursor={}",
                prefix("channel"),
                backlog.len(),
                cursor.0
            );
        }
        Ok(Self {
            channel,
            cursor,
            authorized,
        })
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Loop on the channel until `accept` maps a parsed command to a value.
    /// The cursor advances past every observed message, matched or not, so
    /// malformed or irrelevant traffic is never observed twice. Transport
    /// errors on this read path are logged and retried after the poll interval.
    pub async fn next_match<T, F>(
        &mut self,
        poll: Duration,
        deadline: Option<Duration>,
        mut accept: F,
    ) -> Result<T, IntakeError>
    where
        F: FnMut(Command) -> Option<T>,
    {
        let deadline_at = deadline.map(|d| tokio::time::Instant::now() + d);
        let mut ticks: u32 = 0;
        loop {
            let batch = match self.channel.receive_since(self.cursor).await {
                Ok(b) => b,
                Err(e) => {
                    eprintln!("{} event=receive error={}", prefix("channel"), e);
                    tokio::time::sleep(poll).await;
                    continue;
                }
            };

            for msg in batch {
                self.cursor.advance_past(msg.update_id);
                let Some(sender) = msg.sender else { continue };
                if sender != self.authorized {
                    eprintln!(
                        "{} event=drop reason=unauthorized sender={} update_id={}",
                        prefix("channel"),
                        sender,
                        msg.update_id
                    );
                    continue;
                }
                let Some(cmd) = command::parse(&msg) else {
                    if let Some(text) = msg.text.as_deref() {
                        eprintln!(
                            "{} event=ignore update_id={} content={}",
                            prefix("channel"),
                            msg.update_id,
                            truncate_content_default(text)
                        );
                    }
                    continue;
                };
                if let Some(value) = accept(cmd) {
                    return Ok(value);
                }
            }

            if let Some(at) = deadline_at {
                if tokio::time::Instant::now() + poll > at {
                    return Err(IntakeError::TimedOut);
                }
            }
            ticks += 1;
            if ticks % WAIT_LOG_EVERY == 0 {
                eprintln!("{} event=waiting polls={}", prefix("channel"), ticks);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Block until a destination-list command arrives. Waits indefinitely.
    pub async fn await_destinations(&mut self) -> Vec<Destination> {
        eprintln!("{} event=await_destinations", prefix("channel"));
        loop {
            match self
                .next_match(COMMAND_POLL, None, |cmd| match cmd {
                    Command::Destinations(d) => Some(d),
                    _ => None,
                })
                .await
            {
                Ok(d) => return d,
                Err(_) => continue,
            }
        }
    }

    /// Block until a publish command arrives. Waits indefinitely.
    pub async fn await_publish(&mut self) -> PublishCommand {
        eprintln!("{} event=await_publish", prefix("channel"));
        loop {
            match self
                .next_match(COMMAND_POLL, None, |cmd| match cmd {
                    Command::Publish(p) => Some(p),
                    _ => None,
                })
                .await
            {
                Ok(p) => return p,
                Err(_) => continue,
            }
        }
    }

    /// Wait for a one-time code, bounded by CODE_TIMEOUT. Only messages newer
    /// than the cursor position at entry are considered, which is what makes
    /// stale or replayed codes invisible here.
    pub async fn await_code(&mut self) -> Result<String, IntakeError> {
        eprintln!(
            "{} event=await_code cursor={} timeout_secs={}",
            prefix("channel"),
            self.cursor.0,
            CODE_TIMEOUT.as_secs()
        );
        self.next_match(COMMAND_POLL, Some(CODE_TIMEOUT), |cmd| match cmd {
            Command::Code(v) => Some(v),
            _ => None,
        })
        .await
    }
}
