//! One end-to-end run: authenticate, collect the destination list and the
//! publish command from the control channel, resolve the payload, then publish
//! to every destination sequentially. Destination failures are isolated; only
//! authentication and payload resolution abort the run.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::auth::{self, AuthError, Credentials};
use crate::channel::intake::{Intake, IntakeError};
use crate::channel::transport::ControlChannel;
use crate::config::Config;
use crate::driver::Driver;
use crate::log::prefix;
use crate::media::{self, ResolveError, Scratch};
use crate::publish::{self, absolute_link, AttemptState};

/// Pause between consecutive destinations.
const DESTINATION_SPACING: Duration = Duration::from_secs(3);
/// Pause between consecutive result reports on the channel.
const REPORT_SPACING: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Channel(#[from] IntakeError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("scratch storage: {0}")]
    Scratch(std::io::Error),
    #[error("payload resolution failed: {0}")]
    Resolve(#[from] ResolveError),
}

#[derive(Debug)]
pub struct RunResult {
    /// Absolute permalinks of confirmed posts, in destination order.
    pub links: Vec<String>,
    /// Destinations that ended in a failed attempt.
    pub failed: usize,
}

/// Execute one complete run over an already-launched driver. The caller owns
/// the driver's lifecycle and quits it after this returns, success or not.
pub async fn run_once<D, C>(
    driver: &D,
    channel: Arc<C>,
    config: &Config,
) -> Result<RunResult, RunError>
where
    D: Driver + ?Sized,
    C: ControlChannel,
{
    let mut intake = Intake::start(channel.clone(), config.authorized_chat).await?;

    let credentials = Credentials {
        email: config.email.clone(),
        password: config.password.clone(),
    };
    if let Err(e) = auth::authenticate(driver, &mut intake, &credentials).await {
        report(&*channel, &format!("login failed: {}", e)).await;
        return Err(e.into());
    }

    let destinations = intake.await_destinations().await;
    eprintln!(
        "{} event=destinations count={}",
        prefix("run"),
        destinations.len()
    );
    let command = intake.await_publish().await;

    let scratch = Scratch::new(config.scratch_root.as_deref()).map_err(RunError::Scratch)?;
    let payload = match media::resolve(&*channel, command, &scratch).await {
        Ok(p) => p,
        Err(e) => {
            report(&*channel, &format!("cannot prepare content: {}", e)).await;
            return Err(e.into());
        }
    };

    let mut result = RunResult {
        links: Vec::new(),
        failed: 0,
    };
    for (i, destination) in destinations.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(DESTINATION_SPACING).await;
        }
        let attempt = publish::publish(driver, destination, &payload).await;
        match attempt.state {
            AttemptState::Confirmed => {
                if let Some(link) = attempt.result_link {
                    result.links.push(absolute_link(&link));
                }
            }
            AttemptState::Failed(e) => {
                result.failed += 1;
                report(
                    &*channel,
                    &format!("publish to {} failed: {}", destination.url, e),
                )
                .await;
            }
            // Submitted and no permalink observed; nothing to report or count.
            _ => {}
        }
    }

    for (i, link) in result.links.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(REPORT_SPACING).await;
        }
        report(&*channel, &format!("published: {}", link)).await;
    }
    eprintln!(
        "{} event=done published={} failed={}",
        prefix("run"),
        result.links.len(),
        result.failed
    );
    Ok(result)
}

/// Best effort; a dead channel must not take the run down with it.
async fn report<C: ControlChannel + ?Sized>(channel: &C, text: &str) {
    if let Err(e) = channel.send(text).await {
        eprintln!("{} event=report_failed error={}", prefix("run"), e);
    }
}
