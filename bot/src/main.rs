//! Standalone publisher binary: reads configuration from the environment,
//! launches the headless browser, and drives one publish run end to end.
//! Exits non-zero when the run aborts; destination-level failures do not.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use common::browser::HeadlessChrome;
use common::channel::TelegramChannel;
use common::config::Config;
use common::driver::Driver;
use common::run::{run_once, RunResult};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[OkPoster][bot] config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(result) => {
            eprintln!(
                "[OkPoster][bot] run finished published={} failed={}",
                result.links.len(),
                result.failed
            );
            if result.failed > 0 && result.links.is_empty() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("[OkPoster][bot] run aborted: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<RunResult> {
    let channel = Arc::new(TelegramChannel::new(&config.bot_token, config.authorized_chat));
    channel
        .check()
        .await
        .context("Telegram API check failed (set HTTPS_PROXY if blocked)")?;

    let driver = HeadlessChrome::launch(&config.snapshot_dir)
        .await
        .context("failed to launch headless browser")?;

    let result = run_once(&driver, channel, &config).await;

    // Release the browser whatever the outcome; its errors never mask the
    // run's.
    if let Err(e) = driver.quit().await {
        eprintln!("[OkPoster][bot] browser close: {}", e);
    }

    Ok(result?)
}
