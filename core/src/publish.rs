//! Per-destination publish orchestrator: navigate → attach → wait-ready →
//! caption → submit → wait-confirmation, every readiness condition inferred by
//! bounded polling of the submit affordance and the post-link indicators.
//! A failure here is isolated to its destination; the run always continues.
//!
//! Readiness-timeout policy: the file-upload path fails the destination
//! without submitting, the link-paste path proceeds anyway (caption and submit
//! can still succeed without a resolved preview).

use std::time::Duration;

use thiserror::Error;

use crate::command::Destination;
use crate::driver::{Driver, DriverError, ElementHandle};
use crate::log::prefix;
use crate::media::{Payload, Source};
use crate::poll::poll_until;

/// Origin prefixed to path-relative post links when reporting results.
pub const SITE_ORIGIN: &str = "https://ok.ru";

const COMPOSER: &[&str] = &["div[contenteditable='true']"];
const SUBMIT_BUTTON: &[&str] = &["button.js-pf-submit-btn[data-action='submit']"];
/// "Add video" affordances across markup revisions.
const VIDEO_BUTTON: &[&str] = &[
    "div[data-l='t,button.video'] .posting_ac_i",
    "div[data-l*='button.video']",
    ".js-video-btn",
    "div[title='Add video']",
    "div[aria-label='Add video']",
];
/// Hidden file inputs backing the video upload.
const UPLOAD_INPUT: &[&str] = &[
    ".js-fileapi-input.video-upload-input",
    "input.video-upload-input",
    ".video-upload-wrapper input[type='file']",
    ".js-upload-button input[type='file']",
    "input[type='file'][accept*='video']",
];
/// Explicit upload-failure indicators; any of these short-circuits the wait.
const UPLOAD_ERROR: &[&str] = &[
    ".upload-error",
    ".error-message",
    "div[data-state='error']",
    ".js-upload-error",
];
/// Locations where the permalink of a freshly published post shows up.
const POST_LINK: &[&str] = &[
    "#hook_Block_TipBlock .js-tip-block-url",
    ".tip-block_lk a.js-tip-block-url",
    ".action-tip a[href*='/topic/']",
    ".toast a[href*='/topic/']",
];

const NAVIGATE_SETTLE: Duration = Duration::from_secs(3);
const COMPOSER_BUDGET: Duration = Duration::from_secs(20);
const AFFORDANCE_BUDGET: Duration = Duration::from_secs(20);
const LINK_PREVIEW_BUDGET: Duration = Duration::from_secs(15);
const CONFIRM_BUDGET: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// The composition view never became interactive.
    #[error("composer did not become interactive: {0}")]
    Navigation(String),
    /// The page reported an explicit upload failure.
    #[error("upload error reported by the page: {0}")]
    Upload(String),
    /// The submit affordance never enabled within the size-proportional budget.
    #[error("upload did not finish within {budget_secs}s")]
    UploadTimeout { budget_secs: u64 },
    /// The submit affordance was disabled at publish time; nothing was clicked.
    #[error("submit affordance disabled at publish time")]
    NotReady,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, Clone)]
pub enum AttemptState {
    NotStarted,
    ContentAttached,
    CaptionInserted,
    Submitted,
    /// Published, permalink observed.
    Confirmed,
    /// Submission went through but no permalink showed up within the budget.
    ConfirmedNoLink,
    Failed(PublishError),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Confirmed | AttemptState::ConfirmedNoLink | AttemptState::Failed(_)
        )
    }
}

/// Per-destination record of publish progress and outcome.
#[derive(Debug, Clone)]
pub struct PublishAttempt {
    pub destination: Destination,
    pub state: AttemptState,
    pub result_link: Option<String>,
}

/// Upload wait proportional to payload size: one second per 512 KiB, clamped
/// to [30s, 120s]. A heuristic standing in for the upload-progress signal the
/// target does not expose.
fn upload_budget(size_bytes: u64) -> Duration {
    Duration::from_secs((size_bytes / (512 * 1024)).clamp(30, 120))
}

/// Absolute form of an observed post link (the tip block often yields a
/// path-relative href).
pub fn absolute_link(link: &str) -> String {
    if link.starts_with('/') {
        format!("{}{}", SITE_ORIGIN, link)
    } else {
        link.to_string()
    }
}

/// Publish one payload to one destination. Never panics, never aborts the
/// run: every outcome lands in the returned attempt.
pub async fn publish<D: Driver + ?Sized>(
    driver: &D,
    destination: &Destination,
    payload: &Payload,
) -> PublishAttempt {
    let mut attempt = PublishAttempt {
        destination: destination.clone(),
        state: AttemptState::NotStarted,
        result_link: None,
    };
    eprintln!(
        "{} event=start destination={}",
        prefix("publish"),
        destination.url
    );

    match run_steps(driver, destination, payload, &mut attempt).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!(
                "{} event=failed destination={} error={}",
                prefix("publish"),
                destination.url,
                e
            );
            if let PublishError::Driver(_) = &e {
                // Known failure points snapshot themselves with a precise
                // label; this covers unexpected automation errors.
                snapshot(driver, &format!("publish_error_{}", destination.slug())).await;
            }
            attempt.state = AttemptState::Failed(e);
        }
    }
    attempt
}

async fn run_steps<D: Driver + ?Sized>(
    driver: &D,
    destination: &Destination,
    payload: &Payload,
    attempt: &mut PublishAttempt,
) -> Result<(), PublishError> {
    let slug = destination.slug();

    driver.navigate(&destination.post_url()).await?;
    tokio::time::sleep(NAVIGATE_SETTLE).await;

    let Some(composer) = wait_visible(driver, COMPOSER, COMPOSER_BUDGET).await? else {
        snapshot(driver, &format!("composer_missing_{}", slug)).await;
        return Err(PublishError::Navigation(
            "composition input never became interactive".into(),
        ));
    };
    driver.click(&composer).await?;

    let link_inserted = match &payload.source {
        Source::MediaFile { path, size_bytes } => {
            attach_media(driver, &slug, path, *size_bytes).await?;
            attempt.state = AttemptState::ContentAttached;
            false
        }
        Source::Link(url) => {
            insert_link(driver, &slug, &composer, url).await?;
            attempt.state = AttemptState::ContentAttached;
            true
        }
    };

    if !payload.caption.is_empty() {
        // The attachment UI may have replaced the original node; re-locate.
        let text_box = driver
            .find_visible(COMPOSER)
            .await?
            .ok_or_else(|| DriverError::NotFound("composition input after attach".into()))?;
        driver.click(&text_box).await?;
        let text = if link_inserted {
            format!(" {}", payload.caption)
        } else {
            payload.caption.clone()
        };
        driver.type_text(&text_box, &text).await?;
        attempt.state = AttemptState::CaptionInserted;
    }

    let submit = driver
        .find_present(SUBMIT_BUTTON)
        .await?
        .ok_or_else(|| DriverError::NotFound("submit affordance".into()))?;
    if driver.attribute_of(&submit, "disabled").await?.is_some() {
        snapshot(driver, &format!("share_button_disabled_before_publish_{}", slug)).await;
        return Err(PublishError::NotReady);
    }
    driver.click(&submit).await?;
    attempt.state = AttemptState::Submitted;
    eprintln!("{} event=submitted destination={}", prefix("publish"), slug);

    match wait_post_link(driver).await? {
        Some(link) => {
            eprintln!("{} event=confirmed link={}", prefix("publish"), link);
            attempt.result_link = Some(link);
            attempt.state = AttemptState::Confirmed;
        }
        None => {
            eprintln!(
                "{} event=confirmed_without_link destination={}",
                prefix("publish"),
                slug
            );
            attempt.state = AttemptState::ConfirmedNoLink;
        }
    }
    Ok(())
}

/// File-upload path: open the video affordance, hand the file to the hidden
/// input, then wait for the submit affordance to enable. Exhausting the
/// budget fails the destination without submitting.
async fn attach_media<D: Driver + ?Sized>(
    driver: &D,
    slug: &str,
    path: &std::path::Path,
    size_bytes: u64,
) -> Result<(), PublishError> {
    if let Some(submit) = driver.find_present(SUBMIT_BUTTON).await? {
        let disabled = driver.attribute_of(&submit, "disabled").await?.is_some();
        eprintln!(
            "{} event=attach_start size={} submit_disabled={}",
            prefix("publish"),
            size_bytes,
            disabled
        );
    }

    let Some(video_button) = wait_visible(driver, VIDEO_BUTTON, AFFORDANCE_BUDGET).await? else {
        snapshot(driver, &format!("no_video_button_{}", slug)).await;
        return Err(PublishError::Upload("video affordance not found".into()));
    };
    driver.click(&video_button).await?;
    tokio::time::sleep(NAVIGATE_SETTLE).await;

    let Some(input) = wait_present(driver, UPLOAD_INPUT, AFFORDANCE_BUDGET).await? else {
        snapshot(driver, &format!("no_upload_input_{}", slug)).await;
        return Err(PublishError::Upload("upload input not found".into()));
    };
    driver.upload_file(&input, path).await?;

    let budget = upload_budget(size_bytes);
    eprintln!(
        "{} event=upload_wait budget_secs={}",
        prefix("publish"),
        budget.as_secs()
    );
    let ready = poll_until(POLL_INTERVAL, budget, || async move {
        if let Some(error) = driver.find_visible(UPLOAD_ERROR).await? {
            let text = driver.text_of(&error).await?;
            return Err(PublishError::Upload(text));
        }
        submit_enabled(driver).await.map_err(PublishError::from)
    })
    .await;
    match ready {
        Ok(Some(())) => Ok(()),
        Ok(None) => {
            snapshot(driver, &format!("share_button_not_activated_{}", slug)).await;
            Err(PublishError::UploadTimeout {
                budget_secs: budget.as_secs(),
            })
        }
        Err(e) => {
            if let PublishError::Upload(_) = &e {
                snapshot(driver, &format!("upload_error_{}", slug)).await;
            }
            Err(e)
        }
    }
}

/// Link path: paste the URL plus a trailing space (observed to trigger the
/// preview resolution), then wait briefly. Timing out here is non-fatal.
async fn insert_link<D: Driver + ?Sized>(
    driver: &D,
    slug: &str,
    composer: &ElementHandle,
    url: &str,
) -> Result<(), PublishError> {
    driver.clear(composer).await?;
    driver.type_text(composer, &format!("{} ", url)).await?;

    let ready = poll_until(POLL_INTERVAL, LINK_PREVIEW_BUDGET, || async move {
        submit_enabled(driver).await
    })
    .await?;
    if ready.is_none() {
        eprintln!(
            "{} event=link_preview_timeout destination={} (proceeding)",
            prefix("publish"),
            slug
        );
        snapshot(driver, &format!("link_not_processed_{}", slug)).await;
    }
    Ok(())
}

/// Is the submit affordance currently enabled? Re-located on every probe; the
/// page re-renders it while an upload is in flight.
async fn submit_enabled<D: Driver + ?Sized>(driver: &D) -> Result<Option<()>, DriverError> {
    let Some(submit) = driver.find_present(SUBMIT_BUTTON).await? else {
        return Ok(None);
    };
    let disabled = driver.attribute_of(&submit, "disabled").await?.is_some();
    Ok((!disabled).then_some(()))
}

async fn wait_visible<D: Driver + ?Sized>(
    driver: &D,
    selectors: &[&str],
    budget: Duration,
) -> Result<Option<ElementHandle>, DriverError> {
    poll_until(POLL_INTERVAL, budget, || async move {
        driver.find_visible(selectors).await
    })
    .await
}

async fn wait_present<D: Driver + ?Sized>(
    driver: &D,
    selectors: &[&str],
    budget: Duration,
) -> Result<Option<ElementHandle>, DriverError> {
    poll_until(POLL_INTERVAL, budget, || async move {
        driver.find_present(selectors).await
    })
    .await
}

/// First visible post-link indicator whose href matches the permalink
/// pattern. None after the budget means confirmed-without-link.
async fn wait_post_link<D: Driver + ?Sized>(driver: &D) -> Result<Option<String>, PublishError> {
    let link = poll_until(POLL_INTERVAL, CONFIRM_BUDGET, || async move {
        for selector in POST_LINK.iter().copied() {
            if let Some(el) = driver.find_visible(&[selector]).await? {
                if let Some(href) = driver.attribute_of(&el, "href").await? {
                    if href.contains("/topic/") {
                        return Ok::<_, DriverError>(Some(href));
                    }
                }
            }
        }
        Ok(None)
    })
    .await?;
    Ok(link)
}

async fn snapshot<D: Driver + ?Sized>(driver: &D, label: &str) {
    match driver.capture_snapshot(label).await {
        Ok(path) => eprintln!(
            "{} event=snapshot label={} path={}",
            prefix("publish"),
            label,
            path.display()
        ),
        Err(e) => eprintln!(
            "{} event=snapshot_failed label={} error={}",
            prefix("publish"),
            label,
            e
        ),
    }
}
