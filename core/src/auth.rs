//! Session authentication state machine: login form, optional identity
//! confirmation, optional one-time-code challenge resolved out of band through
//! the control channel. Any failure here is fatal for the whole run; no
//! destination is attempted without an authenticated session.

use std::time::Duration;

use thiserror::Error;

use crate::channel::intake::{Intake, IntakeError};
use crate::channel::transport::ControlChannel;
use crate::driver::{Driver, DriverError, ElementHandle};
use crate::log::prefix;
use crate::poll::poll_until;

const LOGIN_URL: &str = "https://ok.ru/";

const EMAIL_INPUT: &[&str] = &["input[name='st.email']"];
const PASSWORD_INPUT: &[&str] = &["input[name='st.password']"];
const LOGIN_SUBMIT: &[&str] = &["input[type='submit']"];
/// Identity-confirmation affordances across markup revisions.
const CONFIRM_IDENTITY: &[&str] = &[
    "input[value='Yes, confirm']",
    "input[value='Да, это я']",
    "button[data-l*='confirm']",
];
const GET_CODE_BUTTON: &[&str] = &["input[type='submit'][value='Get code']"];
const CODE_INPUT: &[&str] = &["input#smsCode", "input[name*='smsCode']"];
const CODE_SUBMIT: &[&str] = &["input[type='submit'][value='Next']"];
const BODY: &[&str] = &["body"];

/// Bounded probe window for optional page states (identity challenge, form
/// fields after a navigation).
const PROBE_BUDGET: Duration = Duration::from_secs(20);
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    CredentialsSubmitted,
    IdentityChallengePending,
    CodeChallengePending,
    Authenticated,
    Failed,
}

/// Authentication state for one run. Created by authenticate(), destroyed at
/// process exit.
#[derive(Debug)]
pub struct Session {
    pub phase: Phase,
    pub started_at: std::time::Instant,
}

pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The site refused to issue a code (requested too often). Non-retryable.
    #[error("rate limited by the site while requesting a code")]
    RateLimited,
    /// No code arrived on the control channel within the wait budget.
    #[error("timed out waiting for the one-time code")]
    CodeTimeout,
    /// A page element the flow depends on never showed up.
    #[error("unexpected page state: {0}")]
    Page(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Drive login to an authenticated session, consuming a `Code` command from
/// the control channel if the site demands one.
pub async fn authenticate<D, C>(
    driver: &D,
    intake: &mut Intake<C>,
    credentials: &Credentials,
) -> Result<Session, AuthError>
where
    D: Driver + ?Sized,
    C: ControlChannel,
{
    let mut session = Session {
        phase: Phase::Unauthenticated,
        started_at: std::time::Instant::now(),
    };

    driver.navigate(LOGIN_URL).await?;
    submit_credentials(driver, credentials).await?;
    session.phase = Phase::CredentialsSubmitted;
    eprintln!("{} event=credentials_submitted", prefix("auth"));

    // The identity-confirmation page appears only on some logins; absence
    // within the probe window is a normal outcome.
    if let Some(confirm) = probe_visible(driver, CONFIRM_IDENTITY).await? {
        session.phase = Phase::IdentityChallengePending;
        driver.click(&confirm).await?;
        eprintln!("{} event=identity_confirmed", prefix("auth"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        session.phase = Phase::CredentialsSubmitted;
    } else {
        eprintln!("{} event=identity_page_absent", prefix("auth"));
    }

    if logged_in_marker(driver).await? {
        session.phase = Phase::Authenticated;
        eprintln!("{} event=authenticated pre_authorized=true", prefix("auth"));
        return Ok(session);
    }

    request_code(driver, &mut session).await?;

    let code = match intake.await_code().await {
        Ok(code) => code,
        Err(IntakeError::TimedOut) => return Err(AuthError::CodeTimeout),
        Err(IntakeError::Unavailable(e)) => {
            return Err(AuthError::Page(format!("control channel lost: {}", e)))
        }
    };
    submit_code(driver, &code).await?;
    session.phase = Phase::Authenticated;
    eprintln!("{} event=authenticated", prefix("auth"));
    Ok(session)
}

async fn submit_credentials<D: Driver + ?Sized>(
    driver: &D,
    credentials: &Credentials,
) -> Result<(), AuthError> {
    let email = probe_present(driver, EMAIL_INPUT)
        .await?
        .ok_or_else(|| AuthError::Page("login form did not appear".into()))?;
    driver.type_text(&email, &credentials.email).await?;

    let password = driver
        .find_present(PASSWORD_INPUT)
        .await?
        .ok_or_else(|| AuthError::Page("password field missing".into()))?;
    driver.type_text(&password, &credentials.password).await?;

    let submit = driver
        .find_visible(LOGIN_SUBMIT)
        .await?
        .ok_or_else(|| AuthError::Page("login submit missing".into()))?;
    driver.click(&submit).await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(())
}

/// The page's login-state marker: body@data-l carries `userMain` for a real
/// session and `anonymMain` for an anonymous one.
async fn logged_in_marker<D: Driver + ?Sized>(driver: &D) -> Result<bool, AuthError> {
    let Some(body) = driver.find_present(BODY).await? else {
        return Ok(false);
    };
    let data_l = driver
        .attribute_of(&body, "data-l")
        .await?
        .unwrap_or_default();
    Ok(data_l.contains("userMain") && !data_l.contains("anonymMain"))
}

async fn request_code<D: Driver + ?Sized>(
    driver: &D,
    session: &mut Session,
) -> Result<(), AuthError> {
    let button = probe_visible(driver, GET_CODE_BUTTON)
        .await?
        .ok_or_else(|| AuthError::Page("code-request button did not appear".into()))?;
    driver.click(&button).await?;
    session.phase = Phase::CodeChallengePending;
    eprintln!("{} event=code_requested", prefix("auth"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    // The site rate-limits code requests; that aborts the run, not just one
    // destination.
    if let Some(body) = driver.find_present(BODY).await? {
        let text = driver.text_of(&body).await?.to_lowercase();
        if text.contains("too often") {
            session.phase = Phase::Failed;
            return Err(AuthError::RateLimited);
        }
    }
    Ok(())
}

async fn submit_code<D: Driver + ?Sized>(driver: &D, code: &str) -> Result<(), AuthError> {
    let input = probe_present(driver, CODE_INPUT)
        .await?
        .ok_or_else(|| AuthError::Page("code input did not appear".into()))?;
    driver.clear(&input).await?;
    driver.type_text(&input, code).await?;

    let next = driver
        .find_visible(CODE_SUBMIT)
        .await?
        .ok_or_else(|| AuthError::Page("code submit missing".into()))?;
    driver.click(&next).await?;
    Ok(())
}

async fn probe_visible<D: Driver + ?Sized>(
    driver: &D,
    selectors: &[&str],
) -> Result<Option<ElementHandle>, DriverError> {
    poll_until(PROBE_INTERVAL, PROBE_BUDGET, || async move {
        driver.find_visible(selectors).await
    })
    .await
}

/// Bounded lookup: absence after the budget is a normal None, not an error.
async fn probe_present<D: Driver + ?Sized>(
    driver: &D,
    selectors: &[&str],
) -> Result<Option<ElementHandle>, DriverError> {
    poll_until(PROBE_INTERVAL, PROBE_BUDGET, || async move {
        driver.find_present(selectors).await
    })
    .await
}
