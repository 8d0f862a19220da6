//! Bounded readiness polling. The target UI exposes no event callbacks, so
//! every readiness condition (upload finished, link preview resolved, post
//! confirmed) is inferred by repeated, time-budgeted observation. All timeout
//! policy lives here; callers supply only the probe.

use std::future::Future;
use std::time::Duration;

/// Probe immediately, then every `interval`, until the probe yields a value or
/// the budget is spent. `Ok(None)` is a timeout; a probe error short-circuits
/// the wait. Probes that only answer yes/no return `Option<()>`.
pub async fn poll_until<F, Fut, T, E>(
    interval: Duration,
    budget: Duration,
    mut probe: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        if let Some(value) = probe().await? {
            return Ok(Some(value));
        }
        if tokio::time::Instant::now() + interval > deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_probe_returns_immediately() {
        let out = poll_until(Duration::from_secs(1), Duration::from_secs(30), || async move {
            Ok::<_, ()>(Some(7))
        })
        .await
        .unwrap();
        assert_eq!(out, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_some_polls() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let out = poll_until(Duration::from_secs(1), Duration::from_secs(30), || async move {
            let n = calls_ref.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>((n >= 4).then_some(n))
        })
        .await
        .unwrap();
        assert_eq!(out, Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_times_out() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let start = tokio::time::Instant::now();
        let out = poll_until(Duration::from_secs(1), Duration::from_secs(10), || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<()>, ()>(None)
        })
        .await
        .unwrap();
        assert_eq!(out, None);
        assert!(start.elapsed() <= Duration::from_secs(10));
        // Probed once per second from t=0 through t=10 inclusive.
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let result: Result<Option<()>, &str> =
            poll_until(Duration::from_secs(1), Duration::from_secs(30), || async move {
                let n = calls_ref.fetch_add(1, Ordering::SeqCst);
                if n == 2 {
                    Err("boom")
                } else {
                    Ok(None)
                }
            })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
