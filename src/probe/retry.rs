use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio_util::sync::CancellationToken;

use super::error::{ProbeError, report};

/// Delay before the first retry; doubled for every following one.
pub const BACKOFF_BASE: Duration = Duration::from_millis(100);

/// Delay slept after the failed attempt with the given 0-based index.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    BACKOFF_BASE.saturating_mul(factor)
}

/// Runs `op` up to `retries` times (at least once), sleeping with exponential
/// backoff between failed attempts.
///
/// The cancellation token is observed before every attempt, while an attempt
/// is in flight and during every backoff sleep; once it fires the executor
/// returns [`ProbeError::Canceled`] without trying again. When all attempts
/// fail, the error of the last one is returned.
pub async fn retry_with_backoff<T, F, Fut>(
    retries: u32,
    cancel: &CancellationToken,
    target: &str,
    mut op: F,
) -> Result<T, ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    let attempts = retries.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ProbeError::Canceled);
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProbeError::Canceled),
            outcome = op() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts => return Err(err),
            Err(err) => err,
        };

        let backoff = backoff_delay(attempt);
        debug!(
            "Attempt {}/{} failed for {}, retrying after {:?}: {}",
            attempt + 1,
            attempts,
            target,
            backoff,
            report(&err)
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ProbeError::Canceled),
            () = tokio::time::sleep(backoff) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn failure(n: u32) -> ProbeError {
        ProbeError::invalid_target("test", format!("attempt {n} failed"))
    }

    #[test]
    fn delays_double() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
        assert_eq!(backoff_delay(64), BACKOFF_BASE.saturating_mul(u32::MAX));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(3, &CancellationToken::new(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProbeError>(())
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(3, &CancellationToken::new(), "test", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(failure(n)) } else { Ok(n) }
        })
        .await;

        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_attempts_fail_with_exponential_delays() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result = retry_with_backoff(4, &CancellationToken::new(), "test", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(failure(n))
        })
        .await;

        let elapsed = start.elapsed();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.err().map(|e| e.to_string()), Some(failure(4).to_string()));
        // 100 + 200 + 400, no sleep after the last attempt
        assert!(elapsed >= Duration::from_millis(700), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn single_retry_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(1, &CancellationToken::new(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(failure(1))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff(10, &cancel, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(failure(1))
        })
        .await;

        assert!(matches!(result, Err(ProbeError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_backoff() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let counter = calls.clone();
        let result = retry_with_backoff(10, &cancel, "test", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err::<(), _>(failure(n))
            }
        })
        .await;

        assert!(matches!(result, Err(ProbeError::Canceled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = retry_with_backoff(3, &cancel, "test", || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, ProbeError>(())
        })
        .await;

        assert!(matches!(result, Err(ProbeError::Canceled)));
    }
}
