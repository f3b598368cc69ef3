use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// How often a prober fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub one_off: bool,
}

/// Drives `probe` according to `schedule` until it is done or `cancel` fires.
///
/// In one-off mode the probe runs exactly once. Otherwise the first probe
/// happens one interval after start and every interval after that; a probe
/// that overruns its interval delays the next tick instead of bursting, so
/// probes of the same prober never overlap.
pub async fn run_loop<F, Fut>(name: &str, schedule: Schedule, cancel: &CancellationToken, mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if schedule.one_off {
        info!("Starting (one-off) {}", name);
        probe().await;
        return;
    }

    let period = schedule.interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting {}", name);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("{}: received shutdown signal, exiting", name);
                return;
            }
            _ = ticker.tick() => {
                debug!("{}: starting new probe", name);
                probe().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn one_off_probes_exactly_once() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let schedule = Schedule {
            interval: Duration::from_secs(60),
            one_off: true,
        };

        run_loop("test-oneoff", schedule, &CancellationToken::new(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interval_mode_runs_until_cancelled() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let cancel = CancellationToken::new();
        let token = &cancel;
        let schedule = Schedule {
            interval: Duration::from_millis(50),
            one_off: false,
        };

        let started = std::time::Instant::now();
        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            run_loop("test-interval", schedule, &cancel, move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                    token.cancel();
                }
            }),
        )
        .await;

        assert!(finished.is_ok(), "loop did not stop after cancellation");
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn cancelled_loop_never_probes() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let schedule = Schedule {
            interval: Duration::from_millis(10),
            one_off: false,
        };

        run_loop("test-cancelled", schedule, &cancel, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_probe_waits_one_interval() {
        let cancel = CancellationToken::new();
        let token = &cancel;
        let start = Instant::now();
        let first = std::sync::Mutex::new(None);
        let first_ref = &first;
        let schedule = Schedule {
            interval: Duration::from_secs(5),
            one_off: false,
        };

        run_loop("test-first-tick", schedule, &cancel, move || async move {
            *first_ref.lock().unwrap() = Some(start.elapsed());
            token.cancel();
        })
        .await;

        let waited = first.lock().unwrap().expect("probe did not run");
        assert!(waited >= Duration::from_secs(5), "first probe after {waited:?}");
        assert!(waited < Duration::from_millis(5010), "first probe after {waited:?}");
    }
}
