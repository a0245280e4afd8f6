use std::time::Duration;

use tokio::time::Instant;

use crate::runner::{CancelHandle, CancelReason};

/// Sampling period for progress checks: at most 5 seconds, and at most
/// 1/30th of the stall window (and of the hard deadline, when set), so a
/// short window still gets many samples before it elapses.
fn tick_period(stall_window: Duration, hard_deadline: Option<Duration>) -> Duration {
    let mut period = std::cmp::min(Duration::from_secs(5), stall_window / 30);
    if let Some(hard_deadline) = hard_deadline {
        period = std::cmp::min(period, hard_deadline / 30);
    }
    if period.is_zero() {
        Duration::from_millis(1)
    } else {
        period
    }
}

/// Watches one runner's progress counter and hard deadline, cancelling it
/// when either fires. Samples the runner's byte counter on a fixed tick and
/// compares it against the last sample; a duration with no advance past the
/// stall window is a stall.
///
/// Runs until it cancels the runner or `stop` resolves (the runner reached a
/// terminal state on its own). Tie-break: the hard deadline is always
/// checked before the stall window on each tick, so a runner that stalls
/// exactly as the hard deadline elapses is recorded as `cancelled_hard`.
pub struct Watchdog {
    cancel: CancelHandle,
    stall_window: Duration,
    hard_deadline: Option<Duration>,
}

impl Watchdog {
    pub fn new(cancel: CancelHandle, stall_window: Duration, hard_deadline: Option<Duration>) -> Self {
        Self {
            cancel,
            stall_window,
            hard_deadline,
        }
    }

    pub async fn watch(
        &self,
        bytes_seen: impl Fn() -> u64,
        mut stop: tokio::sync::oneshot::Receiver<()>,
    ) {
        let start = Instant::now();
        let mut last_bytes = bytes_seen();
        let mut last_progress_at = start;

        let period = tick_period(self.stall_window, self.hard_deadline);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => return,
                _ = interval.tick() => {
                    if let Some(hard_deadline) = self.hard_deadline {
                        if start.elapsed() >= hard_deadline {
                            self.cancel.cancel(CancelReason::Hard);
                            return;
                        }
                    }

                    let current = bytes_seen();
                    if current > last_bytes {
                        last_bytes = current;
                        last_progress_at = Instant::now();
                        continue;
                    }

                    if last_progress_at.elapsed() >= self.stall_window {
                        self.cancel.cancel(CancelReason::Stall);
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn cancel_handle() -> CancelHandle {
        // Route through a Runner just to obtain a handle with the real
        // construction path; the child process is never spawned in these
        // tests.
        crate::runner::Runner::new(
            Arc::new(crate::output_buffer::OutputBuffer::new(1024)),
            Arc::new(crate::output_buffer::OutputBuffer::new(1024)),
            Duration::from_secs(1),
        )
        .cancel_handle()
    }

    #[tokio::test]
    async fn stall_fires_when_progress_stops() {
        let cancel = cancel_handle();
        let watchdog = Watchdog::new(cancel.clone(), Duration::from_millis(60), None);
        let (_tx, rx) = tokio::sync::oneshot::channel();

        let bytes = Arc::new(AtomicU64::new(0));
        watchdog.watch(|| bytes.load(Ordering::Relaxed), rx).await;

        assert_eq!(cancel.reason(), Some(CancelReason::Stall));
    }

    #[tokio::test]
    async fn steady_progress_prevents_stall_cancellation() {
        let cancel = cancel_handle();
        let watchdog = Watchdog::new(cancel.clone(), Duration::from_millis(80), None);
        let (tx, rx) = tokio::sync::oneshot::channel();

        let bytes = Arc::new(AtomicU64::new(0));
        let writer_bytes = bytes.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..6 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                writer_bytes.fetch_add(1, Ordering::Relaxed);
            }
        });

        let watch_fut = watchdog.watch(|| bytes.load(Ordering::Relaxed), rx);
        tokio::select! {
            _ = watch_fut => panic!("watchdog should not have cancelled a progressing runner"),
            _ = writer => {
                let _ = tx.send(());
            }
        }

        assert!(cancel.reason().is_none());
    }

    #[tokio::test]
    async fn hard_deadline_wins_over_a_simultaneous_stall() {
        let cancel = cancel_handle();
        let watchdog = Watchdog::new(
            cancel.clone(),
            Duration::from_millis(50),
            Some(Duration::from_millis(50)),
        );
        let (_tx, rx) = tokio::sync::oneshot::channel();

        let bytes = Arc::new(AtomicU64::new(0));
        watchdog.watch(|| bytes.load(Ordering::Relaxed), rx).await;

        assert_eq!(cancel.reason(), Some(CancelReason::Hard));
    }
}
