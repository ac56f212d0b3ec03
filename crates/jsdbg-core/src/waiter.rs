//! Pause-waiter: bridges a command that is about to cause suspension and
//! the asynchronous pause event that follows.
//!
//! The waiter must exist — listeners subscribed — before the resume/step/
//! pause command is sent, otherwise a pause arriving between send and
//! subscribe is lost. Construction subscribes synchronously; only the
//! `wait` call suspends.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant};

/// Default budget for a pause to arrive.
pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the waiter re-reads session state as a safety net for missed
/// events (listener cleared by a concurrent disconnect, exit monitor racing
/// the hook install).
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A one-shot future that completes on the next pause event, on target
/// exit, or after `timeout`. It never fails: callers observe the outcome by
/// re-reading session state.
pub struct PauseWaiter {
    pause_rx: watch::Receiver<u64>,
    exit_rx: watch::Receiver<u64>,
    settled: Box<dyn Fn() -> bool + Send>,
    timeout: Duration,
}

impl PauseWaiter {
    /// Subscribe to the pause and exit channels. `settled` is polled every
    /// 100 ms and should report whether the session is already paused or
    /// idle.
    pub fn new(
        pause_rx: watch::Receiver<u64>,
        exit_rx: watch::Receiver<u64>,
        settled: impl Fn() -> bool + Send + 'static,
        timeout: Duration,
    ) -> Self {
        Self {
            pause_rx,
            exit_rx,
            settled: Box::new(settled),
            timeout,
        }
    }

    /// Wait for pause, exit, or timeout.
    pub async fn wait(mut self) {
        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);

        // First poll lands a full interval out: immediately after a resume
        // command the state may still read "paused" until the runtime's
        // resumed event is processed.
        let mut poll = interval_at(Instant::now() + STATE_POLL_INTERVAL, STATE_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = self.pause_rx.changed() => return,
                _ = self.exit_rx.changed() => return,
                _ = poll.tick() => {
                    if (self.settled)() {
                        return;
                    }
                }
                _ = &mut deadline => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn channels() -> (watch::Sender<u64>, watch::Sender<u64>, PauseWaiter) {
        let (pause_tx, pause_rx) = watch::channel(0u64);
        let (exit_tx, exit_rx) = watch::channel(0u64);
        let waiter = PauseWaiter::new(pause_rx, exit_rx, || false, Duration::from_secs(30));
        (pause_tx, exit_tx, waiter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_pause_event() {
        let (pause_tx, _exit_tx, waiter) = channels();
        let handle = tokio::spawn(waiter.wait());
        pause_tx.send(1).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_exit() {
        let (_pause_tx, exit_tx, waiter) = channels();
        let handle = tokio::spawn(waiter.wait());
        exit_tx.send(1).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_sent_before_wait_is_not_lost() {
        // The waiter subscribes at construction; a pause that fires before
        // wait() is polled must still complete it.
        let (pause_tx, _exit_tx, waiter) = channels();
        pause_tx.send(1).unwrap();
        waiter.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_any_signal() {
        let (_pause_tx, pause_rx) = watch::channel(0u64);
        let (_exit_tx, exit_rx) = watch::channel(0u64);
        let waiter = PauseWaiter::new(pause_rx, exit_rx, || false, Duration::from_millis(500));
        // No pause, no exit, never settled: only the timeout can finish it.
        waiter.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_poll_observes_settled_session() {
        let settled = Arc::new(AtomicBool::new(false));
        let observed = settled.clone();
        let (_pause_tx, pause_rx) = watch::channel(0u64);
        let (_exit_tx, exit_rx) = watch::channel(0u64);
        let waiter = PauseWaiter::new(
            pause_rx,
            exit_rx,
            move || observed.load(Ordering::Relaxed),
            Duration::from_secs(30),
        );
        settled.store(true, Ordering::Relaxed);
        // No event ever fires; the 100 ms poll picks the state up.
        waiter.wait().await;
    }
}
