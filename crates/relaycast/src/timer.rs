//! One-shot reconnect timer for the control loop.
//!
//! Sits in the control loop's `select!` next to the request and inbound
//! queues. While disarmed, [`ReconnectTimer::wait`] pends forever, so that
//! branch simply never wins.

use std::time::Duration;

use tokio::time::{self, Instant};

/// A single optional deadline.
#[derive(Debug, Default)]
pub(crate) struct ReconnectTimer {
    deadline: Option<Instant>,
}

impl ReconnectTimer {
    /// Creates a disarmed timer.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fires on the next poll.
    pub(crate) fn arm_now(&mut self) {
        self.deadline = Some(Instant::now());
    }

    /// Fires once `delay` has elapsed. Re-arming replaces the deadline.
    pub(crate) fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the deadline passes, disarming the timer.
    ///
    /// Cancel-safe: if the future is dropped before the deadline, the
    /// timer stays armed.
    pub(crate) async fn wait(&mut self) {
        let Some(deadline) = self.deadline else {
            std::future::pending::<()>().await;
            return;
        };
        time::sleep_until(deadline).await;
        self.deadline = None;
        tracing::trace!("reconnect timer fired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_disarmed_never_fires() {
        let mut timer = ReconnectTimer::new();
        let fired = time::timeout(Duration::from_secs(3600), timer.wait()).await;
        assert!(fired.is_err(), "a disarmed timer must pend forever");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_arm_now_fires_immediately() {
        let mut timer = ReconnectTimer::new();
        timer.arm_now();
        let start = Instant::now();

        timer.wait().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!timer.is_armed(), "firing disarms the timer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_fires_after_delay() {
        let mut timer = ReconnectTimer::new();
        timer.arm(Duration::from_secs(1));
        let start = Instant::now();

        timer.wait().await;

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled_keeps_deadline() {
        let mut timer = ReconnectTimer::new();
        timer.arm(Duration::from_secs(5));

        let early = time::timeout(Duration::from_secs(1), timer.wait()).await;
        assert!(early.is_err());
        assert!(timer.is_armed(), "dropping wait() must not disarm");

        timer.wait().await;
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels_pending_deadline() {
        let mut timer = ReconnectTimer::new();
        timer.arm(Duration::from_millis(10));
        timer.disarm();

        let fired = time::timeout(Duration::from_secs(60), timer.wait()).await;
        assert!(fired.is_err());
    }
}
