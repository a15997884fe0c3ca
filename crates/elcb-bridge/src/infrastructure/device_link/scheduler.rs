//! One-shot retry timer for the device link.
//!
//! The link manager polls [`RetryScheduler::fired`] inside its `select!`
//! loop so that commands keep being answered (with `NotConnected`) while a
//! retry is pending.  At most one retry is ever armed.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Sleep};

#[derive(Debug, Default)]
pub struct RetryScheduler {
    timer: Option<Pin<Box<Sleep>>>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer, replacing any pending deadline.
    pub fn schedule(&mut self, delay: Duration) {
        self.timer = Some(Box::pin(sleep(delay)));
    }

    pub fn cancel(&mut self) {
        self.timer = None;
    }

    /// Completes when the armed deadline passes, disarming the timer.
    ///
    /// Never completes while nothing is armed.  Cancel-safe: dropping the
    /// future leaves the deadline in place.
    pub async fn fired(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.timer = None;
            }
            None => pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;
    use tokio_test::{assert_pending, task};

    #[tokio::test]
    async fn test_fires_after_delay_and_disarms() {
        // Arrange
        let mut scheduler = RetryScheduler::new();
        scheduler.schedule(Duration::from_millis(10));

        // Act
        timeout(Duration::from_secs(1), scheduler.fired())
            .await
            .expect("timer fires");

        // Assert: a fired timer does not fire again.
        let mut fired = task::spawn(scheduler.fired());
        assert_pending!(fired.poll());
    }

    #[test]
    fn test_unarmed_scheduler_never_fires() {
        let mut scheduler = RetryScheduler::new();
        let mut fired = task::spawn(scheduler.fired());
        assert_pending!(fired.poll());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_deadline() {
        let mut scheduler = RetryScheduler::new();
        scheduler.schedule(Duration::from_secs(60));
        scheduler.schedule(Duration::from_millis(5));

        timeout(Duration::from_secs(1), scheduler.fired())
            .await
            .expect("shorter deadline wins");
    }

    #[tokio::test]
    async fn test_cancel_disarms() {
        let mut scheduler = RetryScheduler::new();
        scheduler.schedule(Duration::from_millis(5));
        scheduler.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut fired = task::spawn(scheduler.fired());
        assert_pending!(fired.poll());
    }

    #[tokio::test]
    async fn test_dropped_poll_keeps_deadline() {
        let mut scheduler = RetryScheduler::new();
        scheduler.schedule(Duration::from_millis(20));

        // A select! that picks another branch drops the fired() future.
        {
            let mut fired = task::spawn(scheduler.fired());
            assert_pending!(fired.poll());
        }

        timeout(Duration::from_secs(1), scheduler.fired())
            .await
            .expect("still fires");
    }
}
