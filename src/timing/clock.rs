use std::future::Future;
#[cfg(test)]
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Source of time for every bounded wait, so tests can drive time by hand.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    async fn sleep_until(&mut self, deadline: Instant);

    async fn sleep(&mut self, duration: Duration) {
        let deadline = self.now() + duration;
        self.sleep_until(deadline).await;
    }

    /// Runs `future` to completion unless `duration` passes first, in which case `None`.
    async fn within<F>(&mut self, duration: Duration, future: F) -> Option<F::Output>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let deadline = self.now() + duration;
        tokio::select! {
            output = future => Some(output),
            _ = self.sleep_until(deadline) => None,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(crate) fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Instant::now();
    let (tx, rx) = watch::channel(now);

    (MockClock { current_time: rx }, MockClockController { current_time: tx })
}

#[cfg(test)]
#[derive(Clone, Debug)]
pub(crate) struct MockClock {
    current_time: watch::Receiver<Instant>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        while *self.current_time.borrow() < deadline {
            if self.current_time.changed().await.is_err() {
                // Controller is gone, time stands still forever.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) struct MockClockController {
    current_time: watch::Sender<Instant>,
}

#[cfg(test)]
impl MockClockController {
    /// Advance in steps no larger than the granularity under test. A sleeper only promises to
    /// wake at or after its deadline.
    pub(crate) fn advance(&mut self, duration: Duration) {
        let new_now = *self.current_time.borrow() + duration;
        let _ = self.current_time.send(new_now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn within_times_out_on_mock_time() {
        let (mut clock, mut controller) = mocked_clock();
        let (_keep_open, never) = oneshot::channel::<()>();
        let (done_tx, mut done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let output = clock.within(Duration::from_millis(300), never).await;
            let _ = done_tx.send(output.is_none());
        });

        controller.advance(Duration::from_millis(200));
        tokio::time::timeout(Duration::from_millis(10), &mut done_rx)
            .await
            .expect_err("Expected timeout");

        controller.advance(Duration::from_millis(100));
        assert!(done_rx.await.unwrap());
    }

    #[tokio::test]
    async fn within_returns_output() {
        let (mut clock, _controller) = mocked_clock();
        let output = clock.within(Duration::from_millis(1), async { 7 }).await;

        assert_eq!(output, Some(7));
    }
}
