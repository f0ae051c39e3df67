use std::time::Duration;

use argus_metrics::MetricDto;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{Collector, MetricsSender, RateLimiter};

/// Depth of the collector → dispatcher intake queue. Producers block (apply
/// backpressure) when the queue is full; nothing is dropped.
pub const INTAKE_QUEUE_DEPTH: usize = 10;

/// Runs a collector on its own fixed-interval timer, pushing every produced
/// snapshot into the intake queue.
///
/// The task stops when the shutdown token fires, including while blocked on
/// a full queue.
pub fn spawn_collector<C>(
    mut collector: C,
    poll_interval: Duration,
    tx: mpsc::Sender<Vec<MetricDto>>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    C: Collector + 'static,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; consume it so the first
        // sample happens a full poll interval after startup.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    let metrics = collector.collect();
                    if metrics.is_empty() {
                        continue;
                    }

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = tx.send(metrics) => {
                            if result.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(collector = collector.name(), "collector stopped");
    })
}

/// Fan-in core of the agent.
///
/// The dispatcher owns the retained batch exclusively; it is only ever
/// touched from the single control loop in [`run`](Self::run), so no lock is
/// needed. A flush that fails keeps the batch for the next cycle, so failed
/// batches grow instead of dropping data.
pub struct Dispatcher<S> {
    sender: S,
    limiter: RateLimiter,
    batch: Vec<MetricDto>,
}

impl<S: MetricsSender> Dispatcher<S> {
    pub fn new(sender: S, limiter: RateLimiter) -> Self {
        Self {
            sender,
            limiter,
            batch: Vec::new(),
        }
    }

    /// Runs the control loop until the shutdown token fires.
    ///
    /// The loop selects over the intake queue, the flush timer and the
    /// shutdown signal. Flushes never overlap: they run inline in the loop,
    /// and ticks backed up behind a slow flush coalesce instead of bursting.
    ///
    /// On shutdown the collector tasks are awaited first so nothing new is
    /// appended, then whatever is queued is drained into the batch and
    /// flushed one final time, still subject to the rate limiter. A failure
    /// of that last flush is logged, not retried.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Vec<MetricDto>>,
        report_interval: Duration,
        shutdown: CancellationToken,
        collectors: Vec<JoinHandle<()>>,
    ) {
        let mut flush = tokio::time::interval(report_interval);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(metrics) = rx.recv() => self.batch.extend(metrics),
                _ = flush.tick() => {
                    if self.batch.is_empty() {
                        continue;
                    }

                    // Cap the outbound request rate; collectors keep running
                    // while the flush waits for a token.
                    let acquired = tokio::select! {
                        _ = shutdown.cancelled() => false,
                        _ = self.limiter.acquire() => true,
                    };
                    if !acquired {
                        break;
                    }

                    self.flush_once().await;
                }
            }
        }

        for handle in collectors {
            let _ = handle.await;
        }

        rx.close();
        while let Ok(metrics) = rx.try_recv() {
            self.batch.extend(metrics);
        }

        self.final_flush().await;
    }

    async fn flush_once(&mut self) {
        match self.sender.send(&self.batch).await {
            Ok(()) => {
                tracing::debug!(count = self.batch.len(), "metrics batch delivered");
                self.batch.clear();
            }
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    retained = self.batch.len(),
                    "metrics delivery failed, batch retained for next cycle"
                );
            }
        }
    }

    async fn final_flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        tracing::info!(count = self.batch.len(), "flushing retained metrics before exit");
        self.limiter.acquire().await;
        if let Err(error) = self.sender.send(&self.batch).await {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "final flush failed, dropping retained batch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::SendError;

    use super::*;

    /// Records every delivered batch, failing the first `failures` calls
    /// with a retriable error.
    #[derive(Clone, Default)]
    struct RecordingSender {
        calls: Arc<Mutex<Vec<Vec<MetricDto>>>>,
        failures: Arc<AtomicU32>,
    }

    impl RecordingSender {
        fn failing(failures: u32) -> Self {
            let sender = Self::default();
            sender.failures.store(failures, Ordering::Relaxed);
            sender
        }

        fn calls(&self) -> Vec<Vec<MetricDto>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl MetricsSender for RecordingSender {
        async fn send(&self, batch: &[MetricDto]) -> Result<(), SendError> {
            self.calls.lock().unwrap().push(batch.to_vec());
            let remaining = self.failures.load(Ordering::Relaxed);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::Relaxed);
                return Err(SendError::Status(
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
            Ok(())
        }
    }

    const REPORT: Duration = Duration::from_secs(10);

    fn start<S: MetricsSender + Send + 'static>(
        sender: S,
    ) -> (
        mpsc::Sender<Vec<MetricDto>>,
        CancellationToken,
        JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::channel(INTAKE_QUEUE_DEPTH);
        let shutdown = CancellationToken::new();
        let limiter = RateLimiter::new(4, Duration::from_secs(1));
        let dispatcher = Dispatcher::new(sender, limiter);
        let handle = tokio::spawn(dispatcher.run(rx, REPORT, shutdown.clone(), Vec::new()));
        (tx, shutdown, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_on_interval() {
        let sender = RecordingSender::default();
        let (tx, shutdown, handle) = start(sender.clone());

        tx.send(vec![MetricDto::counter("PollCount", 1)])
            .await
            .unwrap();
        tokio::time::sleep(REPORT + Duration::from_secs(1)).await;

        shutdown.cancel();
        handle.await.unwrap();

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![MetricDto::counter("PollCount", 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_skips_flush() {
        let sender = RecordingSender::default();
        let (_tx, shutdown, handle) = start(sender.clone());

        tokio::time::sleep(REPORT * 3).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(sender.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_retained_and_grows() {
        let sender = RecordingSender::failing(1);
        let (tx, shutdown, handle) = start(sender.clone());

        tx.send(vec![MetricDto::gauge("Alloc", 1.0)]).await.unwrap();
        tokio::time::sleep(REPORT + Duration::from_secs(1)).await;

        tx.send(vec![MetricDto::gauge("Alloc", 2.0)]).await.unwrap();
        tokio::time::sleep(REPORT).await;

        shutdown.cancel();
        handle.await.unwrap();

        let calls = sender.calls();
        assert_eq!(calls.len(), 2);
        // First flush failed and retained the batch; the second cycle resent
        // it together with the newly accumulated metrics.
        assert_eq!(calls[0], vec![MetricDto::gauge("Alloc", 1.0)]);
        assert_eq!(
            calls[1],
            vec![MetricDto::gauge("Alloc", 1.0), MetricDto::gauge("Alloc", 2.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_on_shutdown() {
        let sender = RecordingSender::default();
        let (tx, shutdown, handle) = start(sender.clone());

        tx.send(vec![MetricDto::counter("PollCount", 2)])
            .await
            .unwrap();
        // Cancel before any flush tick: the retained batch must still go out
        // exactly once as the best-effort final flush.
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![MetricDto::counter("PollCount", 2)]);
    }
}
