//! Outbound call throttle shared by every network-bound component.
//!
//! Calls are queued FIFO and dispatched by a single worker task that keeps a
//! minimum spacing of `1000ms / max_per_second` between dispatches and never
//! starts more than `max_per_second` calls inside one rolling second. The
//! worker only paces the *start* of each call; calls run concurrently once
//! dispatched.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

type Job = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("request scheduler is no longer running")]
    Closed,
    #[error("scheduled call was dropped before completing")]
    Dropped,
}

/// Handle to the dispatch queue. Cloning shares the same worker.
#[derive(Clone, Debug)]
pub struct RequestScheduler {
    jobs: mpsc::UnboundedSender<Job>,
    max_per_second: u32,
}

impl RequestScheduler {
    /// Spawns the worker loop on the current tokio runtime.
    pub fn new(max_per_second: u32) -> Self {
        let max_per_second = max_per_second.max(1);
        let (jobs, queue) = mpsc::unbounded_channel();
        tokio::spawn(drain(queue, max_per_second));
        Self {
            jobs,
            max_per_second,
        }
    }

    pub fn max_per_second(&self) -> u32 {
        self.max_per_second
    }

    /// Queues `call` and resolves to its output once it has been dispatched
    /// and completed. Queueing itself never fails while the worker runs.
    pub async fn enqueue<F, Fut, T>(&self, call: F) -> Result<T, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let output = call().await;
                let _ = reply.send(output);
            })
        });
        self.jobs.send(job).map_err(|_| SchedulerError::Closed)?;
        outcome.await.map_err(|_| SchedulerError::Dropped)
    }
}

async fn drain(mut queue: mpsc::UnboundedReceiver<Job>, max_per_second: u32) {
    let spacing = WINDOW / max_per_second;
    let mut window_start = Instant::now();
    let mut dispatched_in_window = 0u32;
    let mut last_dispatch: Option<Instant> = None;

    while let Some(job) = queue.recv().await {
        if window_start.elapsed() >= WINDOW {
            window_start = Instant::now();
            dispatched_in_window = 0;
        }
        if dispatched_in_window >= max_per_second {
            counter!("request_scheduler_throttled_total", "reason" => "window").increment(1);
            sleep_until(window_start + WINDOW).await;
            window_start = Instant::now();
            dispatched_in_window = 0;
        }
        if let Some(last) = last_dispatch {
            let earliest = last + spacing;
            if earliest > Instant::now() {
                counter!("request_scheduler_throttled_total", "reason" => "spacing").increment(1);
                sleep_until(earliest).await;
            }
        }

        last_dispatch = Some(Instant::now());
        dispatched_in_window += 1;
        counter!("request_scheduler_dispatched_total").increment(1);
        tokio::spawn(job());
    }

    debug!("request scheduler queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn returns_call_output() {
        let scheduler = RequestScheduler::new(50);
        let value = scheduler.enqueue(|| async { 21 * 2 }).await.unwrap();
        assert_eq!(value, 42);

        let failed: Result<u8, String> = scheduler
            .enqueue(|| async { Err("boom".to_string()) })
            .await
            .unwrap();
        assert_eq!(failed, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn spaces_dispatches_and_keeps_fifo_order() {
        let scheduler = RequestScheduler::new(10);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for index in 0..4u32 {
            let scheduler = scheduler.clone();
            let starts = starts.clone();
            pending.push(tokio::spawn(async move {
                scheduler
                    .enqueue(move || async move {
                        starts.lock().unwrap().push((index, Instant::now()));
                    })
                    .await
            }));
            tokio::task::yield_now().await;
        }
        for handle in pending {
            handle.await.unwrap().unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 4);
        let order: Vec<u32> = starts.iter().map(|(index, _)| *index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        for pair in starts.windows(2) {
            let gap = pair[1].1.duration_since(pair[0].1);
            assert!(gap >= Duration::from_millis(95), "gap too small: {gap:?}");
        }
    }

    #[tokio::test]
    async fn caps_dispatches_per_window() {
        let scheduler = RequestScheduler::new(2);
        let began = Instant::now();
        for _ in 0..3 {
            scheduler.enqueue(|| async {}).await.unwrap();
        }
        // Third dispatch must wait for the spacing of two 500ms slots.
        assert!(began.elapsed() >= Duration::from_millis(950));
    }
}
