//! Serialization Queue
//!
//! FIFO of asynchronous operations executed one at a time by a single
//! worker task. An operation is enqueued when [`SerialQueue::submit`] is
//! *called*, not when the returned future is first polled, so execution
//! order always equals call order regardless of per-operation latency.
//!
//! A failing operation only fails its own caller. Panics are caught by the
//! worker and surface as [`QueueError::Aborted`]; the next operation runs
//! as normal.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Queue errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The worker task is gone (runtime shut down).
    #[error("queue worker has stopped")]
    Closed,

    /// The operation panicked before producing a result.
    #[error("queued operation aborted")]
    Aborted,
}

/// Single-worker FIFO for state-mutating operations.
///
/// Clones submit to the same worker.
#[derive(Clone)]
pub struct SerialQueue {
    name: &'static str,
    jobs: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Create a queue and spawn its worker on the current tokio runtime.
    ///
    /// The worker exits once every clone of the queue is dropped and every
    /// job already submitted has run.
    pub fn new(name: &'static str) -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            let mut settled: u64 = 0;
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!(queue = name, "Queued operation panicked");
                }
                settled += 1;
                debug!(queue = name, settled, "Queued operation settled");
            }
            debug!(queue = name, "Queue worker stopped");
        });

        Self { name, jobs }
    }

    /// Queue name (for logging).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Schedule `operation` after everything submitted before it.
    ///
    /// The returned future resolves with the operation's output once it has
    /// run. Dropping the returned future does not cancel the operation.
    pub fn submit<F, T>(&self, operation: F) -> impl Future<Output = Result<T, QueueError>> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let output = operation.await;
            // The caller may have stopped waiting; the work is done either way.
            let _ = done_tx.send(output);
        });

        let queued = self.jobs.send(job).map_err(|_| QueueError::Closed);

        async move {
            queued?;
            done_rx.await.map_err(|_| QueueError::Aborted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recorder() -> Arc<Mutex<Vec<u32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_runs_in_submission_order_despite_delays() {
        let queue = SerialQueue::new("test");
        let log = recorder();

        // The first operation is the slowest; it must still finish first.
        let delays = [30u64, 1, 10, 0];
        let pending: Vec<_> = delays
            .iter()
            .enumerate()
            .map(|(i, delay)| {
                let log = log.clone();
                let delay = *delay;
                queue.submit(async move {
                    log.lock().unwrap().push(i as u32 * 10);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    log.lock().unwrap().push(i as u32 * 10 + 1);
                    i
                })
            })
            .collect();

        let results = futures_util::future::join_all(pending).await;
        let results: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(results, vec![0, 1, 2, 3]);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 10, 11, 20, 21, 30, 31]);
    }

    #[tokio::test]
    async fn test_order_is_fixed_at_call_time() {
        let queue = SerialQueue::new("test");
        let log = recorder();

        let first = {
            let log = log.clone();
            queue.submit(async move { log.lock().unwrap().push(1) })
        };
        let second = {
            let log = log.clone();
            queue.submit(async move { log.lock().unwrap().push(2) })
        };

        // Await in reverse; execution order is unaffected.
        second.await.unwrap();
        first.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_next_operation() {
        let queue = SerialQueue::new("test");

        let failing = queue.submit(async { Err::<u32, String>("Oops".to_string()) });
        let passing = queue.submit(async { Ok::<u32, String>(7) });

        assert_eq!(failing.await.unwrap(), Err("Oops".to_string()));
        assert_eq!(passing.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let queue = SerialQueue::new("test");

        let panicking = queue.submit(async {
            if true {
                panic!("engine exploded");
            }
            0u32
        });
        let passing = queue.submit(async { 5u32 });

        assert_eq!(panicking.await, Err(QueueError::Aborted));
        assert_eq!(passing.await, Ok(5));
    }

    #[tokio::test]
    async fn test_dropped_handle_still_runs() {
        let queue = SerialQueue::new("test");
        let log = recorder();

        {
            let log = log.clone();
            drop(queue.submit(async move { log.lock().unwrap().push(1) }));
        }

        let log2 = log.clone();
        queue.submit(async move { log2.lock().unwrap().push(2) }).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }
}
