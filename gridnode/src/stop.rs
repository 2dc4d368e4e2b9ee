//! Shutdown coordination shared by a node and everything it starts.
//!
//! A [`Stopper`] owns three kinds of work:
//! - workers: long-running loops that exit when the stop signal fires;
//! - async tasks: one-shot background jobs, refused once stopping;
//! - tasks: short calls admitted through [`Stopper::run_task`], refused once
//!   stopping and drained (never interrupted) by [`Stopper::wait`].

use log::debug;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Receiving side of the stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the stop signal has fired.
    pub async fn stopped(&mut self) {
        self.token.cancelled().await
    }
}

#[derive(Debug, Default)]
pub struct Stopper {
    cancel_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Stopper {
    pub fn new() -> Self {
        Stopper {
            cancel_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    pub fn should_stop(&self) -> StopSignal {
        StopSignal {
            token: self.cancel_token.clone(),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Spawns a long-running worker. Workers are expected to watch
    /// [`Stopper::should_stop`] and return promptly once it fires.
    pub fn run_worker<F>(&self, worker: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.task_tracker.spawn(worker);
    }

    /// Spawns a one-shot background task unless the stopper is stopping.
    pub fn run_async_task<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopping() {
            return false;
        }
        self.task_tracker.spawn(task);
        true
    }

    /// Runs `f` to completion unless the stopper is stopping, in which case
    /// `f` is never invoked and `None` is returned.
    pub async fn run_task<F, Fut, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        // Registered before the stop check so `wait` cannot miss the task.
        let _admitted = self.task_tracker.token();
        if self.is_stopping() {
            return None;
        }
        Some(f().await)
    }

    /// Refuses new work and fires the stop signal. Idempotent.
    pub fn stop(&self) {
        if self.is_stopping() {
            return;
        }
        debug!("stopper: stop requested");
        self.cancel_token.cancel();
        self.task_tracker.close();
    }

    /// Waits for admitted tasks to drain and for every worker and async task
    /// to finish. Call after [`Stopper::stop`].
    pub async fn wait(&self) {
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn run_task_refused_after_stop() {
        let stopper = Stopper::new();
        assert_eq!(stopper.run_task(|| async { 1 }).await, Some(1));

        stopper.stop();
        let invoked = AtomicBool::new(false);
        let result = stopper
            .run_task(|| async {
                invoked.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(result.is_none());
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn workers_exit_on_signal() {
        let stopper = Stopper::new();
        let exited = Arc::new(AtomicBool::new(false));
        let mut signal = stopper.should_stop();
        let flag = exited.clone();
        stopper.run_worker(async move {
            signal.stopped().await;
            flag.store(true, Ordering::SeqCst);
        });

        stopper.stop();
        tokio::time::timeout(Duration::from_secs(5), stopper.wait())
            .await
            .unwrap();
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn signal_observed_by_late_subscriber() {
        let stopper = Stopper::new();
        stopper.stop();
        let mut late = stopper.should_stop();
        assert!(late.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), late.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_drains_admitted_tasks() {
        let stopper = Arc::new(Stopper::new());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let s = stopper.clone();
        let call = tokio::spawn(async move {
            s.run_task(|| async move {
                started_tx.send(()).unwrap();
                release_rx.await.unwrap();
                7
            })
            .await
        });
        started_rx.await.unwrap();

        stopper.stop();
        let mut wait = Box::pin(stopper.wait());
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut wait)
                .await
                .is_err()
        );

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap();
        assert_eq!(call.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn async_task_refused_after_stop() {
        let stopper = Stopper::new();
        stopper.stop();
        assert!(!stopper.run_async_task(async {}));
    }
}
