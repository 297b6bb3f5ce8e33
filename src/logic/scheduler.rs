//! Periodic background tasks with cooperative shutdown
//!
//! Every loop in the engine (collector, retrain, analysis) is one of these:
//! a tokio task that waits on an interval, runs one job, and checks a
//! shutdown channel at both suspension points.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// Shutdown requested
    Cancelled,
    /// The job asked to stop (fatal error)
    Stopped,
    Panicked,
}

/// Owner side of a periodic task. Dropping it also stops the task.
pub struct TaskHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<TaskExit>>,
    exit: Option<TaskExit>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown; the task exits at its next suspension point
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the task to finish. Safe to use inside `select!`.
    pub async fn wait(&mut self) -> TaskExit {
        if let Some(exit) = self.exit {
            return exit;
        }

        let exit = match self.join.as_mut() {
            Some(join) => match join.await {
                Ok(exit) => exit,
                Err(e) => {
                    log::error!("{} task failed: {}", self.name, e);
                    TaskExit::Panicked
                }
            },
            None => TaskExit::Cancelled,
        };

        self.join = None;
        self.exit = Some(exit);
        exit
    }

    pub async fn shutdown(mut self) -> TaskExit {
        self.cancel();
        self.wait().await
    }
}

/// Run `job` every `period` (first run immediately) until cancelled or the
/// job returns `ControlFlow::Break`. A job still running at shutdown is
/// dropped at its next await point.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut job: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let (shutdown, mut rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("{} started (every {:?})", name, period);

        let exit = loop {
            tokio::select! {
                biased;
                _ = rx.changed() => break TaskExit::Cancelled,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = rx.changed() => break TaskExit::Cancelled,
                flow = job() => {
                    if flow.is_break() {
                        break TaskExit::Stopped;
                    }
                }
            }
        };

        log::info!("{} stopped ({:?})", name, exit);
        exit
    });

    TaskHandle {
        name,
        shutdown,
        join: Some(join),
        exit: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_periodic("counter", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { ControlFlow::Continue(()) }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(handle.shutdown().await, TaskExit::Cancelled);
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_job_can_stop_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut handle = spawn_periodic("stopper", Duration::from_millis(1), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n >= 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        assert_eq!(handle.wait().await, TaskExit::Stopped);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        // Exit is remembered
        assert_eq!(handle.wait().await, TaskExit::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_job() {
        let handle = spawn_periodic("sleeper", Duration::from_millis(1), || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let exit = tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .unwrap();
        assert_eq!(exit, TaskExit::Cancelled);
    }
}
