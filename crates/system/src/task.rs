use chrono::{DateTime, Utc};
use pulse_core::{PulseError, Result};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, warn};

/// Receiving side of a background task's stop request.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn is_set(&self) -> bool {
        *self.0.borrow()
    }

    /// Sleep for `pause`, waking early if a stop is requested.
    /// Returns `true` when the task should exit.
    pub async fn sleep(&mut self, pause: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        tokio::select! {
            _ = time::sleep(pause) => false,
            // Err = sender dropped, which also means stop.
            _ = self.0.changed() => true,
        }
    }
}

#[derive(Debug)]
struct Running {
    stop:       watch::Sender<bool>,
    task:       JoinHandle<()>,
    started_at: DateTime<Utc>,
}

/// Holds at most one running background task and owns its shutdown.
#[derive(Debug)]
pub struct TaskSlot {
    name:             String,
    shutdown_timeout: Duration,
    running:          Mutex<Option<Running>>,
}

impl TaskSlot {
    pub fn new(name: impl Into<String>, shutdown_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            shutdown_timeout,
            running: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the task built by `make` unless one is already running.
    ///
    /// `prepare` runs under the slot lock right before spawning, so state
    /// resets cannot race a concurrent `start`. Returns `false` if the slot
    /// was busy. Must be called from within a Tokio runtime.
    pub fn start<P, F, Fut>(&self, prepare: P, make: F) -> bool
    where
        P: FnOnce(),
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        prepare();
        let (stop, rx) = watch::channel(false);
        let task = tokio::spawn(make(StopSignal(rx)));
        *running = Some(Running {
            stop,
            task,
            started_at: Utc::now(),
        });
        true
    }

    /// Request a stop and wait for the task to exit, up to the shutdown
    /// timeout. The slot is empty afterwards either way.
    pub async fn stop(&self) -> Result<()> {
        let running = self.lock().take();
        let Some(Running { stop, mut task, .. }) = running else {
            return Ok(());
        };

        let _ = stop.send(true);
        match time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("{}: background task ended abnormally: {e}", self.name);
                Ok(())
            }
            Err(_) => {
                // Stuck inside a blocking call; it exits once the call returns.
                task.abort();
                warn!(
                    "{}: background task did not exit within {:?}; abandoning it",
                    self.name, self.shutdown_timeout
                );
                Err(PulseError::ShutdownTimeout {
                    name:   self.name.clone(),
                    waited: self.shutdown_timeout,
                })
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|r| !r.task.is_finished())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().as_ref().map(|r| r.started_at)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            let _ = running.stop.send(true);
        }
    }
}

/// Run a blocking call on Tokio's blocking pool. A panic inside `call` is
/// reported through `on_panic`.
pub async fn run_blocking<T, F>(call: F, on_panic: impl FnOnce(String) -> PulseError) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| on_panic(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn start_is_exclusive_until_stopped() {
        let slot = TaskSlot::new("test", Duration::from_secs(1));
        let spawned = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let spawned = Arc::clone(&spawned);
            slot.start(
                || {},
                move |mut stop| async move {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    while !stop.sleep(Duration::from_secs(60)).await {}
                },
            );
        }
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert!(slot.is_running());

        slot.stop().await.unwrap();
        assert!(!slot.is_running());
        assert!(slot.started_at().is_none());
        slot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn finished_task_frees_the_slot() {
        let slot = TaskSlot::new("test", Duration::from_secs(1));
        assert!(slot.start(|| {}, |_| async {}));
        time::sleep(Duration::from_millis(20)).await;
        assert!(!slot.is_running());
        assert!(slot.start(|| {}, |_| async {}));
    }

    #[tokio::test]
    async fn panicking_call_is_reported() {
        let result: Result<u32> = run_blocking(
            || -> Result<u32> { panic!("boom") },
            |msg| PulseError::unavailable("test", msg),
        )
        .await;
        assert!(matches!(result, Err(PulseError::SourceUnavailable { .. })));
    }
}
