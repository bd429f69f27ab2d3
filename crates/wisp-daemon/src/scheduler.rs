//! Periodic task scheduling.
//!
//! Each scheduled task runs on its own ticker. A tick awaits the handler
//! before sleeping again, so a slow cycle delays the next tick instead of
//! overlapping with it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Owns the shutdown channel and the handles of every spawned ticker.
pub struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawn a named ticker that runs `task` every `interval`.
    ///
    /// The handler is awaited to completion before the next sleep starts;
    /// ticks never overlap.
    pub fn spawn<F, Fut>(&self, name: &'static str, interval: Duration, task: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            info!(name, interval_secs = interval.as_secs(), "ticker started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        debug!(name, "tick");
                        task().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!(name, "ticker stopped");
                        break;
                    }
                }
            }
        });
        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    /// Signal every ticker to stop and wait for them to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handles: Vec<JoinHandle<()>> = {
            match self.handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(poisoned) => poisoned.into_inner().drain(..).collect(),
            }
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));

        let c = Arc::clone(&count);
        scheduler.spawn("test", Duration::from_secs(10), move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        scheduler.shutdown().await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_never_overlaps() {
        let scheduler = Scheduler::new();
        let in_flight = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let count = Arc::new(AtomicU32::new(0));

        let flight = Arc::clone(&in_flight);
        let bad = Arc::clone(&overlapped);
        let c = Arc::clone(&count);
        // Handler takes 3x the tick interval.
        scheduler.spawn("slow", Duration::from_secs(10), move || {
            let flight = Arc::clone(&flight);
            let bad = Arc::clone(&bad);
            let c = Arc::clone(&c);
            async move {
                if flight.swap(true, Ordering::SeqCst) {
                    bad.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                flight.store(false, Ordering::SeqCst);
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(125)).await;
        scheduler.shutdown().await;

        assert!(!overlapped.load(Ordering::SeqCst));
        // 40s per full cycle (10s sleep + 30s handler): 3 complete by 125s.
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_with_no_tasks() {
        let scheduler = Scheduler::new();
        scheduler.shutdown().await;
    }
}
