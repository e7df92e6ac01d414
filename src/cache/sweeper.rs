//! Background sweep of expired cache entries
//!
//! Runs on a tokio interval and holds only a weak reference to the cache, so the
//! task ends on its own once the cache is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::TtlCache;

/// How often the sweep runs unless configured otherwise
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Handle for the background sweep task
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns a task that sweeps `cache` every `every`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(cache: &Arc<TtlCache>, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let weak: Weak<TtlCache> = Arc::downgrade(cache);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // Skip the first tick (immediate)
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(cache) = weak.upgrade() else {
                            break;
                        };
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired cache entries");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx, task }
    }

    /// Whether the sweep task has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the sweep task and waits for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(TtlCache::new());
        cache.set("short", &1, Duration::from_millis(5));
        cache.set("long", &2, Duration::from_secs(60));

        let sweeper = Sweeper::spawn(&cache, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;

        // len() counts raw entries, so only a sweep can have removed "short"
        assert_eq!(cache.len(), 1);
        assert!(cache.has("long"));

        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_cache_dropped() {
        let cache = Arc::new(TtlCache::new());
        let sweeper = Sweeper::spawn(&cache, Duration::from_millis(10));

        drop(cache);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let cache = Arc::new(TtlCache::new());
        let sweeper = Sweeper::spawn(&cache, DEFAULT_SWEEP_INTERVAL);
        sweeper.shutdown().await;
        assert_eq!(Arc::strong_count(&cache), 1);
    }
}
