//! Bounded-wait write admission for a single shared backend.
//!
//! When every mutation lands on one shared resource, writers queue behind
//! one global lock. A writer that cannot get in within `max_wait` is turned
//! away with [`GateError::Busy`] instead of piling up. Reads never pass
//! through the gate.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;

/// Default time a writer waits for the lock.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("Store is busy: write lock not acquired within {0:?}")]
    Busy(Duration),
}

/// Held while a write is in progress. Dropping it releases the lock.
pub type WriteGuard<'a> = MutexGuard<'a, ()>;

/// A single global write lock with a bounded wait.
#[derive(Debug)]
pub struct WriteGate {
    lock: Mutex<()>,
    max_wait: Duration,
}

impl WriteGate {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            max_wait,
        }
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Waits up to `max_wait` for the lock.
    pub async fn acquire(&self) -> Result<WriteGuard<'_>, GateError> {
        timeout(self.max_wait, self.lock.lock())
            .await
            .map_err(|_| GateError::Busy(self.max_wait))
    }

    /// Runs `write` while holding the lock.
    ///
    /// The lock is released when `write` finishes, whether it succeeded or not.
    pub async fn run<F, T>(&self, write: F) -> Result<T, GateError>
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire().await?;
        Ok(write.await)
    }
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_when_free() {
        let gate = WriteGate::new(Duration::from_millis(50));
        let guard = gate.acquire().await;
        assert!(guard.is_ok());
    }

    #[tokio::test]
    async fn test_busy_after_bounded_wait() {
        let gate = WriteGate::new(Duration::from_millis(20));
        let _held = gate.acquire().await.unwrap();

        let second = gate.acquire().await;
        assert_eq!(second.unwrap_err(), GateError::Busy(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let gate = WriteGate::new(Duration::from_millis(20));
        {
            let _held = gate.acquire().await.unwrap();
        }
        assert!(gate.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_releases_after_error() {
        let gate = WriteGate::new(Duration::from_millis(20));

        let result: Result<Result<(), &str>, GateError> =
            gate.run(async { Err("write failed") }).await;
        assert_eq!(result.unwrap(), Err("write failed"));

        assert!(gate.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_writers_are_serialized() {
        let gate = Arc::new(WriteGate::new(Duration::from_secs(5)));
        let counter = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let gate = gate.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                gate.run(async {
                    counter.lock().await.push(("start", i));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.lock().await.push(("end", i));
                })
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = counter.lock().await;
        for pair in events.chunks(2) {
            assert_eq!(pair[0].0, "start");
            assert_eq!(pair[1].0, "end");
            assert_eq!(pair[0].1, pair[1].1);
        }
    }
}
