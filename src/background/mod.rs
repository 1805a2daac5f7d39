//! Detached background tasks.
//!
//! The read path hands refresh work to a [`Spawner`] and returns to the
//! client without waiting. [`Background`] runs those tasks on the Tokio
//! runtime and tracks them so the process can wait for in-flight refreshes
//! before it exits.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// A unit of detached work. It owns everything it touches.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Launches tasks whose completion the caller does not await.
///
/// A spawned task must run to completion (or failure) on its own, even if
/// the code that spawned it has already returned or been dropped.
pub trait Spawner: Send + Sync {
    fn spawn(&self, name: &'static str, task: Task);
}

/// Tokio-backed [`Spawner`] that keeps count of running tasks.
#[derive(Clone, Default)]
pub struct Background {
    tracker: TaskTracker,
}

impl Background {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Closes the tracker and waits up to `timeout` for running tasks to
    /// finish.
    ///
    /// Returns `true` if everything finished in time. Tasks spawned after
    /// this call still run, they are just not waited for.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for background tasks");
        }
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    abandoned = self.tracker.len(),
                    "background tasks did not finish before shutdown"
                );
                false
            }
        }
    }
}

impl Spawner for Background {
    fn spawn(&self, name: &'static str, task: Task) {
        debug!(task = name, "spawning background task");
        self.tracker.spawn(task);
    }
}
