//! Cleanup registry for tearing down runtime resources.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// A deferred asynchronous cleanup action.
pub type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

struct CleanupCallback {
    action: CleanupAction,
    name: String,
}

/// Registry for cleanup actions executed in LIFO order.
///
/// Resources are registered as they are created, so running the registry
/// releases them in reverse: containers before the network they joined.
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: Mutex<Vec<CleanupCallback>>,
}

impl CleanupRegistry {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named cleanup action.
    pub fn register<F>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), String>> + Send + 'static,
    {
        self.callbacks.lock().push(CleanupCallback {
            action: Box::new(action),
            name: name.into(),
        });
    }

    /// Unregisters every action with the given name.
    ///
    /// Returns true if an action was removed.
    pub fn unregister_by_name(&self, name: &str) -> bool {
        let mut callbacks = self.callbacks.lock();
        let initial_len = callbacks.len();
        callbacks.retain(|cb| cb.name != name);
        callbacks.len() < initial_len
    }

    /// Runs all cleanup actions in LIFO order.
    ///
    /// Each action gets an equal share of the total timeout. Failures are
    /// collected but don't stop other actions from running. The registry is
    /// cleared after completion.
    pub async fn run_all(&self, timeout: Duration) -> Vec<(String, String)> {
        let callbacks: Vec<CleanupCallback> = std::mem::take(&mut *self.callbacks.lock());

        if callbacks.is_empty() {
            return Vec::new();
        }

        let share = u32::try_from(callbacks.len()).unwrap_or(u32::MAX);
        let per_action = (timeout / share).max(Duration::from_millis(10));
        let mut failures = Vec::new();

        for entry in callbacks.into_iter().rev() {
            let name = entry.name;
            match tokio::time::timeout(per_action, (entry.action)()).await {
                Ok(Ok(())) => debug!(cleanup = %name, "Cleanup finished"),
                Ok(Err(msg)) => {
                    warn!("{}: {}", name, msg);
                    failures.push((name, msg));
                }
                Err(_) => {
                    let msg = "Cleanup action timed out".to_string();
                    warn!("{}: {}", name, msg);
                    failures.push((name, msg));
                }
            }
        }

        failures
    }

    /// Returns the number of pending cleanup actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.lock().len()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
